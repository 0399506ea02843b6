//! Bybit Scalper
//!
//! An automated maker-based scalping engine for a single symbol: a ladder of
//! passive BUY limit orders rests a few ticks inside the best bid, every
//! fill is converted into a paired take-profit SELL, and the spread is
//! pocketed. The strategy engine is a value type driven by a periodic tick,
//! generic over the exchange adapter.

pub mod book;
pub mod bybit;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod stats;
pub mod ticks;

pub use book::{BuyOrder, StrategyBook, TpOrder};
pub use bybit::{BybitClient, Credentials};
pub use config::{Config, ConfigError};
pub use engine::{Snapshot, StrategyEngine};
pub use exchange::{Exchange, OrderBookTop, OrderState, OrderUpdate, Side};
pub use stats::{PendingPosition, Stats};
