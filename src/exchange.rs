//! Exchange adapter seam consumed by the strategy engine.
//!
//! The engine is generic over this trait so the live Bybit client and the
//! scripted test double are interchangeable. Every call is a self-contained
//! request/response; the engine never assumes atomicity between two calls.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order state as reported by the exchange, collapsed to what the engine
/// acts on. Anything that is neither resting nor filled maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Other,
}

/// Snapshot of a single order's progress
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub state: OrderState,
    pub cum_exec_qty: Decimal,
}

/// Best bid / best ask of the public order book
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderBookTop {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

/// The five operations the engine consumes.
#[async_trait]
pub trait Exchange {
    /// Place a passive limit order. Returns the exchange-assigned order id.
    async fn place_limit(&self, side: Side, price: Decimal, qty: Decimal) -> Result<String>;

    /// Place a market order. Returns the exchange-assigned order id.
    async fn place_market(&self, side: Side, qty: Decimal) -> Result<String>;

    /// Cancel an order. Idempotent from the engine's view: canceling an
    /// already-filled or unknown order is not fatal.
    async fn cancel(&self, order_id: &str) -> Result<()>;

    /// Query an order's state. `Ok(None)` means the exchange does not (yet)
    /// know the order; the engine treats that as "not filled this tick".
    async fn status(&self, order_id: &str) -> Result<Option<OrderUpdate>>;

    /// Fetch the current top of book.
    async fn orderbook_top(&self) -> Result<OrderBookTop>;
}
