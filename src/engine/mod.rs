//! Strategy engine and lifecycle
//!
//! The engine is a plain value that owns its order book, statistics and
//! sub-state, and is driven one tick at a time by an external scheduler.
//! Within a tick the order is fixed: waiting controller, orderbook fetch,
//! BUY reconciliation, BUY top-up, TP reconciliation. Errors in any step are
//! logged and the tick continues; the book is reconciled against the
//! exchange on the next pass.

mod ladder;
mod takeprofit;
mod waiting;

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::book::{StrategyBook, TpOrder};
use crate::config::{Config, ConfigError};
use crate::exchange::{Exchange, Side};
use crate::stats::Stats;

/// Engine lifecycle state. The waiting sub-state can only exist while
/// running, so it lives inside the `Running` variant rather than as a
/// parallel flag.
#[derive(Debug)]
pub enum EngineState {
    Stopped,
    Running { waiting: Option<WaitState> },
    Paused,
    Stopping,
}

/// Payload of the waiting-for-market-sell sub-state
#[derive(Debug)]
pub struct WaitState {
    /// The outstanding sell from a TP eviction
    pub sell: PendingSell,
    /// A BUY fill whose TP could not be placed because the cap was reached
    pub queued_tp: Option<QueuedTp>,
}

/// The sell order flattening an evicted take-profit position
#[derive(Debug)]
pub struct PendingSell {
    pub id: String,
    pub qty: Decimal,
    /// Paired buy price of the evicted TP, for P/L attribution
    pub buy_price: Decimal,
    pub placed_at: Instant,
    pub kind: PendingSellKind,
}

#[derive(Debug, Clone, Copy)]
pub enum PendingSellKind {
    Market,
    LimitFallback { price: Decimal },
}

/// A fill waiting for TP capacity to free up
#[derive(Debug, Clone, Copy)]
pub struct QueuedTp {
    pub buy_price: Decimal,
    pub qty: Decimal,
}

/// Maker-scalping strategy engine, generic over the exchange adapter.
pub struct StrategyEngine<E> {
    cfg: Config,
    exchange: E,
    state: EngineState,
    book: StrategyBook,
    stats: Stats,
    last_buy_fill: Option<Instant>,
}

impl<E: Exchange> StrategyEngine<E> {
    /// Create an engine with a validated configuration. An invalid config is
    /// fatal: the engine is never constructed.
    pub fn new(cfg: Config, exchange: E) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            exchange,
            state: EngineState::Stopped,
            book: StrategyBook::default(),
            stats: Stats::default(),
            last_buy_fill: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn state_name(&self) -> &'static str {
        match self.state {
            EngineState::Stopped => "Stopped",
            EngineState::Running { .. } => "Running",
            EngineState::Paused => "Paused",
            EngineState::Stopping => "Stopping",
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, EngineState::Stopped)
    }

    pub(crate) fn is_waiting(&self) -> bool {
        matches!(self.state, EngineState::Running { waiting: Some(_) })
    }

    pub(crate) fn waiting_mut(&mut self) -> Option<&mut WaitState> {
        match &mut self.state {
            EngineState::Running { waiting } => waiting.as_mut(),
            _ => None,
        }
    }

    pub(crate) fn take_waiting(&mut self) -> Option<WaitState> {
        match &mut self.state {
            EngineState::Running { waiting } => waiting.take(),
            _ => None,
        }
    }

    pub(crate) fn set_waiting(&mut self, wait: WaitState) {
        if let EngineState::Running { waiting } = &mut self.state {
            *waiting = Some(wait);
        }
    }

    // ==================== LIFECYCLE ====================

    /// Stopped → Running. Resets statistics and the book of record.
    pub fn start(&mut self) -> Result<()> {
        if !self.is_stopped() {
            bail!("engine can only start from Stopped (currently {})", self.state_name());
        }
        self.stats = Stats::default();
        self.book.clear();
        self.last_buy_fill = None;
        self.state = EngineState::Running { waiting: None };
        info!(symbol = %self.cfg.symbol, "engine started");
        Ok(())
    }

    /// Running → Paused. Cancels all open BUY orders and keeps the TP set.
    pub async fn pause(&mut self) -> Result<()> {
        match self.state {
            EngineState::Running { waiting: None } => {}
            EngineState::Running { waiting: Some(_) } => {
                bail!("cannot pause while a pending sell is outstanding")
            }
            _ => bail!("engine is not running"),
        }

        let partials = self.cancel_all_buys().await;
        // partial fills still need a covering sell; route them through the
        // TP manager so the cap policy applies
        for (price, qty) in partials {
            self.handle_buy_fill(price, qty).await;
        }
        // a partial at the cap evicts and leaves a pending sell outstanding,
        // which cannot be carried into Paused
        if self.is_waiting() {
            bail!("pause deferred: a partial fill left a pending sell outstanding");
        }
        self.state = EngineState::Paused;
        info!("engine paused");
        Ok(())
    }

    /// Paused → Running. BUY top-up resumes on the next tick.
    pub fn resume(&mut self) -> Result<()> {
        if !matches!(self.state, EngineState::Paused) {
            bail!("engine is not paused");
        }
        self.state = EngineState::Running { waiting: None };
        info!("engine resumed");
        Ok(())
    }

    /// Running/Paused → Stopping → Stopped. Cancels all BUYs, then applies
    /// the stop policy to the TP set: market-flatten everything when
    /// `sell_all_on_stop` is set, cancel-only otherwise.
    pub async fn stop(&mut self) -> Result<()> {
        let waiting = match std::mem::replace(&mut self.state, EngineState::Stopping) {
            EngineState::Running { waiting } => waiting,
            EngineState::Paused => None,
            prev => {
                self.state = prev;
                bail!("engine is not running");
            }
        };
        info!("engine stopping");

        // Inventory with no covering TP order: partial fills from canceled
        // BUYs, the abandoned wait payload.
        let mut flatten: Vec<(Decimal, Decimal)> = Vec::new();

        if let Some(wait) = waiting {
            match wait.sell.kind {
                PendingSellKind::LimitFallback { .. } => {
                    match self.exchange.cancel(&wait.sell.id).await {
                        Ok(()) => self.stats.sell_canceled += 1,
                        Err(e) => warn!(error = %e, "failed to cancel fallback limit on stop"),
                    }
                    flatten.push((wait.sell.buy_price, wait.sell.qty));
                }
                PendingSellKind::Market => {
                    info!(id = %wait.sell.id, "market sell left in flight on stop");
                }
            }
            if let Some(q) = wait.queued_tp {
                flatten.push((q.buy_price, q.qty));
            }
        }

        flatten.extend(self.cancel_all_buys().await);
        self.apply_stop_policy(flatten).await;

        self.state = EngineState::Stopped;
        info!(pnl = %self.stats.realized_pnl, "engine stopped");
        Ok(())
    }

    async fn apply_stop_policy(&mut self, flatten: Vec<(Decimal, Decimal)>) {
        let tps: Vec<TpOrder> = std::mem::take(&mut self.book.tps);

        if self.cfg.sell_all_on_stop && (!tps.is_empty() || !flatten.is_empty()) {
            match self.exchange.orderbook_top().await {
                Ok(top) => {
                    for tp in tps {
                        match self.exchange.cancel(&tp.id).await {
                            Ok(()) => {
                                self.stats.sell_canceled += 1;
                                match self.exchange.place_market(Side::Sell, tp.qty).await {
                                    Ok(id) => {
                                        self.stats.sell_created += 1;
                                        self.stats.realized_pnl +=
                                            (top.best_ask - tp.buy_price) * tp.qty;
                                        info!(%id, qty = %tp.qty, "position flattened at market");
                                    }
                                    Err(e) => {
                                        error!(error = %e, "market flatten failed on stop")
                                    }
                                }
                            }
                            // the TP may already be filled; leave it alone
                            Err(e) => warn!(error = %e, id = %tp.id, "cancel failed on stop"),
                        }
                    }
                    for (buy_price, qty) in flatten {
                        match self.exchange.place_market(Side::Sell, qty).await {
                            Ok(id) => {
                                self.stats.sell_created += 1;
                                self.stats.realized_pnl += (top.best_ask - buy_price) * qty;
                                info!(%id, %qty, "residual inventory flattened at market");
                            }
                            Err(e) => error!(error = %e, "market flatten failed on stop"),
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "orderbook unavailable on stop, canceling TPs without flatten");
                    for tp in tps {
                        match self.exchange.cancel(&tp.id).await {
                            Ok(()) => self.stats.sell_canceled += 1,
                            Err(e) => warn!(error = %e, id = %tp.id, "cancel failed on stop"),
                        }
                    }
                }
            }
        } else {
            for tp in tps {
                match self.exchange.cancel(&tp.id).await {
                    Ok(()) => self.stats.sell_canceled += 1,
                    Err(e) => warn!(error = %e, id = %tp.id, "cancel failed on stop"),
                }
            }
            if !flatten.is_empty() {
                warn!(
                    positions = flatten.len(),
                    "leaving residual inventory unsold on stop"
                );
            }
        }

        self.stats.pending_positions.clear();
    }

    // ==================== TICK ====================

    /// Run one reconciliation pass. Never aborts: every failure is logged
    /// and retried on the next tick.
    pub async fn tick(&mut self) {
        match self.state {
            EngineState::Running { .. } | EngineState::Paused => {}
            _ => return,
        }

        if self.is_waiting() {
            self.poll_pending_sell().await;
        }

        let top = match self.exchange.orderbook_top().await {
            Ok(top) => Some(top),
            Err(e) => {
                warn!(error = %e, "orderbook fetch failed, skipping ladder pass");
                None
            }
        };

        if let Some(top) = top {
            if matches!(self.state, EngineState::Running { waiting: None }) {
                self.reconcile_buys(top).await;
            }
            // a fill may have entered the wait sub-state during reconciliation
            if matches!(self.state, EngineState::Running { waiting: None }) {
                self.top_up_ladder(top).await;
            }
        }

        if self.is_waiting() {
            self.cancel_remaining_buys().await;
        }

        self.reconcile_tps().await;
    }

    /// Cancel every open BUY, returning `(price, filled_qty)` for orders
    /// that had partial executions. Orders whose cancel fails stay in the
    /// book and are retried next tick.
    pub(crate) async fn cancel_all_buys(&mut self) -> Vec<(Decimal, Decimal)> {
        let ids: Vec<String> = self.book.buys.iter().map(|b| b.id.clone()).collect();
        let mut partials = Vec::new();

        for id in ids {
            match self.exchange.cancel(&id).await {
                Ok(()) => {
                    self.stats.buy_canceled += 1;
                    if let Some(order) = self.book.remove_buy(&id) {
                        info!(id = %order.id, price = %order.price, "buy order canceled");
                        if order.filled_qty > Decimal::ZERO {
                            partials.push((order.price, order.filled_qty));
                        }
                    }
                }
                Err(e) => warn!(error = %e, %id, "buy cancel failed, retrying next tick"),
            }
        }

        partials
    }

    /// While waiting for a pending sell no BUY may rest on the book.
    async fn cancel_remaining_buys(&mut self) {
        if self.book.buys.is_empty() {
            return;
        }
        let partials = self.cancel_all_buys().await;
        for (price, qty) in partials {
            self.handle_buy_fill(price, qty).await;
        }
    }

    // ==================== REPORTING ====================

    /// Realized P/L plus the paper profit of every open TP at its target.
    pub fn estimated_profit(&self) -> Decimal {
        let open: Decimal = self
            .book
            .tps
            .iter()
            .map(|t| (t.sell_price - t.buy_price) * t.qty)
            .sum();
        self.stats.realized_pnl + open
    }

    pub fn snapshot(&self) -> Snapshot {
        let waiting = match &self.state {
            EngineState::Running { waiting } => waiting.as_ref(),
            _ => None,
        };

        Snapshot {
            state: self.state_name(),
            waiting_for_market_sell: waiting.is_some(),
            stats: self.stats.clone(),
            open_buy_orders: self
                .book
                .buys
                .iter()
                .map(|b| BuyOrderView {
                    id: b.id.clone(),
                    price: b.price,
                    qty: b.qty,
                    filled_qty: b.filled_qty,
                    layer: b.layer,
                    age_secs: b.placed_at.elapsed().as_secs(),
                })
                .collect(),
            open_tp_orders: self
                .book
                .tps
                .iter()
                .map(|t| TpOrderView {
                    id: t.id.clone(),
                    sell_price: t.sell_price,
                    qty: t.qty,
                    buy_price: t.buy_price,
                    age_secs: t.placed_at.elapsed().as_secs(),
                })
                .collect(),
            pending_sell: waiting.map(|w| {
                let (is_limit_fallback, limit_price) = match w.sell.kind {
                    PendingSellKind::Market => (false, None),
                    PendingSellKind::LimitFallback { price } => (true, Some(price)),
                };
                PendingSellView {
                    id: w.sell.id.clone(),
                    qty: w.sell.qty,
                    buy_price: w.sell.buy_price,
                    age_secs: w.sell.placed_at.elapsed().as_secs(),
                    is_limit_fallback,
                    limit_price,
                }
            }),
            queued_tp: waiting.and_then(|w| w.queued_tp.as_ref()).map(|q| QueuedTpView {
                buy_price: q.buy_price,
                qty: q.qty,
            }),
            estimated_profit: self.estimated_profit(),
            average_buy_price: self.stats.average_buy_price(),
        }
    }
}

/// Serializable view of the engine for an embedding server or UI
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: &'static str,
    pub waiting_for_market_sell: bool,
    pub stats: Stats,
    pub open_buy_orders: Vec<BuyOrderView>,
    pub open_tp_orders: Vec<TpOrderView>,
    pub pending_sell: Option<PendingSellView>,
    pub queued_tp: Option<QueuedTpView>,
    pub estimated_profit: Decimal,
    pub average_buy_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuyOrderView {
    pub id: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub filled_qty: Decimal,
    pub layer: u32,
    pub age_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TpOrderView {
    pub id: String,
    pub sell_price: Decimal,
    pub qty: Decimal,
    pub buy_price: Decimal,
    pub age_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingSellView {
    pub id: String,
    pub qty: Decimal,
    pub buy_price: Decimal,
    pub age_secs: u64,
    pub is_limit_fallback: bool,
    pub limit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedTpView {
    pub buy_price: Decimal,
    pub qty: Decimal,
}
