//! Cross-order waiting controller
//!
//! Drives the waiting-for-market-sell sub-state: polls the outstanding sell
//! from a TP eviction, converts a stuck market order into a limit at the
//! best bid after 30 s, and keeps that fallback limit within two ticks of
//! the bid thereafter.

use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::exchange::{Exchange, OrderState, Side};
use crate::ticks::round_to_tick;

use super::{PendingSell, PendingSellKind, StrategyEngine, WaitState};

/// How long a market sell may stay unfilled before the limit fallback
const MARKET_SELL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a fallback limit may rest before it is checked for repricing
const FALLBACK_REPRICE_AFTER: Duration = Duration::from_secs(10);

impl<E: Exchange> StrategyEngine<E> {
    /// Runs at the top of each tick while the wait sub-state is set.
    pub(crate) async fn poll_pending_sell(&mut self) {
        let Some(wait) = self.take_waiting() else { return };

        match self.exchange.status(&wait.sell.id).await {
            Ok(Some(update)) if update.state == OrderState::Filled => {
                self.settle_pending_sell(wait).await;
                return;
            }
            Ok(Some(update)) if update.state == OrderState::PartiallyFilled => {
                self.set_waiting(wait);
                return;
            }
            Ok(_) => {
                // still resting, or not yet queryable; fall through to the
                // timeout handling below
            }
            Err(e) => {
                warn!(error = %e, id = %wait.sell.id, "pending sell status check failed");
                self.set_waiting(wait);
                return;
            }
        }

        let elapsed = wait.sell.placed_at.elapsed();
        match wait.sell.kind {
            PendingSellKind::Market => {
                if elapsed <= MARKET_SELL_TIMEOUT {
                    self.set_waiting(wait);
                    return;
                }
                self.replace_market_with_limit(wait).await;
            }
            PendingSellKind::LimitFallback { price } => {
                if elapsed <= FALLBACK_REPRICE_AFTER {
                    self.set_waiting(wait);
                    return;
                }
                self.reprice_fallback_limit(wait, price).await;
            }
        }
    }

    /// The pending sell filled: attribute P/L at the current best bid (the
    /// most pessimistic fill-side quote), materialize a queued TP, and exit
    /// the wait sub-state.
    async fn settle_pending_sell(&mut self, mut wait: WaitState) {
        let estimate = match self.exchange.orderbook_top().await {
            Ok(top) => top.best_bid,
            Err(e) => {
                warn!(error = %e, "orderbook unavailable, settling pending sell at cost");
                wait.sell.buy_price
            }
        };

        let pnl = (estimate - wait.sell.buy_price) * wait.sell.qty;
        self.stats.realized_pnl += pnl;
        self.stats.sell_filled += 1;
        info!(id = %wait.sell.id, %pnl, "pending sell completed");

        if let Some(q) = wait.queued_tp.take() {
            self.place_take_profit(q.buy_price, q.qty).await;
        }
    }

    /// The market sell has been stuck past its timeout: cancel it
    /// best-effort and park a limit at the rounded best bid instead.
    async fn replace_market_with_limit(&mut self, mut wait: WaitState) {
        info!(id = %wait.sell.id, "market sell timed out, falling back to a limit");

        match self.exchange.cancel(&wait.sell.id).await {
            Ok(()) => self.stats.sell_canceled += 1,
            Err(e) => warn!(error = %e, "best-effort cancel of market sell failed"),
        }

        let top = match self.exchange.orderbook_top().await {
            Ok(top) => top,
            Err(e) => {
                warn!(error = %e, "orderbook unavailable, retrying fallback next tick");
                self.set_waiting(wait);
                return;
            }
        };

        let price = round_to_tick(top.best_bid, self.cfg.tick_size);
        match self
            .exchange
            .place_limit(Side::Sell, price, wait.sell.qty)
            .await
        {
            Ok(id) => {
                self.stats.sell_created += 1;
                info!(%id, %price, "fallback limit sell placed");
                wait.sell = PendingSell {
                    id,
                    qty: wait.sell.qty,
                    buy_price: wait.sell.buy_price,
                    placed_at: Instant::now(),
                    kind: PendingSellKind::LimitFallback { price },
                };
                self.set_waiting(wait);
            }
            Err(e) => {
                error!(error = %e, "fallback limit failed, giving up on evicted position");
                if let Some(q) = wait.queued_tp.take() {
                    self.place_take_profit(q.buy_price, q.qty).await;
                }
            }
        }
    }

    /// The fallback limit has rested long enough: if the bid has moved more
    /// than two ticks away, chase it.
    async fn reprice_fallback_limit(&mut self, mut wait: WaitState, limit_price: Decimal) {
        let top = match self.exchange.orderbook_top().await {
            Ok(top) => top,
            Err(e) => {
                warn!(error = %e, "orderbook unavailable, keeping fallback limit");
                self.set_waiting(wait);
                return;
            }
        };

        if (top.best_bid - limit_price).abs() <= Decimal::TWO * self.cfg.tick_size {
            self.set_waiting(wait);
            return;
        }

        match self.exchange.cancel(&wait.sell.id).await {
            Ok(()) => self.stats.sell_canceled += 1,
            Err(e) => warn!(error = %e, "cancel of fallback limit failed"),
        }

        let price = round_to_tick(top.best_bid, self.cfg.tick_size);
        match self
            .exchange
            .place_limit(Side::Sell, price, wait.sell.qty)
            .await
        {
            Ok(id) => {
                self.stats.sell_created += 1;
                info!(%id, old_price = %limit_price, %price, "fallback limit repriced");
                wait.sell = PendingSell {
                    id,
                    qty: wait.sell.qty,
                    buy_price: wait.sell.buy_price,
                    placed_at: Instant::now(),
                    kind: PendingSellKind::LimitFallback { price },
                };
                self.set_waiting(wait);
            }
            Err(e) => {
                error!(error = %e, "fallback reprice failed, giving up on evicted position");
                if let Some(q) = wait.queued_tp.take() {
                    self.place_take_profit(q.buy_price, q.qty).await;
                }
            }
        }
    }
}
