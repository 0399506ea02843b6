//! TP manager
//!
//! Converts every BUY fill into a paired passive SELL. When the TP cap is
//! reached, the TP with the highest sell price is evicted and market-sold,
//! and the new fill waits for capacity.

use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::book::TpOrder;
use crate::exchange::{Exchange, OrderState, Side};
use crate::ticks::tp_price;

use super::{PendingSell, PendingSellKind, QueuedTp, StrategyEngine, WaitState};

impl<E: Exchange> StrategyEngine<E> {
    /// Entry point for every BUY fill, whole or partial.
    pub(crate) async fn handle_buy_fill(&mut self, buy_price: Decimal, qty: Decimal) {
        let cap = self.cfg.max_sell_tp_orders as usize;

        // While a pending sell is outstanding a second eviction makes no
        // sense: use free capacity, else the queue slot.
        if self.is_waiting() {
            if self.book.tps.len() < cap {
                self.place_take_profit(buy_price, qty).await;
                return;
            }
            let slot_free = self
                .waiting_mut()
                .map(|w| w.queued_tp.is_none())
                .unwrap_or(false);
            if slot_free {
                if let Some(wait) = self.waiting_mut() {
                    wait.queued_tp = Some(QueuedTp { buy_price, qty });
                }
                info!(%buy_price, %qty, "fill queued until TP capacity frees");
            } else {
                warn!(%buy_price, %qty, "TP queue occupied, placing take-profit above capacity");
                self.place_take_profit(buy_price, qty).await;
            }
            return;
        }

        if self.book.tps.len() < cap {
            self.place_take_profit(buy_price, qty).await;
        } else {
            self.evict_and_market_sell(buy_price, qty).await;
        }
    }

    /// Place the paired SELL for a fill and record it in the book and the
    /// pending-position list. Returns false if the exchange refused it.
    pub(crate) async fn place_take_profit(&mut self, buy_price: Decimal, qty: Decimal) -> bool {
        let sell_price = tp_price(buy_price, self.cfg.tp_ticks, self.cfg.tick_size);
        match self.exchange.place_limit(Side::Sell, sell_price, qty).await {
            Ok(id) => {
                self.stats.sell_created += 1;
                self.stats.add_pending(id.clone(), buy_price, qty);
                self.book.tps.push(TpOrder {
                    id,
                    sell_price,
                    qty,
                    buy_price,
                    placed_at: Instant::now(),
                });
                info!(%buy_price, %sell_price, %qty, "take-profit placed");
                true
            }
            Err(e) => {
                error!(error = %e, %buy_price, %qty, "take-profit placement failed");
                false
            }
        }
    }

    /// TP overflow: evict the highest-priced TP, market-sell its inventory,
    /// and queue the new fill until the sell completes or a slot frees.
    async fn evict_and_market_sell(&mut self, fill_buy_price: Decimal, fill_qty: Decimal) {
        let Some(victim) = self.book.highest_tp().cloned() else {
            self.place_take_profit(fill_buy_price, fill_qty).await;
            return;
        };

        match self.exchange.cancel(&victim.id).await {
            Ok(()) => {
                self.stats.sell_canceled += 1;
                self.book.remove_tp(&victim.id);
                self.stats.remove_pending(&victim.id);
                info!(id = %victim.id, sell_price = %victim.sell_price, "take-profit evicted");
            }
            Err(e) => {
                // no slot was freed; the fill still needs a covering sell
                error!(error = %e, id = %victim.id, "eviction cancel failed");
                self.place_take_profit(fill_buy_price, fill_qty).await;
                return;
            }
        }

        match self.exchange.place_market(Side::Sell, victim.qty).await {
            Ok(id) => {
                self.stats.sell_created += 1;
                info!(%id, qty = %victim.qty, buy_price = %victim.buy_price,
                    "market sell placed for evicted position, awaiting completion");
                self.set_waiting(WaitState {
                    sell: PendingSell {
                        id,
                        qty: victim.qty,
                        buy_price: victim.buy_price,
                        placed_at: Instant::now(),
                        kind: PendingSellKind::Market,
                    },
                    queued_tp: Some(QueuedTp {
                        buy_price: fill_buy_price,
                        qty: fill_qty,
                    }),
                });
            }
            Err(e) => {
                // the eviction freed a slot; fall back to a plain TP for the
                // new fill and abandon the evicted inventory
                error!(error = %e, "market sell for evicted position failed");
                self.place_take_profit(fill_buy_price, fill_qty).await;
            }
        }
    }

    /// Reconcile every open TP against exchange status, then materialize a
    /// queued TP if capacity has freed. Only the pending-sell controller
    /// exits the waiting sub-state.
    pub(crate) async fn reconcile_tps(&mut self) {
        let mut slot_opened_by_fill = false;

        let ids: Vec<String> = self.book.tps.iter().map(|t| t.id.clone()).collect();
        for id in ids {
            match self.exchange.status(&id).await {
                Ok(Some(update)) => match update.state {
                    OrderState::Filled => {
                        if let Some(tp) = self.book.remove_tp(&id) {
                            let profit = (tp.sell_price - tp.buy_price) * tp.qty;
                            self.stats.realized_pnl += profit;
                            self.stats.sell_filled += 1;
                            self.stats.remove_pending(&id);
                            slot_opened_by_fill = true;
                            info!(%id, sell_price = %tp.sell_price, %profit, "take-profit filled");
                        }
                    }
                    OrderState::PartiallyFilled => {
                        debug!(%id, cum = %update.cum_exec_qty, "take-profit partially filled");
                    }
                    OrderState::New | OrderState::Other => {}
                },
                Ok(None) => debug!(%id, "take-profit unknown to the exchange"),
                Err(e) => warn!(error = %e, %id, "take-profit status check failed"),
            }
        }

        // A queued fill materializes only when an existing TP fill opened a
        // slot; the slot freed by its own eviction stays reserved until the
        // pending sell completes.
        let cap = self.cfg.max_sell_tp_orders as usize;
        if slot_opened_by_fill && self.book.tps.len() < cap {
            let queued = self.waiting_mut().and_then(|w| w.queued_tp.take());
            if let Some(q) = queued {
                if !self.place_take_profit(q.buy_price, q.qty).await {
                    // keep the fill queued and retry next tick
                    if let Some(wait) = self.waiting_mut() {
                        wait.queued_tp = Some(q);
                    }
                }
            }
        }
    }
}
