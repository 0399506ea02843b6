//! BUY-ladder manager
//!
//! Keeps up to `max_buy_orders` passive BUY orders laddered below the best
//! bid, each at a distinct layer. Reconciliation checks, in order: exchange
//! status, TTL, drift from the bid.

use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::book::BuyOrder;
use crate::exchange::{Exchange, OrderBookTop, OrderState, Side};
use crate::ticks::{layer_price, round_to_tick, tick_distance};

use super::{EngineState, StrategyEngine};

impl<E: Exchange> StrategyEngine<E> {
    /// Reconcile every open BUY against exchange status and age/drift
    /// policy. Stops early if a fill pushes the engine into the waiting
    /// sub-state; the remaining BUYs are canceled by the tick's waiting
    /// pass.
    pub(crate) async fn reconcile_buys(&mut self, top: OrderBookTop) {
        let ids: Vec<String> = self.book.buys.iter().map(|b| b.id.clone()).collect();
        for id in ids {
            self.reconcile_buy(&id, top).await;
            if self.is_waiting() {
                break;
            }
        }
    }

    async fn reconcile_buy(&mut self, id: &str, top: OrderBookTop) {
        match self.exchange.status(id).await {
            Ok(Some(update)) => match update.state {
                OrderState::Filled => {
                    if let Some(order) = self.book.remove_buy(id) {
                        self.stats.buy_filled += 1;
                        self.last_buy_fill = Some(Instant::now());
                        info!(id = %order.id, price = %order.price, qty = %order.qty, "buy filled");
                        self.handle_buy_fill(order.price, order.qty).await;
                    }
                    return;
                }
                OrderState::PartiallyFilled => {
                    if let Some(idx) = self.book.buy_index(id) {
                        self.book.buys[idx].filled_qty = update.cum_exec_qty;
                    }
                }
                OrderState::New | OrderState::Other => {}
            },
            Ok(None) => {
                // not yet queryable after placement; not filled this tick
                debug!(%id, "order unknown to the exchange");
            }
            Err(e) => warn!(error = %e, %id, "buy status check failed"),
        }

        let Some(idx) = self.book.buy_index(id) else { return };
        let (price, filled_qty, age) = {
            let order = &self.book.buys[idx];
            (order.price, order.filled_qty, order.placed_at.elapsed())
        };

        if age >= self.cfg.buy_ttl() {
            match self.exchange.cancel(id).await {
                Ok(()) => {
                    self.stats.buy_canceled += 1;
                    self.book.remove_buy(id);
                    info!(%id, %price, age_secs = age.as_secs(), "buy canceled after TTL");
                    if filled_qty > Decimal::ZERO {
                        self.last_buy_fill = Some(Instant::now());
                        self.handle_buy_fill(price, filled_qty).await;
                    }
                }
                Err(e) => warn!(error = %e, %id, "TTL cancel failed, retrying next tick"),
            }
            return;
        }

        let drift = tick_distance(price, top.best_bid, self.cfg.tick_size);
        if drift >= Decimal::from(self.cfg.reprice_ticks) {
            // hand any partial execution to the TP side before the order goes
            if filled_qty > Decimal::ZERO {
                self.handle_buy_fill(price, filled_qty).await;
            }
            match self.exchange.cancel(id).await {
                Ok(()) => self.stats.buy_canceled += 1,
                Err(e) => warn!(error = %e, %id, "reprice cancel failed"),
            }
            self.book.remove_buy(id);
            info!(%id, %price, best_bid = %top.best_bid, %drift, "buy repriced away from market");
        }
    }

    /// Place BUY orders at every missing layer until the ladder is full.
    /// Skipped while paused, while waiting for a pending sell, and during
    /// the post-fill cooldown.
    pub(crate) async fn top_up_ladder(&mut self, top: OrderBookTop) {
        if !matches!(self.state, EngineState::Running { waiting: None }) {
            return;
        }

        if self.cfg.wait_after_buy_fill_ms > 0 {
            if let Some(last) = self.last_buy_fill {
                if last.elapsed() < self.cfg.wait_after_buy_fill() {
                    debug!("post-fill cooldown active, skipping ladder top-up");
                    return;
                }
            }
        }

        for layer in 0..self.cfg.max_buy_orders {
            if self.book.buys.len() >= self.cfg.max_buy_orders as usize {
                break;
            }
            if self.book.layer_present(layer) {
                continue;
            }

            let mut price = layer_price(
                top.best_bid,
                layer,
                self.cfg.offset_ticks,
                self.cfg.layer_step_ticks,
                self.cfg.tick_size,
            );

            // Layer collision: bump one step toward the bid and retest. The
            // relabel afterwards keeps layer indices growing with distance
            // from the bid.
            let mut reshuffled = false;
            if self.book.colliding_buy(price, self.cfg.tick_size).is_some() {
                let bumped = round_to_tick(
                    price + Decimal::from(self.cfg.layer_step_ticks) * self.cfg.tick_size,
                    self.cfg.tick_size,
                );
                // a maker order must never cross the bid
                if bumped > top.best_bid
                    || self.book.colliding_buy(bumped, self.cfg.tick_size).is_some()
                {
                    debug!(layer, %price, "layer collision not resolvable, skipping");
                    continue;
                }
                price = bumped;
                reshuffled = true;
            }

            match self
                .exchange
                .place_limit(Side::Buy, price, self.cfg.order_qty)
                .await
            {
                Ok(id) => {
                    self.stats.buy_created += 1;
                    self.book.buys.push(BuyOrder {
                        id,
                        price,
                        qty: self.cfg.order_qty,
                        filled_qty: Decimal::ZERO,
                        layer,
                        placed_at: Instant::now(),
                    });
                    if reshuffled {
                        self.book.relabel_layers();
                    }
                    info!(%price, layer, qty = %self.cfg.order_qty, "buy order placed");
                }
                Err(e) => warn!(error = %e, %price, layer, "buy placement failed"),
            }
        }
    }
}
