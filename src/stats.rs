//! Session statistics
//!
//! Monotonic order counters, realized P/L, and the pending-position list
//! that shadows open take-profit orders for average-cost reporting.

use rust_decimal::Decimal;
use serde::Serialize;

/// One unit of inventory awaiting its take-profit fill. Shadows exactly one
/// open TP order, matched by exchange order id.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPosition {
    pub order_id: String,
    pub buy_price: Decimal,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub buy_created: u64,
    pub buy_filled: u64,
    pub buy_canceled: u64,
    pub sell_created: u64,
    pub sell_filled: u64,
    pub sell_canceled: u64,
    /// Realized profit/loss over the session; may be negative
    pub realized_pnl: Decimal,
    pub pending_positions: Vec<PendingPosition>,
}

impl Stats {
    pub fn add_pending(&mut self, order_id: impl Into<String>, buy_price: Decimal, qty: Decimal) {
        self.pending_positions.push(PendingPosition {
            order_id: order_id.into(),
            buy_price,
            qty,
        });
    }

    pub fn remove_pending(&mut self, order_id: &str) -> Option<PendingPosition> {
        self.pending_positions
            .iter()
            .position(|p| p.order_id == order_id)
            .map(|i| self.pending_positions.remove(i))
    }

    /// Quantity-weighted average buy price of pending positions; zero when
    /// there are none.
    pub fn average_buy_price(&self) -> Decimal {
        let total_qty: Decimal = self.pending_positions.iter().map(|p| p.qty).sum();
        if total_qty.is_zero() {
            return Decimal::ZERO;
        }
        let weighted: Decimal = self
            .pending_positions
            .iter()
            .map(|p| p.buy_price * p.qty)
            .sum();
        weighted / total_qty
    }
}
