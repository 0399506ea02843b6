//! In-memory mirror of this strategy's own open orders
//!
//! The exchange is authoritative; this book is a cache reconciled on every
//! tick. It holds the BUY ladder and the take-profit set with the per-order
//! metadata the engine decides on.

use rust_decimal::Decimal;
use tokio::time::Instant;

use crate::ticks::prices_equal;

/// An open passive BUY order on the ladder
#[derive(Debug, Clone)]
pub struct BuyOrder {
    pub id: String,
    /// Tick-aligned limit price
    pub price: Decimal,
    pub qty: Decimal,
    /// Cumulative executed quantity reported by the exchange
    pub filled_qty: Decimal,
    /// Ladder layer; 0 is closest to the best bid
    pub layer: u32,
    pub placed_at: Instant,
}

/// An open take-profit SELL paired with a filled BUY
#[derive(Debug, Clone)]
pub struct TpOrder {
    pub id: String,
    /// Tick-aligned limit SELL price
    pub sell_price: Decimal,
    pub qty: Decimal,
    /// Price at which the underlying BUY filled, for P/L attribution
    pub buy_price: Decimal,
    pub placed_at: Instant,
}

/// The BUY ladder and TP set of one strategy instance
#[derive(Debug, Default)]
pub struct StrategyBook {
    pub buys: Vec<BuyOrder>,
    pub tps: Vec<TpOrder>,
}

impl StrategyBook {
    pub fn clear(&mut self) {
        self.buys.clear();
        self.tps.clear();
    }

    pub fn layer_present(&self, layer: u32) -> bool {
        self.buys.iter().any(|b| b.layer == layer)
    }

    /// An open BUY whose price matches within half a tick, if any.
    pub fn colliding_buy(&self, price: Decimal, tick: Decimal) -> Option<&BuyOrder> {
        self.buys.iter().find(|b| prices_equal(b.price, price, tick))
    }

    pub fn buy_index(&self, id: &str) -> Option<usize> {
        self.buys.iter().position(|b| b.id == id)
    }

    pub fn remove_buy(&mut self, id: &str) -> Option<BuyOrder> {
        self.buy_index(id).map(|i| self.buys.remove(i))
    }

    pub fn remove_tp(&mut self, id: &str) -> Option<TpOrder> {
        self.tps
            .iter()
            .position(|t| t.id == id)
            .map(|i| self.tps.remove(i))
    }

    /// Reassign layer indices so that a higher price always carries a lower
    /// index. Keeps the ladder's "layer grows with distance from bid"
    /// invariant after a collision reshuffle.
    pub fn relabel_layers(&mut self) {
        self.buys.sort_by(|a, b| b.price.cmp(&a.price));
        for (i, buy) in self.buys.iter_mut().enumerate() {
            buy.layer = i as u32;
        }
    }

    /// The TP with the highest sell price; ties broken by oldest placement.
    pub fn highest_tp(&self) -> Option<&TpOrder> {
        self.tps.iter().max_by(|a, b| {
            a.sell_price
                .cmp(&b.sell_price)
                // on equal prices prefer the older order
                .then_with(|| b.placed_at.cmp(&a.placed_at))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy(id: &str, price: Decimal, layer: u32) -> BuyOrder {
        BuyOrder {
            id: id.to_string(),
            price,
            qty: dec!(1),
            filled_qty: Decimal::ZERO,
            layer,
            placed_at: Instant::now(),
        }
    }

    fn tp(id: &str, sell_price: Decimal, placed_at: Instant) -> TpOrder {
        TpOrder {
            id: id.to_string(),
            sell_price,
            qty: dec!(1),
            buy_price: sell_price - dec!(0.05),
            placed_at,
        }
    }

    #[test]
    fn test_layer_present() {
        let mut book = StrategyBook::default();
        book.buys.push(buy("b1", dec!(99.98), 0));
        assert!(book.layer_present(0));
        assert!(!book.layer_present(1));
    }

    #[test]
    fn test_colliding_buy_within_half_tick() {
        let mut book = StrategyBook::default();
        book.buys.push(buy("b1", dec!(99.98), 0));
        let tick = dec!(0.01);
        assert!(book.colliding_buy(dec!(99.98), tick).is_some());
        assert!(book.colliding_buy(dec!(99.984), tick).is_some());
        assert!(book.colliding_buy(dec!(99.99), tick).is_none());
    }

    #[test]
    fn test_relabel_layers_orders_by_price() {
        let mut book = StrategyBook::default();
        book.buys.push(buy("low", dec!(99.97), 0));
        book.buys.push(buy("high", dec!(100.00), 1));
        book.buys.push(buy("mid", dec!(99.99), 2));

        book.relabel_layers();

        let layers: Vec<(String, u32)> = book
            .buys
            .iter()
            .map(|b| (b.id.clone(), b.layer))
            .collect();
        assert_eq!(
            layers,
            vec![
                ("high".to_string(), 0),
                ("mid".to_string(), 1),
                ("low".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_remove_buy() {
        let mut book = StrategyBook::default();
        book.buys.push(buy("b1", dec!(99.98), 0));
        assert!(book.remove_buy("b1").is_some());
        assert!(book.remove_buy("b1").is_none());
        assert!(book.buys.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_highest_tp_prefers_price_then_age() {
        let mut book = StrategyBook::default();
        let t0 = Instant::now();
        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        let t1 = Instant::now();

        book.tps.push(tp("older", dec!(101.50), t0));
        book.tps.push(tp("newer", dec!(101.50), t1));
        book.tps.push(tp("low", dec!(101.00), t1));

        assert_eq!(book.highest_tp().unwrap().id, "older");
    }
}
