//! Tick-price arithmetic
//!
//! Every price sent to the exchange must sit on the instrument's tick grid
//! and carry exactly the number of decimals the tick implies, so the
//! serialized form never picks up floating-point noise.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a price to the nearest multiple of the tick.
///
/// The result is rescaled to the tick's decimal places, e.g. tick `0.001`
/// always yields three decimals.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    let steps = (price / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let mut aligned = steps * tick;
    aligned.rescale(tick.scale());
    aligned
}

/// Price for a ladder layer: `offset_ticks + layer * layer_step_ticks` ticks
/// below the best bid. Layer 0 is closest to the bid.
pub fn layer_price(
    best_bid: Decimal,
    layer: u32,
    offset_ticks: u32,
    layer_step_ticks: u32,
    tick: Decimal,
) -> Decimal {
    let ticks_below = Decimal::from(offset_ticks + layer * layer_step_ticks);
    round_to_tick(best_bid - ticks_below * tick, tick)
}

/// Take-profit price for a filled buy: `tp_ticks` above the fill price.
pub fn tp_price(buy_price: Decimal, tp_ticks: u32, tick: Decimal) -> Decimal {
    round_to_tick(buy_price + Decimal::from(tp_ticks) * tick, tick)
}

/// Distance between two prices measured in ticks.
pub fn tick_distance(a: Decimal, b: Decimal, tick: Decimal) -> Decimal {
    (a - b).abs() / tick
}

/// Price equality on the tick grid: equal within half a tick.
pub fn prices_equal(a: Decimal, b: Decimal, tick: Decimal) -> bool {
    (a - b).abs() * Decimal::TWO < tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_to_tick_nearest() {
        let tick = dec!(0.01);
        assert_eq!(round_to_tick(dec!(99.984), tick), dec!(99.98));
        assert_eq!(round_to_tick(dec!(99.986), tick), dec!(99.99));
        assert_eq!(round_to_tick(dec!(100), tick), dec!(100.00));
    }

    #[test]
    fn test_round_to_tick_midpoint_away_from_zero() {
        let tick = dec!(0.01);
        assert_eq!(round_to_tick(dec!(99.985), tick), dec!(99.99));
    }

    #[test]
    fn test_round_to_tick_idempotent() {
        let tick = dec!(0.001);
        let p = round_to_tick(dec!(12.3456), tick);
        assert_eq!(round_to_tick(p, tick), p);
    }

    #[test]
    fn test_round_to_tick_scale_matches_tick() {
        let tick = dec!(0.001);
        let p = round_to_tick(dec!(5), tick);
        assert_eq!(p.scale(), 3);
        assert_eq!(p.to_string(), "5.000");
    }

    #[test]
    fn test_layer_price_ladder() {
        let tick = dec!(0.01);
        // offset 2, step 1: layers sit 2, 3, 4 ticks below the bid
        assert_eq!(layer_price(dec!(100.00), 0, 2, 1, tick), dec!(99.98));
        assert_eq!(layer_price(dec!(100.00), 1, 2, 1, tick), dec!(99.97));
        assert_eq!(layer_price(dec!(100.00), 2, 2, 1, tick), dec!(99.96));
    }

    #[test]
    fn test_tp_price_distance() {
        let tick = dec!(0.01);
        let buy = dec!(99.98);
        let sell = tp_price(buy, 5, tick);
        assert_eq!(sell, dec!(100.03));
        assert!(sell - buy >= Decimal::from(5) * tick - tick);
    }

    #[test]
    fn test_tick_distance() {
        let tick = dec!(0.01);
        assert_eq!(tick_distance(dec!(99.95), dec!(100.00), tick), dec!(5));
        assert_eq!(tick_distance(dec!(100.00), dec!(99.95), tick), dec!(5));
    }

    #[test]
    fn test_prices_equal_within_half_tick() {
        let tick = dec!(0.01);
        assert!(prices_equal(dec!(99.98), dec!(99.980), tick));
        assert!(prices_equal(dec!(99.98), dec!(99.984), tick));
        assert!(!prices_equal(dec!(99.98), dec!(99.985), tick));
        assert!(!prices_equal(dec!(99.98), dec!(99.99), tick));
    }
}
