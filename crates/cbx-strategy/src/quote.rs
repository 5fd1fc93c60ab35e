//! Fixed-point quoting arithmetic.
//!
//! The quote price starts from the fair value — mid, shifted by the
//! smoothed OFI and penalized by inventory — and backs off half the spread
//! on the passive side:
//!
//! ```text
//! fair = mid + s / skew_divisor − position · inventory_skew
//! px   = fair ∓ spread / 2          (buy: −, sell: +)
//! ```
//!
//! The result is clamped so it never crosses the opposite best: buys stay at
//! least one tick below the ask, sells at least one tick above the bid.

/// Quoting parameters, all 1e-8 fixed point except the divisor.
#[derive(Debug, Clone, Copy)]
pub struct QuoteParams {
    /// Divisor mapping smoothed OFI into a price offset.
    pub skew_divisor: i64,
    /// Price penalty per lot of inventory.
    pub inventory_skew: i64,
    /// Price tick used for the no-cross clamp.
    pub tick: i64,
}

/// Compute a passive quote price, or `None` if the arithmetic lands at or
/// below zero.
pub fn quote_price(
    is_buy: bool,
    best_bid: i64,
    best_ask: i64,
    smoothed_ofi: i64,
    position_lots: i64,
    params: &QuoteParams,
) -> Option<i64> {
    let mid = (best_bid + best_ask) / 2;
    let spread = best_ask - best_bid;
    let fair = mid + smoothed_ofi / params.skew_divisor - position_lots * params.inventory_skew;

    let px = if is_buy {
        (fair - spread / 2).min(best_ask - params.tick)
    } else {
        (fair + spread / 2).max(best_bid + params.tick)
    };

    (px > 0).then_some(px)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbx_core::fixed::TICK;

    const BID: i64 = 10_000_000_000; // $100.00
    const ASK: i64 = 10_002_000_000; // $100.02

    fn params() -> QuoteParams {
        QuoteParams { skew_divisor: 1_000, inventory_skew: 500_000, tick: TICK }
    }

    #[test]
    fn flat_no_signal_quotes_at_touch() {
        let p = params();
        // fair = mid, spread = 2 ticks → buy at bid, sell at ask.
        assert_eq!(quote_price(true, BID, ASK, 0, 0, &p), Some(BID));
        assert_eq!(quote_price(false, BID, ASK, 0, 0, &p), Some(ASK));
    }

    #[test]
    fn positive_signal_lifts_fair_value() {
        let p = params();
        let with_signal = quote_price(true, BID, ASK, 1_000_000_000, 0, &p).unwrap();
        let without = quote_price(true, BID, ASK, 0, 0, &p).unwrap();
        assert_eq!(with_signal - without, 1_000_000_000 / p.skew_divisor);
    }

    #[test]
    fn inventory_skews_quotes_down() {
        let p = params();
        let flat = quote_price(false, BID, ASK, 0, 0, &p).unwrap();
        let long3 = quote_price(false, BID, ASK, 0, 3, &p).unwrap();
        // Long inventory lowers the sell quote toward the bid...
        assert_eq!(flat - long3, 3 * p.inventory_skew);
        // ...but the clamp keeps it from crossing.
        let long_huge = quote_price(false, BID, ASK, 0, 1_000_000, &p).unwrap();
        assert_eq!(long_huge, BID + TICK);
    }

    #[test]
    fn buy_clamped_below_ask() {
        let p = params();
        // A large positive signal would cross the ask without the clamp.
        let px = quote_price(true, BID, ASK, i64::MAX / 4, 0, &p).unwrap();
        assert_eq!(px, ASK - TICK);
    }

    #[test]
    fn non_positive_price_suppressed() {
        let p = params();
        // Deep short inventory pushes the sell fair value below zero; the
        // bid-side clamp keeps sells positive, so drive a buy negative.
        let px = quote_price(true, 2 * TICK, 3 * TICK, -1_000_000_000_000, 0, &p);
        assert_eq!(px, None);
    }
}
