//! Pipeline event structures.
//!
//! These structs are `#[repr(C, align(64))]` and `Copy` so they occupy
//! exactly one cache line each inside the SPSC rings and can be persisted
//! verbatim in the binary tick format.
//!
//! # Fixed-point convention
//!
//! All prices and quantities are `i64` at 1e-8 scale (see [`crate::fixed`]).
//! Timestamps are nanoseconds.

use crate::fixed;
use crate::types::symbol::unpack_symbol;

// ---------------------------------------------------------------------------
// BookEvent
// ---------------------------------------------------------------------------

/// A normalized L2 book update published by the feed stage.
///
/// A **reset marker** is a `BookEvent` with `is_snapshot` set and a zero
/// price; the strategy clears its book when it sees one. The feed publishes
/// a reset marker ahead of every snapshot's levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct BookEvent {
    /// Monotonic per-session event id.
    pub id: u64,
    /// Local receive timestamp, nanoseconds.
    pub timestamp_ns: u64,
    /// Level price, 1e-8 fixed point. Zero only on a reset marker.
    pub price: i64,
    /// New aggregate quantity at the level, 1e-8 fixed point.
    pub quantity: i64,
    /// Packed 8-byte symbol.
    pub symbol: u64,
    /// Bid side if true, ask otherwise.
    pub is_bid: bool,
    /// Trade print rather than an L2 level change.
    pub is_trade: bool,
    /// Level belongs to a snapshot (book rebuild in progress).
    pub is_snapshot: bool,
}

impl BookEvent {
    /// Build the reset marker that precedes a snapshot's levels.
    #[inline]
    pub fn reset_marker(id: u64, timestamp_ns: u64, symbol: u64) -> Self {
        Self {
            id,
            timestamp_ns,
            price: 0,
            quantity: 0,
            symbol,
            is_bid: false,
            is_trade: false,
            is_snapshot: true,
        }
    }

    /// Returns `true` if this event is a reset marker.
    #[inline]
    pub fn is_reset(&self) -> bool {
        self.is_snapshot && self.price == 0
    }
}

impl Default for BookEvent {
    fn default() -> Self {
        Self {
            id: 0,
            timestamp_ns: 0,
            price: 0,
            quantity: 0,
            symbol: 0,
            is_bid: false,
            is_trade: false,
            is_snapshot: false,
        }
    }
}

impl std::fmt::Display for BookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut px = String::new();
        let mut qty = String::new();
        fixed::format_fixed(self.price, 2, &mut px);
        fixed::format_fixed(self.quantity, 8, &mut qty);
        let side = if self.is_bid { "bid" } else { "ask" };
        write!(
            f,
            "BookEvent({} {side} {px}x{qty} snap={} trade={})",
            unpack_symbol(self.symbol),
            self.is_snapshot,
            self.is_trade,
        )
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// An order request emitted by the strategy stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Order {
    /// Strictly increasing per-process order id.
    pub id: u64,
    /// Monotonic timestamp at emission, nanoseconds.
    pub origin_timestamp_ns: u64,
    /// Limit price, 1e-8 fixed point.
    pub price: i64,
    /// Quantity, 1e-8 fixed point.
    pub quantity: i64,
    /// Packed 8-byte symbol.
    pub symbol: u64,
    /// Buy if true, sell otherwise.
    pub is_buy: bool,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            id: 0,
            origin_timestamp_ns: 0,
            price: 0,
            quantity: 0,
            symbol: 0,
            is_buy: false,
        }
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut px = String::new();
        let mut qty = String::new();
        fixed::format_fixed(self.price, 2, &mut px);
        fixed::format_fixed(self.quantity, 8, &mut qty);
        let side = if self.is_buy { "BUY" } else { "SELL" };
        write!(f, "Order(#{} {} {side} {qty}@{px})", self.id, unpack_symbol(self.symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_one_cache_line() {
        assert_eq!(std::mem::size_of::<BookEvent>(), 64);
        assert_eq!(std::mem::align_of::<BookEvent>(), 64);
        assert_eq!(std::mem::size_of::<Order>(), 64);
        assert_eq!(std::mem::align_of::<Order>(), 64);
    }

    #[test]
    fn reset_marker_detection() {
        let reset = BookEvent::reset_marker(1, 2, 3);
        assert!(reset.is_reset());

        let level = BookEvent {
            price: 10_002_000_000,
            is_snapshot: true,
            ..Default::default()
        };
        assert!(!level.is_reset());

        let update = BookEvent::default();
        assert!(!update.is_reset());
    }
}
