//! Dense bitmap-indexed order book.
//!
//! The book covers a fixed window of discrete price slots centered on an
//! initial mid price at a fixed tick size. Each side keeps:
//!
//! - a dense array of levels (aggregate quantity per slot),
//! - a bitmap with one bit per slot, set iff the level is active,
//! - a best index maintained incrementally.
//!
//! Raising a level is O(1). Clearing the best level walks the bitmap
//! chunk-by-chunk toward the book interior — leading zeros on bids,
//! trailing zeros on asks — which is O(L/64) worst case but O(1) amortized
//! whenever a chunk holds an active bit.
//!
//! Updates priced outside the window are dropped: the book is truncated at
//! ±L/2 ticks from center by design.

use cbx_core::Side;
use cbx_core::fixed;

/// Default book width: one million slots (±5,000.00 at a 0.01 tick).
pub const DEFAULT_BOOK_SIZE: i64 = 1_000_000;

/// One price level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Level {
    /// Aggregate resting quantity, 1e-8 fixed point.
    pub quantity: i64,
    /// Active-order count. The venue publishes aggregate depth only, so this
    /// collapses to 1 while the level is active.
    pub order_count: i64,
}

/// Top-of-book snapshot retained between updates for the OFI computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TopOfBook {
    bid_price: i64,
    bid_qty: i64,
    ask_price: i64,
    ask_qty: i64,
}

/// Dense order book with bitmap-indexed best-price maintenance.
pub struct DenseBook {
    size: i64,
    center_idx: i64,
    tick: i64,
    center_price: i64,

    bids: Vec<Level>,
    asks: Vec<Level>,
    bid_mask: Vec<u64>,
    ask_mask: Vec<u64>,

    /// Highest active bid slot, -1 when no bid.
    best_bid_idx: i64,
    /// Lowest active ask slot, `size` when no ask.
    best_ask_idx: i64,

    prev_top: TopOfBook,
}

impl DenseBook {
    /// Create a book of `size` slots per side centered on `center_price`.
    ///
    /// # Panics
    ///
    /// Panics if `size < 2` or `tick <= 0`.
    pub fn new(center_price: i64, size: i64, tick: i64) -> Self {
        assert!(size >= 2, "book needs at least two slots");
        assert!(tick > 0, "tick must be positive");
        let chunks = ((size + 63) / 64) as usize;
        Self {
            size,
            center_idx: size / 2,
            tick,
            center_price,
            bids: vec![Level::default(); size as usize],
            asks: vec![Level::default(); size as usize],
            bid_mask: vec![0; chunks],
            ask_mask: vec![0; chunks],
            best_bid_idx: -1,
            best_ask_idx: size,
            prev_top: TopOfBook::default(),
        }
    }

    /// Create a full-width book at the standard 0.01 tick.
    pub fn with_center(center_price: i64) -> Self {
        Self::new(center_price, DEFAULT_BOOK_SIZE, fixed::TICK)
    }

    /// Apply one L2 update: set the aggregate quantity at `price`.
    ///
    /// Out-of-window prices are silently ignored.
    pub fn apply(&mut self, side: Side, price: i64, quantity: i64) {
        let delta = price - self.center_price;
        let index = self.center_idx + delta / self.tick;
        if index < 0 || index >= self.size {
            return;
        }
        let idx = index as usize;
        let active = quantity > 0;

        let (levels, masks) = match side {
            Side::Bid => (&mut self.bids, &mut self.bid_mask),
            Side::Ask => (&mut self.asks, &mut self.ask_mask),
        };
        levels[idx].quantity = quantity;
        levels[idx].order_count = active as i64;

        let chunk = idx / 64;
        let bit = idx % 64;
        if active {
            masks[chunk] |= 1u64 << bit;
        } else {
            masks[chunk] &= !(1u64 << bit);
        }

        match side {
            Side::Bid => {
                if active {
                    if index > self.best_bid_idx {
                        self.best_bid_idx = index;
                    }
                } else if index == self.best_bid_idx {
                    self.walk_best_bid();
                }
            }
            Side::Ask => {
                if active {
                    if index < self.best_ask_idx {
                        self.best_ask_idx = index;
                    }
                } else if index == self.best_ask_idx {
                    self.walk_best_ask();
                }
            }
        }
    }

    /// The best bid was cleared: scan the bitmap downward for the new best.
    fn walk_best_bid(&mut self) {
        let mut idx = self.best_bid_idx;
        loop {
            if idx < 0 {
                self.best_bid_idx = -1;
                return;
            }
            let chunk = (idx / 64) as usize;
            let bit = (idx % 64) as u32;
            let mask = self.bid_mask[chunk];
            // Keep only bits at or below the current index in this chunk.
            let relevant = if bit == 63 { mask } else { mask & ((1u64 << (bit + 1)) - 1) };
            if relevant != 0 {
                self.best_bid_idx = chunk as i64 * 64 + (63 - relevant.leading_zeros() as i64);
                return;
            }
            idx = chunk as i64 * 64 - 1;
        }
    }

    /// The best ask was cleared: scan the bitmap upward for the new best.
    fn walk_best_ask(&mut self) {
        let mut idx = self.best_ask_idx;
        loop {
            if idx >= self.size {
                self.best_ask_idx = self.size;
                return;
            }
            let chunk = (idx / 64) as usize;
            let bit = (idx % 64) as u32;
            let mask = self.ask_mask[chunk];
            // Keep only bits at or above the current index in this chunk.
            let relevant = mask & !((1u64 << bit) - 1);
            if relevant != 0 {
                self.best_ask_idx = chunk as i64 * 64 + relevant.trailing_zeros() as i64;
                return;
            }
            idx = (chunk as i64 + 1) * 64;
        }
    }

    /// Clear every level and recenter the window.
    pub fn reset(&mut self, new_center: i64) {
        self.bids.fill(Level::default());
        self.asks.fill(Level::default());
        self.bid_mask.fill(0);
        self.ask_mask.fill(0);
        self.best_bid_idx = -1;
        self.best_ask_idx = self.size;
        self.prev_top = TopOfBook::default();
        self.center_price = new_center;
    }

    #[inline]
    fn price_at(&self, index: i64) -> i64 {
        self.center_price + (index - self.center_idx) * self.tick
    }

    /// Best bid price, if any bid is active.
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        (self.best_bid_idx >= 0).then(|| self.price_at(self.best_bid_idx))
    }

    /// Best ask price, if any ask is active.
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        (self.best_ask_idx < self.size).then(|| self.price_at(self.best_ask_idx))
    }

    /// Quantity at the best bid (zero when no bid).
    #[inline]
    pub fn best_bid_qty(&self) -> i64 {
        if self.best_bid_idx >= 0 { self.bids[self.best_bid_idx as usize].quantity } else { 0 }
    }

    /// Quantity at the best ask (zero when no ask).
    #[inline]
    pub fn best_ask_qty(&self) -> i64 {
        if self.best_ask_idx < self.size { self.asks[self.best_ask_idx as usize].quantity } else { 0 }
    }

    /// Mid price when both sides are defined, the window center otherwise.
    #[inline]
    pub fn mid_price(&self) -> i64 {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => (bid + ask) / 2,
            _ => self.center_price,
        }
    }

    /// Aggregate quantity at an exact price (zero if inactive or outside the
    /// window).
    pub fn level_quantity(&self, side: Side, price: i64) -> i64 {
        let index = self.center_idx + (price - self.center_price) / self.tick;
        if index < 0 || index >= self.size {
            return 0;
        }
        match side {
            Side::Bid => self.bids[index as usize].quantity,
            Side::Ask => self.asks[index as usize].quantity,
        }
    }

    /// Order Flow Imbalance for the latest update, relative to the previous
    /// top-of-book state. Updates the previous state afterwards.
    ///
    /// Per side, a price improvement contributes the full new best quantity,
    /// an unchanged best price contributes the quantity delta, and a price
    /// retreat contributes minus the old quantity. OFI is the bid
    /// contribution minus the ask contribution.
    pub fn compute_ofi(&mut self) -> i64 {
        let bid_price = self.best_bid().unwrap_or(0);
        let bid_qty = self.best_bid_qty();
        let ask_price = self.best_ask().unwrap_or(0);
        let ask_qty = self.best_ask_qty();

        let e_b = if bid_price > self.prev_top.bid_price {
            bid_qty
        } else if bid_price == self.prev_top.bid_price {
            bid_qty - self.prev_top.bid_qty
        } else {
            -self.prev_top.bid_qty
        };

        // A lower ask is the improvement on the sell side.
        let e_a = if ask_price < self.prev_top.ask_price {
            ask_qty
        } else if ask_price == self.prev_top.ask_price {
            ask_qty - self.prev_top.ask_qty
        } else {
            -self.prev_top.ask_qty
        };

        self.prev_top = TopOfBook { bid_price, bid_qty, ask_price, ask_qty };

        e_b - e_a
    }

    /// Rank-weighted depth imbalance over the top `depth` active levels per
    /// side: `(B − A) / (B + A + ε)` with weights `1 / (rank + 1)`.
    pub fn depth_imbalance(&self, depth: usize) -> f64 {
        let mut bid_pressure = 0.0;
        let mut count = 0usize;
        let mut i = self.best_bid_idx;
        while i >= 0 && count < depth {
            let qty = self.bids[i as usize].quantity;
            if qty > 0 {
                bid_pressure += qty as f64 / (count + 1) as f64;
                count += 1;
            }
            i -= 1;
        }

        let mut ask_pressure = 0.0;
        count = 0;
        let mut i = self.best_ask_idx;
        while i < self.size && count < depth {
            let qty = self.asks[i as usize].quantity;
            if qty > 0 {
                ask_pressure += qty as f64 / (count + 1) as f64;
                count += 1;
            }
            i += 1;
        }

        (bid_pressure - ask_pressure) / (bid_pressure + ask_pressure + 1e-9)
    }

    /// Verify the structural invariants: bitmap bits match level activity,
    /// the best indices point at the extreme active slots, and the book is
    /// not crossed. Used by tests.
    #[cfg(test)]
    fn check_invariants(&self) {
        for idx in 0..self.size as usize {
            let bid_bit = self.bid_mask[idx / 64] >> (idx % 64) & 1 == 1;
            assert_eq!(bid_bit, self.bids[idx].quantity > 0, "bid bitmap mismatch at {idx}");
            let ask_bit = self.ask_mask[idx / 64] >> (idx % 64) & 1 == 1;
            assert_eq!(ask_bit, self.asks[idx].quantity > 0, "ask bitmap mismatch at {idx}");
        }

        let highest_bid =
            (0..self.size).rev().find(|&i| self.bids[i as usize].quantity > 0).unwrap_or(-1);
        assert_eq!(self.best_bid_idx, highest_bid, "stale best bid index");

        let lowest_ask =
            (0..self.size).find(|&i| self.asks[i as usize].quantity > 0).unwrap_or(self.size);
        assert_eq!(self.best_ask_idx, lowest_ask, "stale best ask index");

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "crossed book: bid {bid} >= ask {ask}");
        }
    }
}
