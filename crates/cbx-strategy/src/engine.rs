//! Strategy stage: book maintenance, signal, and the market-making state
//! machine.
//!
//! [`StrategyCore`] holds the per-tick logic and is directly unit-testable;
//! [`StrategyEngine`] wraps it in the pinned consumer thread that drains the
//! feed ring and publishes orders into the execution ring.
//!
//! # State machine
//!
//! ```text
//!            s > +T                 s < −T
//!   FLAT ───────────► LONG   FLAT ───────────► SHORT
//!   LONG ── s < −T ──► FLAT  SHORT ── s > +T ──► FLAT   (closing order)
//! ```
//!
//! A transition is *proposed* when the order is created and *committed* only
//! once the execution ring accepts the push; see DESIGN.md for the
//! acknowledgement caveat.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use cbx_core::config::StrategyConfig;
use cbx_core::ring::{Consumer, Producer};
use cbx_core::{BookEvent, Order, Side, fixed, pin, time_util};
use tracing::{debug, info};

use crate::book::DenseBook;
use crate::quote::{QuoteParams, quote_price};
use crate::signal::OfiEwma;

/// Market-making position state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakerState {
    Flat,
    Long,
    Short,
}

/// Per-tick strategy logic, shared by the live thread and the tests.
pub struct StrategyCore {
    cfg: StrategyConfig,
    quote_params: QuoteParams,
    symbol: u64,

    book: Option<DenseBook>,
    book_size: i64,
    ewma: OfiEwma,

    state: MakerState,
    position_lots: i64,
    next_order_id: u64,
    pending_state: Option<MakerState>,
}

impl StrategyCore {
    pub fn new(cfg: StrategyConfig, symbol: u64) -> Self {
        Self::with_book_size(cfg, symbol, crate::book::DEFAULT_BOOK_SIZE)
    }

    /// Test hook: a narrower book keeps allocation cheap.
    pub fn with_book_size(cfg: StrategyConfig, symbol: u64, book_size: i64) -> Self {
        Self {
            quote_params: QuoteParams {
                skew_divisor: cfg.skew_divisor,
                inventory_skew: cfg.inventory_skew,
                tick: fixed::TICK,
            },
            cfg,
            symbol,
            book: None,
            book_size,
            ewma: OfiEwma::new(cfg.ewma_alpha, cfg.ewma_shift),
            state: MakerState::Flat,
            position_lots: 0,
            next_order_id: 0,
            pending_state: None,
        }
    }

    pub fn state(&self) -> MakerState {
        self.state
    }

    pub fn position_lots(&self) -> i64 {
        self.position_lots
    }

    /// Process one book event; returns an order when the state machine fires.
    pub fn on_event(&mut self, ev: &BookEvent) -> Option<Order> {
        if ev.is_reset() {
            // Snapshot incoming: drop the book and recenter on its first level.
            self.book = None;
            debug!("book reset requested");
            return None;
        }

        if ev.is_trade {
            // Trade prints do not move resting liquidity.
            return None;
        }

        if self.book.is_none() {
            if ev.price <= 0 {
                return None;
            }
            info!("centering book at {}", ev.price);
            self.book = Some(DenseBook::new(ev.price, self.book_size, fixed::TICK));
        }
        let Some(book) = self.book.as_mut() else { return None };

        book.apply(Side::from_is_bid(ev.is_bid), ev.price, ev.quantity);
        let ofi = book.compute_ofi();
        let smoothed = self.ewma.update(ofi);

        let buy_signal = smoothed > self.cfg.ofi_threshold;
        let sell_signal = smoothed < -self.cfg.ofi_threshold;
        if !buy_signal && !sell_signal {
            return None;
        }

        let (is_buy, target) = match self.state {
            MakerState::Flat if buy_signal => (true, MakerState::Long),
            MakerState::Flat if sell_signal => (false, MakerState::Short),
            MakerState::Long if sell_signal => (false, MakerState::Flat),
            MakerState::Short if buy_signal => (true, MakerState::Flat),
            _ => return None,
        };

        // Position cap, regardless of the state transition.
        if is_buy && self.position_lots >= self.cfg.max_position {
            return None;
        }
        if !is_buy && self.position_lots <= -self.cfg.max_position {
            return None;
        }

        let best_bid = book.best_bid()?;
        let best_ask = book.best_ask()?;
        let price = quote_price(
            is_buy,
            best_bid,
            best_ask,
            smoothed,
            self.position_lots,
            &self.quote_params,
        )?;

        self.next_order_id += 1;
        self.pending_state = Some(target);
        Some(Order {
            id: self.next_order_id,
            origin_timestamp_ns: time_util::monotonic_ns(),
            price,
            quantity: self.cfg.default_qty,
            symbol: self.symbol,
            is_buy,
        })
    }

    /// Commit the proposed transition after the execution ring accepted the
    /// order.
    pub fn commit(&mut self, order: &Order) {
        if let Some(next) = self.pending_state.take() {
            self.state = next;
        }
        self.position_lots += if order.is_buy { 1 } else { -1 };
    }
}

/// The pinned strategy thread.
pub struct StrategyEngine {
    handle: Option<JoinHandle<()>>,
}

impl StrategyEngine {
    /// Spawn the strategy thread. It drains `input`, runs the state machine,
    /// and publishes accepted orders into `output` until `running` clears.
    pub fn spawn(
        mut input: Consumer<BookEvent>,
        mut output: Producer<Order>,
        cfg: StrategyConfig,
        symbol: u64,
        core: Option<i32>,
        running: Arc<AtomicBool>,
    ) -> anyhow::Result<Self> {
        let handle = std::thread::Builder::new().name("strategy".into()).spawn(move || {
            pin::maybe_pin(core);
            let mut core_logic = StrategyCore::new(cfg, symbol);
            let mut emitted = 0u64;

            while running.load(Ordering::Acquire) {
                let Some(ev) = input.pop() else {
                    std::hint::spin_loop();
                    continue;
                };

                let Some(order) = core_logic.on_event(&ev) else { continue };

                // Spin until the execution stage drains a slot; bail out on
                // shutdown so a stalled gateway cannot wedge the join.
                let mut pending = order;
                let mut accepted = false;
                loop {
                    match output.push(pending) {
                        Ok(()) => {
                            accepted = true;
                            break;
                        }
                        Err(back) => {
                            if !running.load(Ordering::Acquire) {
                                break;
                            }
                            pending = back;
                            std::hint::spin_loop();
                        }
                    }
                }

                if accepted {
                    core_logic.commit(&order);
                    emitted += 1;
                    info!(
                        "emitted {} (state={:?} pos={})",
                        order,
                        core_logic.state(),
                        core_logic.position_lots(),
                    );
                }
            }

            info!("strategy stage exiting — {emitted} order(s) emitted");
        })?;

        Ok(Self { handle: Some(handle) })
    }

    /// Join the thread. The caller clears the shared `running` flag first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
