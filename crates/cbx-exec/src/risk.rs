//! Pre-trade risk checks and shadow balances.
//!
//! Every order popped by the gateway passes through
//! [`RiskManager::check_and_reserve`] before any network activity. Checks
//! run in a fixed order — kill switch, clip, notional, fat-finger, balance
//! reserve — and the first failure aborts.
//!
//! The shadow balances are the engine's optimistic local estimate of
//! available funds. A reserve is a `fetch_sub`; if the balance went
//! negative the inverse `fetch_add` is issued and the order rejected. This
//! is sound under SPSC use: only the gateway thread reserves, and the
//! reconciler only overwrites, never decrements.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use cbx_core::Order;
use cbx_core::config::RiskConfig;
use cbx_core::fixed::SCALE;

/// Why an order was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRejection {
    /// The kill switch is engaged; nothing trades until it is cleared.
    KillSwitch,
    /// Quantity above the per-order clip limit.
    ClipExceeded { quantity: i64, max_clip: i64 },
    /// Price × quantity above the notional limit.
    NotionalExceeded,
    /// Price more than 5 % away from the reference price.
    FatFinger { price: i64, reference: i64 },
    /// Shadow USD balance cannot cover the buy.
    InsufficientUsd { cost: i64 },
    /// Shadow BTC balance cannot cover the sell.
    InsufficientBtc { quantity: i64 },
}

impl std::fmt::Display for RiskRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KillSwitch => write!(f, "kill switch engaged"),
            Self::ClipExceeded { quantity, max_clip } => {
                write!(f, "quantity {quantity} above max clip {max_clip}")
            }
            Self::NotionalExceeded => write!(f, "notional above limit"),
            Self::FatFinger { price, reference } => {
                write!(f, "price {price} more than 5% from reference {reference}")
            }
            Self::InsufficientUsd { cost } => write!(f, "insufficient USD for cost {cost}"),
            Self::InsufficientBtc { quantity } => {
                write!(f, "insufficient BTC for quantity {quantity}")
            }
        }
    }
}

/// Static limits, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    /// Max single-order quantity, 1e-8 fixed point.
    pub max_clip: i64,
    /// Max |price|·|quantity| at raw 1e-16 product scale.
    pub max_notional: i128,
}

impl RiskLimits {
    pub fn from_config(cfg: &RiskConfig) -> Self {
        Self {
            max_clip: cfg.max_clip,
            max_notional: cfg.max_notional_usd as i128 * SCALE as i128 * SCALE as i128,
        }
    }
}

/// Process-wide risk state: kill switch, reference price, position, and the
/// shadow balances. Shared between the gateway (reserve/rollback), the
/// reconciler (overwrite), and management paths (kill switch, reference).
pub struct RiskManager {
    limits: RiskLimits,

    kill_switch: AtomicBool,
    reference_price: AtomicI64,
    position: AtomicI64,
    open_exposure: AtomicI64,

    balance_usd: AtomicI64,
    balance_btc: AtomicI64,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            kill_switch: AtomicBool::new(false),
            reference_price: AtomicI64::new(0),
            position: AtomicI64::new(0),
            open_exposure: AtomicI64::new(0),
            balance_usd: AtomicI64::new(0),
            balance_btc: AtomicI64::new(0),
        }
    }

    /// The USD cost of a buy at 1e-8 scale: price·qty / 1e8, computed in
    /// 128-bit to survive the 1e-8 × 1e-8 product.
    #[inline]
    fn order_cost(order: &Order) -> i64 {
        let raw = order.price.unsigned_abs() as u128 * order.quantity.unsigned_abs() as u128;
        (raw / SCALE as u128) as i64
    }

    /// Run all pre-trade checks and optimistically reserve the shadow
    /// balance. On success the caller owns the reservation and must either
    /// let it stand (fill) or [`rollback`](Self::rollback) it.
    pub fn check_and_reserve(&self, order: &Order) -> Result<(), RiskRejection> {
        if self.kill_switch.load(Ordering::Acquire) {
            return Err(RiskRejection::KillSwitch);
        }

        let quantity = order.quantity.abs();
        if quantity > self.limits.max_clip {
            return Err(RiskRejection::ClipExceeded { quantity, max_clip: self.limits.max_clip });
        }

        let notional = order.price.unsigned_abs() as i128 * order.quantity.unsigned_abs() as i128;
        if notional > self.limits.max_notional {
            return Err(RiskRejection::NotionalExceeded);
        }

        let reference = self.reference_price.load(Ordering::Relaxed);
        if reference > 0 {
            let diff = (order.price - reference).abs();
            if diff > reference / 20 {
                return Err(RiskRejection::FatFinger { price: order.price, reference });
            }
        }

        if order.is_buy {
            let cost = Self::order_cost(order);
            let prev = self.balance_usd.fetch_sub(cost, Ordering::Acquire);
            if prev < cost {
                self.balance_usd.fetch_add(cost, Ordering::Release);
                return Err(RiskRejection::InsufficientUsd { cost });
            }
        } else {
            let prev = self.balance_btc.fetch_sub(quantity, Ordering::Acquire);
            if prev < quantity {
                self.balance_btc.fetch_add(quantity, Ordering::Release);
                return Err(RiskRejection::InsufficientBtc { quantity });
            }
        }

        Ok(())
    }

    /// Return a reservation after a rejected or failed submission.
    pub fn rollback(&self, order: &Order) {
        if order.is_buy {
            self.balance_usd.fetch_add(Self::order_cost(order), Ordering::Release);
        } else {
            self.balance_btc.fetch_add(order.quantity.abs(), Ordering::Release);
        }
    }

    /// Overwrite both shadow balances with exchange ground truth.
    pub fn set_balances(&self, usd: i64, btc: i64) {
        self.balance_usd.store(usd, Ordering::Release);
        self.balance_btc.store(btc, Ordering::Release);
    }

    /// Current shadow balances `(usd, btc)`.
    pub fn balances(&self) -> (i64, i64) {
        (self.balance_usd.load(Ordering::Acquire), self.balance_btc.load(Ordering::Acquire))
    }

    /// Set the fat-finger reference price.
    pub fn set_reference_price(&self, price: i64) {
        self.reference_price.store(price, Ordering::Release);
    }

    /// Engage the kill switch. It is never cleared automatically.
    pub fn engage_kill_switch(&self) {
        self.kill_switch.store(true, Ordering::Release);
    }

    /// Clear the kill switch (management action only).
    pub fn clear_kill_switch(&self) {
        self.kill_switch.store(false, Ordering::Release);
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.kill_switch.load(Ordering::Acquire)
    }

    /// Adjust the net position by `delta` (1e-8 fixed point).
    pub fn update_position(&self, delta: i64) {
        self.position.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Adjust open exposure by `delta` (1e-8 fixed point).
    pub fn update_exposure(&self, delta: i64) {
        self.open_exposure.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn exposure(&self) -> i64 {
        self.open_exposure.load(Ordering::Relaxed)
    }
}
