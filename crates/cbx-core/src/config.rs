//! Configuration parsing for the CBX engine.
//!
//! All stages read their settings from a single JSON config file. Every
//! field carries a default so an empty object `{}` yields a paper-safe
//! configuration for BTC-USD on Coinbase Advanced Trade.
//!
//! # Example config
//!
//! ```json
//! {
//!   "product_id": "BTC-USD",
//!   "cores": { "feed": 0, "strategy": 1, "execution": 0 },
//!   "strategy": { "ofi_threshold": 100000000, "max_position": 5 },
//!   "risk": { "max_clip": 1000000, "max_notional_usd": 5000 },
//!   "rate_limit": { "capacity": 10.0, "refill_per_sec": 10.0 }
//! }
//! ```

use serde::Deserialize;

/// Top-level engine configuration, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Instrument to trade (also the WebSocket product id).
    pub product_id: Option<String>,

    /// Market data WebSocket endpoint.
    pub ws_url: Option<String>,

    /// REST host for orders and reconciliation.
    pub rest_host: Option<String>,

    /// Per-stage CPU core assignments.
    pub cores: CoreConfig,

    /// Strategy parameters.
    pub strategy: StrategyConfig,

    /// Pre-trade risk limits and paper balances.
    pub risk: RiskConfig,

    /// Order submission rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Path for the shutdown trade log CSV.
    pub trade_log_path: Option<String>,

    /// Path for raw feed capture (enabled with the `--capture` flag).
    pub capture_path: Option<String>,

    /// Seconds between reconciler polls.
    pub reconcile_interval_secs: Option<u64>,

    /// Optional JSON key file checked after the env vars.
    pub key_file: Option<String>,
}

impl EngineConfig {
    pub fn product_id(&self) -> &str {
        self.product_id.as_deref().unwrap_or("BTC-USD")
    }

    pub fn ws_url(&self) -> &str {
        self.ws_url.as_deref().unwrap_or("wss://advanced-trade-ws.coinbase.com")
    }

    pub fn rest_host(&self) -> &str {
        self.rest_host.as_deref().unwrap_or("api.coinbase.com")
    }

    pub fn trade_log_path(&self) -> &str {
        self.trade_log_path.as_deref().unwrap_or("trades.csv")
    }

    pub fn capture_path(&self) -> &str {
        self.capture_path.as_deref().unwrap_or("market_data.bin")
    }

    pub fn reconcile_interval_secs(&self) -> u64 {
        self.reconcile_interval_secs.unwrap_or(5)
    }

    pub fn key_file(&self) -> &str {
        self.key_file.as_deref().unwrap_or("private/cdp_api_key.json")
    }
}

/// Per-stage CPU core assignments. `None` (or a negative id) leaves the
/// stage unpinned.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    pub feed: Option<i32>,
    pub strategy: Option<i32>,
    pub execution: Option<i32>,
}

/// Strategy parameters. All fixed-point values are at 1e-8 scale.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Smoothed-OFI magnitude that triggers a signal.
    pub ofi_threshold: i64,

    /// Divisor mapping smoothed OFI into a fair-value price offset.
    pub skew_divisor: i64,

    /// Price penalty per lot of inventory.
    pub inventory_skew: i64,

    /// Quantity of each emitted order.
    pub default_qty: i64,

    /// Position cap in lots.
    pub max_position: i64,

    /// EWMA numerator; the smoothing factor is `ewma_alpha / 2^ewma_shift`.
    pub ewma_alpha: i64,

    /// EWMA shift normalizer.
    pub ewma_shift: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ofi_threshold: 100_000_000, // 1.0 BTC of top-of-book imbalance
            skew_divisor: 1_000,
            inventory_skew: 500_000, // 0.005 USD per lot
            default_qty: 1_000_000,  // 0.01 BTC
            max_position: 5,
            // 11/64 ≈ 0.17
            ewma_alpha: 11,
            ewma_shift: 6,
        }
    }
}

/// Pre-trade risk limits and paper balances.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Max single-order quantity, 1e-8 fixed point.
    pub max_clip: i64,

    /// Max order notional in whole USD.
    pub max_notional_usd: i64,

    /// Optional fat-finger reference price, 1e-8 fixed point. The check is
    /// skipped while unset.
    pub reference_price: Option<i64>,

    /// Shadow USD balance seeded before the first reconcile, whole USD.
    pub paper_usd: i64,

    /// Shadow BTC balance seeded before the first reconcile, whole BTC.
    pub paper_btc: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_clip: 1_000_000, // 0.01 BTC
            max_notional_usd: 5_000,
            reference_price: None,
            paper_usd: 100_000,
            paper_btc: 10,
        }
    }
}

/// Token bucket settings for order submission.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst allowance).
    pub capacity: f64,

    /// Refill rate in tokens per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: 10.0, refill_per_sec: 10.0 }
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.product_id(), "BTC-USD");
        assert_eq!(cfg.rest_host(), "api.coinbase.com");
        assert_eq!(cfg.strategy.default_qty, 1_000_000);
        assert_eq!(cfg.risk.max_clip, 1_000_000);
        assert!(cfg.risk.reference_price.is_none());
        assert_eq!(cfg.reconcile_interval_secs(), 5);
    }

    #[test]
    fn partial_override() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{
                "product_id": "ETH-USD",
                "cores": { "strategy": 3 },
                "strategy": { "max_position": 2 },
                "risk": { "max_notional_usd": 1000 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.product_id(), "ETH-USD");
        assert_eq!(cfg.cores.strategy, Some(3));
        assert_eq!(cfg.cores.feed, None);
        assert_eq!(cfg.strategy.max_position, 2);
        // Unspecified fields in an overridden section keep their defaults.
        assert_eq!(cfg.strategy.ewma_alpha, 11);
        assert_eq!(cfg.risk.max_notional_usd, 1000);
        assert_eq!(cfg.risk.paper_usd, 100_000);
    }
}
