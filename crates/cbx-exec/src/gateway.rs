//! Execution gateway: the pinned order-submission thread.
//!
//! For each order popped from the strategy ring:
//!
//! 1. `check_and_reserve` — on rejection, skip with no network call.
//! 2. Token bucket — on empty, roll back the reserve and skip.
//! 3. Refresh the JWT if it is older than 60 s.
//! 4. Format the order body into a reusable buffer.
//! 5. POST over the persistent TLS connection (2 s deadline).
//! 6. 2xx appends the order to the trade log; anything else rolls back the
//!    reserve. No retry — submission is not idempotent.
//! 7. A transport error or `Connection: close` drops the client so the next
//!    order reconnects.
//!
//! At shutdown the buffered trade log is flushed to CSV and the latency
//! histogram is logged.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use cbx_core::config::RateLimitConfig;
use cbx_core::fixed::format_fixed;
use cbx_core::latency::LatencyCollector;
use cbx_core::ring::Consumer;
use cbx_core::{Order, pin, time_util};

use crate::credentials::ApiCredentials;
use crate::jwt::JwtGenerator;
use crate::rate_limit::TokenBucket;
use crate::risk::RiskManager;
use crate::signer::Signer;

const ORDERS_PATH: &str = "/api/v3/brokerage/orders";

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// REST host (e.g. `api.coinbase.com`).
    pub rest_host: String,
    /// Product id placed in order bodies.
    pub product_id: String,
    /// CPU core for the execution thread.
    pub core: Option<i32>,
    /// Token bucket settings.
    pub rate_limit: RateLimitConfig,
    /// Trade log CSV written at shutdown.
    pub trade_log_path: PathBuf,
    /// Regenerate the JWT once it is older than this.
    pub jwt_refresh: Duration,
    /// Per-request HTTP deadline.
    pub http_timeout: Duration,
}

/// Handle to the running execution thread.
pub struct ExecutionGateway {
    handle: Option<JoinHandle<()>>,
}

impl ExecutionGateway {
    /// Spawn the execution thread. Credential and key-parsing failures are
    /// fatal here, before any market data flows.
    pub fn spawn(
        config: GatewayConfig,
        input: Consumer<Order>,
        risk: Arc<RiskManager>,
        credentials: &ApiCredentials,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let signer = Signer::new(credentials).context("signer initialization failed")?;
        let jwt_gen = JwtGenerator::new(credentials.key_name.clone());

        let handle = std::thread::Builder::new()
            .name("execution".into())
            .spawn(move || {
                gateway_loop(config, input, risk, signer, jwt_gen, running);
            })
            .context("failed to spawn execution thread")?;

        Ok(Self { handle: Some(handle) })
    }

    /// Join the thread. The caller clears the shared `running` flag first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .tcp_nodelay(true)
        .user_agent("cbx-engine/0.3")
        .build()
}

fn gateway_loop(
    config: GatewayConfig,
    mut input: Consumer<Order>,
    risk: Arc<RiskManager>,
    mut signer: Signer,
    mut jwt_gen: JwtGenerator,
    running: Arc<AtomicBool>,
) {
    pin::maybe_pin(config.core);

    // The blocking client owns its own connection pool; it is built here so
    // it lives entirely on this thread.
    let mut client = match build_client(config.http_timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("TLS client construction failed, execution stage down: {e}");
            return;
        }
    };

    let order_url = format!("https://{}{}", config.rest_host, ORDERS_PATH);
    let mut limiter = TokenBucket::new(config.rate_limit.capacity, config.rate_limit.refill_per_sec);

    // Empty header forces the initial JWT build on the first order.
    let mut auth_header = String::new();
    let mut jwt_born = Instant::now();
    let mut body = String::with_capacity(256);
    let mut latencies = LatencyCollector::new();
    let mut trade_log: Vec<Order> = Vec::new();

    while running.load(Ordering::Acquire) {
        let Some(order) = input.pop() else {
            std::hint::spin_loop();
            continue;
        };

        let popped_at = time_util::monotonic_ns();

        if let Err(rejection) = risk.check_and_reserve(&order) {
            warn!("risk rejected {}: {rejection}", order);
            continue;
        }

        if !limiter.consume(1.0) {
            warn!("rate limit hit, dropping {}", order);
            risk.rollback(&order);
            continue;
        }

        if auth_header.is_empty() || jwt_born.elapsed() >= config.jwt_refresh {
            match jwt_gen.generate(&mut signer, "POST", &config.rest_host, ORDERS_PATH) {
                Ok(token) => {
                    auth_header.clear();
                    auth_header.push_str("Bearer ");
                    auth_header.push_str(token);
                    jwt_born = Instant::now();
                    debug!("JWT refreshed (pool depth {})", signer.pool_len());
                }
                Err(e) => {
                    error!("JWT generation failed: {e}");
                    risk.rollback(&order);
                    continue;
                }
            }
        }

        format_order_body(&order, &config.product_id, &mut body);

        let response = client
            .post(&order_url)
            .header("Authorization", auth_header.as_str())
            .header("Content-Type", "application/json")
            .body(body.clone())
            .send();

        match response {
            Ok(resp) => {
                latencies.record_span_ns(popped_at, time_util::monotonic_ns());

                let status = resp.status();
                let server_closed = resp
                    .headers()
                    .get("connection")
                    .map(|v| v.as_bytes().eq_ignore_ascii_case(b"close"))
                    .unwrap_or(false);

                if status.is_success() {
                    debug!("order {} accepted ({status})", order.id);
                    trade_log.push(order);
                    risk.update_position(if order.is_buy { order.quantity } else { -order.quantity });
                } else {
                    let text = resp.text().unwrap_or_default();
                    error!("order {} rejected: {status} {text}", order.id);
                    risk.rollback(&order);
                }

                if server_closed {
                    info!("server requested close, reconnecting");
                    rebuild_client(&mut client, config.http_timeout);
                }
            }
            Err(e) => {
                error!("order {} submission failed: {e}", order.id);
                risk.rollback(&order);
                rebuild_client(&mut client, config.http_timeout);
            }
        }
    }

    // Shutdown: flush buffered records.
    if let Some(stats) = latencies.stats() {
        info!("submission latency: {stats}");
    }
    match write_trade_log(&config.trade_log_path, &trade_log) {
        Ok(()) => info!(
            "execution stage exiting — {} trade(s) logged to {}",
            trade_log.len(),
            config.trade_log_path.display(),
        ),
        Err(e) => error!("trade log write failed: {e}"),
    }
}

/// Replace the TLS client, keeping the old one on builder failure.
fn rebuild_client(client: &mut reqwest::blocking::Client, timeout: Duration) {
    match build_client(timeout) {
        Ok(fresh) => *client = fresh,
        Err(e) => error!("client rebuild failed, keeping stale connection pool: {e}"),
    }
}

/// Format the order JSON into `out` (cleared first).
pub fn format_order_body(order: &Order, product_id: &str, out: &mut String) {
    out.clear();
    let _ = write!(
        out,
        r#"{{"client_order_id":"{}","product_id":"{}","side":"{}","order_configuration":{{"limit_limit_gtc":{{"base_size":""#,
        order.id,
        product_id,
        if order.is_buy { "BUY" } else { "SELL" },
    );
    format_fixed(order.quantity, 8, out);
    out.push_str(r#"","limit_price":""#);
    format_fixed(order.price, 2, out);
    out.push_str(r#""}}}"#);
}

/// Write the accepted-order log as CSV.
pub fn write_trade_log(path: &std::path::Path, orders: &[Order]) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut out = std::io::BufWriter::new(file);
    writeln!(out, "id,timestamp,price,quantity,is_buy")?;
    for order in orders {
        writeln!(
            out,
            "{},{},{},{},{}",
            order.id,
            order.origin_timestamp_ns,
            order.price,
            order.quantity,
            order.is_buy as u8,
        )?;
    }
    out.flush()
}
