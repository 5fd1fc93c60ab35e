//! Shadow-balance reconciliation against the exchange.
//!
//! An auxiliary thread polls `GET /api/v3/brokerage/accounts` on a fixed
//! interval, converts each currency's available balance to 1e-8 fixed
//! point, and atomically overwrites the shadow balances — ground truth
//! replacing the gateway's optimistic state. USD and USDC both count
//! toward the USD balance.
//!
//! The thread is unpinned and failure-tolerant: a failed poll logs and
//! waits for the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use cbx_core::error::CbxError;
use cbx_core::fixed::parse_fixed;

use crate::credentials::ApiCredentials;
use crate::jwt::JwtGenerator;
use crate::risk::RiskManager;
use crate::signer::Signer;

const ACCOUNTS_PATH: &str = "/api/v3/brokerage/accounts";

/// Per-poll HTTP deadline.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the reconciler thread.
pub struct Reconciler {
    handle: Option<JoinHandle<()>>,
}

impl Reconciler {
    /// Spawn the reconciler. It owns its own signer — the gateway's
    /// ephemeral pool is never shared across threads.
    pub fn spawn(
        rest_host: String,
        interval: Duration,
        credentials: &ApiCredentials,
        risk: Arc<RiskManager>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let signer = Signer::new(credentials).context("reconciler signer failed")?;
        let jwt_gen = JwtGenerator::new(credentials.key_name.clone());

        let handle = std::thread::Builder::new()
            .name("reconciler".into())
            .spawn(move || {
                reconcile_loop(rest_host, interval, signer, jwt_gen, risk, running);
            })
            .context("failed to spawn reconciler thread")?;

        Ok(Self { handle: Some(handle) })
    }

    /// Join the thread. The caller clears the shared `running` flag first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn reconcile_loop(
    rest_host: String,
    interval: Duration,
    mut signer: Signer,
    mut jwt_gen: JwtGenerator,
    risk: Arc<RiskManager>,
    running: Arc<AtomicBool>,
) {
    let client = match reqwest::blocking::Client::builder()
        .timeout(POLL_TIMEOUT)
        .user_agent("cbx-engine/0.3")
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("reconciler TLS client failed, balances stay on paper values: {e}");
            return;
        }
    };

    let url = format!("https://{rest_host}{ACCOUNTS_PATH}");
    let mut polls = 0u64;

    while running.load(Ordering::Acquire) {
        // Sleep first so the paper balances survive until the exchange
        // answers, then poll.
        if !interruptible_sleep(interval, &running) {
            break;
        }

        match poll_once(&client, &url, &rest_host, &mut signer, &mut jwt_gen) {
            Ok((usd, btc)) => {
                polls += 1;
                risk.set_balances(usd, btc);
                debug!("balances reconciled: usd={usd} btc={btc}");
            }
            Err(e) => warn!("reconcile poll failed: {e:#}"),
        }
    }

    info!("reconciler exiting — {polls} successful poll(s)");
}

/// One accounts poll. Returns `(usd, btc)` at 1e-8 fixed point.
fn poll_once(
    client: &reqwest::blocking::Client,
    url: &str,
    rest_host: &str,
    signer: &mut Signer,
    jwt_gen: &mut JwtGenerator,
) -> Result<(i64, i64)> {
    let token = jwt_gen.generate(signer, "GET", rest_host, ACCOUNTS_PATH)?;

    let response = client
        .get(url)
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .context("accounts request failed")?;

    let status = response.status();
    if !status.is_success() {
        return Err(CbxError::Http(format!("accounts request returned {status}")).into());
    }

    let body: serde_json::Value = response.json().context("accounts response not JSON")?;
    parse_balances(&body)
        .ok_or_else(|| CbxError::Parse("accounts response missing balances".into()).into())
}

/// Extract `(usd, btc)` totals from an accounts response.
pub fn parse_balances(body: &serde_json::Value) -> Option<(i64, i64)> {
    let accounts = body.get("accounts")?.as_array()?;

    let mut usd = 0i64;
    let mut btc = 0i64;
    for account in accounts {
        let Some(currency) = account.get("currency").and_then(|v| v.as_str()) else { continue };
        let value = account
            .get("available_balance")
            .and_then(|b| b.get("value"))
            .and_then(|v| v.as_str())
            .and_then(parse_fixed)
            .unwrap_or(0);

        match currency {
            "USD" | "USDC" => usd += value,
            "BTC" => btc += value,
            _ => {}
        }
    }
    Some((usd, btc))
}

/// Sleep in short slices so shutdown is prompt. Returns `false` when the
/// engine is stopping.
fn interruptible_sleep(duration: Duration, running: &AtomicBool) -> bool {
    let deadline = std::time::Instant::now() + duration;
    while std::time::Instant::now() < deadline {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    running.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usd_usdc_and_btc() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "accounts": [
                    {"currency": "USD",  "available_balance": {"value": "1000.50", "currency": "USD"}},
                    {"currency": "USDC", "available_balance": {"value": "499.50",  "currency": "USDC"}},
                    {"currency": "BTC",  "available_balance": {"value": "2.5",     "currency": "BTC"}},
                    {"currency": "ETH",  "available_balance": {"value": "99.0",    "currency": "ETH"}}
                ]
            }"#,
        )
        .unwrap();

        let (usd, btc) = parse_balances(&body).unwrap();
        assert_eq!(usd, 150_000_000_000); // $1,500.00
        assert_eq!(btc, 250_000_000);     // 2.5 BTC
    }

    #[test]
    fn missing_accounts_array_is_none() {
        let body: serde_json::Value = serde_json::from_str(r#"{"error": "unauthorized"}"#).unwrap();
        assert!(parse_balances(&body).is_none());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "accounts": [
                    {"currency": "USD"},
                    {"available_balance": {"value": "5"}},
                    {"currency": "BTC", "available_balance": {"value": "not-a-number"}},
                    {"currency": "BTC", "available_balance": {"value": "1"}}
                ]
            }"#,
        )
        .unwrap();

        let (usd, btc) = parse_balances(&body).unwrap();
        assert_eq!(usd, 0);
        assert_eq!(btc, 100_000_000);
    }
}
