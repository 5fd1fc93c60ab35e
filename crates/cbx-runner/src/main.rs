//! # cbx-runner
//!
//! Entry point for the CBX trading engine.
//!
//! Wires the three-stage pipeline — feed → strategy → execution — over two
//! SPSC rings, starts the signer and reconciler auxiliaries, runs for the
//! requested duration (or until SIGINT/SIGTERM), and joins the stages in
//! dependency order.
//!
//! # Usage
//!
//! ```bash
//! cbx-runner 120 --config engine.json --log-level info
//! cbx-runner 60 --replay market_data.bin     # offline, from a capture
//! cbx-runner 60 --capture                    # live, recording raw frames
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use cbx_core::config::{EngineConfig, load_config};
use cbx_core::fixed::SCALE;
use cbx_core::ring::spsc_ring;
use cbx_core::{BookEvent, Order, pack_symbol, pin};
use cbx_exec::{ApiCredentials, ExecutionGateway, GatewayConfig, Reconciler, RiskLimits, RiskManager};
use cbx_feed::FeedSession;
use cbx_feed::ws::{LiveFeed, LiveFeedConfig};
use cbx_strategy::StrategyEngine;

/// Capacity of the feed→strategy and strategy→execution rings.
const RING_CAPACITY: usize = 65_536;

/// CBX low-latency market-making engine.
#[derive(Parser)]
#[command(name = "cbx-runner", about = "CBX low-latency market-making engine")]
struct Cli {
    /// Run duration in seconds.
    #[arg(default_value_t = 60)]
    duration_secs: u64,

    /// Configuration file path (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Replay a capture file instead of connecting to the live feed.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Record raw live frames to the configured capture path.
    #[arg(long)]
    capture: bool,
}

/// Either transport presents the same join surface to the shutdown path.
enum FeedHandle {
    Live(LiveFeed),
    Replay(Option<std::thread::JoinHandle<()>>),
}

impl FeedHandle {
    fn join(&mut self) {
        match self {
            Self::Live(feed) => feed.join(),
            Self::Replay(handle) => {
                if let Some(handle) = handle.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Logging.
    cbx_core::logging::init_logging(&cli.log_level, cli.log_dir.as_deref(), "cbx");

    // 2. Configuration.
    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    info!(
        "cbx-runner starting — product={} duration={}s mode={}",
        config.product_id(),
        cli.duration_secs,
        if cli.replay.is_some() { "replay" } else { "live" },
    );

    // 3. Credentials — fatal if unavailable.
    let credentials = ApiCredentials::load(Path::new(config.key_file()))
        .context("credential load failed, refusing to start")?;

    let symbol = pack_symbol(config.product_id());
    let running = Arc::new(AtomicBool::new(true));

    // 4. Rings and process-wide risk state.
    let (event_tx, event_rx) = spsc_ring::<BookEvent>(RING_CAPACITY);
    let (order_tx, order_rx) = spsc_ring::<Order>(RING_CAPACITY);

    let risk = Arc::new(RiskManager::new(RiskLimits::from_config(&config.risk)));
    risk.set_balances(config.risk.paper_usd * SCALE, config.risk.paper_btc * SCALE);
    if let Some(reference) = config.risk.reference_price {
        risk.set_reference_price(reference);
    }

    // 5. Stages, consumers first so nothing backs up at startup.
    let mut gateway = ExecutionGateway::spawn(
        GatewayConfig {
            rest_host: config.rest_host().to_string(),
            product_id: config.product_id().to_string(),
            core: config.cores.execution,
            rate_limit: config.rate_limit,
            trade_log_path: PathBuf::from(config.trade_log_path()),
            jwt_refresh: Duration::from_secs(60),
            http_timeout: Duration::from_secs(2),
        },
        order_rx,
        Arc::clone(&risk),
        &credentials,
        Arc::clone(&running),
    )?;

    let mut reconciler = Reconciler::spawn(
        config.rest_host().to_string(),
        Duration::from_secs(config.reconcile_interval_secs()),
        &credentials,
        Arc::clone(&risk),
        Arc::clone(&running),
    )?;

    let mut strategy = StrategyEngine::spawn(
        event_rx,
        order_tx,
        config.strategy,
        symbol,
        config.cores.strategy,
        Arc::clone(&running),
    )?;

    let session = FeedSession::new(event_tx, Arc::clone(&running), symbol);
    let mut feed = match &cli.replay {
        Some(path) => FeedHandle::Replay(Some(spawn_replay(
            path.clone(),
            session,
            config.cores.feed,
            Arc::clone(&running),
        )?)),
        None => FeedHandle::Live(LiveFeed::spawn(
            LiveFeedConfig {
                url: config.ws_url().to_string(),
                product_id: config.product_id().to_string(),
                core: config.cores.feed,
                capture_path: cli.capture.then(|| PathBuf::from(config.capture_path())),
            },
            session,
            Arc::clone(&running),
        )?),
    };

    info!("all stages started — press Ctrl+C to stop early");

    // 6. Wait for the duration or a shutdown signal.
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(cli.duration_secs)) => {
            info!("run duration elapsed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received");
        }
        _ = terminate_signal() => {
            info!("terminate received");
        }
    }

    // 7. Ordered shutdown: producers unblock consumers through the shared
    // flag, then join feed → strategy → execution → auxiliaries.
    info!("stopping engine");
    running.store(false, Ordering::Release);
    feed.join();
    strategy.join();
    gateway.join();
    reconciler.join();

    info!("all stages stopped — goodbye");
    Ok(())
}

/// Replay transport: drive the session from a capture file on the pinned
/// feed thread, then idle until shutdown so downstream stages drain.
fn spawn_replay(
    path: PathBuf,
    mut session: FeedSession,
    core: Option<i32>,
    running: Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("feed".into())
        .spawn(move || {
            pin::maybe_pin(core);
            match cbx_feed::capture::replay_into(&path, &mut session) {
                Ok(frames) => info!("replayed {frames} frame(s) from {}", path.display()),
                Err(e) => error!("replay failed: {e:#}"),
            }
            while running.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(100));
            }
            info!("feed stage exiting — {:?}", session.stats());
        })
        .context("failed to spawn replay thread")
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await
}
