//! Live WebSocket transport for the feed stage.
//!
//! The feed thread is pinned to its core and owns a current-thread tokio
//! runtime driving a single TLS WebSocket connection:
//!
//! 1. Connect to the exchange endpoint.
//! 2. Subscribe to the `level2` and `heartbeats` channels.
//! 3. Feed every text frame to the [`FeedSession`] (optionally appending it
//!    to the capture file first).
//! 4. On a sequence gap, close the connection and reconnect — the session
//!    resynchronizes from the next snapshot.
//! 5. Reconnect on any disconnect with exponential backoff (100 ms → 30 s).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use cbx_core::{pin, time_util};

use crate::capture::CaptureWriter;
use crate::session::{FeedAction, FeedSession};

/// Settings for the live transport.
#[derive(Debug, Clone)]
pub struct LiveFeedConfig {
    /// WebSocket endpoint (e.g. `wss://advanced-trade-ws.coinbase.com`).
    pub url: String,
    /// Product to subscribe (e.g. `"BTC-USD"`).
    pub product_id: String,
    /// CPU core for the feed thread.
    pub core: Option<i32>,
    /// Append raw frames to this capture file when set.
    pub capture_path: Option<PathBuf>,
}

/// Handle to the running feed thread.
pub struct LiveFeed {
    handle: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Spawn the pinned feed thread. Runs until `running` clears.
    pub fn spawn(
        config: LiveFeedConfig,
        session: FeedSession,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let handle = std::thread::Builder::new()
            .name("feed".into())
            .spawn(move || {
                pin::maybe_pin(config.core);

                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("feed runtime construction failed")
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("{e:#}");
                        return;
                    }
                };

                runtime.block_on(feed_loop(config, session, running));
            })
            .context("failed to spawn feed thread")?;

        Ok(Self { handle: Some(handle) })
    }

    /// Join the thread. The caller clears the shared `running` flag first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Build the subscription frame for one channel.
fn subscribe_frame(product_id: &str, channel: &str) -> String {
    serde_json::json!({
        "type": "subscribe",
        "product_ids": [product_id],
        "channel": channel,
    })
    .to_string()
}

/// Outer connect/reconnect loop.
async fn feed_loop(config: LiveFeedConfig, mut session: FeedSession, running: Arc<AtomicBool>) {
    let mut capture = match &config.capture_path {
        Some(path) => match CaptureWriter::create(path) {
            Ok(w) => {
                info!("capturing raw feed to {}", path.display());
                Some(w)
            }
            Err(e) => {
                error!("capture disabled: {e:#}");
                None
            }
        },
        None => None,
    };

    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);

    while running.load(Ordering::Acquire) {
        info!("connecting to {}", config.url);

        let connect = tokio::time::timeout(
            Duration::from_secs(10),
            tokio_tungstenite::connect_async(config.url.as_str()),
        );
        let ws_stream = match connect.await {
            Ok(Ok((stream, _response))) => {
                info!("connected");
                backoff = Duration::from_millis(100);
                stream
            }
            Ok(Err(e)) => {
                error!("connection failed: {e}, retrying in {backoff:?}");
                interruptible_sleep(backoff, &running).await;
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
            Err(_) => {
                error!("connection timed out, retrying in {backoff:?}");
                interruptible_sleep(backoff, &running).await;
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Level2 first, then the liveness channel.
        let mut subscribed = true;
        for channel in ["level2", "heartbeats"] {
            let frame = subscribe_frame(&config.product_id, channel);
            debug!("subscribing: {frame}");
            if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                error!("subscribe send failed: {e}");
                subscribed = false;
                break;
            }
        }

        if subscribed {
            // Inner read loop; a shutdown poll tick keeps the select from
            // parking forever on a silent connection.
            let mut shutdown_poll = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    _ = shutdown_poll.tick() => {
                        if !running.load(Ordering::Acquire) {
                            let _ = ws_write.close().await;
                            info!("feed stage exiting — {:?}", session.stats());
                            return;
                        }
                    }

                    msg = ws_read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(ref mut cap) = capture {
                                    let _ = cap.write_record(time_util::now_ns(), text.as_bytes());
                                }
                                if session.on_message(&text) == FeedAction::Resync {
                                    let _ = ws_write.close().await;
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = ws_write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) => {
                                warn!("received close frame");
                                break;
                            }
                            Some(Err(e)) => {
                                error!("read error: {e}");
                                break;
                            }
                            None => {
                                warn!("stream ended");
                                break;
                            }
                            _ => {} // Binary, Pong, Frame — ignore
                        }
                    }
                }
            }
        }

        // Disconnected: the next snapshot rebuilds the book.
        session.on_close();
        if running.load(Ordering::Acquire) {
            warn!("disconnected, reconnecting in {backoff:?}");
            interruptible_sleep(backoff, &running).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    info!("feed stage exiting — {:?}", session.stats());
}

/// Sleep that wakes early on shutdown.
async fn interruptible_sleep(duration: Duration, running: &AtomicBool) {
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        if !running.load(Ordering::Acquire) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
