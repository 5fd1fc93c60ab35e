//! Feed synchronization state machine.
//!
//! Converts decoded frames into an exactly-once, in-order stream of
//! [`BookEvent`]s, provided the transport is lossless — and forces a
//! resynchronization otherwise:
//!
//! - `UNSYNCED` + snapshot → `SYNCED` (a reset marker is published, then the
//!   snapshot's levels)
//! - `UNSYNCED` + update → dropped
//! - `SYNCED` + update → levels published
//! - any frame with `sequence_num ≠ last + 1` (and `last ≠ −1`) →
//!   [`FeedAction::Resync`]: the caller must close the transport and call
//!   [`FeedSession::on_close`]
//!
//! Publication spins on a full ring — the strategy drains faster than the
//! feed fills, so after synchronization no event is ever dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cbx_core::ring::Producer;
use cbx_core::{BookEvent, time_util};
use tracing::{info, warn};

use crate::decode::{Channel, decode_message};

/// What the transport should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedAction {
    /// Keep reading.
    Continue,
    /// Sequence gap: close the transport and resynchronize from the next
    /// snapshot.
    Resync,
}

/// Feed-side counters, logged at shutdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedStats {
    pub events_published: u64,
    pub heartbeats: u64,
    pub parse_errors: u64,
    pub gaps: u64,
    pub dropped_unsynced: u64,
}

/// Transport-agnostic feed session: decode, gap detection,
/// snapshot-before-delta, and ring publication.
pub struct FeedSession {
    producer: Producer<BookEvent>,
    running: Arc<AtomicBool>,
    symbol: u64,

    synced: bool,
    last_seq: i64,
    next_event_id: u64,
    stats: FeedStats,
}

impl FeedSession {
    pub fn new(producer: Producer<BookEvent>, running: Arc<AtomicBool>, symbol: u64) -> Self {
        Self {
            producer,
            running,
            symbol,
            synced: false,
            last_seq: -1,
            next_event_id: 0,
            stats: FeedStats::default(),
        }
    }

    /// Whether a snapshot has been applied since the last (re)connect.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Transport closed (or is about to be): back to `UNSYNCED`.
    pub fn on_close(&mut self) {
        self.synced = false;
        self.last_seq = -1;
    }

    /// Process one raw frame.
    pub fn on_message(&mut self, text: &str) -> FeedAction {
        let Some(msg) = decode_message(text) else {
            self.stats.parse_errors += 1;
            warn!("dropping malformed frame ({} bytes)", text.len());
            return FeedAction::Continue;
        };

        // Global sequence handling, before any channel dispatch.
        if let Some(seq) = msg.sequence_num {
            if self.last_seq != -1 && seq != self.last_seq + 1 {
                self.stats.gaps += 1;
                warn!("sequence gap: {} -> {seq}, forcing resync", self.last_seq);
                return FeedAction::Resync;
            }
            self.last_seq = seq;
        }

        match msg.channel {
            Channel::Heartbeats => {
                self.stats.heartbeats += 1;
                FeedAction::Continue
            }
            Channel::Other => FeedAction::Continue,
            Channel::L2Data => {
                for event in &msg.events {
                    if !self.synced && !event.is_snapshot {
                        // Started mid-stream: nothing to publish until a
                        // snapshot arrives.
                        self.stats.dropped_unsynced += 1;
                        return FeedAction::Continue;
                    }

                    if event.is_snapshot {
                        if !self.synced {
                            info!("snapshot received, feed synchronized");
                        }
                        self.synced = true;
                        let marker = BookEvent::reset_marker(
                            self.bump_event_id(),
                            time_util::now_ns(),
                            self.symbol,
                        );
                        self.publish(marker);
                    }

                    for update in &event.updates {
                        let ev = BookEvent {
                            id: self.bump_event_id(),
                            timestamp_ns: time_util::now_ns(),
                            price: update.price,
                            quantity: update.quantity,
                            symbol: self.symbol,
                            is_bid: update.is_bid,
                            is_trade: false,
                            is_snapshot: event.is_snapshot,
                        };
                        self.publish(ev);
                    }
                }
                FeedAction::Continue
            }
        }
    }

    #[inline]
    fn bump_event_id(&mut self) -> u64 {
        self.next_event_id += 1;
        self.next_event_id
    }

    /// Spin until the strategy drains a slot; abandons the event only on
    /// shutdown.
    fn publish(&mut self, event: BookEvent) {
        let mut pending = event;
        loop {
            match self.producer.push(pending) {
                Ok(()) => {
                    self.stats.events_published += 1;
                    return;
                }
                Err(back) => {
                    if !self.running.load(Ordering::Acquire) {
                        return;
                    }
                    pending = back;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbx_core::pack_symbol;
    use cbx_core::ring::{Consumer, spsc_ring};

    fn session() -> (FeedSession, Consumer<BookEvent>) {
        let (tx, rx) = spsc_ring::<BookEvent>(256);
        let running = Arc::new(AtomicBool::new(true));
        (FeedSession::new(tx, running, pack_symbol("BTC-USD")), rx)
    }

    fn drain(rx: &mut Consumer<BookEvent>) -> Vec<BookEvent> {
        let mut out = Vec::new();
        while let Some(ev) = rx.pop() {
            out.push(ev);
        }
        out
    }

    const UPDATE: &str = r#"{
        "channel": "l2_data", "sequence_num": 1,
        "events": [{"type": "update", "updates": [
            {"side": "bid", "price_level": "100.00", "new_quantity": "2"}
        ]}]
    }"#;

    const SNAPSHOT: &str = r#"{
        "channel": "l2_data", "sequence_num": 2,
        "events": [{"type": "snapshot", "updates": [
            {"side": "bid", "price_level": "100.00", "new_quantity": "2"},
            {"side": "offer", "price_level": "100.02", "new_quantity": "3"}
        ]}]
    }"#;

    #[test]
    fn updates_before_snapshot_are_dropped() {
        let (mut session, mut rx) = session();

        assert_eq!(session.on_message(UPDATE), FeedAction::Continue);
        assert!(!session.is_synced());
        assert!(drain(&mut rx).is_empty());

        // Snapshot: exactly one reset marker followed by the two levels.
        assert_eq!(session.on_message(SNAPSHOT), FeedAction::Continue);
        assert!(session.is_synced());

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(events[0].is_reset());
        assert_eq!(events[1].price, 10_000_000_000);
        assert_eq!(events[1].quantity, 200_000_000);
        assert!(events[1].is_bid);
        assert!(events[1].is_snapshot);
        assert_eq!(events[2].price, 10_002_000_000);
        assert!(!events[2].is_bid);
    }

    #[test]
    fn synced_updates_flow_through() {
        let (mut session, mut rx) = session();
        session.on_message(SNAPSHOT.replace("\"sequence_num\": 2", "\"sequence_num\": 1").as_str());
        drain(&mut rx);

        let update2 = UPDATE.replace("\"sequence_num\": 1", "\"sequence_num\": 2");
        assert_eq!(session.on_message(&update2), FeedAction::Continue);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_snapshot);
        assert!(!events[0].is_reset());
    }

    #[test]
    fn sequence_gap_forces_resync() {
        let (mut session, mut rx) = session();
        let seq = |n: i64| {
            format!(
                r#"{{"channel": "l2_data", "sequence_num": {n},
                    "events": [{{"type": "snapshot", "updates": [
                        {{"side": "bid", "price_level": "100.00", "new_quantity": "1"}}
                    ]}}]}}"#
            )
        };

        assert_eq!(session.on_message(&seq(10)), FeedAction::Continue);
        assert_eq!(session.on_message(&seq(11)), FeedAction::Continue);
        drain(&mut rx);

        // 12 missing: nothing published for 13, transport must restart.
        assert_eq!(session.on_message(&seq(13)), FeedAction::Resync);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.stats().gaps, 1);

        session.on_close();
        assert!(!session.is_synced());

        // After the reconnect the counter restarts from whatever arrives.
        assert_eq!(session.on_message(&seq(100)), FeedAction::Continue);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn heartbeats_count_but_publish_nothing() {
        let (mut session, mut rx) = session();
        let hb = r#"{"channel": "heartbeats", "sequence_num": 1}"#;
        assert_eq!(session.on_message(hb), FeedAction::Continue);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.stats().heartbeats, 1);

        // Heartbeats participate in the gap check.
        let hb3 = r#"{"channel": "heartbeats", "sequence_num": 3}"#;
        assert_eq!(session.on_message(hb3), FeedAction::Resync);
    }

    #[test]
    fn parse_errors_are_counted_and_skipped() {
        let (mut session, mut rx) = session();
        assert_eq!(session.on_message("garbage"), FeedAction::Continue);
        assert_eq!(session.stats().parse_errors, 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn later_snapshots_also_reset() {
        let (mut session, mut rx) = session();
        session.on_message(SNAPSHOT.replace("\"sequence_num\": 2", "\"sequence_num\": 1").as_str());
        drain(&mut rx);

        assert_eq!(session.on_message(SNAPSHOT), FeedAction::Continue);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert!(events[0].is_reset());
    }

    #[test]
    fn event_ids_strictly_increase() {
        let (mut session, mut rx) = session();
        session.on_message(SNAPSHOT.replace("\"sequence_num\": 2", "\"sequence_num\": 1").as_str());
        let events = drain(&mut rx);
        for pair in events.windows(2) {
            assert!(pair[1].id > pair[0].id);
        }
    }
}
