//! Coinbase Advanced Trade JSON message decoding.
//!
//! Each inbound frame carries a `channel` tag, a monotonic `sequence_num`,
//! and — on book channels — an `events` array where each event is either a
//! `snapshot` or an `update` holding `(side, price_level, new_quantity)`
//! tuples. Prices and quantities arrive as ASCII decimal strings and are
//! parsed straight into 1e-8 fixed point.

use cbx_core::fixed::parse_fixed;

/// Which channel a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// L2 book data (`l2_data` on the wire, `level2` on old gateways).
    L2Data,
    /// Liveness channel; never produces book events.
    Heartbeats,
    /// Subscription acks and anything else we do not consume.
    Other,
}

/// One `(side, price_level, new_quantity)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2Update {
    pub is_bid: bool,
    pub price: i64,
    pub quantity: i64,
}

/// One entry of the `events` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Event {
    pub is_snapshot: bool,
    pub updates: Vec<L2Update>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMsg {
    pub channel: Channel,
    pub sequence_num: Option<i64>,
    pub events: Vec<L2Event>,
}

/// Decode one raw frame. Returns `None` when the frame is not valid JSON or
/// lacks the `channel` tag — the session counts those as parse errors.
pub fn decode_message(text: &str) -> Option<InboundMsg> {
    let doc: serde_json::Value = serde_json::from_str(text).ok()?;

    let channel = match doc.get("channel")?.as_str()? {
        "l2_data" | "level2" => Channel::L2Data,
        "heartbeats" => Channel::Heartbeats,
        _ => Channel::Other,
    };

    let sequence_num = doc.get("sequence_num").and_then(|v| v.as_i64());

    let mut events = Vec::new();
    if channel == Channel::L2Data
        && let Some(raw_events) = doc.get("events").and_then(|v| v.as_array())
    {
        for raw in raw_events {
            let Some(kind) = raw.get("type").and_then(|v| v.as_str()) else { continue };
            let is_snapshot = kind == "snapshot";

            let mut updates = Vec::new();
            if let Some(raw_updates) = raw.get("updates").and_then(|v| v.as_array()) {
                for u in raw_updates {
                    if let Some(update) = decode_update(u) {
                        updates.push(update);
                    }
                }
            }
            events.push(L2Event { is_snapshot, updates });
        }
    }

    Some(InboundMsg { channel, sequence_num, events })
}

/// Decode one update tuple; malformed tuples are skipped.
fn decode_update(u: &serde_json::Value) -> Option<L2Update> {
    let side = u.get("side")?.as_str()?;
    let price = parse_fixed(u.get("price_level")?.as_str()?)?;
    let quantity = parse_fixed(u.get("new_quantity")?.as_str()?)?;

    // The venue says "bid" / "offer"; anything starting with 'b' is a bid.
    let is_bid = side.as_bytes().first() == Some(&b'b');

    (price > 0 && quantity >= 0).then_some(L2Update { is_bid, price, quantity })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_update_event() {
        let raw = r#"{
            "channel": "l2_data",
            "sequence_num": 42,
            "events": [{
                "type": "update",
                "updates": [
                    {"side": "bid", "price_level": "100.00", "new_quantity": "2"},
                    {"side": "offer", "price_level": "100.02", "new_quantity": "3.5"}
                ]
            }]
        }"#;

        let msg = decode_message(raw).unwrap();
        assert_eq!(msg.channel, Channel::L2Data);
        assert_eq!(msg.sequence_num, Some(42));
        assert_eq!(msg.events.len(), 1);
        assert!(!msg.events[0].is_snapshot);

        let updates = &msg.events[0].updates;
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0],
            L2Update { is_bid: true, price: 10_000_000_000, quantity: 200_000_000 }
        );
        assert_eq!(
            updates[1],
            L2Update { is_bid: false, price: 10_002_000_000, quantity: 350_000_000 }
        );
    }

    #[test]
    fn decode_snapshot_event() {
        let raw = r#"{
            "channel": "l2_data",
            "sequence_num": 1,
            "events": [{
                "type": "snapshot",
                "updates": [{"side": "bid", "price_level": "99.99", "new_quantity": "1"}]
            }]
        }"#;
        let msg = decode_message(raw).unwrap();
        assert!(msg.events[0].is_snapshot);
    }

    #[test]
    fn heartbeat_has_no_events() {
        let raw = r#"{"channel": "heartbeats", "sequence_num": 7}"#;
        let msg = decode_message(raw).unwrap();
        assert_eq!(msg.channel, Channel::Heartbeats);
        assert_eq!(msg.sequence_num, Some(7));
        assert!(msg.events.is_empty());
    }

    #[test]
    fn subscription_ack_is_other() {
        let raw = r#"{"channel": "subscriptions", "events": []}"#;
        let msg = decode_message(raw).unwrap();
        assert_eq!(msg.channel, Channel::Other);
    }

    #[test]
    fn malformed_frames_rejected() {
        assert!(decode_message("not json").is_none());
        assert!(decode_message(r#"{"no_channel": true}"#).is_none());
        assert!(decode_message(r#"{"channel": 5}"#).is_none());
    }

    #[test]
    fn bad_tuples_skipped() {
        let raw = r#"{
            "channel": "l2_data",
            "events": [{
                "type": "update",
                "updates": [
                    {"side": "bid", "price_level": "abc", "new_quantity": "1"},
                    {"side": "bid", "price_level": "-5", "new_quantity": "1"},
                    {"side": "bid", "price_level": "100.00"},
                    {"side": "bid", "price_level": "100.00", "new_quantity": "1"}
                ]
            }]
        }"#;
        let msg = decode_message(raw).unwrap();
        assert_eq!(msg.events[0].updates.len(), 1);
        assert_eq!(msg.events[0].updates[0].price, 10_000_000_000);
    }
}
