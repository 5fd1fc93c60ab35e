//! Raw feed capture and offline replay.
//!
//! The capture file is a sequence of `{timestamp:u64, length:u32, bytes}`
//! records (little-endian, no framing beyond the length prefix). The live
//! transport appends every inbound frame before decoding it; the replay
//! reader drives the same [`FeedSession`] path so the whole pipeline runs
//! offline from a recording.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::session::{FeedAction, FeedSession};

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends raw frames to a capture file.
pub struct CaptureWriter {
    out: BufWriter<File>,
}

impl CaptureWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create capture file {}", path.display()))?;
        Ok(Self { out: BufWriter::new(file) })
    }

    /// Append one `{timestamp, length, bytes}` record.
    pub fn write_record(&mut self, timestamp_ns: u64, data: &[u8]) -> std::io::Result<()> {
        self.out.write_all(&timestamp_ns.to_le_bytes())?;
        self.out.write_all(&(data.len() as u32).to_le_bytes())?;
        self.out.write_all(data)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Streams records out of a capture file.
pub struct CaptureReader {
    input: BufReader<File>,
}

impl CaptureReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open capture file {}", path.display()))?;
        Ok(Self { input: BufReader::new(file) })
    }

    /// Read the next record, or `None` at a clean end of file. A torn
    /// trailing record (capture cut mid-write) also ends the stream.
    pub fn next_record(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        let mut ts_bytes = [0u8; 8];
        match self.input.read_exact(&mut ts_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut len_bytes = [0u8; 4];
        if self.input.read_exact(&mut len_bytes).is_err() {
            warn!("torn capture record header, stopping replay");
            return Ok(None);
        }

        let timestamp = u64::from_le_bytes(ts_bytes);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut data = vec![0u8; len];
        if self.input.read_exact(&mut data).is_err() {
            warn!("torn capture record body, stopping replay");
            return Ok(None);
        }
        Ok(Some((timestamp, data)))
    }
}

/// Replay a capture file through a feed session. Returns the number of
/// frames fed. A recorded gap resynchronizes exactly as it would live.
pub fn replay_into(path: &Path, session: &mut FeedSession) -> Result<u64> {
    let mut reader = CaptureReader::open(path)?;
    let mut frames = 0u64;

    while let Some((_, data)) = reader.next_record()? {
        frames += 1;
        let Ok(text) = std::str::from_utf8(&data) else {
            warn!("skipping non-UTF-8 capture record");
            continue;
        };
        if session.on_message(text) == FeedAction::Resync {
            session.on_close();
        }
    }

    info!("replay finished: {frames} frame(s)");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbx_core::pack_symbol;
    use cbx_core::ring::spsc_ring;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("cbx-capture-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn round_trip_records() {
        let path = temp_path("rt");
        {
            let mut w = CaptureWriter::create(&path).unwrap();
            w.write_record(123, b"hello").unwrap();
            w.write_record(456, b"").unwrap();
            w.write_record(789, b"world!").unwrap();
        }

        let mut r = CaptureReader::open(&path).unwrap();
        assert_eq!(r.next_record().unwrap(), Some((123, b"hello".to_vec())));
        assert_eq!(r.next_record().unwrap(), Some((456, Vec::new())));
        assert_eq!(r.next_record().unwrap(), Some((789, b"world!".to_vec())));
        assert_eq!(r.next_record().unwrap(), None);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn torn_tail_ends_stream() {
        let path = temp_path("torn");
        {
            let mut w = CaptureWriter::create(&path).unwrap();
            w.write_record(1, b"ok").unwrap();
            w.flush().unwrap();
        }
        // Append a header that promises more bytes than exist.
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&2u64.to_le_bytes()).unwrap();
            f.write_all(&100u32.to_le_bytes()).unwrap();
            f.write_all(b"short").unwrap();
        }

        let mut r = CaptureReader::open(&path).unwrap();
        assert_eq!(r.next_record().unwrap(), Some((1, b"ok".to_vec())));
        assert_eq!(r.next_record().unwrap(), None);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn replay_drives_the_session() {
        let path = temp_path("replay");
        let snapshot = r#"{"channel":"l2_data","sequence_num":1,"events":[{"type":"snapshot","updates":[{"side":"bid","price_level":"100.00","new_quantity":"1"}]}]}"#;
        {
            let mut w = CaptureWriter::create(&path).unwrap();
            w.write_record(1, snapshot.as_bytes()).unwrap();
        }

        let (tx, mut rx) = spsc_ring(64);
        let running = Arc::new(AtomicBool::new(true));
        let mut session = FeedSession::new(tx, running, pack_symbol("BTC-USD"));

        let frames = replay_into(&path, &mut session).unwrap();
        assert_eq!(frames, 1);
        // Reset marker + one level.
        assert!(rx.pop().unwrap().is_reset());
        assert_eq!(rx.pop().unwrap().price, 10_000_000_000);
        assert!(rx.pop().is_none());

        std::fs::remove_file(&path).ok();
    }
}
