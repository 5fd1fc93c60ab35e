//! Packed 8-byte symbol utilities.
//!
//! Events and orders carry the instrument symbol as a single `u64` so the
//! structs stay `Copy` and fit a cache line without heap allocation. Product
//! ids up to 8 ASCII bytes (e.g. `"BTC-USD"`) pack losslessly; longer ids
//! are truncated.

/// Pack a symbol string into a `u64` (little-endian, zero-padded).
#[inline]
pub fn pack_symbol(s: &str) -> u64 {
    let mut buf = [0u8; 8];
    let len = s.len().min(8);
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    u64::from_le_bytes(buf)
}

/// Unpack a symbol `u64` back into a string (up to the first zero byte).
pub fn unpack_symbol(packed: u64) -> String {
    let buf = packed.to_le_bytes();
    let end = buf.iter().position(|&b| b == 0).unwrap_or(8);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
