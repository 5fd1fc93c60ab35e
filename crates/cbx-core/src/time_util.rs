//! High-precision time utilities.
//!
//! Event timestamps are wall-clock nanoseconds from
//! `clock_gettime(CLOCK_REALTIME)`; latency spans use
//! `CLOCK_MONOTONIC_RAW` so wall-clock jumps never produce negative
//! intervals. Non-Linux hosts fall back to `SystemTime` / `Instant`.

#[cfg(not(target_os = "linux"))]
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Linux: clock_gettime
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
#[inline]
fn clock_ns(clock: libc::clockid_t) -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: both clock ids used below are always valid; on the (never
    // observed) failure path the zeroed timespec yields epoch, which is a
    // safe fallback.
    unsafe {
        libc::clock_gettime(clock, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Wall-clock time as **nanoseconds** since Unix epoch.
#[cfg(target_os = "linux")]
#[inline]
pub fn now_ns() -> u64 {
    clock_ns(libc::CLOCK_REALTIME)
}

/// Monotonic clock in **nanoseconds** — for latency spans.
#[cfg(target_os = "linux")]
#[inline]
pub fn monotonic_ns() -> u64 {
    clock_ns(libc::CLOCK_MONOTONIC_RAW)
}

// ---------------------------------------------------------------------------
// Non-Linux fallback
// ---------------------------------------------------------------------------

/// Wall-clock time as **nanoseconds** since Unix epoch.
#[cfg(not(target_os = "linux"))]
#[inline]
pub fn now_ns() -> u64 {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    d.as_secs() * 1_000_000_000 + d.subsec_nanos() as u64
}

/// Monotonic clock in **nanoseconds** — for latency spans.
#[cfg(not(target_os = "linux"))]
#[inline]
pub fn monotonic_ns() -> u64 {
    use std::{sync::LazyLock, time::Instant};
    static ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);
    ORIGIN.elapsed().as_nanos() as u64
}

/// Wall-clock time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    now_ns() / 1_000
}

/// Wall-clock time as whole **seconds** since Unix epoch (JWT claims).
#[inline]
pub fn now_secs() -> u64 {
    now_ns() / 1_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clocks_advance() {
        let a = monotonic_ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = monotonic_ns();
        assert!(b > a);
    }

    #[test]
    fn wall_clock_is_post_2020() {
        // 2020-01-01 in seconds.
        assert!(now_secs() > 1_577_836_800);
    }
}
