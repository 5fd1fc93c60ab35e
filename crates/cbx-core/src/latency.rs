//! Histogram-based latency collector.
//!
//! The execution gateway records the span from order pop to HTTP response;
//! the strategy can record tick-to-emit spans the same way. Statistics
//! (min, max, average, p50/p90/p99) are computed on demand and logged at
//! shutdown rather than written per sample.
//!
//! The histogram uses fixed 10µs bins up to 100ms. Samples above the range
//! are counted in the last bin (the true max is still tracked exactly).

/// Width of each histogram bin in microseconds.
const BIN_WIDTH_US: u64 = 10;

/// Number of histogram bins (covers 0–100ms).
const NUM_BINS: usize = 10_000;

/// Computed latency statistics.
#[derive(Debug, Clone, Copy)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub avg_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
}

impl std::fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} min={}µs max={}µs avg={:.1}µs p50={}µs p90={}µs p99={}µs",
            self.count, self.min_us, self.max_us, self.avg_us, self.p50_us, self.p90_us, self.p99_us,
        )
    }
}

/// A histogram-based latency collector.
///
/// Not thread-safe — each stage owns its own instance.
pub struct LatencyCollector {
    bins: Vec<u64>,
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl LatencyCollector {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self { bins: vec![0u64; NUM_BINS], count: 0, sum: 0, min: u64::MAX, max: 0 }
    }

    /// Record a latency sample in microseconds.
    #[inline]
    pub fn record_us(&mut self, latency_us: u64) {
        self.count += 1;
        self.sum += latency_us;
        self.min = self.min.min(latency_us);
        self.max = self.max.max(latency_us);

        let bin = ((latency_us / BIN_WIDTH_US) as usize).min(NUM_BINS - 1);
        self.bins[bin] += 1;
    }

    /// Record the span between two monotonic nanosecond timestamps.
    #[inline]
    pub fn record_span_ns(&mut self, start_ns: u64, end_ns: u64) {
        if end_ns > start_ns {
            self.record_us((end_ns - start_ns) / 1_000);
        }
    }

    /// Returns the number of recorded samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Compute summary statistics. Returns `None` if no samples recorded.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.count == 0 {
            return None;
        }

        Some(LatencyStats {
            count: self.count,
            min_us: self.min,
            max_us: self.max,
            avg_us: self.sum as f64 / self.count as f64,
            p50_us: self.percentile(0.50),
            p90_us: self.percentile(0.90),
            p99_us: self.percentile(0.99),
        })
    }

    /// Reset all counters and bins.
    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.count = 0;
        self.sum = 0;
        self.min = u64::MAX;
        self.max = 0;
    }

    /// Compute the value at the given percentile (0.0–1.0).
    fn percentile(&self, pct: f64) -> u64 {
        let target = (self.count as f64 * pct).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return (i as u64) * BIN_WIDTH_US;
            }
        }
        self.max
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_stats() {
        let mut lc = LatencyCollector::new();
        for i in 1..=100 {
            lc.record_us(i * 10);
        }
        let stats = lc.stats().unwrap();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min_us, 10);
        assert_eq!(stats.max_us, 1000);
        assert!(stats.p50_us >= 490 && stats.p50_us <= 510);
        assert!(stats.p99_us >= 980 && stats.p99_us <= 1000);
    }

    #[test]
    fn empty_stats() {
        let lc = LatencyCollector::new();
        assert!(lc.stats().is_none());
    }

    #[test]
    fn span_recording() {
        let mut lc = LatencyCollector::new();
        lc.record_span_ns(1_000_000, 3_500_000); // 2.5ms
        lc.record_span_ns(10, 5); // backwards span is dropped
        let stats = lc.stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.max_us, 2_500);
    }

    #[test]
    fn overflow_clamped_to_last_bin() {
        let mut lc = LatencyCollector::new();
        lc.record_us(500_000); // 500ms, above histogram range
        let stats = lc.stats().unwrap();
        assert_eq!(stats.max_us, 500_000);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn reset_clears() {
        let mut lc = LatencyCollector::new();
        lc.record_us(100);
        lc.reset();
        assert_eq!(lc.count(), 0);
        assert!(lc.stats().is_none());
    }
}
