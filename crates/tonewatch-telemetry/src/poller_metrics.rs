use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared metrics for a device-side poll loop.
///
/// Cloned into the poll thread and read from the control side for
/// post-mortem logging; all fields are lock-free.
#[derive(Clone, Default)]
pub struct PollerMetrics {
    /// Maximum observed device-channel round trip, in microseconds
    pub channel_rtt_max_us: Arc<AtomicU64>,
    /// Maximum observed classifier callback processing time, in microseconds
    pub classify_max_us: Arc<AtomicU64>,

    pub lines_polled: Arc<AtomicU64>,
    pub parse_failures: Arc<AtomicU64>,
    pub channel_failures: Arc<AtomicU64>,
}

impl PollerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_channel_rtt(&self, rtt: Duration) {
        self.channel_rtt_max_us
            .fetch_max(rtt.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_classify_time(&self, elapsed: Duration) {
        self.classify_max_us
            .fetch_max(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn incr_lines_polled(&self) {
        self.lines_polled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_channel_failures(&self) {
        self.channel_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_rtt_max_ms(&self) -> f64 {
        self.channel_rtt_max_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn classify_max_ms(&self) -> f64 {
        self.classify_max_us.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
