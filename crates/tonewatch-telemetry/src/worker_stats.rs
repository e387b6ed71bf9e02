use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the audio command worker, shared between the real-time
/// callback side and the consumer thread.
#[derive(Clone, Default)]
pub struct WorkerStats {
    pub chunks_captured: Arc<AtomicU64>,
    pub chunks_dropped: Arc<AtomicU64>,
    pub frames_processed: Arc<AtomicU64>,
    pub observations_emitted: Arc<AtomicU64>,
    pub commands_executed: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &Arc<AtomicU64>) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
