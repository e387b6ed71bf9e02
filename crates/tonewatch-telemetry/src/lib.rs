pub mod poller_metrics;
pub mod worker_stats;

pub use poller_metrics::*;
pub use worker_stats::*;
