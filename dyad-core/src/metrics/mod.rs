//! Latency and sync-quality telemetry

pub mod latency;
pub mod report;

pub use latency::{LatencyMetrics, LatencyMetricsSnapshot, SyncConfidence};
pub use report::MetricsReport;
