//! Live log monitoring and alerting
//!
//! The monitor tails a structured log file, matches each event against
//! registered patterns, and raises deduplicated alerts when a pattern's
//! match count exceeds its threshold within its time window.

/// Pattern definitions and the default pattern set
pub mod pattern;

/// Alert lifecycle store and deduplication
pub mod alerts;

/// The live monitor with its tail and metrics workers
pub mod monitor;

pub use alerts::{Alert, AlertCallback, AlertRegistry};
pub use monitor::{LogMetricsSnapshot, LogMonitor, MetricsSummary, MonitorConfig};
pub use pattern::{default_patterns, LogPattern};
