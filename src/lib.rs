/// Error types for the logging pipeline and monitor
pub mod error;

/// Log record model: levels, categories, metrics and error payloads
pub mod record;

/// Trace context propagation with scoped binding
pub mod context;

/// Structured and human-readable rendering
pub mod format;

/// Output sinks: console, rotating file and the async adapter
pub mod sink;

/// Logger registry, pipeline lifecycle and the ingestion API
pub mod logger;

/// Live log monitoring and alerting
pub mod monitor;

/// Offline batch analysis of log files
pub mod analyze;

/// Configuration loading
pub mod config;

// Re-export commonly used types
pub use error::{AnalyzeError, ConfigError, MonitorError, SinkError};
pub use logger::{init, logger, shutdown, LogConfig, Logger, OperationTimer};
pub use record::{LogCategory, LogLevel, LogRecord};
