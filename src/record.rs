//! Core record types for the logging pipeline
//!
//! This module defines the structured log record and its payloads. A
//! [`LogRecord`] is an immutable snapshot of one event, created at the call
//! site and never mutated afterwards; the formatter and the monitor only
//! ever read it.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Timestamp type for consistent time handling across the pipeline
pub type Timestamp = DateTime<Utc>;

/// Log severity level, totally ordered from Debug to Critical
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Canonical uppercase name as it appears in rendered output
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    /// Parse a level name, case-insensitively. Unknown names are a
    /// configuration error so that a typo fails at init rather than
    /// silently defaulting.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(ConfigError::UnknownLevel(other.to_string())),
        }
    }
}

/// Category describing what kind of event a record represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    System,
    Application,
    Security,
    Audit,
    Performance,
    Business,
    Error,
    Api,
    Database,
    External,
}

/// Performance metrics attached to a record
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    /// Duration of the measured operation in milliseconds
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_misses: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_queries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_calls: Option<u64>,
}

/// Details of an error captured alongside a record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    /// Kind of the error (type name, error code, ...)
    pub kind: String,
    /// Error message text
    pub message: String,
    /// Stack trace or backtrace text, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// One structured log event
///
/// Records are immutable once built. `extra` is an open string-keyed
/// mapping validated only by convention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    /// Wall-clock creation time
    pub timestamp: Timestamp,
    pub level: LogLevel,
    /// Name of the logger that produced the record
    pub logger: String,
    pub message: String,
    pub category: LogCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerformanceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_context: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// Create a record with the current timestamp and no optional payloads
    pub fn new(level: LogLevel, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            message: message.into(),
            category: LogCategory::Application,
            metrics: None,
            error_details: None,
            business_context: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: LogCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_error_details(mut self, details: ErrorDetails) -> Self {
        self.error_details = Some(details);
        self
    }

    pub fn with_business_context(
        mut self,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        self.business_context = Some(context);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("Warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("CRITICAL".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(
            serde_json::to_string(&LogLevel::Warning).unwrap(),
            "\"WARNING\""
        );
        assert_eq!(
            serde_json::to_string(&LogLevel::Critical).unwrap(),
            "\"CRITICAL\""
        );
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(
            serde_json::to_string(&LogCategory::Database).unwrap(),
            "\"database\""
        );
        assert_eq!(
            serde_json::to_string(&LogCategory::Security).unwrap(),
            "\"security\""
        );
    }

    #[test]
    fn test_record_round_trip() {
        let record = LogRecord::new(LogLevel::Error, "app.db", "connection refused")
            .with_category(LogCategory::Database)
            .with_error_details(ErrorDetails {
                kind: "ConnectionError".to_string(),
                message: "connection refused".to_string(),
                stack_trace: None,
            })
            .with_extra("attempt", serde_json::json!(3));

        let json = serde_json::to_string(&record).unwrap();
        let parsed: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.level, parsed.level);
        assert_eq!(record.message, parsed.message);
        assert_eq!(record.category, parsed.category);
        assert_eq!(record, parsed);
    }

    #[test]
    fn test_optional_payloads_omitted() {
        let record = LogRecord::new(LogLevel::Info, "app", "hello");
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("metrics"));
        assert!(!json.contains("error_details"));
        assert!(!json.contains("business_context"));
        assert!(!json.contains("extra"));
    }
}
