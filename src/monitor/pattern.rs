//! Monitored log patterns
//!
//! A [`LogPattern`] is a named regular-expression rule with a match-count
//! threshold and a time window. The expression is compiled once, case
//! insensitively, when the pattern is built; an invalid expression is
//! rejected at registration rather than at match time.

use crate::error::MonitorError;
use crate::record::LogLevel;
use chrono::Duration;
use regex::{Regex, RegexBuilder};

/// A named alerting rule matched against rendered message text
#[derive(Debug, Clone)]
pub struct LogPattern {
    name: String,
    source: String,
    regex: Regex,
    pub severity: LogLevel,
    /// Matches within the window required before an alert is raised
    pub threshold: usize,
    /// Sliding window over match timestamps
    pub time_window: Duration,
    enabled: bool,
}

impl LogPattern {
    /// Build a pattern, compiling its expression case-insensitively
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        severity: LogLevel,
        threshold: usize,
        window_minutes: i64,
    ) -> Result<Self, MonitorError> {
        let name = name.into();
        let source = pattern.into();
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| MonitorError::InvalidPattern {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            source,
            regex,
            severity,
            threshold: threshold.max(1),
            time_window: Duration::minutes(window_minutes.max(1)),
            enabled: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The uncompiled expression, as registered
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Test the pattern against a message or raw line
    pub fn matches(&self, text: &str) -> bool {
        self.enabled && self.regex.is_match(text)
    }

    pub fn window_minutes(&self) -> i64 {
        self.time_window.num_minutes()
    }
}

/// Patterns for common operational problems, registered by default
pub fn default_patterns() -> Vec<LogPattern> {
    // These expressions are deliberately broad; tune thresholds per
    // deployment through the configuration surface.
    let specs: [(&str, &str, LogLevel, usize, i64); 5] = [
        (
            "high_error_rate",
            r#""level":\s*"ERROR""#,
            LogLevel::Critical,
            10,
            5,
        ),
        (
            "database_connection_errors",
            r"database.*connection.*error|connection.*refused|timeout.*database",
            LogLevel::Error,
            3,
            5,
        ),
        (
            "memory_leak",
            r"memory.*leak|out of memory|memory.*exceeded",
            LogLevel::Critical,
            1,
            1,
        ),
        (
            "authentication_failures",
            r"authentication.*failed|invalid.*credentials|unauthorized",
            LogLevel::Warning,
            5,
            10,
        ),
        (
            "api_rate_limiting",
            r"rate.*limit|too many requests|429",
            LogLevel::Warning,
            3,
            5,
        ),
    ];

    specs
        .into_iter()
        .map(|(name, pattern, severity, threshold, window)| {
            LogPattern::new(name, pattern, severity, threshold, window)
                .expect("default pattern must compile")
        })
        .collect()
}
