//! Alert lifecycle store and deduplication
//!
//! Alerts are created when a pattern's match count reaches its threshold
//! and merged into an existing unresolved alert for the same pattern when
//! the trigger falls within the merge window. Alerts are never deleted,
//! only marked resolved.

use crate::monitor::pattern::LogPattern;
use crate::record::{LogLevel, Timestamp};
use chrono::{Duration, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};

/// Sample text stored on an alert is capped at this many bytes
const SAMPLE_LIMIT: usize = 500;

/// A stateful notification raised by the pattern monitor
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Unique id derived from pattern name and creation time
    pub id: String,
    pub pattern_name: String,
    pub message: String,
    pub severity: LogLevel,
    pub timestamp: Timestamp,
    /// Match count within the pattern's window at the last trigger
    pub count: usize,
    /// Triggering pattern configuration plus a truncated event sample
    pub details: BTreeMap<String, serde_json::Value>,
    pub acknowledged: bool,
    pub resolved: bool,
}

/// Callback invoked exactly once per newly created alert
pub type AlertCallback = Box<dyn Fn(&Alert) + Send>;

/// Lifecycle store for alerts with merge-window deduplication
pub struct AlertRegistry {
    active: HashMap<String, Alert>,
    history: Vec<Alert>,
    callback: Option<AlertCallback>,
    merge_window: Duration,
}

impl AlertRegistry {
    /// Create a registry with the given merge window
    ///
    /// The merge window is independent of any pattern's own time window;
    /// repeated triggers of one pattern within it update the existing
    /// unresolved alert instead of creating a new one.
    pub fn new(merge_window_secs: u64) -> Self {
        Self {
            active: HashMap::new(),
            history: Vec::new(),
            callback: None,
            merge_window: Duration::seconds(merge_window_secs.max(1) as i64),
        }
    }

    pub fn with_callback(mut self, callback: AlertCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Create a new alert or merge into a recent unresolved one
    ///
    /// The callback fires only when a new alert is created, never on a
    /// pure count update.
    pub fn create_or_merge(&mut self, pattern: &LogPattern, count: usize, sample: &str) -> Alert {
        self.create_or_merge_at(pattern, count, sample, Utc::now())
    }

    /// Same as [`create_or_merge`] with an explicit trigger time
    ///
    /// [`create_or_merge`]: AlertRegistry::create_or_merge
    pub fn create_or_merge_at(
        &mut self,
        pattern: &LogPattern,
        count: usize,
        sample: &str,
        now: Timestamp,
    ) -> Alert {
        let merge_window = self.merge_window;
        if let Some(existing) = self.active.values_mut().find(|alert| {
            alert.pattern_name == pattern.name()
                && !alert.resolved
                && now - alert.timestamp < merge_window
        }) {
            existing.count = count;
            existing.details.insert(
                "last_occurrence".to_string(),
                serde_json::json!(now.to_rfc3339()),
            );
            return existing.clone();
        }

        let mut details = BTreeMap::new();
        details.insert("pattern".to_string(), serde_json::json!(pattern.source()));
        details.insert("threshold".to_string(), serde_json::json!(pattern.threshold));
        details.insert(
            "time_window_minutes".to_string(),
            serde_json::json!(pattern.window_minutes()),
        );
        details.insert(
            "sample_log_entry".to_string(),
            serde_json::json!(truncate(sample, SAMPLE_LIMIT)),
        );

        let alert = Alert {
            id: format!("{}_{}", pattern.name(), now.timestamp()),
            pattern_name: pattern.name().to_string(),
            message: format!(
                "Pattern '{}' matched {} times in {} minutes",
                pattern.name(),
                count,
                pattern.window_minutes()
            ),
            severity: pattern.severity,
            timestamp: now,
            count,
            details,
            acknowledged: false,
            resolved: false,
        };

        self.active.insert(alert.id.clone(), alert.clone());
        self.history.push(alert.clone());
        warn!("Alert created: {}", alert.message);

        if let Some(callback) = &self.callback {
            // A faulty callback must never break monitoring
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&alert))).is_err() {
                error!("Alert callback panicked for alert {}", alert.id);
            }
        }

        alert
    }

    /// Mark an alert acknowledged; `false` if the id is unknown
    pub fn acknowledge(&mut self, id: &str) -> bool {
        match self.active.get_mut(id) {
            Some(alert) => {
                alert.acknowledged = true;
                info!("Alert acknowledged: {}", id);
                true
            }
            None => false,
        }
    }

    /// Mark an alert resolved; `false` if the id is unknown
    ///
    /// Repeated calls keep returning `true`; resolution has no further
    /// side effects after the first call.
    pub fn resolve(&mut self, id: &str) -> bool {
        match self.active.get_mut(id) {
            Some(alert) => {
                alert.resolved = true;
                info!("Alert resolved: {}", id);
                true
            }
            None => false,
        }
    }

    /// All non-resolved alerts, in unspecified order
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active
            .values()
            .filter(|alert| !alert.resolved)
            .cloned()
            .collect()
    }

    /// Every alert ever created, in creation order
    pub fn history(&self) -> &[Alert] {
        &self.history
    }
}

/// Truncate to a byte limit on a valid UTF-8 boundary
fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
