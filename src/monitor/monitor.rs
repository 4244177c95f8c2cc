//! The live log monitor
//!
//! [`LogMonitor`] tails an append-only log file from its current end,
//! matching each new line against the registered patterns and keeping a
//! per-pattern sliding window of match timestamps. A second worker
//! periodically snapshots cumulative counters into a bounded metrics
//! history. Both workers observe the stop signal within one backoff
//! interval.
//!
//! Lock order throughout: patterns, windows, match totals, counters,
//! history, registry. Every path takes locks in this order.

use crate::error::MonitorError;
use crate::monitor::alerts::{Alert, AlertCallback, AlertRegistry};
use crate::monitor::pattern::LogPattern;
use crate::record::Timestamp;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Idle backoff while the tail worker waits for new lines
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep slice used so workers notice the stop signal promptly
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Rolling metrics history capacity; oldest snapshot evicted on overflow
const METRICS_HISTORY_CAP: usize = 100;

/// Monitor settings supplied at construction
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds between metrics snapshots
    pub metrics_interval_secs: u64,
    /// Seconds within which repeated triggers merge into one alert
    pub merge_window_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 60,
            merge_window_secs: 300,
        }
    }
}

/// Periodic aggregate of the monitor's cumulative counters
#[derive(Debug, Clone, Serialize)]
pub struct LogMetricsSnapshot {
    pub timestamp: Timestamp,
    pub total_logs: u64,
    pub error_count: u64,
    pub warning_count: u64,
    pub critical_count: u64,
    /// Delta of totals since the previous snapshot per elapsed minute
    pub log_rate_per_minute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f64>,
}

/// Operator-facing metrics summary
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub timestamp: Timestamp,
    pub total_logs: u64,
    pub error_count: u64,
    pub warning_count: u64,
    pub critical_count: u64,
    pub log_rate_per_minute: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_usage_percent: Option<f64>,
    pub active_alerts: usize,
    /// Cumulative matches per pattern since construction
    pub pattern_matches: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    errors: u64,
    warnings: u64,
    criticals: u64,
}

/// Shared monitor state, owned behind an `Arc` by the workers
struct MonitorState {
    patterns: Mutex<Vec<LogPattern>>,
    windows: Mutex<HashMap<String, VecDeque<Timestamp>>>,
    match_totals: Mutex<HashMap<String, u64>>,
    counters: Mutex<Counters>,
    history: Mutex<VecDeque<LogMetricsSnapshot>>,
    registry: Mutex<AlertRegistry>,
    running: Mutex<bool>,
}

impl MonitorState {
    fn lock_running(&self) -> bool {
        *self.running.lock().expect("running flag poisoned")
    }

    /// Process one line from the source at the given time
    fn process_line(&self, line: &str, now: Timestamp) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) if value.is_object() => {
                let level = value
                    .get("level")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_ascii_uppercase();
                self.bump_counters(&level);

                let message = value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                self.check_patterns(&message, line, now);
            }
            _ => {
                // Not a structured record; classify by level keyword and
                // match patterns against the whole line
                let upper = line.to_ascii_uppercase();
                let level = if upper.contains("ERROR") {
                    "ERROR"
                } else if upper.contains("WARNING") {
                    "WARNING"
                } else if upper.contains("CRITICAL") {
                    "CRITICAL"
                } else {
                    ""
                };
                self.bump_counters(level);
                self.check_patterns(line, line, now);
            }
        }
    }

    fn bump_counters(&self, level: &str) {
        let mut counters = self.counters.lock().expect("counters poisoned");
        counters.total += 1;
        match level {
            "ERROR" => counters.errors += 1,
            "WARNING" => counters.warnings += 1,
            "CRITICAL" => counters.criticals += 1,
            _ => {}
        }
    }

    /// Match `target` against every enabled pattern and advance each
    /// matching pattern's sliding window
    fn check_patterns(&self, target: &str, sample: &str, now: Timestamp) {
        let patterns = self.patterns.lock().expect("patterns poisoned");
        for pattern in patterns.iter().filter(|p| p.matches(target)) {
            let recent = {
                let mut windows = self.windows.lock().expect("windows poisoned");
                let queue = windows.entry(pattern.name().to_string()).or_default();
                let cutoff = now - pattern.time_window;
                while queue.front().is_some_and(|ts| *ts < cutoff) {
                    queue.pop_front();
                }
                queue.push_back(now);
                queue.len()
            };

            *self
                .match_totals
                .lock()
                .expect("match totals poisoned")
                .entry(pattern.name().to_string())
                .or_insert(0) += 1;

            if recent >= pattern.threshold {
                self.registry
                    .lock()
                    .expect("registry poisoned")
                    .create_or_merge_at(pattern, recent, sample, now);
            }
        }
    }

    /// Append a snapshot to the rolling history and return it
    fn take_snapshot(
        &self,
        now: Timestamp,
        memory_usage_mb: Option<f64>,
        cpu_usage_percent: Option<f64>,
    ) -> LogMetricsSnapshot {
        let counters = self.counters.lock().expect("counters poisoned");
        let mut history = self.history.lock().expect("history poisoned");

        let log_rate_per_minute = history
            .back()
            .map(|prev| {
                let minutes = (now - prev.timestamp).num_milliseconds() as f64 / 60_000.0;
                if minutes > 0.0 {
                    counters.total.saturating_sub(prev.total_logs) as f64 / minutes
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        let snapshot = LogMetricsSnapshot {
            timestamp: now,
            total_logs: counters.total,
            error_count: counters.errors,
            warning_count: counters.warnings,
            critical_count: counters.criticals,
            log_rate_per_minute,
            memory_usage_mb,
            cpu_usage_percent,
        };

        history.push_back(snapshot.clone());
        while history.len() > METRICS_HISTORY_CAP {
            history.pop_front();
        }
        snapshot
    }
}

/// Real-time pattern monitor over an append-only log source
pub struct LogMonitor {
    state: Arc<MonitorState>,
    handles: Vec<JoinHandle<()>>,
    metrics_interval: Duration,
}

impl LogMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a monitor whose registry invokes `callback` once per newly
    /// created alert
    pub fn with_callback(config: MonitorConfig, callback: AlertCallback) -> Self {
        Self::build(config, Some(callback))
    }

    fn build(config: MonitorConfig, callback: Option<AlertCallback>) -> Self {
        let mut registry = AlertRegistry::new(config.merge_window_secs);
        if let Some(callback) = callback {
            registry = registry.with_callback(callback);
        }

        Self {
            state: Arc::new(MonitorState {
                patterns: Mutex::new(Vec::new()),
                windows: Mutex::new(HashMap::new()),
                match_totals: Mutex::new(HashMap::new()),
                counters: Mutex::new(Counters::default()),
                history: Mutex::new(VecDeque::new()),
                registry: Mutex::new(registry),
                running: Mutex::new(false),
            }),
            handles: Vec::new(),
            metrics_interval: Duration::from_secs(config.metrics_interval_secs.max(1)),
        }
    }

    /// Register a pattern, replacing any existing pattern of the same name
    pub fn register_pattern(&self, pattern: LogPattern) {
        let mut patterns = self.state.patterns.lock().expect("patterns poisoned");
        patterns.retain(|p| p.name() != pattern.name());
        info!("Registered log pattern: {}", pattern.name());
        patterns.push(pattern);
    }

    /// Remove a pattern and its window state; `false` if unknown
    pub fn remove_pattern(&self, name: &str) -> bool {
        let mut patterns = self.state.patterns.lock().expect("patterns poisoned");
        let before = patterns.len();
        patterns.retain(|p| p.name() != name);
        let removed = patterns.len() < before;
        drop(patterns);

        if removed {
            self.state
                .windows
                .lock()
                .expect("windows poisoned")
                .remove(name);
            info!("Removed log pattern: {}", name);
        }
        removed
    }

    /// Enable or disable a registered pattern; `false` if unknown
    pub fn set_pattern_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut patterns = self.state.patterns.lock().expect("patterns poisoned");
        match patterns.iter_mut().find(|p| p.name() == name) {
            Some(pattern) => {
                pattern.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Feed one line directly into the monitor, bypassing the tail worker
    ///
    /// Used for sources that are already in memory and by replay tooling.
    pub fn ingest_line(&self, line: &str) {
        self.state.process_line(line, Utc::now());
    }

    /// [`ingest_line`] with an explicit event time
    ///
    /// [`ingest_line`]: LogMonitor::ingest_line
    pub fn ingest_line_at(&self, line: &str, now: Timestamp) {
        self.state.process_line(line, now);
    }

    /// Start tailing `path` from its current end
    ///
    /// Spawns the tail worker and the metrics worker. Failures to open or
    /// read the source after startup terminate the tail worker only; the
    /// metrics worker and the rest of the process are unaffected.
    ///
    /// # Arguments
    ///
    /// * `path` - The append-only log file to tail
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SourceNotFound` if `path` does not exist and
    /// `MonitorError::AlreadyRunning` if the monitor was already started.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), MonitorError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(MonitorError::SourceNotFound(path.display().to_string()));
        }

        {
            let mut running = self.state.running.lock().expect("running flag poisoned");
            if *running {
                return Err(MonitorError::AlreadyRunning);
            }
            *running = true;
        }

        let tail_state = Arc::clone(&self.state);
        let tail_path = path.clone();
        self.handles.push(thread::spawn(move || {
            Self::tail_worker(tail_state, tail_path);
        }));

        let metrics_state = Arc::clone(&self.state);
        let interval = self.metrics_interval;
        self.handles.push(thread::spawn(move || {
            Self::metrics_worker(metrics_state, interval);
        }));

        info!("Log monitoring started on {}", path.display());
        Ok(())
    }

    /// Signal both workers to stop and join them
    ///
    /// Stopping a monitor that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::JoinFailed` if a worker thread panicked.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        {
            let mut running = self.state.running.lock().expect("running flag poisoned");
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        for handle in self.handles.drain(..) {
            handle
                .join()
                .map_err(|_| MonitorError::JoinFailed("monitor worker panicked".to_string()))?;
        }
        info!("Log monitoring stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock_running()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.state
            .registry
            .lock()
            .expect("registry poisoned")
            .active_alerts()
    }

    pub fn acknowledge(&self, id: &str) -> bool {
        self.state
            .registry
            .lock()
            .expect("registry poisoned")
            .acknowledge(id)
    }

    pub fn resolve(&self, id: &str) -> bool {
        self.state
            .registry
            .lock()
            .expect("registry poisoned")
            .resolve(id)
    }

    /// Take an immediate snapshot outside the periodic schedule
    pub fn snapshot_now(&self) -> LogMetricsSnapshot {
        self.state.take_snapshot(Utc::now(), None, None)
    }

    pub fn metrics_history(&self) -> Vec<LogMetricsSnapshot> {
        self.state
            .history
            .lock()
            .expect("history poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Latest snapshot enriched with alert and per-pattern match counts
    pub fn metrics_summary(&self) -> Option<MetricsSummary> {
        let latest = self
            .state
            .history
            .lock()
            .expect("history poisoned")
            .back()
            .cloned()?;

        Some(MetricsSummary {
            timestamp: latest.timestamp,
            total_logs: latest.total_logs,
            error_count: latest.error_count,
            warning_count: latest.warning_count,
            critical_count: latest.critical_count,
            log_rate_per_minute: latest.log_rate_per_minute,
            memory_usage_mb: latest.memory_usage_mb,
            cpu_usage_percent: latest.cpu_usage_percent,
            active_alerts: self.active_alerts().len(),
            pattern_matches: self
                .state
                .match_totals
                .lock()
                .expect("match totals poisoned")
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
        })
    }

    /// Tail worker: read new lines from the current end of the file,
    /// backing off briefly at end-of-file
    fn tail_worker(state: Arc<MonitorState>, path: PathBuf) {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                error!(
                    "Failed to open monitored source {}: {}",
                    path.display(),
                    e
                );
                return;
            }
        };

        let mut reader = BufReader::new(file);
        if let Err(e) = reader.seek(SeekFrom::End(0)) {
            error!("Failed to seek monitored source {}: {}", path.display(), e);
            return;
        }
        debug!("Tail worker started on {}", path.display());

        let mut line = String::new();
        while state.lock_running() {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => thread::sleep(POLL_INTERVAL),
                Ok(_) => state.process_line(&line, Utc::now()),
                Err(e) => {
                    // Terminal for this worker only
                    error!("Error reading monitored source {}: {}", path.display(), e);
                    break;
                }
            }
        }
        debug!("Tail worker finished for {}", path.display());
    }

    /// Metrics worker: snapshot counters every interval, sleeping in
    /// short slices so the stop signal is observed promptly
    fn metrics_worker(state: Arc<MonitorState>, interval: Duration) {
        let mut system = sysinfo::System::new();
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            warn!("Could not determine own pid; process metrics disabled");
        }

        loop {
            let mut remaining = interval;
            while remaining > Duration::ZERO && state.lock_running() {
                let slice = remaining.min(STOP_CHECK_INTERVAL);
                thread::sleep(slice);
                remaining = remaining.saturating_sub(slice);
            }
            if !state.lock_running() {
                break;
            }

            let (memory_usage_mb, cpu_usage_percent) = match pid {
                Some(pid) if system.refresh_process(pid) => match system.process(pid) {
                    Some(process) => (
                        Some(process.memory() as f64 / (1024.0 * 1024.0)),
                        Some(process.cpu_usage() as f64),
                    ),
                    None => (None, None),
                },
                _ => (None, None),
            };

            let snapshot = state.take_snapshot(Utc::now(), memory_usage_mb, cpu_usage_percent);
            debug!(
                "Metrics snapshot: {} logs, {:.1}/min",
                snapshot.total_logs, snapshot.log_rate_per_minute
            );
        }
        debug!("Metrics worker finished");
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
