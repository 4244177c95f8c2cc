//! Logger registry and the ingestion API
//!
//! The pipeline is process-wide state with an explicit lifecycle:
//! [`init`] builds the configured sinks, [`shutdown`] drains and joins
//! them. Named [`Logger`] handles come from a mutex-guarded registry, so
//! asking twice for the same name yields the same handle. `log` calls
//! never return an error to the caller; delivery failures fall back to
//! stderr.

use crate::context;
use crate::error::ConfigError;
use crate::format::{self, LogFormat};
use crate::record::{
    ErrorDetails, LogCategory, LogLevel, LogRecord, PerformanceMetrics, Timestamp,
};
use crate::sink::{AsyncSink, ConsoleSink, RotatingFileSink, Sink, DEFAULT_QUEUE_CAPACITY};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Instant;

/// File output settings
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub path: std::path::PathBuf,
    /// Rotate once the file exceeds this many bytes; 0 disables rotation
    pub max_size: u64,
    pub backup_count: usize,
}

/// Pipeline configuration, supplied once at process start
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Records below this level are dropped at the call site
    pub level: LogLevel,
    pub format: LogFormat,
    /// Optional rotating file output alongside the console
    pub file: Option<FileConfig>,
    /// Deliver through a background worker instead of blocking the caller
    pub async_delivery: bool,
    pub queue_capacity: usize,
    /// ANSI colors for human-readable output
    pub colorize: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Structured,
            file: None,
            async_delivery: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            colorize: true,
        }
    }
}

impl LogConfig {
    /// Parse level and format selectors, failing fast on unknown values
    pub fn from_selectors(level: &str, format: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            level: LogLevel::from_str(level)?,
            format: LogFormat::from_str(format)?,
            ..Self::default()
        })
    }
}

/// One configured output: either written inline or queued to a worker
enum Output {
    Direct(Mutex<Box<dyn Sink>>),
    Queued(AsyncSink),
}

impl Output {
    fn emit(&self, line: String) {
        match self {
            Output::Direct(sink) => {
                let mut guard = match sink.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Err(e) = guard.write_line(&line) {
                    eprintln!("lantern: failed to write log line: {}", e);
                }
            }
            Output::Queued(sink) => sink.emit(line),
        }
    }
}

struct Pipeline {
    config: LogConfig,
    outputs: Vec<Output>,
}

impl Pipeline {
    fn build(config: LogConfig) -> Result<Self, ConfigError> {
        let mut outputs = Vec::new();

        let console: Box<dyn Sink> = Box::new(ConsoleSink::new());
        outputs.push(Self::wrap(console, &config));

        if let Some(file) = &config.file {
            let sink = RotatingFileSink::new(&file.path, file.max_size, file.backup_count)?;
            outputs.push(Self::wrap(Box::new(sink), &config));
        }

        Ok(Self { config, outputs })
    }

    fn wrap(sink: Box<dyn Sink>, config: &LogConfig) -> Output {
        if config.async_delivery {
            Output::Queued(AsyncSink::new(sink, config.queue_capacity))
        } else {
            Output::Direct(Mutex::new(sink))
        }
    }

    fn dispatch(&self, record: &LogRecord) {
        let ctx = context::current();
        let line = match self.config.format {
            LogFormat::Structured => format::render_structured(record, ctx.as_ref()),
            LogFormat::Human => format::render_human(record, ctx.as_ref(), self.config.colorize),
        };
        for output in &self.outputs {
            output.emit(line.clone());
        }
    }
}

static PIPELINE: RwLock<Option<Pipeline>> = RwLock::new(None);

fn registry() -> &'static Mutex<HashMap<String, Logger>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Logger>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Initialize the pipeline, replacing any previous configuration
///
/// A previously running pipeline is drained first so reconfiguration never
/// loses queued lines.
pub fn init(config: LogConfig) -> Result<(), ConfigError> {
    let pipeline = Pipeline::build(config)?;
    let previous = {
        let mut guard = PIPELINE.write().expect("pipeline lock poisoned");
        guard.replace(pipeline)
    };
    // Dropping the old pipeline joins its sink workers
    drop(previous);
    Ok(())
}

/// Drain every sink and tear the pipeline down
pub fn shutdown() {
    let previous = {
        let mut guard = PIPELINE.write().expect("pipeline lock poisoned");
        guard.take()
    };
    drop(previous);
}

pub fn is_initialized() -> bool {
    PIPELINE.read().expect("pipeline lock poisoned").is_some()
}

/// Get the logger registered under `name`, creating it on first use
pub fn logger(name: &str) -> Logger {
    let mut registry = registry().lock().expect("registry lock poisoned");
    registry
        .entry(name.to_string())
        .or_insert_with(|| Logger {
            name: Arc::from(name),
        })
        .clone()
}

/// Cheap, cloneable handle for emitting records under a fixed name
#[derive(Debug, Clone)]
pub struct Logger {
    name: Arc<str>,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit a record built by the caller
    ///
    /// Records below the configured threshold are dropped. Before `init`
    /// (or after `shutdown`) records go to stderr so nothing is silently
    /// lost during startup and teardown.
    pub fn emit(&self, record: LogRecord) {
        let guard = PIPELINE.read().expect("pipeline lock poisoned");
        match guard.as_ref() {
            Some(pipeline) => {
                if record.level >= pipeline.config.level {
                    pipeline.dispatch(&record);
                }
            }
            None => {
                let ctx = context::current();
                eprintln!("{}", format::render_human(&record, ctx.as_ref(), false));
            }
        }
    }

    /// Start a record for this logger at the given level
    pub fn record(&self, level: LogLevel, message: impl Into<String>) -> LogRecord {
        LogRecord::new(level, self.name.as_ref(), message)
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(self.record(level, message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }

    /// Record an operator-auditable action on a resource
    pub fn audit(&self, action: &str, resource: &str, user_id: Option<&str>) {
        let mut business = BTreeMap::new();
        business.insert("audit_action".to_string(), serde_json::json!(action));
        business.insert("audit_resource".to_string(), serde_json::json!(resource));
        business.insert(
            "audit_timestamp".to_string(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );

        let mut record = self
            .record(LogLevel::Info, format!("Audit: {} on {}", action, resource))
            .with_category(LogCategory::Audit)
            .with_business_context(business);
        if let Some(user) = user_id {
            record = record.with_extra("user_id", serde_json::json!(user));
        }
        self.emit(record);
    }

    /// Record a security-relevant event
    pub fn security(&self, event: &str, severity: LogLevel, ip_address: Option<&str>) {
        let mut business = BTreeMap::new();
        business.insert("security_event".to_string(), serde_json::json!(event));
        business.insert(
            "security_timestamp".to_string(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );
        if let Some(ip) = ip_address {
            business.insert("ip_address".to_string(), serde_json::json!(ip));
        }

        self.emit(
            self.record(severity, format!("Security: {}", event))
                .with_category(LogCategory::Security)
                .with_business_context(business),
        );
    }

    /// Record a business event with free-form context
    pub fn business(&self, event: &str, context: BTreeMap<String, serde_json::Value>) {
        let mut business = context;
        business.insert("business_event".to_string(), serde_json::json!(event));

        self.emit(
            self.record(LogLevel::Info, format!("Business: {}", event))
                .with_category(LogCategory::Business)
                .with_business_context(business),
        );
    }
}

/// Scoped timer emitting a metrics-tagged record when it goes out of scope
///
/// On the success path the record is INFO/performance; after [`fail`] it
/// becomes ERROR/error with the captured details attached. This replaces
/// decorator-style performance wrapping with an explicit scoped resource.
///
/// [`fail`]: OperationTimer::fail
pub struct OperationTimer {
    logger: Logger,
    operation: String,
    start: Instant,
    started_at: Timestamp,
    failure: Option<ErrorDetails>,
}

impl OperationTimer {
    pub fn start(logger: &Logger, operation: impl Into<String>) -> Self {
        Self {
            logger: logger.clone(),
            operation: operation.into(),
            start: Instant::now(),
            started_at: Utc::now(),
            failure: None,
        }
    }

    /// Mark the operation as failed; the drop record switches to ERROR
    pub fn fail(&mut self, details: ErrorDetails) {
        self.failure = Some(details);
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let metrics = PerformanceMetrics {
            duration_ms: self.elapsed_ms(),
            ..Default::default()
        };

        let record = match self.failure.take() {
            None => self
                .logger
                .record(
                    LogLevel::Info,
                    format!("Operation completed: {}", self.operation),
                )
                .with_category(LogCategory::Performance),
            Some(details) => self
                .logger
                .record(
                    LogLevel::Error,
                    format!("Operation failed: {}", self.operation),
                )
                .with_category(LogCategory::Error)
                .with_error_details(details),
        };

        self.logger.emit(
            record
                .with_metrics(metrics)
                .with_extra("operation", serde_json::json!(self.operation))
                .with_extra(
                    "started_at",
                    serde_json::json!(self.started_at.to_rfc3339()),
                ),
        );
    }
}

/// Run a fallible operation under a scoped timer
///
/// The emitted record reflects the `Result`: `Err` produces the failure
/// record with the error rendered into the details.
pub fn timed<T, E: std::fmt::Display>(
    logger: &Logger,
    operation: &str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    let mut timer = OperationTimer::start(logger, operation);
    let result = f();
    if let Err(e) = &result {
        timer.fail(ErrorDetails {
            kind: "OperationError".to_string(),
            message: e.to_string(),
            stack_trace: None,
        });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Read;
    use tempfile::tempdir;

    // Pipeline state is process-wide; serialize tests that touch it
    fn pipeline_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        let mut content = String::new();
        File::open(path).unwrap().read_to_string(&mut content).unwrap();
        content.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_registry_returns_same_handle() {
        let a = logger("app.db");
        let b = logger("app.db");
        assert!(Arc::ptr_eq(&a.name, &b.name));
        assert_eq!(a.name(), "app.db");
    }

    #[test]
    fn test_config_selectors_fail_fast() {
        assert!(LogConfig::from_selectors("info", "structured").is_ok());
        assert!(matches!(
            LogConfig::from_selectors("loud", "structured"),
            Err(ConfigError::UnknownLevel(_))
        ));
        assert!(matches!(
            LogConfig::from_selectors("info", "yaml"),
            Err(ConfigError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_records_reach_file_sink() {
        let _serial = pipeline_lock().lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");

        init(LogConfig {
            file: Some(FileConfig {
                path: path.clone(),
                max_size: 0,
                backup_count: 1,
            }),
            ..LogConfig::default()
        })
        .unwrap();

        let log = logger("test.file");
        log.info("first event");
        log.error("second event");
        shutdown();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["message"], "first event");
        assert_eq!(first["logger"], "test.file");
    }

    #[test]
    fn test_level_threshold_filters() {
        let _serial = pipeline_lock().lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");

        init(LogConfig {
            level: LogLevel::Warning,
            file: Some(FileConfig {
                path: path.clone(),
                max_size: 0,
                backup_count: 1,
            }),
            ..LogConfig::default()
        })
        .unwrap();

        let log = logger("test.threshold");
        log.debug("dropped");
        log.info("dropped too");
        log.warning("kept");
        shutdown();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("kept"));
    }

    #[test]
    fn test_bound_context_lands_in_output() {
        let _serial = pipeline_lock().lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");

        init(LogConfig {
            file: Some(FileConfig {
                path: path.clone(),
                max_size: 0,
                backup_count: 1,
            }),
            ..LogConfig::default()
        })
        .unwrap();

        let log = logger("test.ctx");
        let ctx = crate::context::TraceContext::new().with_operation("ingest");
        let trace_id = ctx.trace_id.clone();
        {
            let _guard = crate::context::bind(ctx);
            log.info("inside");
        }
        log.info("outside");
        shutdown();

        let lines = read_lines(&path);
        let inside: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let outside: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(inside["trace_id"], trace_id.as_str());
        assert_eq!(inside["operation"], "ingest");
        assert!(outside["trace_id"].is_null());
    }

    #[test]
    fn test_nested_scopes_keep_outer_trace_id() {
        let _serial = pipeline_lock().lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");

        init(LogConfig {
            file: Some(FileConfig {
                path: path.clone(),
                max_size: 0,
                backup_count: 1,
            }),
            ..LogConfig::default()
        })
        .unwrap();

        let log = logger("test.nested");
        let outer = crate::context::TraceContext::new();
        let outer_trace = outer.trace_id.clone();
        {
            let _outer_guard = crate::context::bind(outer);
            log.info("outer record");
            {
                let child = crate::context::current().unwrap().child();
                let _inner_guard = crate::context::bind(child);
                log.info("inner record");
            }
        }
        shutdown();

        let lines = read_lines(&path);
        let outer_rec: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let inner_rec: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(outer_rec["trace_id"], outer_trace.as_str());
        assert_eq!(inner_rec["trace_id"], outer_trace.as_str());
        assert_ne!(outer_rec["span_id"], inner_rec["span_id"]);
    }

    #[test]
    fn test_operation_timer_success_and_failure() {
        let _serial = pipeline_lock().lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");

        init(LogConfig {
            file: Some(FileConfig {
                path: path.clone(),
                max_size: 0,
                backup_count: 1,
            }),
            ..LogConfig::default()
        })
        .unwrap();

        let log = logger("test.timer");
        {
            let _timer = OperationTimer::start(&log, "fetch_rows");
        }
        let result: Result<(), String> =
            timed(&log, "flaky_call", || Err("it broke".to_string()));
        assert!(result.is_err());
        shutdown();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        let ok: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let err: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(ok["level"], "INFO");
        assert_eq!(ok["category"], "performance");
        assert!(ok["metrics"]["duration_ms"].is_number());
        assert_eq!(err["level"], "ERROR");
        assert_eq!(err["error_details"]["message"], "it broke");
    }

    #[test]
    fn test_audit_and_security_helpers() {
        let _serial = pipeline_lock().lock().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");

        init(LogConfig {
            file: Some(FileConfig {
                path: path.clone(),
                max_size: 0,
                backup_count: 1,
            }),
            ..LogConfig::default()
        })
        .unwrap();

        let log = logger("test.helpers");
        log.audit("delete", "dataset/7", Some("u-1"));
        log.security("login_failed", LogLevel::Warning, Some("10.0.0.9"));
        shutdown();

        let lines = read_lines(&path);
        let audit: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let security: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(audit["category"], "audit");
        assert_eq!(audit["business_context"]["audit_action"], "delete");
        assert_eq!(security["category"], "security");
        assert_eq!(security["level"], "WARNING");
        assert_eq!(security["business_context"]["ip_address"], "10.0.0.9");
    }
}
