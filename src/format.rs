//! Record formatters
//!
//! Rendering is a pure function of the record and the context handed in by
//! the caller; formatters perform no I/O and keep no state. Structured mode
//! produces one self-contained JSON object per record, human mode a single
//! colorized line.

use crate::context::TraceContext;
use crate::error::ConfigError;
use crate::record::{LogLevel, LogRecord};
use std::str::FromStr;

/// Output representation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per record, newline-delimited
    Structured,
    /// Single human-readable line, colorized by level
    Human,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(LogFormat::Structured),
            "human" | "human-readable" | "text" => Ok(LogFormat::Human),
            other => Err(ConfigError::UnknownFormat(other.to_string())),
        }
    }
}

const RESET: &str = "\x1b[0m";

fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "\x1b[36m",    // cyan
        LogLevel::Info => "\x1b[32m",     // green
        LogLevel::Warning => "\x1b[33m",  // yellow
        LogLevel::Error => "\x1b[31m",    // red
        LogLevel::Critical => "\x1b[31;47m", // red on white
    }
}

/// Render a record in the given format with an optionally bound context
pub fn render(record: &LogRecord, context: Option<&TraceContext>, format: LogFormat) -> String {
    match format {
        LogFormat::Structured => render_structured(record, context),
        LogFormat::Human => render_human(record, context, true),
    }
}

/// Render a record as a self-contained JSON object
///
/// All record fields are flattened to the top level; context fields are
/// merged in only when a context is bound. Payloads (metrics, error
/// details, business context) keep their own keys.
pub fn render_structured(record: &LogRecord, context: Option<&TraceContext>) -> String {
    // LogRecord serializes to a JSON object by construction
    let mut value = serde_json::to_value(record).unwrap_or_else(|_| serde_json::json!({}));

    if let (Some(obj), Some(ctx)) = (value.as_object_mut(), context) {
        if let Ok(serde_json::Value::Object(ctx_fields)) = serde_json::to_value(ctx) {
            for (key, field) in ctx_fields {
                // Record fields win over context fields of the same name
                obj.entry(key).or_insert(field);
            }
        }
    }

    value.to_string()
}

/// Render a record as `[timestamp] LEVEL(8) logger(20) message`
///
/// When a context is bound, an abbreviated trace id is appended so that a
/// human tailing the stream can still correlate lines.
pub fn render_human(record: &LogRecord, context: Option<&TraceContext>, colorize: bool) -> String {
    let timestamp = record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
    let mut line = if colorize {
        format!(
            "{}[{}] {:8} {:20} {}{}",
            level_color(record.level),
            timestamp,
            record.level.as_str(),
            record.logger,
            record.message,
            RESET,
        )
    } else {
        format!(
            "[{}] {:8} {:20} {}",
            timestamp,
            record.level.as_str(),
            record.logger,
            record.message,
        )
    };

    if let Some(ctx) = context {
        // Trace ids are caller-supplied; take characters, not bytes
        let short: String = ctx.trace_id.chars().take(8).collect();
        line.push_str(&format!(" [trace:{}]", short));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LogCategory, PerformanceMetrics};

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Structured);
        assert_eq!(
            "structured".parse::<LogFormat>().unwrap(),
            LogFormat::Structured
        );
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_structured_contains_all_fields() {
        let record = LogRecord::new(LogLevel::Warning, "app.api", "slow response")
            .with_category(LogCategory::Performance)
            .with_metrics(PerformanceMetrics {
                duration_ms: 1532.0,
                ..Default::default()
            });

        let line = render_structured(&record, None);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "WARNING");
        assert_eq!(value["logger"], "app.api");
        assert_eq!(value["message"], "slow response");
        assert_eq!(value["category"], "performance");
        assert_eq!(value["metrics"]["duration_ms"], 1532.0);
        assert!(value["trace_id"].is_null());
    }

    #[test]
    fn test_structured_merges_context() {
        let record = LogRecord::new(LogLevel::Info, "app", "hello");
        let ctx = TraceContext::new().with_user_id("u-42");

        let line = render_structured(&record, Some(&ctx));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["trace_id"], ctx.trace_id.as_str());
        assert_eq!(value["span_id"], ctx.span_id.as_str());
        assert_eq!(value["user_id"], "u-42");
    }

    #[test]
    fn test_structured_record_fields_win() {
        // A record carrying a field with the same name as a context field
        // keeps its own value
        let record = LogRecord::new(LogLevel::Info, "app", "hello")
            .with_extra("message_id", serde_json::json!("m-1"));
        let ctx = TraceContext::new();

        let line = render_structured(&record, Some(&ctx));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["message"], "hello");
    }

    #[test]
    fn test_structured_round_trip() {
        let record = LogRecord::new(LogLevel::Error, "app.db", "query failed")
            .with_category(LogCategory::Database);
        let line = render_structured(&record, None);
        let parsed: LogRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.level, LogLevel::Error);
        assert_eq!(parsed.message, "query failed");
        assert_eq!(parsed.category, LogCategory::Database);
    }

    #[test]
    fn test_human_line_layout() {
        let record = LogRecord::new(LogLevel::Error, "app.db", "boom");
        let line = render_human(&record, None, false);
        assert!(line.starts_with('['));
        assert!(line.contains("ERROR"));
        assert!(line.contains("app.db"));
        assert!(line.ends_with("boom"));
        assert!(!line.contains("\x1b["));
    }

    #[test]
    fn test_human_colorized() {
        let record = LogRecord::new(LogLevel::Critical, "app", "down");
        let line = render_human(&record, None, true);
        assert!(line.starts_with("\x1b[31;47m"));
        assert!(line.ends_with(RESET));
    }

    #[test]
    fn test_human_trace_suffix() {
        let record = LogRecord::new(LogLevel::Info, "app", "hi");
        let ctx = TraceContext::new().with_trace_id("0123456789abcdef");
        let line = render_human(&record, Some(&ctx), false);
        assert!(line.ends_with("[trace:01234567]"));
    }

    #[test]
    fn test_human_trace_suffix_multibyte_id() {
        let record = LogRecord::new(LogLevel::Info, "app", "hi");
        let ctx = TraceContext::new().with_trace_id("日本語トレース識別子");
        let line = render_human(&record, Some(&ctx), false);
        assert!(line.ends_with("[trace:日本語トレース識別]"));

        let short_ctx = TraceContext::new().with_trace_id("短い");
        let short_line = render_human(&record, Some(&short_ctx), false);
        assert!(short_line.ends_with("[trace:短い]"));
    }

    #[test]
    fn test_rendering_is_pure() {
        let record = LogRecord::new(LogLevel::Info, "app", "hi");
        let ctx = TraceContext::new();
        let a = render_structured(&record, Some(&ctx));
        let b = render_structured(&record, Some(&ctx));
        assert_eq!(a, b);
    }
}
