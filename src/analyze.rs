//! Offline batch analysis of log files
//!
//! Reads a complete log file in one forward pass and aggregates level
//! counts, distinct error messages and an hourly volume distribution.
//! Lines that are not valid JSON still count and are classified by level
//! keyword, so a partially corrupted file never aborts the scan.

use crate::error::AnalyzeError;
use crate::record::Timestamp;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

/// How many ranked error messages to report, most frequent first
const TOP_ERRORS: usize = 10;

/// Aggregated statistics over one log file
#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    /// Every physical line in the file, parsable or not
    pub total_lines: u64,
    /// Lines that were not valid JSON objects
    pub malformed_lines: u64,
    pub level_counts: BTreeMap<String, u64>,
    pub error_count: u64,
    pub warning_count: u64,
    pub critical_count: u64,
    /// ERROR and CRITICAL lines as a percentage of the total
    pub error_rate: f64,
    /// Count of distinct error messages seen
    pub unique_errors: u64,
    /// Most frequent error messages with their occurrence counts
    pub top_errors: Vec<(String, u64)>,
    /// Line counts keyed by hour, formatted `YYYY-MM-DD HH:00`
    pub hourly_distribution: BTreeMap<String, u64>,
    pub elapsed_ms: u64,
}

/// Analyze `path`, keeping entries within the optional inclusive range
///
/// Entries without a parsable timestamp are never filtered out; the
/// range only applies where a timestamp is available.
pub fn analyze_file(
    path: impl AsRef<Path>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) -> Result<LogStats, AnalyzeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AnalyzeError::SourceNotFound(path.display().to_string()));
    }

    let started = Instant::now();

    let mut total_lines: u64 = 0;
    let mut malformed_lines: u64 = 0;
    let mut level_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut error_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut hourly_distribution: BTreeMap<String, u64> = BTreeMap::new();

    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        // Every physical line counts, even ones the filters exclude below
        total_lines += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parsed: Option<serde_json::Value> = match serde_json::from_str(trimmed) {
            Ok(value @ serde_json::Value::Object(_)) => Some(value),
            _ => None,
        };

        let timestamp = parsed.as_ref().and_then(|value| {
            value
                .get("timestamp")
                .and_then(|v| v.as_str())
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|dt| dt.with_timezone(&Utc))
        });
        // The range only excludes entries from the aggregation; lines
        // without a parsable timestamp are never filtered out
        if let Some(ts) = timestamp {
            if start.is_some_and(|s| ts < s) || end.is_some_and(|e| ts > e) {
                continue;
            }
        }

        let (level, error_message) = match &parsed {
            Some(value) => {
                let level = value
                    .get("level")
                    .and_then(|v| v.as_str())
                    .unwrap_or("UNKNOWN")
                    .to_ascii_uppercase();
                let message = value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<no message>")
                    .to_string();
                (Some(level), message)
            }
            None => {
                malformed_lines += 1;
                // Keyword classification keeps corrupted lines in the stats
                let upper = trimmed.to_ascii_uppercase();
                let level = if upper.contains("ERROR") {
                    Some("ERROR".to_string())
                } else if upper.contains("WARNING") {
                    Some("WARNING".to_string())
                } else if upper.contains("CRITICAL") {
                    Some("CRITICAL".to_string())
                } else {
                    None
                };
                (level, trimmed.to_string())
            }
        };

        if let Some(level) = level {
            *level_counts.entry(level.clone()).or_insert(0) += 1;
            if level == "ERROR" || level == "CRITICAL" {
                *error_counts.entry(error_message).or_insert(0) += 1;
            }
        }

        if let Some(ts) = timestamp {
            let hour_key = ts.format("%Y-%m-%d %H:00").to_string();
            *hourly_distribution.entry(hour_key).or_insert(0) += 1;
        }
    }

    let error_count = level_counts.get("ERROR").copied().unwrap_or(0);
    let warning_count = level_counts.get("WARNING").copied().unwrap_or(0);
    let critical_count = level_counts.get("CRITICAL").copied().unwrap_or(0);
    let error_rate = if total_lines > 0 {
        (error_count + critical_count) as f64 / total_lines as f64 * 100.0
    } else {
        0.0
    };

    let unique_errors = error_counts.len() as u64;
    // Most frequent first; ties break alphabetically for stable output
    let mut top_errors: Vec<(String, u64)> = error_counts.into_iter().collect();
    top_errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_errors.truncate(TOP_ERRORS);

    let elapsed_ms = started.elapsed().as_millis() as u64;
    debug!(
        "Analyzed {}: {} lines in {} ms",
        path.display(),
        total_lines,
        elapsed_ms
    );

    Ok(LogStats {
        total_lines,
        malformed_lines,
        level_counts,
        error_count,
        warning_count,
        critical_count,
        error_rate,
        unique_errors,
        top_errors,
        hourly_distribution,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::io::Write;
    use tempfile::tempdir;

    fn entry(ts: Timestamp, level: &str, message: &str) -> String {
        serde_json::json!({
            "timestamp": ts.to_rfc3339(),
            "level": level,
            "logger": "app",
            "message": message,
            "category": "application",
        })
        .to_string()
    }

    fn write_log(lines: &[String]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        (dir, path)
    }

    #[test]
    fn test_three_line_fixture() {
        let now = Utc::now();
        let lines = vec![
            entry(now, "INFO", "ok"),
            entry(now, "ERROR", "db down"),
            entry(now, "WARNING", "slow"),
        ];
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, None, None).unwrap();
        assert_eq!(stats.total_lines, 3);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.warning_count, 1);
        assert_eq!(stats.critical_count, 0);
    }

    #[test]
    fn test_counts_errors_and_rate() {
        let now = Utc::now();
        let lines = vec![
            entry(now, "INFO", "ok"),
            entry(now, "ERROR", "db down"),
            entry(now, "ERROR", "db down"),
            entry(now, "CRITICAL", "oom"),
        ];
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, None, None).unwrap();
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.error_count, 2);
        assert_eq!(stats.critical_count, 1);
        assert!((stats.error_rate - 75.0).abs() < f64::EPSILON);
        assert_eq!(stats.unique_errors, 2);
        assert_eq!(stats.top_errors[0], ("db down".to_string(), 2));
    }

    #[test]
    fn test_time_range_filters_aggregation_not_totals() {
        let now = Utc::now();
        let lines = vec![
            entry(now - Duration::hours(30), "ERROR", "ancient"),
            entry(now - Duration::hours(24), "INFO", "boundary"),
            entry(now - Duration::hours(2), "INFO", "recent"),
        ];
        let (_dir, path) = write_log(&lines);

        // Out-of-range lines still count as lines; only the per-level and
        // error aggregation excludes them. The range is inclusive.
        let stats = analyze_file(&path, Some(now - Duration::hours(24)), None).unwrap();
        assert_eq!(stats.total_lines, 3);
        assert_eq!(stats.level_counts["INFO"], 2);
        assert_eq!(stats.error_count, 0);
        assert!(stats.top_errors.is_empty());

        let bounded = analyze_file(
            &path,
            Some(now - Duration::hours(24)),
            Some(now - Duration::hours(3)),
        )
        .unwrap();
        assert_eq!(bounded.total_lines, 3);
        assert_eq!(bounded.level_counts["INFO"], 1);
    }

    #[test]
    fn test_malformed_lines_counted_and_classified() {
        let now = Utc::now();
        let lines = vec![
            "2026-01-01 ERROR raw text failure".to_string(),
            "plain chatter".to_string(),
            "[1, 2, 3]".to_string(),
            entry(now, "INFO", "fine"),
        ];
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, None, None).unwrap();
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.malformed_lines, 3);
        assert_eq!(stats.level_counts["ERROR"], 1);
        assert_eq!(stats.level_counts["INFO"], 1);
    }

    #[test]
    fn test_missing_timestamp_never_filtered() {
        let now = Utc::now();
        let lines = vec![
            "ERROR text line without a timestamp".to_string(),
            entry(now - Duration::hours(30), "INFO", "old"),
        ];
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, Some(now - Duration::hours(1)), None).unwrap();
        // The text line survives the filter, the dated entry is excluded
        // from the aggregation only
        assert_eq!(stats.total_lines, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.level_counts.get("INFO"), None);
    }

    #[test]
    fn test_blank_lines_count_toward_total() {
        let now = Utc::now();
        let lines = vec![
            entry(now, "INFO", "a"),
            String::new(),
            "   ".to_string(),
            entry(now, "ERROR", "b"),
        ];
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, None, None).unwrap();
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.malformed_lines, 0);
        assert_eq!(stats.level_counts["INFO"], 1);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_top_errors_ordering_and_limit() {
        let now = Utc::now();
        let mut lines = Vec::new();
        for i in 0..15 {
            // message i occurs i+1 times
            for _ in 0..=i {
                lines.push(entry(now, "ERROR", &format!("error {:02}", i)));
            }
        }
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, None, None).unwrap();
        assert_eq!(stats.unique_errors, 15);
        assert_eq!(stats.top_errors.len(), TOP_ERRORS);
        assert_eq!(stats.top_errors[0], ("error 14".to_string(), 15));
        for pair in stats.top_errors.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_hourly_distribution_keys() {
        let now = Utc::now();
        let lines = vec![
            entry(now, "INFO", "a"),
            entry(now, "INFO", "b"),
            entry(now - Duration::hours(1), "INFO", "c"),
        ];
        let (_dir, path) = write_log(&lines);

        let stats = analyze_file(&path, None, None).unwrap();
        let this_hour = now.format("%Y-%m-%d %H:00").to_string();
        assert_eq!(stats.hourly_distribution[&this_hour], 2);
        assert_eq!(stats.hourly_distribution.values().sum::<u64>(), 3);
    }

    #[test]
    fn test_empty_file_yields_zero_stats() {
        let (_dir, path) = write_log(&[]);
        let stats = analyze_file(&path, None, None).unwrap();
        assert_eq!(stats.total_lines, 0);
        assert_eq!(stats.error_rate, 0.0);
        assert!(stats.top_errors.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = analyze_file("/nonexistent/app.log", None, None);
        assert!(matches!(result, Err(AnalyzeError::SourceNotFound(_))));
    }
}
