//! Configuration loading
//!
//! Settings come from an optional TOML file with environment overrides
//! applied on top. A missing file falls back to defaults with a warning;
//! a file that exists but does not parse is an error, silently running
//! with defaults would mask a broken deployment.

use crate::error::ConfigError;
use crate::format::LogFormat;
use crate::logger::{FileConfig, LogConfig};
use crate::monitor::{LogPattern, MonitorConfig};
use crate::record::LogLevel;
use crate::sink::DEFAULT_QUEUE_CAPACITY;
use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variables recognized on top of the file settings
const ENV_LOG_LEVEL: &str = "LANTERN_LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "LANTERN_LOG_FORMAT";
const ENV_LOG_FILE: &str = "LANTERN_LOG_FILE";

/// Top-level configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogSection,
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    pub format: String,
    /// Optional log file; rotation applies only to this output
    pub file: Option<PathBuf>,
    pub max_size: u64,
    pub backup_count: usize,
    pub async_delivery: bool,
    pub queue_capacity: usize,
    pub colorize: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: "structured".to_string(),
            file: None,
            max_size: 10 * 1024 * 1024,
            backup_count: 5,
            async_delivery: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            colorize: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub metrics_interval_secs: u64,
    pub merge_window_secs: u64,
    /// Register the built-in operational pattern set
    pub default_patterns: bool,
    pub patterns: Vec<PatternSection>,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 60,
            merge_window_secs: 300,
            default_patterns: true,
            patterns: Vec::new(),
        }
    }
}

/// One user-defined alerting pattern
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternSection {
    pub name: String,
    pub pattern: String,
    pub severity: String,
    pub threshold: usize,
    pub window_minutes: i64,
    pub enabled: bool,
}

impl Default for PatternSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            pattern: String::new(),
            severity: "WARNING".to_string(),
            threshold: 1,
            window_minutes: 5,
            enabled: true,
        }
    }
}

impl Config {
    /// Parse a configuration file, failing on unreadable or invalid input
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional path with env overrides
    ///
    /// A missing file is tolerated with a warning; a present but broken
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            Some(path) => {
                warn!(
                    "Configuration file '{}' not found, using defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                info!("Using default configuration");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.log.level = level;
        }
        if let Ok(format) = std::env::var(ENV_LOG_FORMAT) {
            self.log.format = format;
        }
        if let Ok(file) = std::env::var(ENV_LOG_FILE) {
            self.log.file = Some(PathBuf::from(file));
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.log.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "log.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.log.file.is_some() && self.log.max_size > 0 && self.log.backup_count == 0 {
            return Err(ConfigError::ValidationError(
                "log.backup_count must be at least 1 when rotation is enabled".to_string(),
            ));
        }
        for pattern in &self.monitor.patterns {
            if pattern.name.is_empty() || pattern.pattern.is_empty() {
                return Err(ConfigError::ValidationError(
                    "monitor.patterns entries need a name and a pattern".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the `[log]` section into a pipeline configuration
    pub fn log_config(&self) -> Result<LogConfig, ConfigError> {
        Ok(LogConfig {
            level: LogLevel::from_str(&self.log.level)?,
            format: LogFormat::from_str(&self.log.format)?,
            file: self.log.file.as_ref().map(|path| FileConfig {
                path: path.clone(),
                max_size: self.log.max_size,
                backup_count: self.log.backup_count,
            }),
            async_delivery: self.log.async_delivery,
            queue_capacity: self.log.queue_capacity,
            colorize: self.log.colorize,
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            metrics_interval_secs: self.monitor.metrics_interval_secs,
            merge_window_secs: self.monitor.merge_window_secs,
        }
    }

    /// Compile the user-defined patterns from the `[monitor]` section
    pub fn monitor_patterns(&self) -> Result<Vec<LogPattern>, ConfigError> {
        self.monitor
            .patterns
            .iter()
            .map(|section| {
                let severity = LogLevel::from_str(&section.severity)?;
                let mut pattern = LogPattern::new(
                    &section.name,
                    &section.pattern,
                    severity,
                    section.threshold,
                    section.window_minutes,
                )
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
                pattern.set_enabled(section.enabled);
                Ok(pattern)
            })
            .collect()
    }
}
