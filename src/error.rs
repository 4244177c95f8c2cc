use thiserror::Error;

/// Errors that can occur during configuration loading and pipeline init
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Unknown log level: {0}")]
    UnknownLevel(String),

    #[error("Unknown log format: {0}")]
    UnknownFormat(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Sink error: {0}")]
    SinkError(#[from] SinkError),
}

/// Errors that can occur inside a log sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to open log file {path}: {source}")]
    OpenFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur in the live log monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid pattern '{name}': {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("Log source does not exist: {0}")]
    SourceNotFound(String),

    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Failed to join monitor thread: {0}")]
    JoinFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during batch log analysis
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Log file does not exist: {0}")]
    SourceNotFound(String),

    #[error("Failed to read log file: {0}")]
    ReadFailed(#[from] std::io::Error),
}
