use anyhow::Context;
use clap::Parser;
use lantern::config::Config;
use lantern::monitor::{default_patterns, Alert, LogMonitor};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::mpsc;

/// Command-line arguments for the lantern log pipeline
#[derive(Parser)]
#[command(
    name = "lantern",
    about = "Structured logging pipeline with real-time pattern alerting",
    long_about = "Tails a structured log file, matches events against configurable \
                  alerting patterns with sliding-window thresholds, and can run \
                  offline batch analysis over historical log files."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log file to monitor in real time
    #[arg(short, long, value_name = "FILE", help = "Tail and monitor this log file")]
    monitor: Option<PathBuf>,

    /// Log file to analyze offline
    #[arg(short, long, value_name = "FILE", help = "Analyze this log file and exit")]
    analyze: Option<PathBuf>,

    /// Analysis period in hours
    #[arg(
        long,
        default_value_t = 24,
        help = "How many hours of entries to include in analysis"
    )]
    hours: i64,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose diagnostic output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    fn validate(&self) -> Result<(), String> {
        if self.monitor.is_none() && self.analyze.is_none() {
            return Err("Nothing to do: pass --monitor <FILE> or --analyze <FILE>".to_string());
        }

        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults later; only reject paths
            // that exist but are not usable
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }
                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

fn run_analysis(path: &PathBuf, hours: i64) -> anyhow::Result<()> {
    let start = chrono::Utc::now() - chrono::Duration::hours(hours.max(1));
    let stats = lantern::analyze::analyze_file(path, Some(start), None)
        .with_context(|| format!("failed to analyze {}", path.display()))?;
    let rendered =
        serde_json::to_string_pretty(&stats).context("failed to render analysis output")?;
    println!("{}", rendered);
    Ok(())
}

fn run_monitor(config: &Config, path: &PathBuf) -> anyhow::Result<()> {
    let alert_log = lantern::logger("lantern.alerts");
    let callback = Box::new(move |alert: &Alert| {
        alert_log.log(alert.severity, alert.message.clone());
    });

    let mut monitor = LogMonitor::with_callback(config.monitor_config(), callback);
    if config.monitor.default_patterns {
        for pattern in default_patterns() {
            monitor.register_pattern(pattern);
        }
    }
    let patterns = config
        .monitor_patterns()
        .context("invalid monitor pattern in configuration")?;
    for pattern in patterns {
        monitor.register_pattern(pattern);
    }

    monitor
        .start(path)
        .with_context(|| format!("failed to start monitoring {}", path.display()))?;

    // Graceful shutdown on Ctrl+C
    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("failed to install signal handler")?;

    info!("Monitoring {}. Press Ctrl+C to stop.", path.display());
    if let Err(e) = shutdown_receiver.recv() {
        error!("Shutdown channel closed unexpectedly: {}", e);
    }

    monitor.stop().context("error during monitor shutdown")?;

    if let Some(summary) = monitor.metrics_summary() {
        match serde_json::to_string_pretty(&summary) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => error!("Failed to render metrics summary: {}", e),
        }
    }
    for alert in monitor.active_alerts() {
        warn!("Unresolved alert at shutdown: {}", alert.message);
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Offline analysis does not need the full pipeline
    if let Some(ref path) = cli.analyze {
        if let Err(e) = run_analysis(path, cli.hours) {
            error!("{:#}", e);
            std::process::exit(1);
        }
        return;
    }

    let log_config = match config.log_config() {
        Ok(log_config) => log_config,
        Err(e) => {
            error!("Invalid logging configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = lantern::init(log_config) {
        error!("Failed to initialize logging pipeline: {}", e);
        std::process::exit(1);
    }

    let result = match cli.monitor {
        Some(ref path) => run_monitor(&config, path),
        None => unreachable!("validated above"),
    };

    // Drain the pipeline before exiting either way
    lantern::shutdown();

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
    info!("Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config: None,
            monitor: Some(PathBuf::from("app.log")),
            analyze: None,
            hours: 24,
            verbose: false,
        }
    }

    #[test]
    fn test_cli_requires_a_mode() {
        let cli = Cli {
            monitor: None,
            ..base_cli()
        };
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let temp_file = std::env::temp_dir().join("lantern_test_config.toml");
        std::fs::write(&temp_file, "[log]\nlevel = \"INFO\"").unwrap();

        let cli = Cli {
            config: Some(temp_file.clone()),
            ..base_cli()
        };
        assert!(cli.validate().is_ok());

        std::fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_cli_validation_with_missing_config_file() {
        // Missing config files are tolerated; load falls back to defaults
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/lantern.toml")),
            ..base_cli()
        };
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_rejects_directory_config() {
        let cli = Cli {
            config: Some(std::env::temp_dir()),
            ..base_cli()
        };
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_analyze_mode_alone_is_valid() {
        let cli = Cli {
            monitor: None,
            analyze: Some(PathBuf::from("app.log")),
            ..base_cli()
        };
        assert!(cli.validate().is_ok());
    }
}
