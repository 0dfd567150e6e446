//! Structured logging infrastructure.
//!
//! # Component Targets
//!
//! | Target | Description |
//! |--------|-------------|
//! | `crossing_control::pipeline` | Tick loop and decision assembly |
//! | `crossing_control::inference` | Oracle requests and validation |
//! | `crossing_control::consensus` | Ledger submissions and receipts |
//! | `crossing_control::actuation` | Controller actuation calls |
//! | `crossing_control::supervisor` | Cross-domain safety checks |
//! | `crossing_control::store` | Measurement ingest and eviction |
//!
//! # Example Usage
//!
//! ```bash
//! # Debug only the consensus race
//! RUST_LOG=info,crossing_control::consensus=debug cargo run --bin control_node
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors (default for development)
    #[default]
    Pretty,
    /// JSON format (best for log aggregation)
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("Unknown log format '{other}'. Use: pretty, json, compact")),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Base level directive when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Format for stdout logging
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for the daily-rotated JSON audit stream (None disables it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Level for the file stream
    #[serde(default = "default_file_level")]
    pub file_level: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            log_dir: None,
            file_level: default_file_level(),
        }
    }
}

fn quiet_dependencies(filter: EnvFilter) -> EnvFilter {
    ["hyper=warn", "reqwest=warn", "h2=warn"]
        .iter()
        .filter_map(|d| d.parse().ok())
        .fold(filter, EnvFilter::add_directive)
}

/// Initialize logging based on configuration.
///
/// Returns the `WorkerGuard`s that must be kept alive for the duration of the
/// program so buffered file logs are flushed.
pub fn init_logging(config: &LogConfig) -> Result<Vec<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guards = Vec::new();

    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| quiet_dependencies(EnvFilter::new(&config.level)));

    let stdout_layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_filter(base_filter).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_filter(base_filter).boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_filter(base_filter)
            .boxed(),
    };

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "control-node.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            let filter = quiet_dependencies(EnvFilter::new(&config.file_level));
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .with_filter(filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = &config.log_dir {
        eprintln!("File logging enabled: {}", dir.display());
    }

    Ok(guards)
}

/// Log target constants for component-specific logging.
pub mod targets {
    pub const PIPELINE: &str = "crossing_control::pipeline";
    pub const INFERENCE: &str = "crossing_control::inference";
    pub const CONSENSUS: &str = "crossing_control::consensus";
    pub const ACTUATION: &str = "crossing_control::actuation";
    pub const SUPERVISOR: &str = "crossing_control::supervisor";
    pub const STORE: &str = "crossing_control::store";
}
