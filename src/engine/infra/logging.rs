//! Structured logging setup.
//!
//! Stdout logging in pretty, compact or JSON form, plus an optional daily-rolling
//! JSON file written through a non-blocking appender.
//!
//! # Component Targets
//!
//! | Target | Description |
//! |--------|-------------|
//! | `pressure_engine::engine::pressure` | Pressure field construction |
//! | `pressure_engine::engine::regime` | Regime labels and transitions |
//! | `pressure_engine::engine::composer` | Agent fusion decisions |
//! | `pressure_engine::engine::learning` | Bandit, thresholds, calibrator, lookahead |
//! | `pressure_engine::engine::checkpoint` | Persistence |
//! | `pressure_engine::engine::orchestrator` | Decision cycle and background services |
//!
//! ```bash
//! RUST_LOG=warn,pressure_engine::engine::learning=debug pressure_engine replay --input bars.jsonl
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::errors::Error;
use crate::prelude::Result;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
    /// Compact single-line format
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when RUST_LOG is unset
    pub level: String,
    /// Format for stdout logging
    pub stdout_format: LogFormat,
    /// Enable a daily-rolling JSON log file in `log_dir`
    pub enable_file: bool,
    /// Directory for the rolling file
    pub log_dir: PathBuf,
    /// File name prefix for the rolling file
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stdout_format: LogFormat::default(),
            enable_file: false,
            log_dir: PathBuf::from("logs"),
            file_prefix: "pressure-engine.log".to_string(),
        }
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber.
///
/// Returns the appender guard when file logging is enabled; it must be kept alive
/// for the lifetime of the program so buffered lines are flushed.
pub fn init_logging(config: &LogConfig, level_override: Option<&str>) -> Result<Option<WorkerGuard>> {
    let level = level_override.unwrap_or(&config.level);

    if config.enable_file {
        std::fs::create_dir_all(&config.log_dir).map_err(|e| Error::Logging(e.to_string()))?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .json()
            .with_filter(build_filter(level));

        let result = match config.stdout_format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(file_layer)
                .with(fmt::layer().json().with_filter(build_filter(level)))
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(file_layer)
                .with(fmt::layer().compact().with_filter(build_filter(level)))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(file_layer)
                .with(fmt::layer().with_target(false).with_filter(build_filter(level)))
                .try_init(),
        };
        result.map_err(|e| Error::Logging(e.to_string()))?;
        return Ok(Some(guard));
    }

    let filter = build_filter(level);
    let result = match config.stdout_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };
    result.map_err(|e| Error::Logging(e.to_string()))?;
    Ok(None)
}
