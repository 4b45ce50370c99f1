//! Logging initialisation
//!
//! Sets up a `tracing-subscriber` registry with a console layer and,
//! optionally, an ANSI-free layer appending to a log file under
//! `logs/`. The file is either shared by every run on the same day or
//! created per execution.

use crate::env::{self, logging::*};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// How log files are named
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFileMode {
    /// One file per day (`YYYYMMDD-scheduler.log`)
    #[default]
    Daily,
    /// One file per run (`YYYYMMDDHHmmss-scheduler.log`)
    PerExecution,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Minimum level: verbose, debug, information, warning, error or fatal
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file_mode: LogFileMode,

    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_file_enabled")]
    pub file_enabled: bool,
}

fn default_level() -> String {
    "information".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_file_enabled() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_mode: LogFileMode::default(),
            directory: default_directory(),
            file_enabled: default_file_enabled(),
        }
    }
}

impl LoggingConfig {
    /// Log file for a run starting at `now`
    pub fn log_file_path(&self, now: DateTime<Local>) -> PathBuf {
        let format = match self.file_mode {
            LogFileMode::Daily => DAILY_STAMP_FORMAT,
            LogFileMode::PerExecution => PER_EXECUTION_STAMP_FORMAT,
        };
        env::log_file_path(&self.directory, &now.format(format).to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Unknown log level '{0}'")]
    UnknownLevel(String),

    #[error("Cannot open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialised: {0}")]
    Init(String),
}

/// Parse a level name.
///
/// Accepts the scheduler's historical names (`verbose`, `information`,
/// `warning`, `fatal`) as well as the usual tracing ones, ignoring case.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "verbose" | "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "information" | "info" => Ok(LevelFilter::INFO),
        "warning" | "warn" => Ok(LevelFilter::WARN),
        "error" | "fatal" => Ok(LevelFilter::ERROR),
        "off" | "none" => Ok(LevelFilter::OFF),
        _ => Err(LoggingError::UnknownLevel(level.to_string())),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns the path
/// of the log file when file logging is enabled.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<Option<PathBuf>, LoggingError> {
    let level = parse_level(level_override.unwrap_or(&config.level))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, log_file) = if config.file_enabled {
        let path = config.log_file_path(Local::now());
        let file = open_log_file(&path)?;
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file));
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(log_file)
}

fn open_log_file(path: &Path) -> Result<fs::File, LoggingError> {
    let io_error = |source| LoggingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)
}
