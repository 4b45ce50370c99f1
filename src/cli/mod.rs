//! CLI-specific functionality for the synchronisation scheduler
//!
//! This module contains all CLI-related code including argument parsing,
//! configuration discovery and logging initialisation.

pub mod args;
pub mod config;
pub mod logging;

pub use args::{Args, Commands, ExecutionMode, RunConfig, ValidateConfig};
pub use config::{ConfigDiscovery, ConfigError, SchedulerConfig};
pub use logging::{LogFileMode, LoggingConfig, LoggingError, init_logging, parse_level};
