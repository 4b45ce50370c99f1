//! Environment constants and path utilities for the synchronisation scheduler.
//!
//! This module centralizes all hardcoded paths, directory names and naming
//! conventions used throughout the application, making them easier to
//! maintain and modify.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const APP_DIR_NAME: &str = ".mim-scheduler";

/// Configuration file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "mim-scheduler.toml";

/// Directory name used for system-wide configuration
pub const SYSTEM_CONFIG_DIR_NAME: &str = "mim-scheduler";

/// Prefix put in front of log lines when running in WHATIF (dry run) mode
pub const WHAT_IF_PREFIX: &str = "WHATIF: ";

/// Logging related names
pub mod logging {
    /// Default log directory, relative to the working directory
    pub const DEFAULT_LOG_DIR: &str = "logs";

    /// Suffix appended to the timestamp of every log file name
    pub const LOG_FILE_SUFFIX: &str = "-scheduler.log";

    /// Timestamp format for daily log files (shared by every run on the same day)
    pub const DAILY_STAMP_FORMAT: &str = "%Y%m%d";

    /// Timestamp format for per-execution log files
    pub const PER_EXECUTION_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
}

/// Directory synchronisation naming conventions
pub mod sync {
    /// Run profile name prefixes that denote import operations
    /// (delta import and full import, compared case-insensitively).
    pub const IMPORT_RUN_PROFILE_PREFIXES: [&str; 2] = ["DISO", "FISO"];

    /// CIM namespace of the synchronisation service
    pub const CIM_NAMESPACE: &str = "root/MicrosoftIdentityIntegrationServer";

    /// CIM class exposing management agents
    pub const MANAGEMENT_AGENT_CLASS: &str = "MIIS_ManagementAgent";
}

/// Returns the logging prefix for the given mode.
pub fn log_prefix(what_if: bool) -> &'static str {
    if what_if { WHAT_IF_PREFIX } else { "" }
}

/// Build the application directory path from a base directory
pub fn app_dir_path(base: &Path) -> PathBuf {
    base.join(APP_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    app_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    app_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

/// Build the system-wide config file path under a system root
/// (`/etc` on Unix-like systems, `%PROGRAMDATA%` on Windows)
pub fn system_config_file_path(system_root: &Path) -> PathBuf {
    system_root
        .join(SYSTEM_CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Build a log file path from a directory and a formatted timestamp
pub fn log_file_path(log_dir: &Path, stamp: &str) -> PathBuf {
    log_dir.join(format!("{}{}", stamp, logging::LOG_FILE_SUFFIX))
}
