//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./mim-scheduler.toml or ./.mim-scheduler/config.toml
//! 2. User config: ~/.mim-scheduler/config.toml
//! 3. System config: /etc/mim-scheduler/config.toml (%PROGRAMDATA% on Windows)
//! 4. Built-in defaults

use super::logging::LoggingConfig;
use crate::env;
use crate::executor::ExecutorSettings;
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Log what would run instead of running it
    #[serde(default)]
    pub what_if: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub executors: ExecutorSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Cannot read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl SchedulerConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load an explicit file, or fall back to discovery.
    ///
    /// Returns the configuration together with the file it came from.
    pub fn load(
        config_override: Option<&Path>,
    ) -> Result<(SchedulerConfig, Option<PathBuf>), ConfigError> {
        match config_override {
            Some(path) => {
                info!("Loading configuration override from: {:?}", path);
                let config = SchedulerConfig::from_toml_file(path)?;
                Ok((config, Some(path.to_path_buf())))
            }
            None => Self::discover_config(),
        }
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<(SchedulerConfig, Option<PathBuf>), ConfigError> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            let config = SchedulerConfig::from_toml_file(&config_path)?;
            return Ok((config, Some(config_path)));
        }

        info!("No configuration file found, using defaults");
        Ok((SchedulerConfig::default(), None))
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::first_existing(Self::config_candidates())
    }

    fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Configuration file candidates in priority order
    pub fn config_candidates() -> Vec<PathBuf> {
        let current_dir = std_env::current_dir().ok();
        let home_dir = Self::get_home_dir();
        Self::candidates_from(
            current_dir.as_deref(),
            home_dir.as_deref(),
            Self::system_root().as_deref(),
        )
    }

    fn candidates_from(
        current_dir: Option<&Path>,
        home_dir: Option<&Path>,
        system_root: Option<&Path>,
    ) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        if let Some(system_root) = system_root {
            candidates.push(env::system_config_file_path(system_root));
        }

        candidates
    }

    #[cfg(windows)]
    fn system_root() -> Option<PathBuf> {
        std_env::var("PROGRAMDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(windows))]
    fn system_root() -> Option<PathBuf> {
        Some(PathBuf::from("/etc"))
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        let candidates = Self::config_candidates();
        for (i, candidate) in candidates.iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        let active = Self::first_existing(candidates);
        match &active {
            Some(found) => println!("Active configuration: {:?}", found),
            None => println!("Active configuration: Built-in defaults"),
        }

        let settings = active
            .and_then(|path| SchedulerConfig::from_toml_file(path).ok())
            .unwrap_or_default()
            .executors;
        println!();
        println!("External tools:");
        for (role, program, resolved) in settings.tool_status() {
            match resolved {
                Some(path) => println!("  {}: {} -> {:?}", role, program, path),
                None => println!("  {}: {} - ✗ NOT ON PATH", role, program),
            }
        }
    }
}
