//! Command line argument parsing
//!
//! This module handles CLI argument parsing with subcommands:
//! - `run`: Load, validate and execute a schedule file
//! - `validate`: Load and validate a schedule file without executing it
//! - `show-config`: Show configuration discovery information

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ExecutionMode {
    Run(RunConfig),
    Validate(ValidateConfig),
    ShowConfig, // Show configuration discovery info
}

#[derive(Debug)]
pub struct RunConfig {
    pub schedule: PathBuf,
    pub config_override: Option<PathBuf>,
    pub what_if: bool,
    pub log_level: Option<String>,
    pub report: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ValidateConfig {
    pub schedule: PathBuf,
    pub json: bool,
}

#[derive(Debug, Parser)]
#[command(name = "mim-scheduler")]
#[command(author = "Synchronisation Scheduler Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Runs MIM synchronisation schedules: run profiles, scripts, executables and SQL commands in a tree"
)]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a schedule file
    Run {
        /// Path to the XML schedule file
        schedule: PathBuf,
        /// Configuration file path
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
        /// Log what would be executed without running anything
        #[arg(long = "what-if")]
        what_if: bool,
        /// Log level (verbose, debug, information, warning, error, fatal)
        #[arg(short = 'l', long = "log-level", value_name = "LEVEL")]
        log_level: Option<String>,
        /// Write a JSON run report to this file
        #[arg(long = "report", value_name = "FILE")]
        report: Option<PathBuf>,
    },
    /// Check a schedule file without executing it
    Validate {
        /// Path to the XML schedule file
        schedule: PathBuf,
        /// Print the parsed schedule as JSON
        #[arg(long = "json")]
        json: bool,
    },
    /// Show configuration discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Run {
                schedule,
                config,
                what_if,
                log_level,
                report,
            }) => Ok(ExecutionMode::Run(RunConfig {
                schedule: schedule.clone(),
                config_override: config.clone(),
                what_if: *what_if,
                log_level: log_level.clone(),
                report: report.clone(),
            })),
            Some(Commands::Validate { schedule, json }) => {
                Ok(ExecutionMode::Validate(ValidateConfig {
                    schedule: schedule.clone(),
                    json: *json,
                }))
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'mim-scheduler --help' to see available commands."
                    .to_string(),
            ),
        }
    }
}
