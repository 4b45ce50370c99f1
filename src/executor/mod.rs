//! # Capability Executors
//!
//! The execution engine never talks to processes, databases or the
//! synchronisation service directly. It goes through three narrow
//! capability traits, one per family of task kinds:
//!
//! - **[`RunProfileExecutor`]**: executes management agent run profiles and
//!   probes agents for pending exports and imports
//! - **[`ProcessExecutor`]**: runs PowerShell scripts, VBScripts and executables
//! - **[`DatabaseExecutor`]**: sends a command to a database server
//!
//! Parallel siblings are polled together on the caller's task, so trait
//! methods must never block the thread. Wrap synchronous work in
//! `tokio::task::spawn_blocking`.
//!
//! ## Implementations
//!
//! - [`HostProcessExecutor`]: spawns processes on the host via `tokio::process`
//! - [`SqlCmdExecutor`]: runs commands through the `sqlcmd` client
//! - [`CimRunProfileExecutor`]: drives the `MIIS_ManagementAgent` CIM class
//!   through a PowerShell bridge
//! - [`WhatIfExecutor`]: logs what would happen and reports success
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mim_scheduler::executor::{Executors, ExecutorSettings};
//!
//! let settings = ExecutorSettings::default();
//! let live = Executors::from_settings(&settings, false);
//! let dry_run = Executors::what_if();
//! # let _ = (live, dry_run);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Executor settings (interpreter paths and timeouts).
pub mod config;

/// Host process execution via `tokio::process::Command`.
pub mod host;

/// Run profile execution through the synchronisation service's CIM provider.
pub mod run_profile;

/// Database commands through the `sqlcmd` client.
pub mod sql;

/// Dry-run executors.
pub mod what_if;

pub use config::ExecutorSettings;
pub use host::{HostProcessExecutor, run_command};
pub use run_profile::{CimRunProfileExecutor, classify_return_value};
pub use sql::SqlCmdExecutor;
pub use what_if::WhatIfExecutor;

/// Result of executing a run profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProfileOutcome {
    /// Whether the run profile completed (did not hit a fatal status)
    pub completed: bool,
    /// Whether running the profile again on its own may succeed
    pub retry_required: bool,
    /// Raw status reported by the synchronisation service
    pub return_value: String,
}

impl RunProfileOutcome {
    pub fn completed(return_value: impl Into<String>) -> Self {
        Self {
            completed: true,
            retry_required: false,
            return_value: return_value.into(),
        }
    }

    pub fn failed(return_value: impl Into<String>) -> Self {
        Self {
            completed: false,
            retry_required: false,
            return_value: return_value.into(),
        }
    }

    pub fn retry(return_value: impl Into<String>) -> Self {
        Self {
            completed: false,
            retry_required: true,
            return_value: return_value.into(),
        }
    }
}

/// Script flavours understood by [`ProcessExecutor::run_script`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    PowerShell,
    VisualBasic,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::PowerShell => f.write_str("PowerShell"),
            ScriptKind::VisualBasic => f.write_str("Visual Basic"),
        }
    }
}

/// Executes run profiles and inspects management agents.
///
/// Implementations must not block; see the module docs.
#[async_trait]
pub trait RunProfileExecutor: Send + Sync {
    /// Execute `run_profile` on the management agent `agent`
    async fn execute_run_profile(
        &self,
        agent: &str,
        run_profile: &str,
    ) -> Result<RunProfileOutcome, ExecutorError>;

    /// Whether the agent holds staged exports
    async fn has_pending_exports(&self, agent: &str) -> Result<bool, ExecutorError>;

    /// Whether the agent holds staged imports
    async fn has_pending_imports(&self, agent: &str) -> Result<bool, ExecutorError>;
}

/// Runs scripts and executables, reporting whether they completed.
/// Must not block the calling thread.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn run_script(&self, kind: ScriptKind, path: &str) -> Result<bool, ExecutorError>;

    async fn run_executable(
        &self,
        path: &str,
        arguments: Option<&str>,
        show_window: bool,
    ) -> Result<bool, ExecutorError>;
}

/// Sends commands to a database server. Must not block the calling thread.
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    async fn execute(&self, command: &str, server: &str) -> Result<bool, ExecutorError>;
}

/// Result of command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Exit code (0 = success, non-zero = failure)
    pub exit_code: i32,
    /// Duration of command execution
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the command executed successfully (exit code 0)
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of standard output, trimmed
    pub fn last_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
    }
}

/// Command to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCommand {
    /// Program name or path to execute
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Argument string passed through verbatim (Windows) or whitespace-split
    pub raw_args: Option<String>,
    /// Maximum execution time (None = no timeout)
    pub timeout: Option<Duration>,
    /// Suppress the console window of the spawned process (Windows only)
    pub hide_window: bool,
}

impl ExecutionCommand {
    /// Create a new command with just program and args
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            raw_args: None,
            timeout: None,
            hide_window: true,
        }
    }

    /// Append a free-form argument string after `args`
    pub fn with_raw_args(mut self, raw: impl Into<String>) -> Self {
        self.raw_args = Some(raw.into());
        self
    }

    /// Set execution timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show or hide the process window
    pub fn with_window(mut self, show: bool) -> Self {
        self.hide_window = !show;
        self
    }

    /// Shell-quoted rendering for logs
    pub fn display_line(&self) -> String {
        let mut parts = vec![shell_escape::escape(self.program.as_str().into()).into_owned()];
        parts.extend(
            self.args
                .iter()
                .map(|arg| shell_escape::escape(arg.as_str().into()).into_owned()),
        );
        if let Some(raw) = &self.raw_args {
            parts.push(raw.clone());
        }
        parts.join(" ")
    }
}

/// Errors raised by capability executors. The engine treats every one of
/// them as the task not completing.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Command execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Command execution timed out
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The external tool answered with something we cannot interpret
    #[error("Unexpected response from {tool}: {response}")]
    UnexpectedResponse { tool: String, response: String },

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// The set of capability executors an engine dispatches to
#[derive(Clone)]
pub struct Executors {
    pub run_profiles: Arc<dyn RunProfileExecutor>,
    pub processes: Arc<dyn ProcessExecutor>,
    pub database: Arc<dyn DatabaseExecutor>,
}

impl Executors {
    pub fn new(
        run_profiles: Arc<dyn RunProfileExecutor>,
        processes: Arc<dyn ProcessExecutor>,
        database: Arc<dyn DatabaseExecutor>,
    ) -> Self {
        Self {
            run_profiles,
            processes,
            database,
        }
    }

    /// Dry-run executors for every capability
    pub fn what_if() -> Self {
        let executor = Arc::new(WhatIfExecutor::new());
        Self::new(executor.clone(), executor.clone(), executor)
    }

    /// Live executors talking to the host
    pub fn host(settings: &ExecutorSettings) -> Self {
        Self::new(
            Arc::new(CimRunProfileExecutor::new(settings)),
            Arc::new(HostProcessExecutor::new(settings)),
            Arc::new(SqlCmdExecutor::new(settings)),
        )
    }

    /// Host or dry-run executors depending on `what_if`
    pub fn from_settings(settings: &ExecutorSettings, what_if: bool) -> Self {
        if what_if {
            Self::what_if()
        } else {
            Self::host(settings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line_skips_trailing_blanks() {
        let result = ExecutionResult {
            stdout: "first\r\nsuccess\r\n\r\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        };
        assert_eq!(result.last_line(), Some("success"));
        assert!(result.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_display_line_quotes_arguments() {
        let command = ExecutionCommand::new("cscript", vec!["/Nologo".into(), "c:\\my script.vbs".into()]);
        assert_eq!(command.display_line(), "cscript /Nologo 'c:\\my script.vbs'");
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(RunProfileOutcome::completed("success").completed);
        assert!(!RunProfileOutcome::failed("stopped-server-down").completed);
        let retry = RunProfileOutcome::retry("sql-deadlock");
        assert!(!retry.completed && retry.retry_required);
    }
}
