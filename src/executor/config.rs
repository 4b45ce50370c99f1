//! Executor configuration types.
//!
//! Names the external tools the host executors spawn and how long they
//! may run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the host capability executors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorSettings {
    /// PowerShell host used for scripts and the run profile bridge
    #[serde(default = "default_powershell")]
    pub powershell: String,

    /// Console script host used for VBScripts
    #[serde(default = "default_cscript")]
    pub cscript: String,

    /// SQL Server command line client
    #[serde(default = "default_sqlcmd")]
    pub sqlcmd: String,

    /// Query timeout handed to the SQL client, in seconds
    #[serde(default = "default_sql_command_timeout_secs")]
    pub sql_command_timeout_secs: u64,

    /// Wall-clock limit for any spawned process, in seconds (0 = none)
    #[serde(default)]
    pub process_timeout_secs: u64,
}

fn default_powershell() -> String {
    if cfg!(windows) {
        "powershell".to_string()
    } else {
        "pwsh".to_string()
    }
}

fn default_cscript() -> String {
    "cscript".to_string()
}

fn default_sqlcmd() -> String {
    "sqlcmd".to_string()
}

fn default_sql_command_timeout_secs() -> u64 {
    300
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            powershell: default_powershell(),
            cscript: default_cscript(),
            sqlcmd: default_sqlcmd(),
            sql_command_timeout_secs: default_sql_command_timeout_secs(),
            process_timeout_secs: 0,
        }
    }
}

impl ExecutorSettings {
    /// Process timeout, if one is configured
    pub fn process_timeout(&self) -> Option<Duration> {
        (self.process_timeout_secs > 0).then(|| Duration::from_secs(self.process_timeout_secs))
    }

    /// Resolve every configured tool on the PATH.
    ///
    /// Returns `(role, configured program, resolved path)` triples.
    pub fn tool_status(&self) -> Vec<(&'static str, String, Option<PathBuf>)> {
        [
            ("powershell", &self.powershell),
            ("cscript", &self.cscript),
            ("sqlcmd", &self.sqlcmd),
        ]
        .into_iter()
        .map(|(role, program)| (role, program.clone(), which::which(program).ok()))
        .collect()
    }
}
