//! Database command execution through `sqlcmd`.
//!
//! Commands run with Windows integrated authentication (`-E`) and `-b`, so
//! any SQL error surfaces as a non-zero exit code.

use super::host::run_command;
use super::{DatabaseExecutor, ExecutionCommand, ExecutorError, ExecutorSettings};
use async_trait::async_trait;
use tracing::{debug, error, info};

/// Runs database commands with the SQL Server command line client
#[derive(Debug, Clone)]
pub struct SqlCmdExecutor {
    settings: ExecutorSettings,
}

impl SqlCmdExecutor {
    pub fn new(settings: &ExecutorSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn command(&self, command: &str, server: &str) -> ExecutionCommand {
        ExecutionCommand::new(
            &self.settings.sqlcmd,
            vec![
                "-S".to_string(),
                server.to_string(),
                "-E".to_string(),
                "-b".to_string(),
                "-t".to_string(),
                self.settings.sql_command_timeout_secs.to_string(),
                "-Q".to_string(),
                command.to_string(),
            ],
        )
        .with_timeout(self.settings.process_timeout())
    }
}

#[async_trait]
impl DatabaseExecutor for SqlCmdExecutor {
    async fn execute(&self, command: &str, server: &str) -> Result<bool, ExecutorError> {
        info!("Executing database command on {}", server);
        let result = run_command(&self.command(command, server)).await?;

        for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!("sqlcmd: {}", line);
        }
        if !result.success() {
            let message = result
                .stderr
                .lines()
                .chain(result.stdout.lines())
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("no output");
            error!(
                "Database command on {} failed with exit code {}: {}",
                server, result.exit_code, message
            );
        }

        Ok(result.success())
    }
}
