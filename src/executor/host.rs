//! Native host process execution.
//!
//! Runs scripts and executables directly on the host using
//! `tokio::process::Command`. A process counts as completed when it exits
//! with code 0; anything else (including 1, the conventional error code
//! for scheduler-aware tools) is a failure.

use super::{
    ExecutionCommand, ExecutionResult, ExecutorError, ExecutorSettings, ProcessExecutor,
    ScriptKind,
};
use async_trait::async_trait;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Spawn a command and collect its output.
///
/// The child is killed if the timeout elapses first.
pub async fn run_command(cmd: &ExecutionCommand) -> Result<ExecutionResult, ExecutorError> {
    debug!("Executing command on host: {}", cmd.display_line());

    let start = Instant::now();

    let mut std_command = std::process::Command::new(&cmd.program);
    std_command.args(&cmd.args);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        if let Some(ref raw) = cmd.raw_args {
            std_command.raw_arg(raw);
        }
        if cmd.hide_window {
            std_command.creation_flags(CREATE_NO_WINDOW);
        }
    }

    #[cfg(not(windows))]
    if let Some(ref raw) = cmd.raw_args {
        std_command.args(raw.split_whitespace());
    }

    let mut command = Command::from(std_command);
    command.kill_on_drop(true);

    // Execute command with optional timeout
    let output = if let Some(timeout) = cmd.timeout {
        match tokio::time::timeout(timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecutorError::Timeout(timeout));
            }
        }
    } else {
        command.output().await?
    };

    let duration = start.elapsed();

    Ok(ExecutionResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        duration,
    })
}

/// Forward captured process output into the log
fn log_output(source: &str, result: &ExecutionResult) {
    for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
        debug!("{}: {}", source, line);
    }
    for line in result.stderr.lines().filter(|l| !l.trim().is_empty()) {
        error!("{}: {}", source, line);
    }
}

/// Runs scripts and executables directly on the host system
#[derive(Debug, Clone)]
pub struct HostProcessExecutor {
    settings: ExecutorSettings,
}

impl HostProcessExecutor {
    pub fn new(settings: &ExecutorSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Build the interpreter invocation for a script
    pub fn script_command(&self, kind: ScriptKind, path: &str) -> ExecutionCommand {
        let command = match kind {
            ScriptKind::PowerShell => ExecutionCommand::new(
                &self.settings.powershell,
                vec![
                    "-NoProfile".to_string(),
                    "-NonInteractive".to_string(),
                    "-ExecutionPolicy".to_string(),
                    "Unrestricted".to_string(),
                    "-File".to_string(),
                    path.to_string(),
                ],
            ),
            ScriptKind::VisualBasic => ExecutionCommand::new(
                &self.settings.cscript,
                vec!["/Nologo".to_string(), path.to_string()],
            ),
        };
        command.with_timeout(self.settings.process_timeout())
    }

    /// Build the invocation for an executable
    pub fn executable_command(
        &self,
        path: &str,
        arguments: Option<&str>,
        show_window: bool,
    ) -> ExecutionCommand {
        let mut command = ExecutionCommand::new(path, Vec::new())
            .with_window(show_window)
            .with_timeout(self.settings.process_timeout());
        if let Some(arguments) = arguments.filter(|a| !a.trim().is_empty()) {
            command = command.with_raw_args(arguments);
        }
        command
    }
}

#[async_trait]
impl ProcessExecutor for HostProcessExecutor {
    async fn run_script(&self, kind: ScriptKind, path: &str) -> Result<bool, ExecutorError> {
        let command = self.script_command(kind, path);
        let result = run_command(&command).await?;

        let source = match kind {
            ScriptKind::PowerShell => "PowerShell",
            ScriptKind::VisualBasic => "VBS",
        };
        log_output(source, &result);
        debug!(
            "{} script {} exited with code {} after {:?}",
            kind, path, result.exit_code, result.duration
        );

        Ok(result.success())
    }

    async fn run_executable(
        &self,
        path: &str,
        arguments: Option<&str>,
        show_window: bool,
    ) -> Result<bool, ExecutorError> {
        let command = self.executable_command(path, arguments, show_window);
        let result = run_command(&command).await?;

        log_output("Executable", &result);
        debug!(
            "Executable {} exited with code {} after {:?}",
            path, result.exit_code, result.duration
        );

        Ok(result.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_script_commands() {
        let executor = HostProcessExecutor::new(&ExecutorSettings {
            powershell: "pwsh".to_string(),
            ..Default::default()
        });

        let ps = executor.script_command(ScriptKind::PowerShell, "c:\\s.ps1");
        assert_eq!(ps.program, "pwsh");
        assert_eq!(ps.args.last().map(String::as_str), Some("c:\\s.ps1"));
        assert!(ps.args.contains(&"Unrestricted".to_string()));

        let vbs = executor.script_command(ScriptKind::VisualBasic, "c:\\s.vbs");
        assert_eq!(vbs.program, "cscript");
        assert_eq!(vbs.args, vec!["/Nologo".to_string(), "c:\\s.vbs".to_string()]);
    }

    #[test]
    fn test_executable_command_window_and_arguments() {
        let executor = HostProcessExecutor::new(&ExecutorSettings::default());

        let hidden = executor.executable_command("tool.exe", None, false);
        assert!(hidden.hide_window);
        assert!(hidden.raw_args.is_none());

        let shown = executor.executable_command("tool.exe", Some("-a 1"), true);
        assert!(!shown.hide_window);
        assert_eq!(shown.raw_args.as_deref(), Some("-a 1"));

        let blank = executor.executable_command("tool.exe", Some("   "), false);
        assert!(blank.raw_args.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_output() {
        let cmd = ExecutionCommand::new("echo", vec!["hello".to_string()]).with_raw_args("big world");

        let result = run_command(&cmd).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello big world"));
        assert!(result.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_timeout() {
        let cmd = ExecutionCommand::new("sleep", vec!["2".to_string()])
            .with_timeout(Some(Duration::from_millis(100)));

        let result = run_command(&cmd).await;
        assert!(matches!(result.unwrap_err(), ExecutorError::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_executable_exit_codes_map_to_completion() {
        let executor = HostProcessExecutor::new(&ExecutorSettings::default());

        assert!(executor.run_executable("true", None, false).await.unwrap());
        assert!(!executor.run_executable("false", None, false).await.unwrap());
        assert!(
            !executor
                .run_executable("sh", Some("-c exit 1"), false)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_an_error() {
        let executor = HostProcessExecutor::new(&ExecutorSettings::default());
        let result = executor
            .run_executable("definitely-not-a-real-binary-xyz", None, false)
            .await;
        assert!(matches!(result, Err(ExecutorError::IoError(_))));
    }
}
