//! Run profile execution against the synchronisation service.
//!
//! The service exposes its management agents through the
//! `MIIS_ManagementAgent` CIM class. Rather than binding the CIM API
//! directly, each call runs a small PowerShell script through
//! [`run_command`] and reads the result back from standard output.

use super::host::run_command;
use super::{
    ExecutionCommand, ExecutionResult, ExecutorError, ExecutorSettings, RunProfileExecutor,
    RunProfileOutcome,
};
use crate::env::sync::{CIM_NAMESPACE, MANAGEMENT_AGENT_CLASS};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Status reported when the service hands back no return value
const MISSING_RETURN_VALUE: &str = "stopped";

/// Statuses that start with a failure prefix but still count as completed
const TOLERATED_STOPS: [&str; 2] = [
    "stopped-user-termination-from-wmi-or-ui",
    "stopped-object-limit",
];

const FAILURE_PREFIXES: [&str; 3] = ["stopped", "call-failure:", "no-start-"];

const DEADLOCK: &str = "sql-deadlock";

/// Map a run profile return value onto completion and retry.
///
/// `sql-deadlock` asks for a retry. Values starting with `stopped`,
/// `call-failure:` or `no-start-` are failures, apart from user
/// termination and the object limit. Everything else (`success`,
/// `completed-*-errors`, ...) completed. Blank values count as `stopped`.
pub fn classify_return_value(return_value: &str) -> RunProfileOutcome {
    let value = match return_value.trim() {
        "" => MISSING_RETURN_VALUE,
        value => value,
    };

    if value == DEADLOCK {
        return RunProfileOutcome::retry(value);
    }
    if TOLERATED_STOPS.contains(&value) {
        return RunProfileOutcome::completed(value);
    }
    if FAILURE_PREFIXES.iter().any(|prefix| value.starts_with(prefix)) {
        return RunProfileOutcome::failed(value);
    }
    RunProfileOutcome::completed(value)
}

/// Escape a value for use inside a single-quoted PowerShell string
fn powershell_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// WQL filter selecting one management agent by name
fn agent_filter(agent: &str) -> String {
    let escaped = agent.replace('\\', "\\\\").replace('\'', "\\'");
    format!("Name='{}'", escaped)
}

/// Drives management agents through the CIM provider via PowerShell
#[derive(Debug, Clone)]
pub struct CimRunProfileExecutor {
    settings: ExecutorSettings,
}

impl CimRunProfileExecutor {
    pub fn new(settings: &ExecutorSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Preamble binding `$ma` to the agent, failing the script when absent
    fn agent_lookup(agent: &str) -> String {
        format!(
            "$ErrorActionPreference = 'Stop'; \
             $ma = Get-CimInstance -Namespace {} -ClassName {} -Filter {}; \
             if ($null -eq $ma) {{ [Console]::Error.WriteLine('management agent not found'); exit 2 }}; ",
            powershell_literal(CIM_NAMESPACE),
            MANAGEMENT_AGENT_CLASS,
            powershell_literal(&agent_filter(agent)),
        )
    }

    pub fn execute_script(agent: &str, run_profile: &str) -> String {
        format!(
            "{}$r = Invoke-CimMethod -InputObject $ma -MethodName Execute \
             -Arguments @{{ RunProfileName = {} }}; \
             if ($null -ne $r) {{ $r.ReturnValue }}",
            Self::agent_lookup(agent),
            powershell_literal(run_profile),
        )
    }

    /// Script printing one counter per line
    pub fn counter_script(agent: &str, counters: &[&str]) -> String {
        let names = counters
            .iter()
            .map(|c| powershell_literal(c))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}foreach ($m in @({})) {{ (Invoke-CimMethod -InputObject $ma -MethodName $m).ReturnValue }}",
            Self::agent_lookup(agent),
            names,
        )
    }

    fn bridge_command(&self, script: String) -> ExecutionCommand {
        ExecutionCommand::new(
            &self.settings.powershell,
            vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
                script,
            ],
        )
        .with_timeout(self.settings.process_timeout())
    }

    async fn run_bridge(&self, script: String) -> Result<ExecutionResult, ExecutorError> {
        let result = run_command(&self.bridge_command(script)).await?;
        if !result.success() {
            let reason = result
                .stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("no error output");
            return Err(ExecutorError::ExecutionFailed(format!(
                "CIM bridge exited with code {}: {}",
                result.exit_code, reason
            )));
        }
        Ok(result)
    }

    async fn pending_total(&self, agent: &str, counters: &[&str]) -> Result<i64, ExecutorError> {
        let result = self
            .run_bridge(Self::counter_script(agent, counters))
            .await?;
        sum_counters(&result.stdout, counters.len())
    }
}

/// Sum the counter lines printed by [`CimRunProfileExecutor::counter_script`]
fn sum_counters(stdout: &str, expected: usize) -> Result<i64, ExecutorError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() != expected {
        return Err(ExecutorError::UnexpectedResponse {
            tool: "CIM bridge".to_string(),
            response: stdout.trim().to_string(),
        });
    }
    lines.iter().try_fold(0i64, |total, line| {
        line.parse::<i64>()
            .ok()
            .and_then(|n| total.checked_add(n))
            .ok_or_else(|| ExecutorError::UnexpectedResponse {
                tool: "CIM bridge".to_string(),
                response: line.to_string(),
            })
    })
}

/// Classify the return value printed last by the `Execute` bridge script
fn run_profile_outcome(result: &ExecutionResult) -> RunProfileOutcome {
    classify_return_value(result.last_line().unwrap_or_default())
}

const EXPORT_COUNTERS: [&str; 3] = ["NumExportAdd", "NumExportUpdate", "NumExportDelete"];
const IMPORT_COUNTERS: [&str; 3] = ["NumImportAdd", "NumImportUpdate", "NumImportDelete"];

#[async_trait]
impl RunProfileExecutor for CimRunProfileExecutor {
    async fn execute_run_profile(
        &self,
        agent: &str,
        run_profile: &str,
    ) -> Result<RunProfileOutcome, ExecutorError> {
        let result = self
            .run_bridge(Self::execute_script(agent, run_profile))
            .await?;

        let outcome = run_profile_outcome(&result);
        info!(
            "MA: {}, Run profile: {}, ReturnValue: {}",
            agent, run_profile, outcome.return_value
        );
        if outcome.retry_required {
            warn!(
                "Run profile {}\\{} reported {}, it will be retried",
                agent, run_profile, outcome.return_value
            );
        }
        Ok(outcome)
    }

    async fn has_pending_exports(&self, agent: &str) -> Result<bool, ExecutorError> {
        let total = self.pending_total(agent, &EXPORT_COUNTERS).await?;
        debug!("{} has {} pending exports", agent, total);
        Ok(total > 0)
    }

    async fn has_pending_imports(&self, agent: &str) -> Result<bool, ExecutorError> {
        let total = self.pending_total(agent, &IMPORT_COUNTERS).await?;
        debug!("{} has {} pending imports", agent, total);
        Ok(total > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classify_return_values() {
        let cases = [
            ("success", true, false),
            ("completed-no-objects", true, false),
            ("completed-export-errors", true, false),
            ("stopped-server-down", false, false),
            ("stopped", false, false),
            ("call-failure:access-denied", false, false),
            ("no-start-ma-already-running", false, false),
            ("sql-deadlock", false, true),
            ("stopped-user-termination-from-wmi-or-ui", true, false),
            ("stopped-object-limit", true, false),
            ("", false, false),
            ("   ", false, false),
        ];

        for (value, completed, retry) in cases {
            let outcome = classify_return_value(value);
            assert_eq!(outcome.completed, completed, "completed for {:?}", value);
            assert_eq!(outcome.retry_required, retry, "retry for {:?}", value);
        }

        assert_eq!(classify_return_value("").return_value, "stopped");
    }

    #[test]
    fn test_names_are_escaped_for_the_bridge() {
        let script = CimRunProfileExecutor::execute_script("O'Brien MA", "Full 'Import'");
        assert!(script.contains("-Filter 'Name=''O\\''Brien MA'''"));
        assert!(script.contains("RunProfileName = 'Full ''Import'''"));
        assert!(script.contains("root/MicrosoftIdentityIntegrationServer"));
    }

    #[test]
    fn test_agent_filter_escapes_backslashes() {
        assert_eq!(agent_filter("DOMAIN\\MA"), "Name='DOMAIN\\\\MA'");
    }

    #[test]
    fn test_counter_script_lists_counters() {
        let script = CimRunProfileExecutor::counter_script("HR", &IMPORT_COUNTERS);
        assert!(script.contains("@('NumImportAdd','NumImportUpdate','NumImportDelete')"));
    }

    #[test]
    fn test_sum_counters() {
        assert_eq!(sum_counters("0\r\n2\r\n1\r\n", 3).unwrap(), 3);
        assert_eq!(sum_counters("0\n0\n0", 3).unwrap(), 0);
        assert!(matches!(
            sum_counters("0\nfoo\n0", 3),
            Err(ExecutorError::UnexpectedResponse { .. })
        ));
        assert!(matches!(
            sum_counters("0\n0", 3),
            Err(ExecutorError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn test_sum_counters_rejects_overflow() {
        let stdout = format!("{}\n1\n0", i64::MAX);
        assert!(matches!(
            sum_counters(&stdout, 3),
            Err(ExecutorError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn test_run_profile_outcome_uses_last_line() {
        let result = |stdout: &str| ExecutionResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(5),
        };

        let deadlock = run_profile_outcome(&result("WARNING: slow\r\nsql-deadlock\r\n\r\n"));
        assert!(deadlock.retry_required);
        assert_eq!(deadlock.return_value, "sql-deadlock");

        assert!(run_profile_outcome(&result("success\n")).completed);

        let silent = run_profile_outcome(&result("  \n"));
        assert!(!silent.completed);
        assert_eq!(silent.return_value, "stopped");
    }
}
