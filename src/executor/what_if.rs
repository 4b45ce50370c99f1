//! Dry-run (WHATIF) executors.
//!
//! Every capability is logged with the `WHATIF: ` prefix and reported as
//! successful. Pending export and import probes always answer `false`, so
//! gated run profiles and import-dependent continuation conditions are
//! skipped in a dry run.

use super::{
    DatabaseExecutor, ExecutorError, ProcessExecutor, RunProfileExecutor, RunProfileOutcome,
    ScriptKind,
};
use crate::env::WHAT_IF_PREFIX;
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct WhatIfExecutor;

impl WhatIfExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RunProfileExecutor for WhatIfExecutor {
    async fn execute_run_profile(
        &self,
        agent: &str,
        run_profile: &str,
    ) -> Result<RunProfileOutcome, ExecutorError> {
        debug!(
            "{}Executing run profile: {}\\{}",
            WHAT_IF_PREFIX, agent, run_profile
        );
        Ok(RunProfileOutcome::completed("success"))
    }

    async fn has_pending_exports(&self, agent: &str) -> Result<bool, ExecutorError> {
        debug!("{}Checking pending exports for: {}", WHAT_IF_PREFIX, agent);
        Ok(false)
    }

    async fn has_pending_imports(&self, agent: &str) -> Result<bool, ExecutorError> {
        debug!("{}Checking pending imports for: {}", WHAT_IF_PREFIX, agent);
        Ok(false)
    }
}

#[async_trait]
impl ProcessExecutor for WhatIfExecutor {
    async fn run_script(&self, kind: ScriptKind, path: &str) -> Result<bool, ExecutorError> {
        debug!("{}Executing {} script: {}", WHAT_IF_PREFIX, kind, path);
        Ok(true)
    }

    async fn run_executable(
        &self,
        path: &str,
        arguments: Option<&str>,
        show_window: bool,
    ) -> Result<bool, ExecutorError> {
        debug!(
            "{}Executing executable: {} {} (show window: {})",
            WHAT_IF_PREFIX,
            path,
            arguments.unwrap_or_default(),
            show_window
        );
        Ok(true)
    }
}

#[async_trait]
impl DatabaseExecutor for WhatIfExecutor {
    async fn execute(&self, command: &str, server: &str) -> Result<bool, ExecutorError> {
        debug!(
            "{}Executing database command on {}: {}",
            WHAT_IF_PREFIX, server, command
        );
        Ok(true)
    }
}
