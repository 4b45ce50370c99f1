//! # Execution Engine
//!
//! Walks a validated schedule tree once, dispatching every task to the
//! capability executors and deciding which subtrees may continue.
//!
//! ## Per-task state machine
//!
//! 1. **Gate**: run profiles marked "only if pending exports" probe the
//!    agent first, continuation conditions read the branch-local imports
//!    flag, everything else runs unconditionally. A closed gate skips the
//!    whole subtree and stops the branch.
//! 2. **Dispatch**: an exhaustive match over [`TaskKind`] picks the
//!    executor. `Block` and an open continuation condition complete
//!    without any external action.
//! 3. **Imports probe**: a completed import run profile (`DISO*`/`FISO*`)
//!    probes the agent for pending imports and raises the branch flag.
//! 4. **Resolve**: an incomplete task halts the schedule when the schedule
//!    stops on incompletion, otherwise only its own subtree is dropped. A
//!    completed task recurses into its children.
//!
//! ## Sibling lists
//!
//! All-`Block` lists run in declaration order and stop at the first halt.
//! Any other list fans out with `join_all`, one branch per task, each with
//! a private copy of the imports flag. Flags are OR-merged after the join.
//! Tasks whose executor asked for a retry are rerun once, sequentially,
//! after the first pass. Panics are caught at the task boundary and count
//! as the task not completing.

use crate::env::{log_prefix, sync::IMPORT_RUN_PROFILE_PREFIXES};
use crate::executor::{Executors, ScriptKind};
use crate::schedule::{
    ContinuationConditionKind, Schedule, ScheduleError, ScheduleTask, TaskKind,
    validate_block_siblings,
};
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod report;


use report::StatCounters;
pub use report::{RunId, RunReport, RunStatistics};

/// What a task (or sibling list) tells its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The subtree ran; the caller carries on
    Continue,
    /// The subtree stopped early; siblings elsewhere carry on
    Stop,
    /// The whole schedule halts once in-flight work has joined
    Halt,
}

impl TaskOutcome {
    pub fn is_halt(self) -> bool {
        self == TaskOutcome::Halt
    }

    fn incomplete(stop_on_incompletion: bool) -> Self {
        if stop_on_incompletion {
            TaskOutcome::Halt
        } else {
            TaskOutcome::Stop
        }
    }
}

/// Whether a run profile name denotes an import (delta or full).
///
/// Matches the `DISO`/`FISO` naming convention, ignoring case.
pub fn is_import_run_profile(run_profile: &str) -> bool {
    IMPORT_RUN_PROFILE_PREFIXES.iter().any(|prefix| {
        run_profile
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Runs schedules against a set of capability executors
pub struct ExecutionEngine {
    executors: Executors,
    what_if: bool,
    counters: StatCounters,
}

impl ExecutionEngine {
    pub fn new(executors: Executors) -> Self {
        Self {
            executors,
            what_if: false,
            counters: StatCounters::default(),
        }
    }

    /// Mark log lines as a dry run
    pub fn with_what_if(mut self, what_if: bool) -> Self {
        self.what_if = what_if;
        self
    }

    /// Counters of the current (or last) run
    pub fn statistics(&self) -> RunStatistics {
        self.counters.snapshot()
    }

    fn prefix(&self) -> &'static str {
        log_prefix(self.what_if)
    }

    /// Validate and run a whole schedule.
    ///
    /// Structural errors are returned before anything is dispatched. Task
    /// failures never surface as errors; they end up in the report.
    pub async fn execute_schedule(&self, schedule: &mut Schedule) -> Result<RunReport, ScheduleError> {
        validate_block_siblings(&schedule.tasks, &schedule.name)?;

        let prefix = self.prefix();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();
        let stop_on_incompletion = schedule.stop_on_incompletion;
        self.counters.reset();

        info!(
            "{}Starting schedule '{}' with {} tasks (stop on incompletion: {}, run {})",
            prefix,
            schedule.name,
            schedule.task_count(),
            stop_on_incompletion,
            run_id
        );

        let mut imports_had_changes = false;
        let outcome = self
            .execute_tasks(&mut schedule.tasks, stop_on_incompletion, &mut imports_had_changes)
            .await;

        let report = RunReport {
            run_id,
            schedule: schedule.name.clone(),
            what_if: self.what_if,
            stop_on_incompletion,
            halted: outcome.is_halt(),
            imports_had_changes,
            started_at,
            finished_at: Utc::now(),
            duration: timer.elapsed(),
            statistics: self.counters.snapshot(),
        };

        if report.halted {
            warn!("{}{}", prefix, report.summary());
        } else {
            info!("{}{}", prefix, report.summary());
        }
        Ok(report)
    }

    /// Run a sibling list: in order when every task is a `Block`,
    /// concurrently otherwise.
    pub fn execute_tasks<'a>(
        &'a self,
        tasks: &'a mut [ScheduleTask],
        stop_on_incompletion: bool,
        imports_had_changes: &'a mut bool,
    ) -> BoxFuture<'a, TaskOutcome> {
        async move {
            if tasks.is_empty() {
                return TaskOutcome::Continue;
            }
            if tasks.iter().all(ScheduleTask::is_block) {
                self.execute_sequential(tasks, stop_on_incompletion, imports_had_changes)
                    .await
            } else {
                self.execute_parallel(tasks, stop_on_incompletion, imports_had_changes)
                    .await
            }
        }
        .boxed()
    }

    /// Run one task through gate, dispatch and resolve, then its children
    pub fn execute_task<'a>(
        &'a self,
        task: &'a mut ScheduleTask,
        stop_on_incompletion: bool,
        imports_had_changes: &'a mut bool,
    ) -> BoxFuture<'a, TaskOutcome> {
        async move {
            let prefix = self.prefix();

            if !self.should_run(task, *imports_had_changes).await {
                let skipped = task.subtree_size();
                info!(
                    "{}Not running task '{}' or its {} child task(s)",
                    prefix,
                    task,
                    skipped - 1
                );
                self.counters.skipped(skipped);
                return TaskOutcome::Stop;
            }

            info!("{}Executing task: {}", prefix, task);
            self.counters.dispatched();
            let task_complete = self.dispatch(task).await;

            if !task_complete {
                self.counters.failed();
                if task.retry_required {
                    warn!("{}Task '{}' did not complete, a retry was requested", prefix, task);
                } else {
                    self.counters.skipped(task.subtree_size() - 1);
                    if stop_on_incompletion {
                        warn!(
                            "{}Task '{}' did not complete and the schedule stops on incompletion",
                            prefix, task
                        );
                    } else {
                        warn!(
                            "{}Task '{}' did not complete, skipping its {} child task(s)",
                            prefix,
                            task,
                            task.children.len()
                        );
                    }
                }
                return TaskOutcome::incomplete(stop_on_incompletion);
            }

            self.counters.completed();
            if let TaskKind::DirectorySyncRun { run_profile, .. } = &task.kind {
                self.record_imports(&task.name, run_profile, imports_had_changes)
                    .await;
            }

            match self
                .execute_tasks(&mut task.children, stop_on_incompletion, imports_had_changes)
                .await
            {
                TaskOutcome::Halt => TaskOutcome::Halt,
                _ => TaskOutcome::Continue,
            }
        }
        .boxed()
    }

    async fn should_run(&self, task: &ScheduleTask, imports_had_changes: bool) -> bool {
        let prefix = self.prefix();
        match &task.kind {
            TaskKind::DirectorySyncRun {
                only_if_pending_exports: true,
                ..
            } => match self.executors.run_profiles.has_pending_exports(&task.name).await {
                Ok(true) => true,
                Ok(false) => {
                    info!("{}No pending exports in '{}'", prefix, task.name);
                    false
                }
                Err(e) => {
                    error!(
                        "{}Checking pending exports for '{}' failed: {}",
                        prefix, task.name, e
                    );
                    false
                }
            },
            TaskKind::ContinuationCondition { condition } => match condition {
                ContinuationConditionKind::ManagementAgentsHadImports => {
                    info!(
                        "{}Continuation condition {}: {}",
                        prefix, condition, imports_had_changes
                    );
                    imports_had_changes
                }
            },
            _ => true,
        }
    }

    /// Invoke the executor for the task's kind; `true` when it completed
    async fn dispatch(&self, task: &mut ScheduleTask) -> bool {
        let result = match &task.kind {
            TaskKind::DirectorySyncRun { run_profile, .. } => {
                match self
                    .executors
                    .run_profiles
                    .execute_run_profile(&task.name, run_profile)
                    .await
                {
                    Ok(outcome) => {
                        if outcome.retry_required {
                            task.retry_required = true;
                        }
                        Ok(outcome.completed)
                    }
                    Err(e) => Err(e),
                }
            }
            TaskKind::Executable {
                command,
                arguments,
                show_window,
            } => {
                self.executors
                    .processes
                    .run_executable(command, arguments.as_deref(), *show_window)
                    .await
            }
            TaskKind::PowerShellScript { path } => {
                self.executors
                    .processes
                    .run_script(ScriptKind::PowerShell, path)
                    .await
            }
            TaskKind::VisualBasicScript { path } => {
                self.executors
                    .processes
                    .run_script(ScriptKind::VisualBasic, path)
                    .await
            }
            TaskKind::DatabaseCommand { command, server } => {
                self.executors.database.execute(command, server).await
            }
            TaskKind::ContinuationCondition { .. } | TaskKind::Block => Ok(true),
        };

        match result {
            Ok(completed) => completed,
            Err(e) => {
                error!("{}Task '{}' failed: {}", self.prefix(), task, e);
                false
            }
        }
    }

    /// Raise the branch flag when an import left pending imports behind
    async fn record_imports(&self, agent: &str, run_profile: &str, imports_had_changes: &mut bool) {
        if *imports_had_changes || !is_import_run_profile(run_profile) {
            return;
        }
        match self.executors.run_profiles.has_pending_imports(agent).await {
            Ok(true) => {
                info!("{}'{}' has pending imports after {}", self.prefix(), agent, run_profile);
                *imports_had_changes = true;
            }
            Ok(false) => debug!("{}'{}' has no pending imports", self.prefix(), agent),
            Err(e) => warn!(
                "{}Checking pending imports for '{}' failed: {}",
                self.prefix(),
                agent,
                e
            ),
        }
    }

    /// Run a task with panics turned into an incomplete outcome
    async fn execute_guarded(
        &self,
        task: &mut ScheduleTask,
        stop_on_incompletion: bool,
        imports_had_changes: &mut bool,
    ) -> TaskOutcome {
        let description = task.to_string();
        let result = AssertUnwindSafe(self.execute_task(task, stop_on_incompletion, imports_had_changes))
            .catch_unwind()
            .await;

        match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                error!(
                    "{}Task '{}' panicked: {}",
                    self.prefix(),
                    description,
                    panic_message(payload.as_ref())
                );
                self.counters.failed();
                TaskOutcome::incomplete(stop_on_incompletion)
            }
        }
    }

    /// Rerun a task once. The flag is cleared first and never honoured twice.
    async fn retry(
        &self,
        task: &mut ScheduleTask,
        stop_on_incompletion: bool,
        imports_had_changes: &mut bool,
    ) -> TaskOutcome {
        task.retry_required = false;
        self.counters.retried();
        info!("{}Retrying task '{}' sequentially", self.prefix(), task);

        let outcome = self
            .execute_guarded(task, stop_on_incompletion, imports_had_changes)
            .await;

        if task.retry_required {
            task.retry_required = false;
            self.counters.skipped(task.subtree_size() - 1);
            warn!(
                "{}Task '{}' requested another retry, giving up after one",
                self.prefix(),
                task
            );
        }
        outcome
    }

    /// Drop a pending retry after the schedule halted
    fn abandon_retry(&self, task: &mut ScheduleTask) {
        task.retry_required = false;
        let skipped = task.subtree_size() - 1;
        self.counters.skipped(skipped);
        warn!(
            "{}Not retrying task '{}' as the schedule is halting ({} child task(s) not run)",
            self.prefix(),
            task,
            skipped
        );
    }

    /// Settle a first-pass outcome, retrying the task if it asked for one
    async fn settle(
        &self,
        task: &mut ScheduleTask,
        first_pass: TaskOutcome,
        stop_on_incompletion: bool,
        imports_had_changes: &mut bool,
    ) -> TaskOutcome {
        if task.retry_required {
            self.retry(task, stop_on_incompletion, imports_had_changes)
                .await
        } else {
            first_pass
        }
    }

    async fn execute_sequential(
        &self,
        tasks: &mut [ScheduleTask],
        stop_on_incompletion: bool,
        imports_had_changes: &mut bool,
    ) -> TaskOutcome {
        let sizes: Vec<usize> = tasks.iter().map(ScheduleTask::subtree_size).collect();

        for (index, task) in tasks.iter_mut().enumerate() {
            let first_pass = self
                .execute_guarded(task, stop_on_incompletion, imports_had_changes)
                .await;
            let outcome = self
                .settle(task, first_pass, stop_on_incompletion, imports_had_changes)
                .await;

            if outcome.is_halt() {
                let remaining: usize = sizes[index + 1..].iter().sum();
                warn!(
                    "{}Not continuing to process the schedule due to the task '{}' not completing ({} task(s) not run)",
                    self.prefix(),
                    task,
                    remaining
                );
                self.counters.skipped(remaining);
                return TaskOutcome::Halt;
            }
        }
        TaskOutcome::Continue
    }

    async fn execute_parallel(
        &self,
        tasks: &mut [ScheduleTask],
        stop_on_incompletion: bool,
        imports_had_changes: &mut bool,
    ) -> TaskOutcome {
        debug!("{}Running {} tasks in parallel", self.prefix(), tasks.len());

        let mut branch_flags = vec![*imports_had_changes; tasks.len()];
        let first_pass = join_all(
            tasks
                .iter_mut()
                .zip(branch_flags.iter_mut())
                .map(|(task, flag)| self.execute_guarded(task, stop_on_incompletion, flag)),
        )
        .await;

        *imports_had_changes = branch_flags
            .into_iter()
            .fold(*imports_had_changes, |merged, flag| merged || flag);

        let mut halted = false;
        let mut retries = Vec::new();
        for (index, (task, first_pass)) in tasks.iter().zip(first_pass).enumerate() {
            if task.retry_required {
                retries.push(index);
            } else {
                halted |= first_pass.is_halt();
            }
        }

        // No retry starts once the cohort has halted
        for index in retries {
            let task = &mut tasks[index];
            if halted {
                self.abandon_retry(task);
                continue;
            }
            let outcome = self
                .retry(task, stop_on_incompletion, imports_had_changes)
                .await;
            halted |= outcome.is_halt();
        }

        if halted {
            warn!(
                "{}Not continuing to process the schedule, a parallel task did not complete",
                self.prefix()
            );
            TaskOutcome::Halt
        } else {
            TaskOutcome::Continue
        }
    }
}
