//! # MIM Synchronisation Scheduler
//!
//! Executes tree-shaped schedules of directory synchronisation run profiles,
//! scripts, executables and database commands. Sibling tasks run in
//! parallel unless they are all `Block`s, which run in declaration order.
//! Children run only after their parent completed.
//!
//! ## Architecture Overview
//!
//! - **[`schedule`]**: the task model, the tree validator and the XML loader
//! - **[`engine`]**: walks a validated tree, gating, dispatching, retrying and
//!   merging the "imports had changes" flag at every join
//! - **[`executor`]**: capability traits the engine dispatches to, with host,
//!   `sqlcmd`, CIM bridge and WHATIF implementations
//! - **[`cli`]**: argument parsing, configuration discovery and logging setup
//! - **[`env`]**: names, paths and naming conventions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mim_scheduler::{ExecutionEngine, Executors, ScheduleLoader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut schedule = ScheduleLoader::load_file("schedule.xml")?;
//!
//!     let engine = ExecutionEngine::new(Executors::what_if()).with_what_if(true);
//!     let report = engine.execute_schedule(&mut schedule).await?;
//!
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

/// Task model, tree validation and schedule loading.
///
/// Schedules are trees of tasks. Every sibling list is either all `Block`
/// tasks or contains none; anything else is rejected before execution.
pub mod schedule;

/// Execution engine.
///
/// Runs the per-task state machine and coordinates sibling lists.
pub mod engine;

/// Capability executors.
///
/// Narrow async traits for run profiles, processes and database commands,
/// plus the implementations that talk to the host.
pub mod executor;

/// Environment constants and path utilities.
///
/// Centralizes all hardcoded paths and directory names used throughout
/// the application for easier maintenance and consistency.
pub mod env;

// CLI module for command-line interface
pub mod cli;

// Re-export the task model
pub use schedule::{
    ContinuationConditionKind, LoadError, Schedule, ScheduleError, ScheduleLoader, ScheduleTask,
    TaskKind, validate,
};

// Re-export engine types
pub use engine::{ExecutionEngine, RunReport, RunStatistics, TaskOutcome};

// Re-export executor types
pub use executor::{
    DatabaseExecutor, ExecutorError, ExecutorSettings, Executors, ProcessExecutor,
    RunProfileExecutor, RunProfileOutcome, ScriptKind,
};
