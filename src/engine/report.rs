use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Identifier of one engine run
pub type RunId = Uuid;

/// Counters gathered while walking the schedule.
///
/// `completed` and `failed` count attempts, so a retried task that
/// succeeds the second time contributes to both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Tasks that passed their gate and reached dispatch
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    /// Tasks never evaluated because of a gate, a failed parent or a halt
    pub skipped: u64,
    pub retried: u64,
}

/// Outcome of one run of a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub schedule: String,
    pub what_if: bool,
    pub stop_on_incompletion: bool,
    /// Whether a task failure halted the schedule
    pub halted: bool,
    /// Final value of the merged "imports had changes" flag
    pub imports_had_changes: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub statistics: RunStatistics,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !self.halted
    }

    /// One-line summary for the log
    pub fn summary(&self) -> String {
        let stats = &self.statistics;
        format!(
            "Schedule '{}' {} in {:.1}s: {} dispatched, {} completed, {} failed, {} skipped, {} retried",
            self.schedule,
            if self.halted { "halted" } else { "finished" },
            self.duration.as_secs_f64(),
            stats.dispatched,
            stats.completed,
            stats.failed,
            stats.skipped,
            stats.retried,
        )
    }
}

/// Lock-free counters shared by concurrent branches
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
}

impl StatCounters {
    pub(crate) fn dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skipped(&self, count: usize) {
        self.skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.dispatched,
            &self.completed,
            &self.failed,
            &self.skipped,
            &self.retried,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}
