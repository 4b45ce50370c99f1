use serde::{Deserialize, Serialize};
use std::fmt;

/// A whole schedule to be executed, including all of its tasks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Schedule {
    /// Human-friendly name of the schedule
    pub name: String,
    /// If set, a task not completing halts the whole schedule once in-flight work joins
    #[serde(default)]
    pub stop_on_incompletion: bool,
    /// Root tasks, in declaration order
    #[serde(default)]
    pub tasks: Vec<ScheduleTask>,
}

/// An item of work for the scheduler to perform. Can contain child tasks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScheduleTask {
    /// Display name, used as the task's identity in logs
    pub name: String,
    /// What the task does, with the fields only that kind uses
    pub kind: TaskKind,
    /// Set by the engine when an executor hints that a retry may succeed.
    /// Consumed (and cleared) by the sibling list that owns the task.
    #[serde(skip)]
    pub retry_required: bool,
    /// Child tasks, executed only once this task has run and completed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ScheduleTask>,
}

/// Closed set of operations a task can represent
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Executes a run profile on the management agent named by the task
    DirectorySyncRun {
        run_profile: String,
        #[serde(default)]
        only_if_pending_exports: bool,
    },
    /// Runs an arbitrary executable
    Executable {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
        #[serde(default)]
        show_window: bool,
    },
    /// Runs a PowerShell script by path
    PowerShellScript { path: String },
    /// Runs a VBScript by path through the console script host
    VisualBasicScript { path: String },
    /// Executes a SQL command against a database server
    DatabaseCommand { command: String, server: String },
    /// Gates the subtree on state accumulated earlier in the branch
    ContinuationCondition { condition: ContinuationConditionKind },
    /// Performs no action. Block siblings run in sequence.
    Block,
}

/// Condition evaluated by a continuation-condition task
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationConditionKind {
    /// Continue only if an import run profile earlier in the branch left
    /// pending imports behind
    ManagementAgentsHadImports,
}

/// Discriminant-only view of [`TaskKind`], handy for logs and statistics
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKindTag {
    DirectorySyncRun,
    Executable,
    PowerShellScript,
    VisualBasicScript,
    DatabaseCommand,
    ContinuationCondition,
    Block,
}

impl Schedule {
    /// Create an empty schedule
    pub fn new(name: impl Into<String>, stop_on_incompletion: bool) -> Self {
        Self {
            name: name.into(),
            stop_on_incompletion,
            tasks: Vec::new(),
        }
    }

    /// Append a root task
    pub fn with_task(mut self, task: ScheduleTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Total number of tasks in the tree, at every depth
    pub fn task_count(&self) -> usize {
        self.tasks.iter().map(ScheduleTask::subtree_size).sum()
    }

    /// Indented, one-line-per-task rendering of the tree
    pub fn outline(&self) -> String {
        fn walk(tasks: &[ScheduleTask], depth: usize, out: &mut String) {
            for task in tasks {
                out.push_str(&format!(
                    "{}- [{}] {}\n",
                    "  ".repeat(depth),
                    task.kind_tag(),
                    task
                ));
                walk(&task.children, depth + 1, out);
            }
        }

        let mut out = format!(
            "{} (stop on incompletion: {})\n",
            self.name, self.stop_on_incompletion
        );
        walk(&self.tasks, 1, &mut out);
        out
    }
}

impl ScheduleTask {
    /// Create a task without children
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            retry_required: false,
            children: Vec::new(),
        }
    }

    /// Run-profile task against the management agent `agent`
    pub fn directory_sync_run(agent: impl Into<String>, run_profile: impl Into<String>) -> Self {
        Self::new(
            agent,
            TaskKind::DirectorySyncRun {
                run_profile: run_profile.into(),
                only_if_pending_exports: false,
            },
        )
    }

    pub fn executable(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            name,
            TaskKind::Executable {
                command: command.into(),
                arguments: None,
                show_window: false,
            },
        )
    }

    pub fn powershell(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, TaskKind::PowerShellScript { path: path.into() })
    }

    pub fn visual_basic_script(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, TaskKind::VisualBasicScript { path: path.into() })
    }

    pub fn database_command(
        name: impl Into<String>,
        command: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            TaskKind::DatabaseCommand {
                command: command.into(),
                server: server.into(),
            },
        )
    }

    /// Continuation condition gate. The name is fixed, as the condition
    /// itself is the only identity such a task has.
    pub fn continuation_condition(condition: ContinuationConditionKind) -> Self {
        Self::new(
            "ContinuationCondition",
            TaskKind::ContinuationCondition { condition },
        )
    }

    pub fn block(name: impl Into<String>) -> Self {
        Self::new(name, TaskKind::Block)
    }

    /// Add a child task
    pub fn with_child(mut self, child: ScheduleTask) -> Self {
        self.children.push(child);
        self
    }

    /// Replace the child list
    pub fn with_children(mut self, children: Vec<ScheduleTask>) -> Self {
        self.children = children;
        self
    }

    /// Only run this run-profile task if the agent has pending exports.
    /// No effect on other kinds.
    pub fn only_if_pending_exports(mut self, value: bool) -> Self {
        if let TaskKind::DirectorySyncRun {
            only_if_pending_exports,
            ..
        } = &mut self.kind
        {
            *only_if_pending_exports = value;
        }
        self
    }

    /// Set the arguments of an executable task. No effect on other kinds.
    pub fn with_arguments(mut self, value: impl Into<String>) -> Self {
        if let TaskKind::Executable { arguments, .. } = &mut self.kind {
            *arguments = Some(value.into());
        }
        self
    }

    /// Set window visibility of an executable task. No effect on other kinds.
    pub fn with_show_window(mut self, value: bool) -> Self {
        if let TaskKind::Executable { show_window, .. } = &mut self.kind {
            *show_window = value;
        }
        self
    }

    /// The kind-specific command: run-profile name, script path,
    /// executable path or SQL text. `None` for kinds without one.
    pub fn command(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::DirectorySyncRun { run_profile, .. } => Some(run_profile),
            TaskKind::Executable { command, .. } => Some(command),
            TaskKind::PowerShellScript { path } | TaskKind::VisualBasicScript { path } => {
                Some(path)
            }
            TaskKind::DatabaseCommand { command, .. } => Some(command),
            TaskKind::ContinuationCondition { .. } | TaskKind::Block => None,
        }
    }

    pub fn kind_tag(&self) -> TaskKindTag {
        self.kind.tag()
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, TaskKind::Block)
    }

    /// Number of tasks in this subtree, including this one
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(ScheduleTask::subtree_size)
            .sum::<usize>()
    }
}

impl fmt::Display for ScheduleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TaskKind::DirectorySyncRun { run_profile, .. } => {
                write!(f, "{} - {}", self.name, run_profile)
            }
            _ => write!(f, "{}", self.name),
        }
    }
}

impl TaskKind {
    pub fn tag(&self) -> TaskKindTag {
        match self {
            TaskKind::DirectorySyncRun { .. } => TaskKindTag::DirectorySyncRun,
            TaskKind::Executable { .. } => TaskKindTag::Executable,
            TaskKind::PowerShellScript { .. } => TaskKindTag::PowerShellScript,
            TaskKind::VisualBasicScript { .. } => TaskKindTag::VisualBasicScript,
            TaskKind::DatabaseCommand { .. } => TaskKindTag::DatabaseCommand,
            TaskKind::ContinuationCondition { .. } => TaskKindTag::ContinuationCondition,
            TaskKind::Block => TaskKindTag::Block,
        }
    }
}

impl fmt::Display for TaskKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKindTag::DirectorySyncRun => "DirectorySyncRun",
            TaskKindTag::Executable => "Executable",
            TaskKindTag::PowerShellScript => "PowerShellScript",
            TaskKindTag::VisualBasicScript => "VisualBasicScript",
            TaskKindTag::DatabaseCommand => "DatabaseCommand",
            TaskKindTag::ContinuationCondition => "ContinuationCondition",
            TaskKindTag::Block => "Block",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ContinuationConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinuationConditionKind::ManagementAgentsHadImports => {
                f.write_str("ManagementAgentsHadImports")
            }
        }
    }
}
