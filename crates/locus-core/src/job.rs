//! Job, Task, and locality type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LocusError, LocusResult, UnplaceableReason};
use crate::locator::InputLocator;

/// Locality policy for every task of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalityMode {
    /// Any available node
    #[default]
    Any,
    /// Only the node named by the input's host
    ForceLocal,
    /// Any available node except the input's host
    ForceRemote,
}

impl std::fmt::Display for LocalityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalityMode::Any => write!(f, "any"),
            LocalityMode::ForceLocal => write!(f, "force_local"),
            LocalityMode::ForceRemote => write!(f, "force_remote"),
        }
    }
}

/// Per-job scheduler options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run each task on its input's host
    pub force_local: bool,
    /// Never run a task on its input's host
    pub force_remote: bool,
    /// Upper bound on concurrently dispatched tasks of this job
    pub max_cores: Option<u32>,
    /// Node failures tolerated per task; falls back to the cluster default
    pub max_attempts: Option<u32>,
}

impl SchedulerConfig {
    /// Resolve the locality mode, rejecting conflicting flags
    pub fn locality(&self) -> LocusResult<LocalityMode> {
        match (self.force_local, self.force_remote) {
            (true, true) => Err(LocusError::Config(
                "force_local and force_remote are mutually exclusive".to_string(),
            )),
            (true, false) => Ok(LocalityMode::ForceLocal),
            (false, true) => Ok(LocalityMode::ForceRemote),
            (false, false) => Ok(LocalityMode::Any),
        }
    }

    /// Validate every option
    pub fn validate(&self) -> LocusResult<LocalityMode> {
        if self.max_cores == Some(0) {
            return Err(LocusError::Config("max_cores must be positive".to_string()));
        }
        if self.max_attempts == Some(0) {
            return Err(LocusError::Config(
                "max_attempts must be positive".to_string(),
            ));
        }
        self.locality()
    }
}

/// A job as submitted by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Human-readable name
    pub name: String,
    /// Input locators, one task per entry
    pub inputs: Vec<String>,
    /// Scheduler options
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl JobSpec {
    /// Create a job spec with default scheduler options
    pub fn new(name: impl Into<String>, inputs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            inputs,
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Replace the scheduler options
    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }
}

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum TaskState {
    Unplaced,
    Reserving,
    Dispatched,
    RetryPending,
    Completed,
    /// Execution failed for reasons unrelated to the node
    Failed,
    Unplaceable(UnplaceableReason),
    Cancelled,
}

impl TaskState {
    /// Whether the task will not change state again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed
                | TaskState::Failed
                | TaskState::Unplaceable(_)
                | TaskState::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Unplaced => write!(f, "Unplaced"),
            TaskState::Reserving => write!(f, "Reserving"),
            TaskState::Dispatched => write!(f, "Dispatched"),
            TaskState::RetryPending => write!(f, "RetryPending"),
            TaskState::Completed => write!(f, "Completed"),
            TaskState::Failed => write!(f, "Failed"),
            TaskState::Unplaceable(reason) => write!(f, "Unplaceable ({})", reason),
            TaskState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One unit of work: a single input of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Position of the input within the job
    pub index: usize,
    pub input: InputLocator,
    pub locality: LocalityMode,
    /// Node currently (or finally) running the task
    pub assigned_node: Option<String>,
    /// Nodes that failed or rejected this task, in order
    pub attempts: Vec<String>,
    pub state: TaskState,
    /// Runtime output on success
    pub output: Option<String>,
    /// Runtime error message on execution failure
    pub error: Option<String>,
}

impl Task {
    /// Create an unplaced task
    pub fn new(index: usize, input: InputLocator, locality: LocalityMode) -> Self {
        Self {
            index,
            input,
            locality,
            assigned_node: None,
            attempts: Vec::new(),
            state: TaskState::Unplaced,
            output: None,
            error: None,
        }
    }

    /// Whether the node already failed this task
    pub fn has_attempted(&self, host: &str) -> bool {
        self.attempts.iter().any(|h| h == host)
    }
}

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "Pending"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Outcome of a single task in a finished job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub input: String,
    pub node: Option<String>,
    pub attempts: Vec<String>,
    pub output: Option<String>,
}

impl From<&Task> for TaskReport {
    fn from(task: &Task) -> Self {
        Self {
            input: task.input.to_string(),
            node: task.assigned_node.clone(),
            attempts: task.attempts.clone(),
            output: task.output.clone(),
        }
    }
}

/// Result of a successfully completed job, in input order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub name: String,
    pub tasks: Vec<TaskReport>,
}

/// Progress summary for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub name: String,
    pub state: JobState,
    pub locality: LocalityMode,
    pub total: usize,
    /// Tasks not yet dispatched
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub unplaceable: usize,
    pub cancelled: usize,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Summarize a task set
    pub fn summarize(
        id: Uuid,
        name: String,
        state: JobState,
        locality: LocalityMode,
        tasks: &[Task],
        submitted_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut status = Self {
            id,
            name,
            state,
            locality,
            total: tasks.len(),
            pending: 0,
            running: 0,
            completed: 0,
            failed: 0,
            unplaceable: 0,
            cancelled: 0,
            submitted_at,
            finished_at,
        };

        for task in tasks {
            match task.state {
                TaskState::Unplaced | TaskState::Reserving | TaskState::RetryPending => {
                    status.pending += 1
                }
                TaskState::Dispatched => status.running += 1,
                TaskState::Completed => status.completed += 1,
                TaskState::Failed => status.failed += 1,
                TaskState::Unplaceable(_) => status.unplaceable += 1,
                TaskState::Cancelled => status.cancelled += 1,
            }
        }

        status
    }
}
