//! Runtime trait definitions

use async_trait::async_trait;
use locus_core::InputLocator;
use serde::{Deserialize, Serialize};

/// A placed task handed to the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispatch {
    /// Owning job
    pub job_id: String,
    /// Task position within the job
    pub task_index: usize,
    pub input: InputLocator,
    /// Node chosen by the scheduler
    pub node: String,
}

/// What the runtime reports back for a dispatched task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// Task finished and produced output
    Completed(String),
    /// The node could not run the task (unreachable, rejected, crashed).
    /// The scheduler re-places the task elsewhere.
    NodeFailure(String),
    /// The task itself failed; never retried by re-placement
    ExecutionFailure(String),
}

/// Runtime trait for executing placed tasks
#[async_trait]
pub trait ExecutionRuntime: Send + Sync {
    /// Run a task on its assigned node and wait for the outcome
    async fn execute(&self, dispatch: &Dispatch) -> ExecutionOutcome;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}
