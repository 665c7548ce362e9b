//! Per-task placement and dispatch
//!
//! Each task moves through `Unplaced -> Reserving -> Dispatched` and ends in
//! `Completed`, `Failed`, `Unplaceable` or `Cancelled`. A node-level failure
//! sends the task to `RetryPending`; the failing node is recorded in the
//! task's attempts and is never chosen for that task again.

use locus_core::{SchedulerSettings, Task, TaskState, UnplaceableReason};
use locus_runtime::{Dispatch, ExecutionOutcome, ExecutionRuntime};
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capacity::{CapacityTracker, SlotGuard};
use crate::placement::{Eligibility, LocalityPlacement, PlacementStrategy};
use crate::registry::NodeRegistry;

/// Job-scoped inputs for running one task
#[derive(Clone)]
pub struct TaskContext {
    pub job_id: String,
    /// Node failures tolerated before the task is unplaceable
    pub max_attempts: u32,
    /// Job-wide cap on concurrently dispatched tasks
    pub cores: Option<Arc<Semaphore>>,
    /// Flips to `true` when the job is cancelled
    pub cancel: watch::Receiver<bool>,
}

/// Result of one reservation round
enum Reservation {
    /// A slot, plus the job's core permit when it has a core limit
    Reserved(SlotGuard, Option<OwnedSemaphorePermit>),
    Saturated,
    Unplaceable(UnplaceableReason),
    Cancelled,
}

/// Places tasks on nodes and drives them through the execution runtime
pub struct TaskScheduler {
    registry: Arc<NodeRegistry>,
    capacity: Arc<CapacityTracker>,
    placement_strategy: Arc<dyn PlacementStrategy>,
    runtime: Arc<dyn ExecutionRuntime>,
    settings: SchedulerSettings,
}

impl TaskScheduler {
    /// Create a scheduler using locality placement
    pub fn new(
        registry: Arc<NodeRegistry>,
        runtime: Arc<dyn ExecutionRuntime>,
        settings: SchedulerSettings,
    ) -> Self {
        info!(
            runtime = runtime.name(),
            nodes = registry.available_nodes().len(),
            max_attempts = settings.max_attempts,
            "Task scheduler initialized"
        );

        Self {
            capacity: Arc::clone(registry.capacity()),
            registry,
            placement_strategy: Arc::new(LocalityPlacement),
            runtime,
            settings,
        }
    }

    /// Replace the placement strategy
    pub fn with_strategy(mut self, strategy: Arc<dyn PlacementStrategy>) -> Self {
        self.placement_strategy = strategy;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Run a task to a terminal state.
    ///
    /// `on_update` sees the task after every state transition, including the
    /// final one.
    pub async fn run_task<F>(&self, mut task: Task, mut ctx: TaskContext, on_update: F) -> Task
    where
        F: Fn(&Task) + Send + Sync,
    {
        loop {
            task.state = TaskState::Reserving;
            on_update(&task);

            let (slot, permit) = match self.reserve(&task, &mut ctx).await {
                Reservation::Reserved(slot, permit) => (slot, permit),
                Reservation::Unplaceable(reason) => {
                    return self.finish_unplaceable(task, &ctx, reason, &on_update);
                }
                Reservation::Cancelled => return finish(task, TaskState::Cancelled, &on_update),
                Reservation::Saturated => {
                    match self.wait_for_capacity(&task, &mut ctx).await {
                        Some(()) => continue,
                        None if *ctx.cancel.borrow() => {
                            return finish(task, TaskState::Cancelled, &on_update);
                        }
                        None => {
                            return self.finish_unplaceable(
                                task,
                                &ctx,
                                UnplaceableReason::CapacityExhausted,
                                &on_update,
                            );
                        }
                    }
                }
            };

            let node = slot.host().to_string();
            task.assigned_node = Some(node.clone());
            task.state = TaskState::Dispatched;
            on_update(&task);

            let dispatch = Dispatch {
                job_id: ctx.job_id.clone(),
                task_index: task.index,
                input: task.input.clone(),
                node: node.clone(),
            };

            debug!(
                job_id = %ctx.job_id,
                task = task.index,
                node = %node,
                attempt = task.attempts.len() + 1,
                "Task dispatched"
            );

            let outcome = tokio::select! {
                outcome = self.runtime.execute(&dispatch) => Some(outcome),
                _ = cancelled(&mut ctx.cancel) => None,
            };
            drop(slot);
            drop(permit);

            match outcome {
                None => return finish(task, TaskState::Cancelled, &on_update),
                Some(ExecutionOutcome::Completed(output)) => {
                    debug!(job_id = %ctx.job_id, task = task.index, node = %node, "Task completed");
                    task.output = Some(output);
                    return finish(task, TaskState::Completed, &on_update);
                }
                Some(ExecutionOutcome::ExecutionFailure(message)) => {
                    warn!(
                        job_id = %ctx.job_id,
                        task = task.index,
                        node = %node,
                        error = %message,
                        "Task execution failed"
                    );
                    task.error = Some(message);
                    return finish(task, TaskState::Failed, &on_update);
                }
                Some(ExecutionOutcome::NodeFailure(message)) => {
                    warn!(
                        job_id = %ctx.job_id,
                        task = task.index,
                        node = %node,
                        error = %message,
                        "Node failed task, retrying elsewhere"
                    );
                    task.attempts.push(node);
                    task.assigned_node = None;
                    task.state = TaskState::RetryPending;
                    on_update(&task);

                    if task.attempts.len() >= ctx.max_attempts as usize {
                        return self.finish_unplaceable(
                            task,
                            &ctx,
                            UnplaceableReason::RetriesExhausted,
                            &on_update,
                        );
                    }
                }
            }
        }
    }

    /// One reservation round against a fresh snapshot.
    ///
    /// Candidates are tried in rank order; losing a race for a slot is not a
    /// node failure, so the node is not added to the task's attempts.
    async fn reserve(&self, task: &Task, ctx: &mut TaskContext) -> Reservation {
        let permit = match &ctx.cores {
            Some(cores) => {
                let acquire = Arc::clone(cores).acquire_owned();
                tokio::select! {
                    permit = acquire => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => return Reservation::Cancelled,
                    },
                    _ = cancelled(&mut ctx.cancel) => return Reservation::Cancelled,
                }
            }
            None => None,
        };
        if *ctx.cancel.borrow() {
            return Reservation::Cancelled;
        }

        let snapshot = self.registry.available_nodes();
        let eligibility = self.placement_strategy.eligible_nodes(task, &snapshot);

        if eligibility.is_empty() {
            let reason = if task.attempts.is_empty() {
                UnplaceableReason::NoEligibleNode
            } else {
                UnplaceableReason::RetriesExhausted
            };
            return Reservation::Unplaceable(reason);
        }

        for candidate in &eligibility.candidates {
            if let Some(slot) = self.capacity.reserve(&candidate.host) {
                return Reservation::Reserved(slot, permit);
            }
            debug!(
                job_id = %ctx.job_id,
                task = task.index,
                node = %candidate.host,
                "Lost reservation race"
            );
        }

        Reservation::Saturated
    }

    /// Wait until a slot frees up on one of the task's eligible nodes.
    ///
    /// The capacity timeout bounds how long the eligible nodes may go without
    /// releasing any slot. A release restarts it even when another task takes
    /// the slot first, so a long queue on busy nodes never times out.
    /// Returns `None` on cancellation or when the timeout passes.
    async fn wait_for_capacity(&self, task: &Task, ctx: &mut TaskContext) -> Option<()> {
        debug!(job_id = %ctx.job_id, task = task.index, "Waiting for capacity");

        let timeout = self.settings.capacity_timeout();
        let mut deadline = Instant::now() + timeout;
        let mut seen_releases: Option<u64> = None;

        loop {
            let released = self.capacity.capacity_released();
            tokio::pin!(released);
            released.as_mut().enable();

            // Re-check after enabling so a release in between is not lost.
            let snapshot = self.registry.available_nodes();
            let eligibility = self.placement_strategy.eligible_nodes(task, &snapshot);
            if eligibility.is_empty() || eligibility.candidates.iter().any(|n| n.has_capacity()) {
                return Some(());
            }

            let releases = self.eligible_releases(&eligibility);
            if seen_releases.is_some_and(|seen| seen != releases) {
                deadline = Instant::now() + timeout;
            }
            seen_releases = Some(releases);

            tokio::select! {
                _ = &mut released => {}
                _ = tokio::time::sleep_until(deadline) => return None,
                _ = cancelled(&mut ctx.cancel) => return None,
            }
        }
    }

    /// Total slots released so far on every node in `eligibility`
    fn eligible_releases(&self, eligibility: &Eligibility) -> u64 {
        eligibility
            .candidates
            .iter()
            .chain(&eligibility.saturated)
            .fold(0u64, |sum, n| sum.wrapping_add(self.capacity.releases(&n.host)))
    }

    fn finish_unplaceable<F>(
        &self,
        task: Task,
        ctx: &TaskContext,
        reason: UnplaceableReason,
        on_update: &F,
    ) -> Task
    where
        F: Fn(&Task),
    {
        warn!(
            job_id = %ctx.job_id,
            task = task.index,
            input = %task.input,
            locality = %task.locality,
            attempts = ?task.attempts,
            %reason,
            "Task unplaceable"
        );
        finish(task, TaskState::Unplaceable(reason), on_update)
    }
}

fn finish<F>(mut task: Task, state: TaskState, on_update: &F) -> Task
where
    F: Fn(&Task),
{
    task.state = state;
    on_update(&task);
    task
}

/// Resolves once the cancel flag is set. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
