//! Job controller
//!
//! Owns every submitted job and its task set, runs the tasks concurrently
//! through the `TaskScheduler`, and folds their terminal states into one job
//! result. Unplaceable tasks are reported together in a single placement
//! error; whole jobs are never retried.

use chrono::{DateTime, Utc};
use locus_core::{
    InputLocator, JobReport, JobSpec, JobState, JobStatus, LocalityMode, LocusError, LocusResult,
    PlacementError, SchedulerConfig, Task, TaskReport, TaskState, UnplaceableInput,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::scheduler::{TaskContext, TaskScheduler};

type JobsMap = HashMap<Uuid, Arc<JobRecord>>;

/// Everything the controller keeps about one job
struct JobRecord {
    id: Uuid,
    name: String,
    config: SchedulerConfig,
    locality: LocalityMode,
    tasks: Mutex<Vec<Task>>,
    state: watch::Sender<JobState>,
    cancel: watch::Sender<bool>,
    submitted_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobRecord {
    fn tasks(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_task(&self, task: &Task) {
        if let Some(slot) = self.tasks().get_mut(task.index) {
            *slot = task.clone();
        }
    }

    fn status(&self) -> JobStatus {
        let finished_at = *self.finished_at.lock().unwrap_or_else(|e| e.into_inner());
        JobStatus::summarize(
            self.id,
            self.name.clone(),
            *self.state.borrow(),
            self.locality,
            &self.tasks(),
            self.submitted_at,
            finished_at,
        )
    }

    /// Terminal job state implied by the task states
    fn resolve_state(&self) -> JobState {
        let tasks = self.tasks();
        if *self.cancel.borrow() && tasks.iter().any(|t| t.state == TaskState::Cancelled) {
            JobState::Cancelled
        } else if tasks.iter().all(|t| t.state == TaskState::Completed) {
            JobState::Completed
        } else {
            JobState::Failed
        }
    }

    /// Build the caller-facing result of a finished job
    fn result(&self) -> LocusResult<JobReport> {
        let state = *self.state.borrow();
        let tasks = self.tasks();

        if state == JobState::Cancelled {
            return Err(LocusError::Cancelled(self.id.to_string()));
        }

        let offenders: Vec<UnplaceableInput> = tasks
            .iter()
            .filter_map(|t| match t.state {
                TaskState::Unplaceable(reason) => Some(UnplaceableInput {
                    input: t.input.to_string(),
                    reason,
                }),
                _ => None,
            })
            .collect();
        if !offenders.is_empty() {
            return Err(PlacementError {
                job_id: self.id.to_string(),
                offenders,
            }
            .into());
        }

        if let Some(failed) = tasks.iter().find(|t| t.state != TaskState::Completed) {
            return Err(LocusError::Execution {
                input: failed.input.to_string(),
                message: failed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("task ended in state {}", failed.state)),
            });
        }

        Ok(JobReport {
            job_id: self.id,
            name: self.name.clone(),
            tasks: tasks.iter().map(TaskReport::from).collect(),
        })
    }
}

/// Handle to a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    state: watch::Receiver<JobState>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest known job state
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }
}

/// JobController accepts jobs and tracks them to completion
pub struct JobController {
    scheduler: Arc<TaskScheduler>,
    jobs: RwLock<JobsMap>,
}

impl JobController {
    /// Create a new controller
    pub fn new(scheduler: Arc<TaskScheduler>) -> Self {
        Self {
            scheduler,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    /// Submit a job. Configuration and locator errors fail here, before any
    /// task reaches the scheduler.
    pub async fn submit(&self, spec: JobSpec) -> LocusResult<JobHandle> {
        let locality = spec.scheduler.validate()?;
        let inputs = spec
            .inputs
            .iter()
            .map(|raw| InputLocator::parse(raw))
            .collect::<LocusResult<Vec<_>>>()?;

        let id = Uuid::new_v4();
        let tasks: Vec<Task> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| Task::new(index, input, locality))
            .collect();

        info!(
            job_id = %id,
            name = %spec.name,
            tasks = tasks.len(),
            %locality,
            max_cores = ?spec.scheduler.max_cores,
            "Submitting job"
        );

        let (state_tx, state_rx) = watch::channel(JobState::Pending);
        let (cancel_tx, _) = watch::channel(false);
        let record = Arc::new(JobRecord {
            id,
            name: spec.name,
            config: spec.scheduler,
            locality,
            tasks: Mutex::new(tasks),
            state: state_tx,
            cancel: cancel_tx,
            submitted_at: Utc::now(),
            finished_at: Mutex::new(None),
        });

        self.jobs.write().await.insert(id, Arc::clone(&record));
        tokio::spawn(drive_job(Arc::clone(&self.scheduler), record));

        Ok(JobHandle {
            id,
            state: state_rx,
        })
    }

    /// Wait for a job to reach a terminal state and return its result
    pub async fn wait(&self, handle: &JobHandle) -> LocusResult<JobReport> {
        let mut state = handle.state.clone();
        state
            .wait_for(|s| s.is_terminal())
            .await
            .map_err(|_| LocusError::Internal(format!("job {} driver stopped", handle.id)))?;

        self.record(handle.id).await?.result()
    }

    /// Cancel a job. Slots held by its running tasks are released.
    pub async fn cancel(&self, id: Uuid) -> LocusResult<()> {
        let record = self.record(id).await?;
        if record.state.borrow().is_terminal() {
            return Ok(());
        }
        info!(job_id = %id, "Cancelling job");
        record.cancel.send_replace(true);
        Ok(())
    }

    /// Progress of a job
    pub async fn status(&self, id: Uuid) -> LocusResult<JobStatus> {
        Ok(self.record(id).await?.status())
    }

    /// Progress of every known job
    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.values().map(|record| record.status()).collect()
    }

    /// Task states of a job, in input order
    pub async fn tasks(&self, id: Uuid) -> LocusResult<Vec<Task>> {
        Ok(self.record(id).await?.tasks().clone())
    }

    /// Forget a finished job
    pub async fn remove_job(&self, id: Uuid) -> LocusResult<()> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get(&id)
            .ok_or_else(|| LocusError::JobNotFound(id.to_string()))?;
        if !record.state.borrow().is_terminal() {
            return Err(LocusError::Internal(format!("job {} is still running", id)));
        }
        jobs.remove(&id);
        Ok(())
    }

    async fn record(&self, id: Uuid) -> LocusResult<Arc<JobRecord>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| LocusError::JobNotFound(id.to_string()))
    }
}

/// Run every task of a job concurrently and publish the terminal state
async fn drive_job(scheduler: Arc<TaskScheduler>, record: Arc<JobRecord>) {
    record.state.send_replace(JobState::Running);

    let max_attempts = record
        .config
        .max_attempts
        .unwrap_or(scheduler.settings().max_attempts);
    let cores = record
        .config
        .max_cores
        .map(|n| Arc::new(Semaphore::new(n as usize)));

    let tasks = record.tasks().clone();
    let mut set = JoinSet::new();
    for task in tasks {
        let scheduler = Arc::clone(&scheduler);
        let record = Arc::clone(&record);
        let ctx = TaskContext {
            job_id: record.id.to_string(),
            max_attempts,
            cores: cores.clone(),
            cancel: record.cancel.subscribe(),
        };
        set.spawn(async move {
            let observer = Arc::clone(&record);
            scheduler
                .run_task(task, ctx, move |t| observer.update_task(t))
                .await
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!(job_id = %record.id, error = %e, "Task driver panicked");
        }
    }

    // A panicked driver leaves its task non-terminal.
    for task in record.tasks().iter_mut() {
        if !task.state.is_terminal() {
            task.error = Some("task driver panicked".to_string());
            task.state = TaskState::Failed;
        }
    }

    let state = record.resolve_state();
    *record.finished_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());

    match state {
        JobState::Completed => info!(job_id = %record.id, "Job completed"),
        _ => warn!(job_id = %record.id, %state, "Job did not complete"),
    }
    record.state.send_replace(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NodeRegistry;
    use locus_core::{NodeInfo, SchedulerSettings, UnplaceableReason};
    use locus_runtime::SimulatedRuntime;
    use std::time::Duration;

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            max_attempts: 3,
            capacity_timeout_ms: 2_000,
        }
    }

    fn controller_with(
        nodes: Vec<NodeInfo>,
        runtime: Arc<SimulatedRuntime>,
        settings: SchedulerSettings,
    ) -> (JobController, Arc<NodeRegistry>) {
        let registry = Arc::new(NodeRegistry::with_nodes(nodes));
        let scheduler = Arc::new(TaskScheduler::new(
            Arc::clone(&registry),
            runtime,
            settings,
        ));
        (JobController::new(scheduler), registry)
    }

    fn cluster() -> Vec<NodeInfo> {
        vec![
            NodeInfo::new("node1", 2),
            NodeInfo::new("node2", 1),
            NodeInfo::new("node3", 3),
        ]
    }

    fn force_local() -> SchedulerConfig {
        SchedulerConfig {
            force_local: true,
            ..Default::default()
        }
    }

    fn force_remote() -> SchedulerConfig {
        SchedulerConfig {
            force_remote: true,
            ..Default::default()
        }
    }

    /// Two inputs per worker slot on every node, as `http://<node>`
    fn inputs_for(nodes: &[NodeInfo]) -> Vec<String> {
        nodes
            .iter()
            .flat_map(|n| (0..n.max_workers * 2).map(move |_| format!("http://{}", n.host)))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_force_local_runs_every_input_on_its_host() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_millis(20)));
        let (controller, _) = controller_with(cluster(), Arc::clone(&runtime), settings());

        let spec = JobSpec::new("force-local", inputs_for(&cluster())).with_scheduler(force_local());
        let handle = controller.submit(spec).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();

        assert_eq!(report.tasks.len(), 12);
        for task in &report.tasks {
            let input = InputLocator::parse(&task.input).unwrap();
            assert_eq!(task.node.as_deref(), Some(input.host.as_str()));
            assert_eq!(task.output.as_deref(), Some(input.host.as_str()));
        }
        for node in cluster() {
            let stats = runtime.node_stats(&node.host);
            assert!(stats.peak <= node.max_workers);
            assert_eq!(stats.completed, node.max_workers * 2);
        }
        assert_eq!(handle.state(), JobState::Completed);
    }

    #[tokio::test]
    async fn test_force_local_missing_node_fails_job() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) = controller_with(cluster(), runtime, settings());

        let input = "foobar://nonodenamedthishopefully_ifnotthistestwillfail";
        let spec = JobSpec::new("no-node", vec![input.to_string()]).with_scheduler(force_local());
        let handle = controller.submit(spec).await.unwrap();

        match controller.wait(&handle).await {
            Err(LocusError::Placement(err)) => {
                assert_eq!(err.inputs(), vec![input]);
                assert!(err.has_reason(UnplaceableReason::NoEligibleNode));
            }
            other => panic!("expected placement error, got {:?}", other),
        }
        let status = controller.status(handle.id()).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.unplaceable, 1);
    }

    #[tokio::test]
    async fn test_force_remote_missing_node_runs_anywhere() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) = controller_with(cluster(), runtime, settings());

        let input = "foobar://nonodenamedthishopefully_ifnotthistestwillfail";
        let spec = JobSpec::new("remote", vec![input.to_string(); 4]).with_scheduler(force_remote());
        let handle = controller.submit(spec).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();

        for task in &report.tasks {
            let node = task.node.as_deref().unwrap();
            assert_ne!(node, "nonodenamedthishopefully_ifnotthistestwillfail");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_force_remote_never_uses_input_host() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_millis(5)));
        let (controller, _) = controller_with(cluster(), runtime, settings());

        let spec = JobSpec::new("remote", inputs_for(&cluster())).with_scheduler(force_remote());
        let handle = controller.submit(spec).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();

        for task in &report.tasks {
            let input = InputLocator::parse(&task.input).unwrap();
            assert_ne!(task.node.as_deref(), Some(input.host.as_str()));
        }
    }

    #[tokio::test]
    async fn test_force_remote_single_node_is_unplaceable() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) =
            controller_with(vec![NodeInfo::new("node1", 4)], runtime, settings());

        let spec = JobSpec::new("remote", vec!["http://node1/a".to_string()])
            .with_scheduler(force_remote());
        let handle = controller.submit(spec).await.unwrap();

        match controller.wait(&handle).await {
            Err(LocusError::Placement(err)) => {
                assert!(err.has_reason(UnplaceableReason::NoEligibleNode));
            }
            other => panic!("expected placement error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conflicting_locality_rejected_at_submit() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) = controller_with(cluster(), runtime, settings());

        let spec = JobSpec::new("both", vec!["http://node1/a".to_string()]).with_scheduler(
            SchedulerConfig {
                force_local: true,
                force_remote: true,
                ..Default::default()
            },
        );
        assert!(matches!(
            controller.submit(spec).await,
            Err(LocusError::Config(_))
        ));
        assert!(controller.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_blacklisted_node_never_selected() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, registry) =
            controller_with(cluster(), Arc::clone(&runtime), settings());
        registry.blacklist("node3").unwrap();

        let spec = JobSpec::new("any", vec!["http://node3/a".to_string(); 6]);
        let handle = controller.submit(spec).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();

        assert!(report.tasks.iter().all(|t| t.node.as_deref() != Some("node3")));
        assert_eq!(runtime.node_stats("node3").completed, 0);

        let local = JobSpec::new("local", vec!["http://node3/a".to_string()])
            .with_scheduler(force_local());
        let handle = controller.submit(local).await.unwrap();
        assert!(matches!(
            controller.wait(&handle).await,
            Err(LocusError::Placement(_))
        ));
    }

    #[tokio::test]
    async fn test_node_failure_retries_on_other_node() {
        let runtime = Arc::new(SimulatedRuntime::default());
        runtime.set_node_failing("node1", true);
        let (controller, _) = controller_with(
            vec![NodeInfo::new("node1", 1), NodeInfo::new("node2", 1)],
            Arc::clone(&runtime),
            settings(),
        );

        let spec = JobSpec::new("retry", vec!["http://node9/a".to_string()]);
        let handle = controller.submit(spec).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();

        let task = &report.tasks[0];
        assert_eq!(task.attempts, vec!["node1".to_string()]);
        assert_eq!(task.node.as_deref(), Some("node2"));
        assert_eq!(runtime.node_stats("node1").failed, 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_when_all_nodes_fail() {
        let runtime = Arc::new(SimulatedRuntime::default());
        runtime.set_node_failing("node1", true);
        runtime.set_node_failing("node2", true);
        let (controller, registry) = controller_with(
            vec![NodeInfo::new("node1", 1), NodeInfo::new("node2", 1)],
            runtime,
            settings(),
        );

        let spec = JobSpec::new("doomed", vec!["http://node1/a".to_string()]);
        let handle = controller.submit(spec).await.unwrap();

        match controller.wait(&handle).await {
            Err(LocusError::Placement(err)) => {
                assert!(err.has_reason(UnplaceableReason::RetriesExhausted));
            }
            other => panic!("expected placement error, got {:?}", other),
        }

        let tasks = controller.tasks(handle.id()).await.unwrap();
        assert_eq!(tasks[0].attempts, vec!["node1", "node2"]);
        assert_eq!(registry.capacity().load("node1"), 0);
        assert_eq!(registry.capacity().load("node2"), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_caps_attempts() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let nodes: Vec<NodeInfo> = (1..=5).map(|i| NodeInfo::new(format!("node{}", i), 1)).collect();
        for node in &nodes {
            runtime.set_node_failing(&node.host, true);
        }
        let (controller, _) = controller_with(nodes, runtime, settings());

        let spec = JobSpec::new("budget", vec!["/data/a".to_string()]).with_scheduler(
            SchedulerConfig {
                max_attempts: Some(2),
                ..Default::default()
            },
        );
        let handle = controller.submit(spec).await.unwrap();
        assert!(controller.wait(&handle).await.is_err());

        let tasks = controller.tasks(handle.id()).await.unwrap();
        assert_eq!(tasks[0].attempts.len(), 2);
        assert_eq!(
            tasks[0].state,
            TaskState::Unplaceable(UnplaceableReason::RetriesExhausted)
        );
    }

    #[tokio::test]
    async fn test_execution_failure_is_not_replaced() {
        let runtime = Arc::new(SimulatedRuntime::default());
        runtime.fail_input("http://node1/bad");
        let (controller, _) = controller_with(cluster(), Arc::clone(&runtime), settings());

        let spec = JobSpec::new("bad", vec!["http://node1/bad".to_string()]);
        let handle = controller.submit(spec).await.unwrap();

        match controller.wait(&handle).await {
            Err(LocusError::Execution { input, .. }) => assert_eq!(input, "http://node1/bad"),
            other => panic!("expected execution error, got {:?}", other),
        }
        let tasks = controller.tasks(handle.id()).await.unwrap();
        assert!(tasks[0].attempts.is_empty());
        assert_eq!(tasks[0].state, TaskState::Failed);
    }

    #[tokio::test]
    async fn test_capacity_exhausted_after_timeout() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_secs(5)));
        let (controller, _) = controller_with(
            vec![NodeInfo::new("node1", 1)],
            runtime,
            SchedulerSettings {
                max_attempts: 3,
                capacity_timeout_ms: 100,
            },
        );

        let spec = JobSpec::new("busy", vec!["http://node1/a".to_string(); 2])
            .with_scheduler(force_local());
        let handle = controller.submit(spec).await.unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        let tasks = controller.tasks(handle.id()).await.unwrap();
        let exhausted = tasks
            .iter()
            .filter(|t| t.state == TaskState::Unplaceable(UnplaceableReason::CapacityExhausted))
            .count();
        assert_eq!(exhausted, 1);

        controller.cancel(handle.id()).await.unwrap();
        assert!(controller.wait(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_long_queue_outlasts_capacity_timeout() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_millis(60)));
        let (controller, _) = controller_with(
            vec![NodeInfo::new("node1", 1)],
            Arc::clone(&runtime),
            SchedulerSettings {
                max_attempts: 3,
                capacity_timeout_ms: 100,
            },
        );

        // The last task waits ~180ms in line, but node1 frees a slot every 60ms.
        let spec = JobSpec::new("queued", vec!["/data/x".to_string(); 4]);
        let handle = controller.submit(spec).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();

        assert_eq!(report.tasks.len(), 4);
        let stats = runtime.node_stats("node1");
        assert_eq!(stats.completed, 4);
        assert_eq!(stats.peak, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_jobs_share_node_capacity() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_millis(40)));
        let (controller, registry) = controller_with(
            vec![NodeInfo::new("node1", 1)],
            Arc::clone(&runtime),
            SchedulerSettings {
                max_attempts: 3,
                capacity_timeout_ms: 100,
            },
        );

        let any = controller
            .submit(JobSpec::new("any", vec!["/data/x".to_string(); 3]))
            .await
            .unwrap();
        let local = controller
            .submit(
                JobSpec::new("local", vec!["http://node1/b".to_string(); 2])
                    .with_scheduler(force_local()),
            )
            .await
            .unwrap();

        let (any_result, local_result) =
            tokio::join!(controller.wait(&any), controller.wait(&local));
        any_result.unwrap();
        let report = local_result.unwrap();

        for task in &report.tasks {
            assert_eq!(task.node.as_deref(), Some("node1"));
        }
        let stats = runtime.node_stats("node1");
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.peak, 1);
        assert_eq!(registry.get("node1").unwrap().current_load, 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_slots() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_secs(30)));
        let (controller, registry) = controller_with(cluster(), runtime, settings());

        let spec = JobSpec::new("long", vec!["/data/x".to_string(); 10]);
        let handle = controller.submit(spec).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = controller.status(handle.id()).await.unwrap();
        assert_eq!(status.running, 6);
        assert_eq!(status.pending, 4);

        controller.cancel(handle.id()).await.unwrap();
        assert!(matches!(
            controller.wait(&handle).await,
            Err(LocusError::Cancelled(_))
        ));

        for node in registry.nodes() {
            assert_eq!(node.current_load, 0, "slot leaked on {}", node.host);
        }
        let status = controller.status(handle.id()).await.unwrap();
        assert_eq!(status.state, JobState::Cancelled);
        assert_eq!(status.cancelled, 10);
        assert!(status.finished_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_max_cores_limits_job_concurrency() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_millis(20)));
        let (controller, _) = controller_with(
            vec![NodeInfo::new("node1", 8)],
            Arc::clone(&runtime),
            settings(),
        );

        let spec = JobSpec::new("capped", vec!["http://node1/a".to_string(); 8]).with_scheduler(
            SchedulerConfig {
                max_cores: Some(2),
                ..Default::default()
            },
        );
        let handle = controller.submit(spec).await.unwrap();
        controller.wait(&handle).await.unwrap();

        let stats = runtime.node_stats("node1");
        assert_eq!(stats.completed, 8);
        assert!(stats.peak <= 2);
    }

    #[tokio::test]
    async fn test_fair_spread_under_any() {
        let runtime = Arc::new(SimulatedRuntime::with_delay(Duration::from_millis(50)));
        let nodes: Vec<NodeInfo> = (1..=4).map(|i| NodeInfo::new(format!("node{}", i), 3)).collect();
        let (controller, _) = controller_with(nodes, Arc::clone(&runtime), settings());

        // 10 tasks on 12 slots, all dispatched at once
        let spec = JobSpec::new("spread", vec!["/data/x".to_string(); 10]);
        let handle = controller.submit(spec).await.unwrap();
        controller.wait(&handle).await.unwrap();

        let counts: Vec<u32> = runtime.all_stats().values().map(|s| s.completed).collect();
        let max = counts.iter().copied().max().unwrap();
        let min = (1..=4)
            .map(|i| runtime.node_stats(&format!("node{}", i)).completed)
            .min()
            .unwrap();
        assert!(max - min <= 10u32.div_ceil(4));
    }

    #[tokio::test]
    async fn test_empty_job_completes() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) = controller_with(cluster(), runtime, settings());

        let handle = controller.submit(JobSpec::new("empty", Vec::new())).await.unwrap();
        let report = controller.wait(&handle).await.unwrap();
        assert!(report.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) = controller_with(cluster(), runtime, settings());
        assert!(matches!(
            controller.status(Uuid::new_v4()).await,
            Err(LocusError::JobNotFound(_))
        ));
        assert!(controller.cancel(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_finished_job() {
        let runtime = Arc::new(SimulatedRuntime::default());
        let (controller, _) = controller_with(cluster(), runtime, settings());

        let handle = controller
            .submit(JobSpec::new("one", vec!["/data/x".to_string()]))
            .await
            .unwrap();
        controller.wait(&handle).await.unwrap();
        assert_eq!(controller.list_jobs().await.len(), 1);

        controller.remove_job(handle.id()).await.unwrap();
        assert!(controller.list_jobs().await.is_empty());
    }
}
