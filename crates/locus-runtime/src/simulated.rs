//! Simulated runtime implementation
//!
//! Executes tasks in-process: sleeps for a configured delay and returns the
//! input's host as output. Failures can be injected per node or per input,
//! and per-node concurrency is recorded so callers can check that no node
//! ever ran more tasks than it had slots for.

use async_trait::async_trait;
use locus_core::SimulationConfig;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::traits::{Dispatch, ExecutionOutcome, ExecutionRuntime};

/// Simulated runtime configuration
#[derive(Debug, Clone, Default)]
pub struct SimulatedRuntimeConfig {
    /// Time each task spends executing
    pub task_delay: Duration,
    /// Nodes that report `NodeFailure`
    pub failing_nodes: HashSet<String>,
    /// Inputs that report `ExecutionFailure`
    pub failing_inputs: HashSet<String>,
}

impl From<&SimulationConfig> for SimulatedRuntimeConfig {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            task_delay: Duration::from_millis(config.task_delay_ms),
            failing_nodes: config.failing_nodes.iter().cloned().collect(),
            failing_inputs: HashSet::new(),
        }
    }
}

/// Per-node execution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Tasks executing right now
    pub running: u32,
    /// Highest observed `running`
    pub peak: u32,
    /// Tasks that finished successfully
    pub completed: u32,
    /// Dispatches answered with a failure
    pub failed: u32,
}

#[derive(Debug, Default)]
struct State {
    config: SimulatedRuntimeConfig,
    stats: HashMap<String, NodeStats>,
}

/// In-process runtime for tests and dry runs
#[derive(Debug, Default)]
pub struct SimulatedRuntime {
    state: Mutex<State>,
}

impl SimulatedRuntime {
    /// Create a new simulated runtime
    pub fn new(config: SimulatedRuntimeConfig) -> Self {
        Self {
            state: Mutex::new(State {
                config,
                stats: HashMap::new(),
            }),
        }
    }

    /// Create a runtime where every task takes `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(SimulatedRuntimeConfig {
            task_delay: delay,
            ..Default::default()
        })
    }

    /// Toggle node-level failures for a node
    pub fn set_node_failing(&self, host: &str, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.config.failing_nodes.insert(host.to_string());
        } else {
            state.config.failing_nodes.remove(host);
        }
    }

    /// Make every execution of `input` fail
    pub fn fail_input(&self, input: &str) {
        self.lock().config.failing_inputs.insert(input.to_string());
    }

    /// Counters for one node
    pub fn node_stats(&self, host: &str) -> NodeStats {
        self.lock().stats.get(host).copied().unwrap_or_default()
    }

    /// Counters for every node that received a dispatch
    pub fn all_stats(&self) -> HashMap<String, NodeStats> {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Decrements the running count even if the execution future is dropped
struct Running<'a> {
    runtime: &'a SimulatedRuntime,
    node: &'a str,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut state = self.runtime.lock();
        if let Some(stats) = state.stats.get_mut(self.node) {
            stats.running = stats.running.saturating_sub(1);
        }
    }
}

#[async_trait]
impl ExecutionRuntime for SimulatedRuntime {
    async fn execute(&self, dispatch: &Dispatch) -> ExecutionOutcome {
        let (delay, node_fails, input_fails) = {
            let mut state = self.lock();
            let delay = state.config.task_delay;
            let node_fails = state.config.failing_nodes.contains(&dispatch.node);
            let input_fails = state
                .config
                .failing_inputs
                .contains(dispatch.input.as_str());
            let stats = state.stats.entry(dispatch.node.clone()).or_default();
            stats.running += 1;
            stats.peak = stats.peak.max(stats.running);
            (delay, node_fails, input_fails)
        };
        let _running = Running {
            runtime: self,
            node: &dispatch.node,
        };

        if node_fails {
            warn!(node = %dispatch.node, input = %dispatch.input, "Simulated node failure");
            self.lock().stats.entry(dispatch.node.clone()).or_default().failed += 1;
            return ExecutionOutcome::NodeFailure(format!("node {} unavailable", dispatch.node));
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if input_fails {
            self.lock().stats.entry(dispatch.node.clone()).or_default().failed += 1;
            return ExecutionOutcome::ExecutionFailure(format!(
                "task for {} raised an error",
                dispatch.input
            ));
        }

        debug!(
            job_id = %dispatch.job_id,
            task = dispatch.task_index,
            node = %dispatch.node,
            "Simulated task completed"
        );
        self.lock().stats.entry(dispatch.node.clone()).or_default().completed += 1;

        let output = if dispatch.input.host.is_empty() {
            dispatch.input.path.clone()
        } else {
            dispatch.input.host.clone()
        };
        ExecutionOutcome::Completed(output)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
