//! Task placement decisions

use locus_core::{LocalityMode, NodeSnapshot, Task};

/// Nodes a task may run on, split by whether they currently have room
#[derive(Debug, Clone, Default)]
pub struct Eligibility {
    /// Nodes with a free slot, best first
    pub candidates: Vec<NodeSnapshot>,
    /// Nodes that satisfy locality but are at capacity
    pub saturated: Vec<NodeSnapshot>,
}

impl Eligibility {
    /// No node satisfies locality at all, regardless of load
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.saturated.is_empty()
    }

    /// Hosts of the ranked candidates
    pub fn candidate_hosts(&self) -> Vec<&str> {
        self.candidates.iter().map(|n| n.host.as_str()).collect()
    }
}

/// Strategy for making placement decisions
pub trait PlacementStrategy: Send + Sync {
    /// Compute the nodes eligible to run `task` from a registry snapshot
    fn eligible_nodes(&self, task: &Task, snapshot: &[NodeSnapshot]) -> Eligibility;
}

/// Default strategy: locality filter, attempt exclusion, least-loaded first
pub struct LocalityPlacement;

impl LocalityPlacement {
    fn satisfies_locality(task: &Task, node: &NodeSnapshot) -> bool {
        match task.locality {
            LocalityMode::Any => true,
            LocalityMode::ForceLocal => {
                task.input.is_remote() && node.host == task.input.host
            }
            LocalityMode::ForceRemote => node.host != task.input.host,
        }
    }
}

impl PlacementStrategy for LocalityPlacement {
    fn eligible_nodes(&self, task: &Task, snapshot: &[NodeSnapshot]) -> Eligibility {
        let (mut candidates, saturated): (Vec<NodeSnapshot>, Vec<NodeSnapshot>) = snapshot
            .iter()
            .filter(|n| !n.blacklisted)
            .filter(|n| Self::satisfies_locality(task, n))
            .filter(|n| !task.has_attempted(&n.host))
            .cloned()
            .partition(|n| n.has_capacity());

        candidates.sort_by(|a, b| a.cmp_by_load(b));

        Eligibility {
            candidates,
            saturated,
        }
    }
}
