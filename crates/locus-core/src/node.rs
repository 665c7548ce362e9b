//! Cluster node type definitions

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Node description as reported by cluster membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identity, matched against input locator hosts
    pub host: String,
    /// Maximum number of concurrently running tasks
    pub max_workers: u32,
    /// Blacklisted nodes never receive tasks
    #[serde(default)]
    pub blacklisted: bool,
}

impl NodeInfo {
    /// Create an available node
    pub fn new(host: impl Into<String>, max_workers: u32) -> Self {
        Self {
            host: host.into(),
            max_workers,
            blacklisted: false,
        }
    }
}

/// Point-in-time view of a node, including its load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub host: String,
    pub max_workers: u32,
    pub current_load: u32,
    pub blacklisted: bool,
}

impl NodeSnapshot {
    /// Whether at least one worker slot is free
    pub fn has_capacity(&self) -> bool {
        self.free_slots() > 0
    }

    /// Free worker slots
    pub fn free_slots(&self) -> u32 {
        self.max_workers.saturating_sub(self.current_load)
    }

    /// Order by `current_load / max_workers`, then by host.
    ///
    /// Ratios are compared by cross-multiplication so no precision is lost.
    pub fn cmp_by_load(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.current_load) * u64::from(other.max_workers.max(1));
        let rhs = u64::from(other.current_load) * u64::from(self.max_workers.max(1));
        lhs.cmp(&rhs).then_with(|| self.host.cmp(&other.host))
    }
}
