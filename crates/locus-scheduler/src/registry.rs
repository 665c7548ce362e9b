//! Node registry
//!
//! Authoritative view of cluster membership. Membership changes come from the
//! cluster layer; readers get point-in-time copies that later updates do not
//! touch.

use locus_core::{LocusError, LocusResult, NodeInfo, NodeSnapshot};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::capacity::CapacityTracker;

/// Registry of cluster nodes, keyed by host
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<String, NodeInfo>>,
    capacity: Arc<CapacityTracker>,
}

impl NodeRegistry {
    /// Create an empty registry backed by `capacity`
    pub fn new(capacity: Arc<CapacityTracker>) -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            capacity,
        }
    }

    /// Create a registry with an initial membership and its own tracker
    pub fn with_nodes(nodes: impl IntoIterator<Item = NodeInfo>) -> Self {
        let registry = Self::new(Arc::new(CapacityTracker::new()));
        for node in nodes {
            registry.upsert(node);
        }
        registry
    }

    /// Capacity tracker holding this registry's load counters
    pub fn capacity(&self) -> &Arc<CapacityTracker> {
        &self.capacity
    }

    /// Add a node or replace its description
    pub fn upsert(&self, node: NodeInfo) {
        self.capacity.register(&node.host, node.max_workers, !node.blacklisted);

        info!(
            node = %node.host,
            max_workers = node.max_workers,
            blacklisted = node.blacklisted,
            "Node registered"
        );
        self.write().insert(node.host.clone(), node);
    }

    /// Remove a node from the cluster.
    ///
    /// Tasks already running there keep their slots until they finish.
    pub fn remove(&self, host: &str) -> LocusResult<NodeInfo> {
        let node = self
            .write()
            .remove(host)
            .ok_or_else(|| LocusError::NodeNotFound(host.to_string()))?;
        self.capacity.set_admitting(host, false);
        info!(node = %host, "Node removed");
        Ok(node)
    }

    /// Exclude a node from all placement
    pub fn blacklist(&self, host: &str) -> LocusResult<()> {
        self.set_blacklisted(host, true)?;
        warn!(node = %host, "Node blacklisted");
        Ok(())
    }

    /// Make a blacklisted node available again
    pub fn whitelist(&self, host: &str) -> LocusResult<()> {
        self.set_blacklisted(host, false)?;
        info!(node = %host, "Node whitelisted");
        Ok(())
    }

    fn set_blacklisted(&self, host: &str, blacklisted: bool) -> LocusResult<()> {
        let mut nodes = self.write();
        let node = nodes
            .get_mut(host)
            .ok_or_else(|| LocusError::NodeNotFound(host.to_string()))?;
        node.blacklisted = blacklisted;
        // Stop admitting while still holding the membership lock so no
        // snapshot can show the node available after this returns.
        self.capacity.set_admitting(host, !blacklisted);
        Ok(())
    }

    /// Replace the whole membership with the result of a node-info query
    pub fn sync(&self, nodes: Vec<NodeInfo>) {
        let stale: Vec<String> = {
            let current = self.read();
            current
                .keys()
                .filter(|host| !nodes.iter().any(|n| &n.host == *host))
                .cloned()
                .collect()
        };
        for host in stale {
            if let Err(e) = self.remove(&host) {
                debug!(node = %host, error = %e, "Node already gone during sync");
            }
        }
        for node in nodes {
            self.upsert(node);
        }
    }

    /// Non-blacklisted nodes with their current load, ordered by host
    pub fn available_nodes(&self) -> Vec<NodeSnapshot> {
        self.read()
            .values()
            .filter(|n| !n.blacklisted)
            .map(|n| self.snapshot(n))
            .collect()
    }

    /// Every node, including blacklisted ones
    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        self.read().values().map(|n| self.snapshot(n)).collect()
    }

    /// Look up a single node
    pub fn get(&self, host: &str) -> Option<NodeSnapshot> {
        self.read().get(host).map(|n| self.snapshot(n))
    }

    fn snapshot(&self, node: &NodeInfo) -> NodeSnapshot {
        NodeSnapshot {
            host: node.host.clone(),
            max_workers: node.max_workers,
            current_load: self.capacity.load(&node.host),
            blacklisted: node.blacklisted,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, NodeInfo>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, NodeInfo>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }
}
