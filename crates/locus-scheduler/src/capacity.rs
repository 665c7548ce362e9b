//! Capacity tracker for per-node worker slots
//!
//! The tracker is the only writer of node load. Reservation is checked and
//! applied in a single compare-and-swap on the node's counter, so it is the
//! authoritative capacity check: placement may rank nodes from a stale
//! snapshot, but two tasks can never both take a node's last slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Slot counters for one node
#[derive(Debug)]
struct NodeSlots {
    max_workers: AtomicU32,
    load: AtomicU32,
    /// Slots given back since registration
    releases: AtomicU64,
    /// Cleared for blacklisted or removed nodes
    admitting: AtomicBool,
}

/// Tracks worker slot reservations for every known node
#[derive(Debug, Default)]
pub struct CapacityTracker {
    nodes: RwLock<HashMap<String, Arc<NodeSlots>>>,
    released: Notify,
}

impl CapacityTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node or update its capacity.
    ///
    /// Load already reserved on the node is kept.
    pub fn register(&self, host: &str, max_workers: u32, admitting: bool) {
        {
            let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
            let slots = nodes.entry(host.to_string()).or_insert_with(|| {
                Arc::new(NodeSlots {
                    max_workers: AtomicU32::new(max_workers),
                    load: AtomicU32::new(0),
                    releases: AtomicU64::new(0),
                    admitting: AtomicBool::new(admitting),
                })
            });
            slots.max_workers.store(max_workers, Ordering::SeqCst);
            slots.admitting.store(admitting, Ordering::SeqCst);
        }
        debug!(node = %host, max_workers, "Node capacity registered");
        self.released.notify_waiters();
    }

    /// Allow or refuse new reservations on a node.
    ///
    /// Waiters are woken either way: a node that stops admitting may leave
    /// them with no eligible node at all.
    pub fn set_admitting(&self, host: &str, admitting: bool) {
        if let Some(slots) = self.slots(host) {
            slots.admitting.store(admitting, Ordering::SeqCst);
            self.released.notify_waiters();
        }
    }

    /// Atomically take one slot if the node has one free
    pub fn try_reserve(&self, host: &str) -> bool {
        let Some(slots) = self.slots(host) else {
            return false;
        };

        let reserved = slots
            .load
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |load| {
                let admitting = slots.admitting.load(Ordering::SeqCst);
                let max = slots.max_workers.load(Ordering::SeqCst);
                (admitting && load < max).then_some(load + 1)
            })
            .is_ok();

        trace!(node = %host, reserved, "Reservation attempt");
        reserved
    }

    /// Take one slot, returning a guard that gives it back on drop
    pub fn reserve(self: &Arc<Self>, host: &str) -> Option<SlotGuard> {
        self.try_reserve(host).then(|| SlotGuard {
            tracker: Arc::clone(self),
            host: host.to_string(),
        })
    }

    /// Give back one slot. Never drops load below zero.
    pub fn release(&self, host: &str) {
        let Some(slots) = self.slots(host) else {
            return;
        };

        let released = slots
            .load
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |load| load.checked_sub(1))
            .is_ok();

        if released {
            slots.releases.fetch_add(1, Ordering::SeqCst);
            trace!(node = %host, "Slot released");
            self.released.notify_waiters();
        }
    }

    /// Current number of reserved slots on a node
    pub fn load(&self, host: &str) -> u32 {
        self.slots(host)
            .map(|s| s.load.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of slots ever given back on a node
    pub fn releases(&self, host: &str) -> u64 {
        self.slots(host)
            .map(|s| s.releases.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Future that resolves the next time a slot frees up anywhere, or a
    /// node's admission changes.
    ///
    /// Call `enable` on the pinned future before checking capacity so a
    /// release between the check and the await is not missed.
    pub fn capacity_released(&self) -> Notified<'_> {
        self.released.notified()
    }

    fn slots(&self, host: &str) -> Option<Arc<NodeSlots>> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(host)
            .cloned()
    }
}

/// A reserved worker slot, released when dropped
#[derive(Debug)]
pub struct SlotGuard {
    tracker: Arc<CapacityTracker>,
    host: String,
}

impl SlotGuard {
    /// Node holding the slot
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.tracker.release(&self.host);
    }
}
