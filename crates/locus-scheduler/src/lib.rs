//! locus-scheduler: Locality-aware task placement
//!
//! This crate decides which node runs each task of a job:
//! - Node membership and blacklisting
//! - Atomic per-node slot reservation
//! - Locality filtering and least-loaded ranking
//! - Per-task dispatch, retry, and failure handling
//! - Job submission, waiting, and cancellation

pub mod capacity;
pub mod controller;
pub mod placement;
pub mod registry;
pub mod scheduler;

pub use capacity::{CapacityTracker, SlotGuard};
pub use controller::{JobController, JobHandle};
pub use placement::{Eligibility, LocalityPlacement, PlacementStrategy};
pub use registry::NodeRegistry;
pub use scheduler::{TaskContext, TaskScheduler};
