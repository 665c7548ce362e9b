//! locus-runtime: Execution runtime boundary
//!
//! The scheduler hands each placed task to an execution runtime and reacts to
//! the reported outcome. This crate provides:
//! - The `ExecutionRuntime` trait and outcome types
//! - A simulated runtime for tests and dry runs

pub mod simulated;
pub mod traits;

pub use simulated::{NodeStats, SimulatedRuntime, SimulatedRuntimeConfig};
pub use traits::{Dispatch, ExecutionOutcome, ExecutionRuntime};
