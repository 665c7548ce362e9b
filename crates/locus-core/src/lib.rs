//! locus-core: Core types for the locus scheduler
//!
//! This crate provides the fundamental types used throughout locus:
//! - Input locators and their parsing
//! - Node, task, and job definitions
//! - Locality modes and per-job scheduler options
//! - Cluster configuration
//! - Error handling

pub mod config;
pub mod error;
pub mod job;
pub mod locator;
pub mod node;

pub use config::*;
pub use error::*;
pub use job::*;
pub use locator::*;
pub use node::*;
