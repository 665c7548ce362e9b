//! Error types for locus

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for locus
#[derive(Error, Debug)]
pub enum LocusError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more tasks of a job could not be placed
    #[error("{0}")]
    Placement(PlacementError),

    /// A task failed inside the execution runtime
    #[error("Execution failed for {input}: {message}")]
    Execution { input: String, message: String },

    /// Job was cancelled before it finished
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Locator could not be parsed
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for locus operations
pub type LocusResult<T> = Result<T, LocusError>;

impl From<serde_json::Error> for LocusError {
    fn from(err: serde_json::Error) -> Self {
        LocusError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LocusError {
    fn from(err: toml::de::Error) -> Self {
        LocusError::Config(err.to_string())
    }
}

impl From<PlacementError> for LocusError {
    fn from(err: PlacementError) -> Self {
        LocusError::Placement(err)
    }
}

/// Why a task ended up unplaceable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplaceableReason {
    /// No node satisfied the locality constraint
    NoEligibleNode,
    /// Eligible nodes existed but never had a free slot in time
    CapacityExhausted,
    /// Eligible nodes kept reporting node-level failures
    RetriesExhausted,
}

impl fmt::Display for UnplaceableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnplaceableReason::NoEligibleNode => write!(f, "no eligible node"),
            UnplaceableReason::CapacityExhausted => write!(f, "capacity exhausted"),
            UnplaceableReason::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// An input that could not be placed, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnplaceableInput {
    pub input: String,
    pub reason: UnplaceableReason,
}

/// Placement failure for a whole job, enumerating every offending input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementError {
    pub job_id: String,
    pub offenders: Vec<UnplaceableInput>,
}

impl PlacementError {
    /// Offending input locators, in task order
    pub fn inputs(&self) -> Vec<&str> {
        self.offenders.iter().map(|o| o.input.as_str()).collect()
    }

    /// Whether any offender failed for the given reason
    pub fn has_reason(&self, reason: UnplaceableReason) -> bool {
        self.offenders.iter().any(|o| o.reason == reason)
    }
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Placement error in job {}: {} input(s) unplaceable",
            self.job_id,
            self.offenders.len()
        )?;
        for offender in &self.offenders {
            write!(f, "; {} ({})", offender.input, offender.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for PlacementError {}
