//! Configuration types for locus

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{LocusError, LocusResult};
use crate::node::NodeInfo;

/// Cluster configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Scheduler defaults
    pub scheduler: SchedulerSettings,
    /// Initial node membership
    pub nodes: Vec<NodeInfo>,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Simulated runtime behaviour
    pub simulation: SimulationConfig,
}

impl ClusterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> LocusResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LocusError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> LocusResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| LocusError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check node entries and scheduler limits
    pub fn validate(&self) -> LocusResult<()> {
        if self.scheduler.max_attempts == 0 {
            return Err(LocusError::Config(
                "scheduler.max_attempts must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.host.is_empty() {
                return Err(LocusError::Config("node host must not be empty".to_string()));
            }
            if node.max_workers == 0 {
                return Err(LocusError::Config(format!(
                    "node {} must have positive max_workers",
                    node.host
                )));
            }
            if !seen.insert(node.host.as_str()) {
                return Err(LocusError::Config(format!("duplicate node {}", node.host)));
            }
        }
        Ok(())
    }
}

/// Cluster-wide scheduler defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Node failures tolerated per task
    pub max_attempts: u32,
    /// How long a task waits for a slot on saturated eligible nodes
    pub capacity_timeout_ms: u64,
}

impl SchedulerSettings {
    pub fn capacity_timeout(&self) -> Duration {
        Duration::from_millis(self.capacity_timeout_ms)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            capacity_timeout_ms: 30_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Log format (json or text)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Behaviour of the simulated execution runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time each task spends executing
    pub task_delay_ms: u64,
    /// Nodes that report a node-level failure for every task
    pub failing_nodes: Vec<String>,
}
