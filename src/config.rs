//! Kernel configuration.
//!
//! Loaded from YAML; every section and field has a default, so an empty
//! document is a valid configuration.
//!
//! ```yaml
//! world_id: ideas
//! scheduler:
//!   agent_call_timeout_ms: 30000
//! snapshots:
//!   root: ./snapshots
//! graph:
//!   edges:
//!     - { subscriber: critic, publisher: architect }
//! ```
//!
//! # Environment Variables
//!
//! [`KernelConfig::apply_env_overrides`] reads:
//!
//! - `SYNAPLEX_WORLD_ID`
//! - `SYNAPLEX_SNAPSHOT_ROOT`
//! - `SYNAPLEX_AGENT_TIMEOUT_MS` (`0` disables the timeout)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::GraphConfig;
use crate::ids::WorldId;
use crate::snapshot::DEFAULT_MAX_RECORD_BYTES;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub world_id: WorldId,
    pub scheduler: SchedulerConfig,
    pub snapshots: SnapshotConfig,
    pub graph: GraphConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            world_id: WorldId::new("default"),
            scheduler: SchedulerConfig::default(),
            snapshots: SnapshotConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

/// Tick scheduler settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on any single collaborator call. `None` waits forever.
    pub agent_call_timeout_ms: Option<u64>,
}

impl SchedulerConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.agent_call_timeout_ms.map(Duration::from_millis)
    }
}

/// File snapshot store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub root: PathBuf,
    pub max_record_bytes: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("snapshots"),
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl KernelConfig {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML file on disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Overlay `SYNAPLEX_*` environment variables.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(world_id) = var("SYNAPLEX_WORLD_ID") {
            self.world_id = WorldId::new(world_id);
        }
        if let Some(root) = var("SYNAPLEX_SNAPSHOT_ROOT") {
            self.snapshots.root = PathBuf::from(root);
        }
        if let Some(raw) = var("SYNAPLEX_AGENT_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "SYNAPLEX_AGENT_TIMEOUT_MS".to_string(),
                message: format!("expected milliseconds, got '{}'", raw),
            })?;
            self.scheduler.agent_call_timeout_ms = (ms > 0).then_some(ms);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.world_id.as_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "world_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.snapshots.max_record_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "snapshots.max_record_bytes".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.scheduler.agent_call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                key: "scheduler.agent_call_timeout_ms".to_string(),
                message: "use null to disable the timeout".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
