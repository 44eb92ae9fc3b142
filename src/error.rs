//! Error types for the kernel, its collaborators and the snapshot store.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::ids::AgentId;

/// Which collaborator call an agent-level failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStage {
    /// `Agent::perceive`.
    Perceive,
    /// `Agent::reason`.
    Reason,
    /// `Agent::act`.
    Act,
    /// `Agent::create_projection` on a publisher.
    Projection,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Perceive => "perceive",
            Self::Reason => "reason",
            Self::Act => "act",
            Self::Projection => "create_projection",
        })
    }
}

/// Errors returned by an [`Agent`](crate::agent::Agent) implementation.
///
/// `Recoverable` and `Timeout` are isolated to the agent that raised them.
/// `Fatal` stops the scheduler.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The call failed; the tick continues for every other agent.
    #[error("{0}")]
    Recoverable(anyhow::Error),

    /// The call failed in a way that leaves the world unsafe to continue.
    #[error("fatal: {0}")]
    Fatal(anyhow::Error),

    /// The call did not return within the configured budget.
    #[error("{stage} timed out after {after_ms} ms")]
    Timeout { stage: CallStage, after_ms: u64 },
}

impl AgentError {
    /// Convenience constructor for a recoverable failure with a message.
    pub fn recoverable(message: impl fmt::Display) -> Self {
        Self::Recoverable(anyhow::anyhow!("{}", message))
    }

    /// Convenience constructor for a fatal failure with a message.
    pub fn fatal(message: impl fmt::Display) -> Self {
        Self::Fatal(anyhow::anyhow!("{}", message))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Recoverable(err)
    }
}

/// Snapshot store errors.
///
/// Read-side corruption is never reported through this type: a record that
/// cannot be decoded is treated as absent.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot's version is not the next one in the agent's lineage.
    #[error("version conflict for agent {agent_id}: expected {expected}, got {got}")]
    VersionConflict {
        agent_id: AgentId,
        expected: u64,
        got: u64,
    },

    /// A record for this version already exists and records are write-once.
    #[error("snapshot {version} for agent {agent_id} already exists")]
    AlreadyExists { agent_id: AgentId, version: u64 },

    /// Record serialization failed before any file was touched.
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An I/O error occurred while writing or listing records.
    #[error("I/O error during {context} at {}: {source}", path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotError {
    pub(crate) fn io(
        context: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value was present but invalid.
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Errors from reading an [`AgentProfile`](crate::profile::AgentProfile).
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("behavior parameter '{name}' not found for agent '{agent_id}' (available: {available:?})")]
    MissingParam {
        agent_id: AgentId,
        name: String,
        available: Vec<String>,
    },
}

/// Errors surfaced by the tick scheduler to its driver.
#[derive(Debug, Error)]
pub enum KernelError {
    /// An agent with this id is already registered.
    #[error("agent already registered: {0}")]
    DuplicateAgent(AgentId),

    /// No agent with this id is registered.
    #[error("agent not registered: {0}")]
    UnknownAgent(AgentId),

    /// Registration or graph configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A collaborator reported a fatal failure; the scheduler is now halted.
    #[error("fatal failure in {stage} of agent {agent_id}: {source}")]
    Fatal {
        agent_id: AgentId,
        stage: CallStage,
        #[source]
        source: anyhow::Error,
    },

    /// A previous fatal failure stopped the scheduler.
    #[error("scheduler halted: {0}")]
    Halted(String),

    /// A tick phase was entered out of order.
    #[error("phase {attempted} cannot follow {current}")]
    PhaseOrder { current: String, attempted: String },

    #[error(transparent)]
    Settings(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
