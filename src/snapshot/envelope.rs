//! The snapshot record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::AgentId;
use crate::messages::Payload;

/// Version of the first snapshot in every agent's lineage.
pub const GENESIS_VERSION: u64 = 1;

/// One immutable, versioned blob of an agent's private state.
///
/// `content` is opaque: the store writes and returns it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub agent_id: AgentId,
    pub version: u64,
    pub content: String,
    #[serde(default)]
    pub metadata: Payload,
}

impl Snapshot {
    pub fn new(agent_id: AgentId, version: u64, content: impl Into<String>) -> Self {
        Self {
            agent_id,
            version,
            content: content.into(),
            metadata: Payload::new(),
        }
    }

    /// Empty first snapshot of a lineage.
    pub fn genesis(agent_id: AgentId) -> Self {
        Self::new(agent_id, GENESIS_VERSION, "")
            .with_meta("genesis", Value::Bool(true))
            .with_meta("initial", Value::Bool(true))
    }

    /// The next snapshot in this lineage, carrying new content.
    pub fn successor(&self, content: impl Into<String>) -> Self {
        Self::new(self.agent_id.clone(), self.version + 1, content)
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
