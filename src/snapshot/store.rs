//! The snapshot store contract and its in-memory implementation.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::envelope::{Snapshot, GENESIS_VERSION};
use crate::error::SnapshotError;
use crate::ids::AgentId;

/// Append-only, per-agent ledger of versioned snapshots.
///
/// Versions start at [`GENESIS_VERSION`] and grow by exactly one per save.
/// Saved snapshots are never modified. Reads never fail: a record that
/// cannot be decoded is reported as absent.
pub trait SnapshotStore: Send + Sync {
    /// The highest-versioned snapshot, if present and readable.
    fn load_latest(&self, agent_id: &AgentId) -> Option<Snapshot>;

    fn load_version(&self, agent_id: &AgentId, version: u64) -> Option<Snapshot>;

    /// Versions on record for `agent_id`, ascending.
    fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, SnapshotError>;

    /// Durably append `snapshot`. Its version must equal
    /// [`next_version`](Self::next_version).
    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;

    /// The version the next `save` for `agent_id` must carry.
    fn next_version(&self, agent_id: &AgentId) -> Result<u64, SnapshotError> {
        Ok(self
            .list_versions(agent_id)?
            .last()
            .map_or(GENESIS_VERSION, |v| v + 1))
    }
}

/// Volatile store; lineages are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    lineages: RwLock<HashMap<AgentId, Vec<Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load_latest(&self, agent_id: &AgentId) -> Option<Snapshot> {
        self.lineages.read().get(agent_id)?.last().cloned()
    }

    fn load_version(&self, agent_id: &AgentId, version: u64) -> Option<Snapshot> {
        let index = version.checked_sub(GENESIS_VERSION)? as usize;
        self.lineages.read().get(agent_id)?.get(index).cloned()
    }

    fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, SnapshotError> {
        Ok(self
            .lineages
            .read()
            .get(agent_id)
            .map(|lineage| lineage.iter().map(|s| s.version).collect())
            .unwrap_or_default())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let mut lineages = self.lineages.write();
        let lineage = lineages.entry(snapshot.agent_id.clone()).or_default();
        let expected = lineage.last().map_or(GENESIS_VERSION, |s| s.version + 1);
        if snapshot.version != expected {
            return Err(SnapshotError::VersionConflict {
                agent_id: snapshot.agent_id.clone(),
                expected,
                got: snapshot.version,
            });
        }
        lineage.push(snapshot.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
