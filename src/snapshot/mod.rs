//! Versioned snapshot store: each agent's private state across ticks.
//!
//! The kernel never reads snapshot content. Agents (the reasoning layer)
//! load their latest snapshot, work with it, and append a successor. The
//! store guarantees:
//!
//! - versions per agent start at [`GENESIS_VERSION`] and grow by one with no gaps
//! - a saved snapshot is never modified
//! - a write either lands completely or leaves the previous latest untouched
//! - an unreadable record reads as absent, so callers can re-seed with
//!   [`load_or_genesis`]

mod atomic;
pub mod envelope;
pub mod file;
pub mod store;

pub use envelope::{Snapshot, GENESIS_VERSION};
pub use file::{FileSnapshotStore, DEFAULT_MAX_RECORD_BYTES};
pub use store::{InMemorySnapshotStore, SnapshotStore};

use serde_json::Value;

use crate::error::SnapshotError;
use crate::ids::AgentId;

/// Latest snapshot for `agent_id`, writing a fresh one if none is readable.
///
/// A brand-new lineage gets a genesis snapshot. A lineage whose latest record
/// is corrupt gets an empty snapshot marked `"recovered"` at the next free
/// version, so no version number is ever reused. Failing to write that
/// snapshot is a hard error: the caller has no durable state to continue from.
pub fn load_or_genesis(
    store: &dyn SnapshotStore,
    agent_id: &AgentId,
) -> Result<Snapshot, SnapshotError> {
    if let Some(latest) = store.load_latest(agent_id) {
        return Ok(latest);
    }

    let version = store.next_version(agent_id)?;
    let snapshot = if version == GENESIS_VERSION {
        Snapshot::genesis(agent_id.clone())
    } else {
        log::warn!(
            "latest snapshot for {} is unreadable; recovering at v{}",
            agent_id,
            version
        );
        Snapshot::new(agent_id.clone(), version, "").with_meta("recovered", Value::Bool(true))
    };
    store.save(&snapshot)?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
