//! File-backed snapshot store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!     <encoded agent id>/
//!         v1.json
//!         v2.json
//! ```
//!
//! Each file holds one JSON [`Snapshot`]. "Latest" is the highest version
//! number present. Records are created with [`atomic::write_new`], so a
//! version file is either complete or absent, and never replaced.
//!
//! Agent ids are percent-encoded into directory names, so distinct ids
//! never share a lineage directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::atomic;
use super::envelope::Snapshot;
use super::store::SnapshotStore;
use crate::error::SnapshotError;
use crate::ids::AgentId;

/// Default cap on a single record read. Larger files count as corrupt.
pub const DEFAULT_MAX_RECORD_BYTES: u64 = 16 * 1024 * 1024;

/// Snapshot store persisting one file per version.
#[derive(Debug)]
pub struct FileSnapshotStore {
    root: PathBuf,
    max_record_bytes: u64,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileSnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Temp files left behind by an interrupted write are removed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| SnapshotError::io("create store root", &root, e))?;

        let mut swept = 0;
        let entries =
            fs::read_dir(&root).map_err(|e| SnapshotError::io("list store root", &root, e))?;
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                swept += atomic::sweep_temp_files(&entry.path());
            }
        }
        if swept > 0 {
            log::info!("removed {} interrupted snapshot writes under {}", swept, root.display());
        }

        Ok(Self {
            root,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            write_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_max_record_bytes(mut self, max_record_bytes: u64) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `agent_id`'s records.
    pub fn agent_dir(&self, agent_id: &AgentId) -> PathBuf {
        self.root.join(dir_name(agent_id.as_str()))
    }

    pub fn record_path(&self, agent_id: &AgentId, version: u64) -> PathBuf {
        self.agent_dir(agent_id).join(format!("v{}.json", version))
    }

    /// One lock per lineage directory.
    fn write_lock(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        let key = dir_name(agent_id.as_str());
        Arc::clone(self.write_locks.lock().entry(key).or_default())
    }

    fn read_record(&self, agent_id: &AgentId, version: u64) -> Option<Snapshot> {
        let path = self.record_path(agent_id, version);
        let bytes = atomic::read_bounded(&path, self.max_record_bytes)?;
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) if &snapshot.agent_id == agent_id && snapshot.version == version => {
                Some(snapshot)
            }
            Ok(snapshot) => {
                log::warn!(
                    "snapshot record {} belongs to {} v{}; treating as absent",
                    path.display(),
                    snapshot.agent_id,
                    snapshot.version
                );
                None
            }
            Err(e) => {
                log::warn!("corrupt snapshot record {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load_latest(&self, agent_id: &AgentId) -> Option<Snapshot> {
        let versions = match self.list_versions(agent_id) {
            Ok(versions) => versions,
            Err(e) => {
                log::warn!("cannot list snapshots for {}: {}", agent_id, e);
                return None;
            }
        };
        self.read_record(agent_id, *versions.last()?)
    }

    fn load_version(&self, agent_id: &AgentId, version: u64) -> Option<Snapshot> {
        self.read_record(agent_id, version)
    }

    fn list_versions(&self, agent_id: &AgentId) -> Result<Vec<u64>, SnapshotError> {
        let dir = self.agent_dir(agent_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SnapshotError::io("list agent directory", dir, e)),
        };
        let mut versions: Vec<u64> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| parse_version(&entry.file_name().to_string_lossy()))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let lock = self.write_lock(&snapshot.agent_id);
        let _guard = lock.lock();

        let expected = self.next_version(&snapshot.agent_id)?;
        if snapshot.version != expected {
            return Err(SnapshotError::VersionConflict {
                agent_id: snapshot.agent_id.clone(),
                expected,
                got: snapshot.version,
            });
        }

        let data = serde_json::to_vec_pretty(snapshot)?;
        let path = self.record_path(&snapshot.agent_id, snapshot.version);
        atomic::write_new(&path, &data).map_err(|e| match e {
            SnapshotError::Io { ref source, .. }
                if source.kind() == std::io::ErrorKind::AlreadyExists =>
            {
                SnapshotError::AlreadyExists {
                    agent_id: snapshot.agent_id.clone(),
                    version: snapshot.version,
                }
            }
            other => other,
        })?;

        log::debug!(
            "saved snapshot {} v{} ({} bytes)",
            snapshot.agent_id,
            snapshot.version,
            data.len()
        );
        Ok(())
    }
}

/// Map an agent id onto a single path component, injectively.
///
/// Everything outside `[A-Za-z0-9-_.~]` is percent-encoded. `.`, `..` and
/// the empty id cannot be produced by the encoder, so they get spellings of
/// their own.
fn dir_name(raw: &str) -> String {
    match raw {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(raw).into_owned(),
    }
}

/// `"v12.json"` → `Some(12)`.
fn parse_version(file_name: &str) -> Option<u64> {
    file_name
        .strip_prefix('v')?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
