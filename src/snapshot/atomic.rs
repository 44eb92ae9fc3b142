//! Crash-safe file primitives for snapshot records.
//!
//! A record is written to a temp file in its final directory, flushed and
//! fsynced, then linked into place under its canonical name without
//! replacing anything already there. A crash before the final step leaves
//! only a `.tmp*` file, which readers ignore and [`sweep_temp_files`] removes.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use crate::error::SnapshotError;

/// Prefix `tempfile` uses for its temp file names.
pub(crate) const TEMP_PREFIX: &str = ".tmp";

/// Write `data` to `path`, failing if `path` already exists.
///
/// Either the complete record appears under `path`, or nothing does.
pub(crate) fn write_new(path: &Path, data: &[u8]) -> Result<(), SnapshotError> {
    let parent = path.parent().ok_or_else(|| {
        SnapshotError::io(
            "resolve parent directory",
            path,
            std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;
    fs::create_dir_all(parent).map_err(|e| SnapshotError::io("create directory", parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| SnapshotError::io("create temp file", parent, e))?;
    tmp.write_all(data)
        .map_err(|e| SnapshotError::io("write temp file", tmp.path(), e))?;
    tmp.flush()
        .map_err(|e| SnapshotError::io("flush temp file", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SnapshotError::io("fsync temp file", tmp.path(), e))?;

    // On failure the returned NamedTempFile is dropped and deletes itself.
    tmp.persist_noclobber(path)
        .map_err(|e| SnapshotError::io("persist record", path, e.error))?;

    sync_dir(parent)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), SnapshotError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| SnapshotError::io("fsync directory", dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), SnapshotError> {
    Ok(())
}

/// Read a whole file, refusing anything larger than `max_bytes`.
///
/// `None` means missing, unreadable or oversized.
pub(crate) fn read_bounded(path: &Path, max_bytes: u64) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    if len > max_bytes {
        log::warn!(
            "snapshot record {} is {} bytes, over the {} byte limit; ignoring",
            path.display(),
            len,
            max_bytes
        );
        return None;
    }
    let mut buf = Vec::with_capacity(len as usize);
    file.take(max_bytes + 1).read_to_end(&mut buf).ok()?;
    if buf.len() as u64 > max_bytes {
        return None;
    }
    Some(buf)
}

/// Remove leftover temp files in `dir`. Returns how many were removed.
pub(crate) fn sweep_temp_files(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(TEMP_PREFIX) {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!(
                    "could not remove stale temp file {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }
    }
    removed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
