//! Scheduler queue persistence.
//!
//! The backlog is serialized to one JSON file after every mutation, so
//! an interrupted process restarts with the same queue. Restoring is
//! lenient: a missing or unreadable file is an empty queue, and the
//! scheduler drops entries whose job is no longer pending.

use std::path::Path;

use tracing::{debug, warn};

use super::admission::QueueEntry;
use crate::jobs::store::atomic_replace;
use crate::jobs::StoreResult;

/// Persist the queue, atomically replacing the previous file.
pub fn save_queue(path: &Path, entries: &[QueueEntry]) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(entries)?;
    atomic_replace(path, &bytes)?;
    debug!(entries = entries.len(), "Scheduler queue persisted");
    Ok(())
}

/// Load the persisted queue; missing or corrupt files yield empty.
pub fn load_queue(path: &Path) -> Vec<QueueEntry> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Discarding unreadable scheduler queue");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(priority: i32, job_id: &str) -> QueueEntry {
        QueueEntry {
            priority,
            job_id: job_id.to_string(),
            backend: "bridge".to_string(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let entries = vec![entry(1, "a"), entry(5, "b")];

        save_queue(&path, &entries).unwrap();
        assert_eq!(load_queue(&path), entries);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(load_queue(&dir.path().join("absent.json")).is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(load_queue(&path).is_empty());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        save_queue(&path, &[entry(1, "a"), entry(2, "b")]).unwrap();
        save_queue(&path, &[entry(3, "c")]).unwrap();
        let loaded = load_queue(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].job_id, "c");
    }
}
