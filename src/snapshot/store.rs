//! Snapshot Store
//!
//! Reads snapshots and publishes new ones with optimistic concurrency.
//!
//! ## Commit protocol
//! ```text
//! 1. re-read latest id          ──mismatch──▶ ConcurrentModification
//! 2. write_new(snapshot-<id>)   ──exists────▶ ConcurrentModification
//! 3. write_atomic(LATEST)       (forward only; failure leaves a valid table)
//! ```
//! LATEST is a hint. The latest id is resolved by reading it and probing
//! forward for `snapshot-<id+1>`, so a crash between steps 2 and 3 still
//! exposes the published snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::arena::MetadataArena;
use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::path;

use super::Snapshot;

/// Snapshot files and pointers of one table
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
    arena: Arc<MetadataArena>,
}

impl SnapshotStore {
    pub fn new(io: Arc<dyn FileIO>, table_root: &Path, arena: Arc<MetadataArena>) -> Self {
        Self {
            io,
            table_root: table_root.to_path_buf(),
            arena,
        }
    }

    pub fn table_root(&self) -> &Path {
        &self.table_root
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Load `snapshot-<id>`. Missing files fail with `NotFound`.
    pub fn read_at(&self, id: u64) -> Result<Arc<Snapshot>> {
        if let Some(cached) = self.arena.snapshot(id) {
            return Ok(cached);
        }

        let file = path::snapshot_path(&self.table_root, id);
        let bytes = match self.io.read(&file) {
            Ok(bytes) => bytes,
            Err(LakeError::NotFound { .. }) => return Err(LakeError::not_found("snapshot", file)),
            Err(e) => return Err(e),
        };
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| LakeError::CorruptSnapshot {
                path: file.clone(),
                reason: e.to_string(),
            })?;
        if snapshot.id != id {
            return Err(LakeError::CorruptSnapshot {
                path: file,
                reason: format!("file holds snapshot id {}", snapshot.id),
            });
        }
        Ok(self.arena.insert_snapshot(snapshot))
    }

    /// Latest committed snapshot, `None` for a table with no commits
    pub fn read_latest(&self) -> Result<Option<Arc<Snapshot>>> {
        match self.latest_id()? {
            Some(id) => self.read_at(id).map(Some),
            None => Ok(None),
        }
    }

    /// All snapshot ids present, ascending
    pub fn list_snapshot_ids(&self) -> Result<Vec<u64>> {
        let dir = path::snapshot_dir(&self.table_root);
        if !self.io.exists(&dir)? {
            return Ok(Vec::new());
        }
        let mut ids: Vec<u64> = self
            .io
            .list(&dir)?
            .iter()
            .filter(|s| !s.is_dir)
            .filter_map(|s| s.file_name().and_then(path::parse_snapshot_id))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Latest snapshot id: LATEST hint plus forward probing, else listing
    pub fn latest_id(&self) -> Result<Option<u64>> {
        let hinted = match self.read_hint(&path::latest_hint_path(&self.table_root))? {
            Some(id) if self.exists(id)? => id,
            _ => return Ok(self.list_snapshot_ids()?.last().copied()),
        };

        let mut id = hinted;
        while self.exists(id + 1)? {
            id += 1;
        }
        if id != hinted {
            debug!(hint = hinted, latest = id, "LATEST hint behind, probed forward");
        }
        Ok(Some(id))
    }

    /// Earliest snapshot id still present
    pub fn earliest_id(&self) -> Result<Option<u64>> {
        match self.read_hint(&path::earliest_hint_path(&self.table_root))? {
            Some(id) if self.exists(id)? => Ok(Some(id)),
            _ => Ok(self.list_snapshot_ids()?.first().copied()),
        }
    }

    /// Every snapshot, ascending by id
    pub fn snapshots(&self) -> Result<Vec<Arc<Snapshot>>> {
        self.list_snapshot_ids()?
            .into_iter()
            .map(|id| self.read_at(id))
            .collect()
    }

    /// Newest snapshot committed at or before `timestamp_ms`
    pub fn snapshot_at_or_before(&self, timestamp_ms: i64) -> Result<Option<Arc<Snapshot>>> {
        for id in self.list_snapshot_ids()?.into_iter().rev() {
            let snapshot = self.read_at(id)?;
            if snapshot.time_millis <= timestamp_ms {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    pub fn exists(&self, id: u64) -> Result<bool> {
        if self.arena.snapshot(id).is_some() {
            return Ok(true);
        }
        self.io.exists(&path::snapshot_path(&self.table_root, id))
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Publish `candidate` as the successor of `expected_latest`.
    ///
    /// Fails with `ConcurrentModification` if the latest id moved or another
    /// writer published the same id first.
    pub fn commit(&self, candidate: &Snapshot, expected_latest: Option<u64>) -> Result<()> {
        let want_id = expected_latest.map_or(1, |id| id + 1);
        if candidate.id != want_id {
            return Err(LakeError::InvalidArgument(format!(
                "snapshot id {} does not follow {:?}",
                candidate.id, expected_latest
            )));
        }

        // Step 1: Re-read latest
        let actual = self.latest_id()?;
        if actual != expected_latest {
            return Err(LakeError::ConcurrentModification {
                expected: expected_latest,
                actual,
            });
        }

        // Step 2: Publish the snapshot file if absent
        let file = path::snapshot_path(&self.table_root, candidate.id);
        let json = serde_json::to_vec_pretty(candidate)
            .map_err(|e| LakeError::Serialization(e.to_string()))?;
        self.io.create_dir_all(&path::snapshot_dir(&self.table_root))?;
        if !self.io.write_new(&file, &json)? {
            let actual = self.latest_id()?;
            warn!(snapshot_id = candidate.id, "Lost snapshot publish race");
            return Err(LakeError::ConcurrentModification {
                expected: expected_latest,
                actual,
            });
        }

        // Step 3: Move the hints. The snapshot is already visible.
        if let Err(e) = self.advance_latest(candidate.id) {
            warn!(snapshot_id = candidate.id, error = %e, "Failed to update LATEST hint");
        }
        let earliest_hint = path::earliest_hint_path(&self.table_root);
        let earliest_missing = candidate.id == 1
            || match self.read_hint(&earliest_hint) {
                Ok(hint) => hint.is_none(),
                Err(e) => {
                    warn!(snapshot_id = candidate.id, error = %e, "Failed to read EARLIEST hint");
                    false
                }
            };
        if earliest_missing {
            if let Err(e) = self.write_hint(&earliest_hint, candidate.id) {
                warn!(snapshot_id = candidate.id, error = %e, "Failed to write EARLIEST hint");
            }
        }

        info!(
            snapshot_id = candidate.id,
            kind = %candidate.commit_kind,
            schema_id = candidate.schema_id,
            "Committed snapshot"
        );
        Ok(())
    }

    /// Rewrite LATEST unless it already points at or past `id`
    fn advance_latest(&self, id: u64) -> Result<()> {
        let hint_path = path::latest_hint_path(&self.table_root);
        match self.read_hint(&hint_path)? {
            Some(current) if current >= id => Ok(()),
            _ => self.write_hint(&hint_path, id),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_hint(&self, hint_path: &Path, id: u64) -> Result<()> {
        self.io.write_atomic(hint_path, id.to_string().as_bytes())
    }

    /// Parse a hint file; absent or unreadable hints are treated as missing
    fn read_hint(&self, hint_path: &Path) -> Result<Option<u64>> {
        let bytes = match self.io.read(hint_path) {
            Ok(bytes) => bytes,
            Err(LakeError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let text = String::from_utf8_lossy(&bytes);
        let text = text.trim();
        let parsed = text
            .parse::<u64>()
            .ok()
            .or_else(|| path::parse_snapshot_id(text));
        if parsed.is_none() {
            warn!(path = %hint_path.display(), content = %text, "Ignoring unparseable snapshot hint");
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileIO;
    use crate::snapshot::{CommitKind, SNAPSHOT_VERSION};
    use std::collections::BTreeMap;

    fn store() -> (Arc<dyn FileIO>, SnapshotStore) {
        let io: Arc<dyn FileIO> = Arc::new(MemoryFileIO::new());
        let store = SnapshotStore::new(io.clone(), Path::new("/t"), Arc::new(MetadataArena::new()));
        (io, store)
    }

    fn snapshot(id: u64, time_millis: i64) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            id,
            schema_id: 0,
            base_manifest_list: format!("base-{}", id),
            delta_manifest_list: format!("delta-{}", id),
            changelog_manifest_list: None,
            index_manifest: None,
            commit_user: "test".into(),
            commit_identifier: id as i64,
            commit_kind: CommitKind::Append,
            time_millis,
            log_offsets: BTreeMap::new(),
            total_record_count: 0,
            delta_record_count: 0,
            changelog_record_count: None,
            watermark: None,
        }
    }

    #[test]
    fn test_empty_store() {
        let (_, store) = store();
        assert!(store.read_latest().unwrap().is_none());
        assert!(store.list_snapshot_ids().unwrap().is_empty());
        assert!(matches!(store.read_at(1), Err(LakeError::NotFound { .. })));
    }

    #[test]
    fn test_commit_sequence() {
        let (io, store) = store();
        store.commit(&snapshot(1, 10), None).unwrap();
        store.commit(&snapshot(2, 20), Some(1)).unwrap();

        assert_eq!(store.list_snapshot_ids().unwrap(), vec![1, 2]);
        assert_eq!(store.read_latest().unwrap().unwrap().id, 2);
        assert_eq!(store.earliest_id().unwrap(), Some(1));
        let latest = io.read(&path::latest_hint_path(Path::new("/t"))).unwrap();
        assert_eq!(&latest[..], b"2");
    }

    #[test]
    fn test_stale_expected_fails() {
        let (_, store) = store();
        store.commit(&snapshot(1, 10), None).unwrap();

        let err = store.commit(&snapshot(1, 10), None).unwrap_err();
        assert!(matches!(
            err,
            LakeError::ConcurrentModification {
                expected: None,
                actual: Some(1)
            }
        ));
    }

    #[test]
    fn test_latest_probes_past_stale_hint() {
        let (io, store) = store();
        store.commit(&snapshot(1, 10), None).unwrap();
        // Simulate a crash after publishing snapshot-2 but before moving LATEST
        let json = serde_json::to_vec(&snapshot(2, 20)).unwrap();
        io.write_new(&path::snapshot_path(Path::new("/t"), 2), &json).unwrap();

        assert_eq!(store.latest_id().unwrap(), Some(2));
        store.commit(&snapshot(3, 30), Some(2)).unwrap();
        assert_eq!(store.latest_id().unwrap(), Some(3));
    }

    #[test]
    fn test_hint_accepts_snapshot_prefix_and_listing_fallback() {
        let (io, store) = store();
        store.commit(&snapshot(1, 10), None).unwrap();
        store.commit(&snapshot(2, 20), Some(1)).unwrap();

        io.write_atomic(&path::latest_hint_path(Path::new("/t")), b"snapshot-1")
            .unwrap();
        assert_eq!(store.latest_id().unwrap(), Some(2));

        io.delete(&path::latest_hint_path(Path::new("/t"))).unwrap();
        assert_eq!(store.latest_id().unwrap(), Some(2));
    }

    #[test]
    fn test_snapshot_at_or_before() {
        let (_, store) = store();
        store.commit(&snapshot(1, 100), None).unwrap();
        store.commit(&snapshot(2, 200), Some(1)).unwrap();

        assert_eq!(store.snapshot_at_or_before(150).unwrap().unwrap().id, 1);
        assert_eq!(store.snapshot_at_or_before(200).unwrap().unwrap().id, 2);
        assert!(store.snapshot_at_or_before(99).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_json() {
        let (io, store) = store();
        io.write_atomic(&path::snapshot_path(Path::new("/t"), 1), b"{\"id\": 1")
            .unwrap();
        assert!(matches!(store.read_at(1), Err(LakeError::CorruptSnapshot { .. })));
    }
}
