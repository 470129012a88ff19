//! Live-file resolution over the manifest chain

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::arena::MetadataArena;
use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::manifest::{merge_entries, FileIdentifier, ManifestEntry, ManifestFile, ManifestFileMeta, ManifestList};
use crate::path;
use crate::schema::SchemaManager;
use crate::snapshot::{Snapshot, SnapshotStore};

use super::{ScanFile, ScanOptions, ScanPlan};

/// Resolves scans for one table
#[derive(Debug, Clone)]
pub struct FileScanner {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
    arena: Arc<MetadataArena>,
    snapshots: SnapshotStore,
    schemas: SchemaManager,
    manifests: ManifestFile,
    manifest_lists: ManifestList,
    parallelism: usize,
    verify_files: bool,
}

impl FileScanner {
    pub fn new(
        io: Arc<dyn FileIO>,
        table_root: &Path,
        arena: Arc<MetadataArena>,
        parallelism: usize,
        verify_files: bool,
    ) -> Self {
        Self {
            snapshots: SnapshotStore::new(io.clone(), table_root, arena.clone()),
            schemas: SchemaManager::new(io.clone(), table_root),
            manifests: ManifestFile::new(io.clone(), table_root),
            manifest_lists: ManifestList::new(io.clone(), table_root),
            io,
            table_root: table_root.to_path_buf(),
            arena,
            parallelism: parallelism.max(1),
            verify_files,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Plan a scan. Missing or malformed metadata fails closed.
    pub fn scan(&self, options: &ScanOptions) -> Result<ScanPlan> {
        if !self.io.exists(&self.table_root)? {
            return Err(LakeError::not_found("table", &self.table_root));
        }
        if options.snapshot_id.is_some() && options.snapshot_timestamp_ms.is_some() {
            return Err(LakeError::InvalidArgument(
                "snapshot id and snapshot timestamp are mutually exclusive".to_string(),
            ));
        }

        // Step 1: Pick the target snapshot
        let target = match (options.snapshot_id, options.snapshot_timestamp_ms) {
            (Some(id), _) => self.snapshots.read_at(id)?,
            (None, Some(ts)) => self.snapshots.snapshot_at_or_before(ts)?.ok_or_else(|| {
                LakeError::not_found("snapshot at or before timestamp", path::snapshot_dir(&self.table_root))
            })?,
            (None, None) => match self.snapshots.read_latest()? {
                Some(s) => s,
                None => {
                    if options.incremental_since_snapshot.is_some() {
                        return Err(LakeError::not_found("snapshot", path::snapshot_dir(&self.table_root)));
                    }
                    debug!(table = %self.table_root.display(), "No snapshot, empty scan");
                    return Ok(ScanPlan::empty());
                }
            },
        };

        // Step 2: Live files at the target
        let mut live = self.resolve_live_files(&target)?;

        // Step 3: Incremental window
        if let Some(since) = options.incremental_since_snapshot {
            let added = self.added_between(since, target.id)?;
            live.retain(|e| added.contains(&e.identifier()));
        }

        // Step 4: Partition pruning
        if let Some(spec) = &options.partition {
            let schema = self.schemas.schema(target.schema_id)?;
            let mut wanted = Vec::with_capacity(spec.len());
            for (key, value) in spec {
                let idx = schema
                    .partition_keys
                    .iter()
                    .position(|k| k == key)
                    .ok_or_else(|| LakeError::InvalidPartition(format!("'{}' is not a partition key", key)))?;
                wanted.push((idx, value));
            }
            live.retain(|e| {
                wanted.iter().all(|(idx, value)| {
                    e.partition
                        .get(*idx)
                        .map_or(false, |v| v.total_cmp(value).is_eq())
                })
            });
        }

        // Step 5: Optional existence check
        if options.verify_files.unwrap_or(self.verify_files) {
            for entry in &live {
                let file = entry.file.resolve_path(&self.table_root);
                if !self.io.exists(&file)? {
                    return Err(LakeError::not_found("data file", file));
                }
            }
        }

        debug!(
            snapshot_id = target.id,
            files = live.len(),
            incremental = options.incremental_since_snapshot.is_some(),
            "Planned scan"
        );
        let files: Vec<ScanFile> = live.into_iter().map(ManifestEntry::into_bucket_file).collect();
        Ok(ScanPlan::new(Some(target.id), Some(target.schema_id), files))
    }

    /// Live files of a snapshot: base list then delta list, folded in order
    pub fn resolve_live_files(&self, snapshot: &Snapshot) -> Result<Vec<ManifestEntry>> {
        let mut metas = self.read_manifest_list(&snapshot.base_manifest_list)?.to_vec();
        metas.extend(self.read_manifest_list(&snapshot.delta_manifest_list)?.iter().cloned());

        let names: Vec<String> = metas.into_iter().map(|m| m.file_name).collect();
        let contents = self.read_manifests(&names)?;

        Ok(merge_entries(
            contents.iter().flat_map(|entries| entries.iter().cloned()),
        ))
    }

    /// Entries recorded in a snapshot's delta list only
    pub fn delta_entries(&self, snapshot: &Snapshot) -> Result<Vec<ManifestEntry>> {
        let names: Vec<String> = self
            .read_manifest_list(&snapshot.delta_manifest_list)?
            .iter()
            .map(|m| m.file_name.clone())
            .collect();
        let contents = self.read_manifests(&names)?;
        Ok(contents.iter().flat_map(|e| e.iter().cloned()).collect())
    }

    /// Identifiers added by snapshots in `(since, until]`
    fn added_between(&self, since: u64, until: u64) -> Result<HashSet<FileIdentifier>> {
        if since > until {
            return Err(LakeError::InvalidArgument(format!(
                "incremental start {} is after target snapshot {}",
                since, until
            )));
        }
        let mut added = HashSet::new();
        for id in (since + 1)..=until {
            let snapshot = self.snapshots.read_at(id)?;
            for entry in self.delta_entries(&snapshot)? {
                if entry.kind.is_add() {
                    added.insert(entry.identifier());
                }
            }
        }
        Ok(added)
    }

    pub(crate) fn read_manifest_list(&self, name: &str) -> Result<Arc<Vec<ManifestFileMeta>>> {
        if let Some(cached) = self.arena.manifest_list(name) {
            return Ok(cached);
        }
        let metas = self.manifest_lists.read(name)?;
        Ok(self.arena.insert_manifest_list(name, metas))
    }

    fn read_manifest(&self, name: &str) -> Result<Arc<Vec<ManifestEntry>>> {
        if let Some(cached) = self.arena.manifest(name) {
            return Ok(cached);
        }
        let entries = self.manifests.read(name)?;
        Ok(self.arena.insert_manifest(name, entries))
    }

    /// Read manifests on up to `parallelism` scoped threads, keeping order
    fn read_manifests(&self, names: &[String]) -> Result<Vec<Arc<Vec<ManifestEntry>>>> {
        if self.parallelism == 1 || names.len() <= 1 {
            return names.iter().map(|n| self.read_manifest(n)).collect();
        }

        let chunk_size = (names.len() + self.parallelism - 1) / self.parallelism;
        crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = names
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .map(|n| self.read_manifest(n))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            let mut out = Vec::with_capacity(names.len());
            for handle in handles {
                let part = handle.join().map_err(|_| reader_panicked())??;
                out.extend(part);
            }
            Ok::<_, LakeError>(out)
        })
        .map_err(|_| reader_panicked())?
    }
}

fn reader_panicked() -> LakeError {
    LakeError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "manifest reader thread panicked",
    ))
}
