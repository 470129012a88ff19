//! Commit Coordinator
//!
//! Turns a set of added/deleted data files into a new snapshot.
//!
//! ## Commit pipeline
//! ```text
//! validate ─▶ read base ─▶ build entries ─▶ manifests ─▶ delta list
//!                                                    └─▶ base list ─▶ snapshot ─▶ store.commit
//! ```
//! Everything before `store.commit` writes uniquely named files only, so an
//! attempt can be abandoned at any point. A lost race is retried from a
//! freshly read base with brand new manifests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::arena::MetadataArena;
use crate::config::Config;
use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::manifest::{FileKind, ManifestEntry, ManifestFile, ManifestList};
use crate::path::PathFactory;
use crate::scan::FileScanner;
use crate::schema::{SchemaManager, TableSchema};
use crate::snapshot::{CommitKind, Snapshot, SnapshotStore, SNAPSHOT_VERSION};
use crate::spec::{now_millis, BucketFile, Datum};

/// Commit identifier used when the caller does not supply one
pub const BATCH_COMMIT_IDENTIFIER: i64 = i64::MAX;

/// Longest pause between two commit attempts
const MAX_BACKOFF_MS: u64 = 5_000;

// =============================================================================
// Commit Request
// =============================================================================

/// Files to add and remove in one snapshot
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub kind: CommitKind,
    /// Schema the snapshot is committed under
    pub schema_id: u64,
    pub added: Vec<BucketFile>,
    pub deleted: Vec<BucketFile>,
    /// OVERWRITE only: restrict the overwrite to this partition
    pub overwrite_partition: Option<Vec<(String, Datum)>>,
    pub commit_identifier: i64,
    pub log_offsets: BTreeMap<u32, i64>,
    pub watermark: Option<i64>,
}

impl CommitRequest {
    fn with(kind: CommitKind, schema_id: u64, added: Vec<BucketFile>, deleted: Vec<BucketFile>) -> Self {
        Self {
            kind,
            schema_id,
            added,
            deleted,
            overwrite_partition: None,
            commit_identifier: BATCH_COMMIT_IDENTIFIER,
            log_offsets: BTreeMap::new(),
            watermark: None,
        }
    }

    /// Add new files
    pub fn append(schema_id: u64, added: Vec<BucketFile>) -> Self {
        Self::with(CommitKind::Append, schema_id, added, Vec::new())
    }

    /// Replace `deleted` by `added` (rewritten files)
    pub fn compact(schema_id: u64, added: Vec<BucketFile>, deleted: Vec<BucketFile>) -> Self {
        Self::with(CommitKind::Compact, schema_id, added, deleted)
    }

    /// Remove every live file (or every file of one partition), then add
    pub fn overwrite(schema_id: u64, added: Vec<BucketFile>) -> Self {
        Self::with(CommitKind::Overwrite, schema_id, added, Vec::new())
    }

    /// Remove files without adding any
    pub fn delete(schema_id: u64, deleted: Vec<BucketFile>) -> Self {
        Self::with(CommitKind::Append, schema_id, Vec::new(), deleted)
    }

    pub fn partition<I, K>(mut self, spec: I) -> Self
    where
        I: IntoIterator<Item = (K, Datum)>,
        K: Into<String>,
    {
        self.overwrite_partition = Some(spec.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn identifier(mut self, identifier: i64) -> Self {
        self.commit_identifier = identifier;
        self
    }

    pub fn log_offset(mut self, bucket: u32, offset: i64) -> Self {
        self.log_offsets.insert(bucket, offset);
        self
    }

    pub fn watermark(mut self, watermark: i64) -> Self {
        self.watermark = Some(watermark);
        self
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Builds and publishes snapshots for one table
#[derive(Debug, Clone)]
pub struct CommitCoordinator {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
    config: Arc<Config>,
    store: SnapshotStore,
    scanner: FileScanner,
    schemas: SchemaManager,
    manifests: ManifestFile,
    manifest_lists: ManifestList,
}

impl CommitCoordinator {
    pub fn new(io: Arc<dyn FileIO>, table_root: &Path, config: Arc<Config>, arena: Arc<MetadataArena>) -> Self {
        Self {
            store: SnapshotStore::new(io.clone(), table_root, arena.clone()),
            scanner: FileScanner::new(io.clone(), table_root, arena, config.scan_parallelism, false),
            schemas: SchemaManager::new(io.clone(), table_root),
            manifests: ManifestFile::new(io.clone(), table_root),
            manifest_lists: ManifestList::new(io.clone(), table_root),
            io,
            table_root: table_root.to_path_buf(),
            config,
        }
    }

    /// Commit with bounded retry on `ConcurrentModification`
    pub fn commit(&self, request: &CommitRequest) -> Result<u64> {
        let max_retries = self.config.commit_max_retries;
        let mut attempt = 0usize;
        loop {
            match self.try_commit(request) {
                Ok(id) => return Ok(id),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let backoff = self
                        .config
                        .commit_retry_backoff_ms
                        .saturating_mul(1u64 << attempt.min(16))
                        .min(MAX_BACKOFF_MS);
                    warn!(attempt = attempt + 1, backoff_ms = backoff, error = %e, "Commit lost race, retrying");
                    if backoff > 0 {
                        thread::sleep(Duration::from_millis(backoff));
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Exactly one commit attempt against the current latest snapshot
    pub fn try_commit(&self, request: &CommitRequest) -> Result<u64> {
        // Step 1: Validate
        if request.kind != CommitKind::Overwrite && request.added.is_empty() && request.deleted.is_empty() {
            return Err(LakeError::InvalidArgument("empty commit".to_string()));
        }
        if request.overwrite_partition.is_some() && request.kind != CommitKind::Overwrite {
            return Err(LakeError::InvalidArgument(
                "a partition filter is only valid for OVERWRITE".to_string(),
            ));
        }
        let schema = self.commit_schema(request.schema_id)?;
        self.validate_files(&request.added)?;

        // Step 2: Base state
        let base = self.store.read_latest()?;
        let expected = base.as_ref().map(|s| s.id);
        let live = match &base {
            Some(s) => self.scanner.resolve_live_files(s)?,
            None => Vec::new(),
        };
        let live_ids: HashMap<_, &ManifestEntry> = live.iter().map(|e| (e.identifier(), e)).collect();

        // Step 3: Entries
        let mut entries = Vec::with_capacity(request.added.len() + request.deleted.len());
        let mut deleted_ids = HashSet::new();

        if request.kind == CommitKind::Overwrite {
            let filter = self.partition_filter(&schema, request.overwrite_partition.as_deref())?;
            for entry in &live {
                let in_scope = filter
                    .iter()
                    .all(|(idx, v)| entry.partition.get(*idx).map_or(false, |p| p.total_cmp(v).is_eq()));
                if in_scope && deleted_ids.insert(entry.identifier()) {
                    entries.push(entry.to_delete());
                }
            }
        }
        for file in &request.deleted {
            let entry = ManifestEntry::from_bucket_file(FileKind::Delete, file.clone());
            let id = entry.identifier();
            if !live_ids.contains_key(&id) {
                return Err(LakeError::CommitConflict(format!(
                    "file {} is not live in snapshot {:?}",
                    file.file.file_name, expected
                )));
            }
            if deleted_ids.insert(id) {
                entries.push(entry);
            }
        }
        let add_kind = if request.kind == CommitKind::Compact {
            FileKind::Compact
        } else {
            FileKind::Add
        };
        for file in &request.added {
            let entry = ManifestEntry::from_bucket_file(add_kind, file.clone());
            let id = entry.identifier();
            if live_ids.contains_key(&id) && !deleted_ids.contains(&id) {
                return Err(LakeError::CommitConflict(format!(
                    "file {} is already live",
                    file.file.file_name
                )));
            }
            entries.push(entry);
        }

        // Step 4: Manifests and lists
        let factory = PathFactory::new(&self.table_root, &self.config.file_extension);
        let metas = self.manifests.write_rolling(
            &factory,
            &entries,
            &schema.partition_keys,
            schema.id,
            self.config.manifest_target_entries,
        )?;
        let delta_list = self.manifest_lists.write(&factory, &metas)?;

        let mut base_metas = Vec::new();
        if let Some(prev) = &base {
            base_metas.extend(self.scanner.read_manifest_list(&prev.base_manifest_list)?.iter().cloned());
            base_metas.extend(self.scanner.read_manifest_list(&prev.delta_manifest_list)?.iter().cloned());
        }
        let base_list = self.manifest_lists.write(&factory, &base_metas)?;

        // Step 5: Snapshot
        let added_rows: u64 = entries
            .iter()
            .filter(|e| e.kind.is_add())
            .map(|e| e.file.add_row_count())
            .sum();
        let deleted_rows: u64 = entries
            .iter()
            .filter(|e| !e.kind.is_add())
            .map(|e| e.file.add_row_count())
            .sum();
        let previous_total = base.as_ref().map_or(0, |s| s.total_record_count);

        let mut log_offsets = base.as_ref().map(|s| s.log_offsets.clone()).unwrap_or_default();
        log_offsets.extend(request.log_offsets.iter().map(|(k, v)| (*k, *v)));
        let watermark = match (base.as_ref().and_then(|s| s.watermark), request.watermark) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            id: expected.map_or(1, |id| id + 1),
            schema_id: schema.id,
            base_manifest_list: base_list,
            delta_manifest_list: delta_list,
            changelog_manifest_list: None,
            index_manifest: None,
            commit_user: self.config.commit_user.clone(),
            commit_identifier: request.commit_identifier,
            commit_kind: request.kind,
            time_millis: now_millis(),
            log_offsets,
            total_record_count: (previous_total + added_rows).saturating_sub(deleted_rows),
            delta_record_count: added_rows as i64 - deleted_rows as i64,
            changelog_record_count: None,
            watermark,
        };
        debug!(
            snapshot_id = snapshot.id,
            entries = entries.len(),
            manifests = metas.len(),
            "Prepared snapshot"
        );

        // Step 6: Publish
        self.store.commit(&snapshot, expected)?;
        info!(
            snapshot_id = snapshot.id,
            added = request.added.len(),
            deleted = entries.len() - request.added.len(),
            "Commit succeeded"
        );
        Ok(snapshot.id)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn commit_schema(&self, schema_id: u64) -> Result<TableSchema> {
        match self.schemas.schema(schema_id) {
            Ok(schema) => Ok(schema),
            Err(LakeError::NotFound { .. }) => Err(LakeError::SchemaMismatch(format!(
                "schema {} does not exist",
                schema_id
            ))),
            Err(e) => Err(e),
        }
    }

    /// Every added file must reference an existing schema and match its bucket count
    fn validate_files(&self, files: &[BucketFile]) -> Result<()> {
        let mut checked: HashMap<u64, u32> = HashMap::new();
        for file in files {
            let schema_id = file.file.schema_id;
            let buckets = match checked.get(&schema_id) {
                Some(&b) => b,
                None => {
                    let b = self.commit_schema(schema_id)?.total_buckets()?;
                    checked.insert(schema_id, b);
                    b
                }
            };
            if file.total_buckets != buckets || file.bucket >= buckets {
                return Err(LakeError::SchemaMismatch(format!(
                    "file {} has bucket {}/{}, schema {} has {} buckets",
                    file.file.file_name, file.bucket, file.total_buckets, schema_id, buckets
                )));
            }
            if !self.io.exists(&file.file.resolve_path(&self.table_root))? {
                return Err(LakeError::not_found("data file", file.file.resolve_path(&self.table_root)));
            }
        }
        Ok(())
    }

    fn partition_filter<'a>(
        &self,
        schema: &TableSchema,
        spec: Option<&'a [(String, Datum)]>,
    ) -> Result<Vec<(usize, &'a Datum)>> {
        let mut out = Vec::new();
        for (key, value) in spec.unwrap_or(&[]) {
            let idx = schema
                .partition_keys
                .iter()
                .position(|k| k == key)
                .ok_or_else(|| LakeError::InvalidPartition(format!("'{}' is not a partition key", key)))?;
            out.push((idx, value));
        }
        Ok(out)
    }
}
