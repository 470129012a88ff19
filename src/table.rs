//! Table Module
//!
//! Entry point that ties detection, scanning, writing and committing together
//! for one table root.
//!
//! ## Responsibilities
//! - Create new Paimon-layout tables (schema 0, metadata directories)
//! - Open existing tables and classify their format
//! - Hand out writers and commit their output
//! - Schema evolution with retry on a lost race
//!
//! ## Concurrency Model
//!
//! A `Table` holds no authoritative state: every call re-reads the hints and
//! metadata files it needs, so handles in different processes can share a
//! table root. The only process-local state is the [`MetadataArena`] cache of
//! immutable metadata files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::arena::MetadataArena;
use crate::commit::{CommitCoordinator, CommitRequest};
use crate::config::Config;
use crate::error::{LakeError, Result};
use crate::format::{self, IcebergFormat, PaimonFormat, TableFormat, TableFormatKind};
use crate::io::{self, FileIO};
use crate::path::{self as layout, PathFactory};
use crate::router::BucketFunction;
use crate::scan::{raw_scan, RawFile, ScanOptions, ScanPlan};
use crate::schema::{SchemaChange, SchemaManager, TableSchema, BUCKET_FUNCTION_OPTION, BUCKET_OPTION};
use crate::snapshot::{SnapshotInfo, SnapshotStore};
use crate::writer::TableWriter;

/// Handle to one table
#[derive(Debug)]
pub struct Table {
    io: Arc<dyn FileIO>,
    root: PathBuf,
    config: Arc<Config>,
    arena: Arc<MetadataArena>,
    format: Box<dyn TableFormat>,
    kind: TableFormatKind,
}

impl Table {
    /// Create a new Paimon-layout table.
    ///
    /// Steps:
    /// 1. Resolve the locator to a storage backend
    /// 2. Fill in the bucket options the schema leaves unset
    /// 3. Publish schema 0 (fails if the table already exists)
    /// 4. Create the snapshot and manifest directories
    pub fn create(locator: &str, schema: TableSchema, config: Config) -> Result<Self> {
        // Step 1: Resolve storage
        let (io, root) = io::resolve(locator, config.sync_writes)?;

        // Step 2: Bucket options
        let mut schema = schema;
        schema
            .options
            .entry(BUCKET_OPTION.to_string())
            .or_insert_with(|| config.default_buckets.to_string());
        schema
            .options
            .entry(BUCKET_FUNCTION_OPTION.to_string())
            .or_insert_with(|| BucketFunction::default().as_str().to_string());

        // Step 3: Schema 0
        SchemaManager::new(io.clone(), &root).create_table(&schema)?;

        // Step 4: Remaining layout
        io.create_dir_all(&layout::snapshot_dir(&root))?;
        io.create_dir_all(&layout::manifest_dir(&root))?;
        info!(table = %root.display(), buckets = %schema.total_buckets()?, "Created table");

        Self::with_io(io, root, config)
    }

    /// Open an existing table of any supported format
    pub fn open(locator: &str, config: Config) -> Result<Self> {
        let (io, root) = io::resolve(locator, config.sync_writes)?;
        Self::with_io(io, root, config)
    }

    /// Open a table on an explicit storage backend
    pub fn with_io(io: Arc<dyn FileIO>, root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let root = root.into();
        let config = Arc::new(config);
        let arena = Arc::new(MetadataArena::with_capacity(config.metadata_cache_entries));

        let kind = format::detect(io.as_ref(), &root)?;
        let format: Box<dyn TableFormat> = match kind {
            TableFormatKind::Paimon => Box::new(PaimonFormat::new(
                io.clone(),
                &root,
                arena.clone(),
                config.scan_parallelism,
                config.verify_files,
            )),
            TableFormatKind::Iceberg => Box::new(IcebergFormat::new(io.clone(), &root)),
            TableFormatKind::Unknown => {
                return Err(LakeError::Unsupported(format!(
                    "no known table format at {}",
                    root.display()
                )))
            }
        };
        info!(table = %root.display(), format = %kind, "Opened table");

        Ok(Self {
            io,
            root,
            config,
            arena,
            format,
            kind,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind(&self) -> TableFormatKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn io(&self) -> &Arc<dyn FileIO> {
        &self.io
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn arena(&self) -> &Arc<MetadataArena> {
        &self.arena
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Current schema
    pub fn schema(&self) -> Result<TableSchema> {
        self.format.schema()
    }

    /// A specific schema version (cached after the first read)
    pub fn schema_by_id(&self, schema_id: u64) -> Result<Arc<TableSchema>> {
        self.require_paimon("reading schema versions")?;
        if let Some(cached) = self.arena.schema(schema_id) {
            return Ok(cached);
        }
        let schema = self.schemas().schema(schema_id)?;
        Ok(self.arena.insert_schema(schema))
    }

    /// Live data files for the requested snapshot
    pub fn scan(&self, options: &ScanOptions) -> Result<ScanPlan> {
        self.format.resolve_live_files(options)
    }

    /// Snapshot history, oldest first
    pub fn snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        self.format.snapshots()
    }

    pub fn latest_snapshot(&self) -> Result<Option<SnapshotInfo>> {
        Ok(self.snapshots()?.pop())
    }

    /// Best-effort directory listing, independent of committed metadata
    pub fn raw_scan(&self) -> Result<Vec<RawFile>> {
        raw_scan(self.io.as_ref(), &self.root, &self.config.raw_scan_extensions)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Writer for the latest schema, or for `schema_id` if given.
    ///
    /// Sequence numbers continue after the highest one currently live.
    pub fn new_writer(&self, schema_id: Option<u64>) -> Result<TableWriter> {
        self.require_paimon("writing")?;
        let schema = match schema_id {
            Some(id) => self.schema_by_id(id)?,
            None => Arc::new(self.schema()?),
        };

        let store = SnapshotStore::new(self.io.clone(), &self.root, self.arena.clone());
        let first_sequence = match store.read_latest()? {
            Some(latest) => {
                let scanner = crate::scan::FileScanner::new(
                    self.io.clone(),
                    &self.root,
                    self.arena.clone(),
                    self.config.scan_parallelism,
                    false,
                );
                scanner
                    .resolve_live_files(&latest)?
                    .iter()
                    .map(|e| e.file.max_sequence_number)
                    .max()
                    .map_or(0, |max| max + 1)
            }
            None => 0,
        };

        let factory = PathFactory::new(&self.root, &self.config.file_extension);
        TableWriter::new(
            self.io.clone(),
            schema,
            factory,
            self.config.target_file_rows,
            first_sequence,
        )
    }

    /// Commit with retry on a lost race. Returns the new snapshot id.
    pub fn commit(&self, request: &CommitRequest) -> Result<u64> {
        self.require_paimon("committing")?;
        self.coordinator().commit(request)
    }

    /// Single commit attempt; a lost race surfaces as `ConcurrentModification`
    pub fn try_commit(&self, request: &CommitRequest) -> Result<u64> {
        self.require_paimon("committing")?;
        self.coordinator().try_commit(request)
    }

    /// Publish the next schema version
    pub fn evolve_schema(&self, changes: &[SchemaChange]) -> Result<TableSchema> {
        self.require_paimon("evolving the schema")?;
        let schemas = self.schemas();
        let mut attempt = 0usize;
        loop {
            match schemas.commit_changes(changes) {
                Ok(next) => return Ok(next),
                Err(e) if e.is_retryable() && attempt < self.config.commit_max_retries => {
                    warn!(attempt = attempt + 1, error = %e, "Schema change lost race, retrying");
                    thread::sleep(Duration::from_millis(self.config.commit_retry_backoff_ms));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn schemas(&self) -> SchemaManager {
        SchemaManager::new(self.io.clone(), &self.root)
    }

    fn coordinator(&self) -> CommitCoordinator {
        CommitCoordinator::new(self.io.clone(), &self.root, self.config.clone(), self.arena.clone())
    }

    fn require_paimon(&self, action: &str) -> Result<()> {
        if self.kind != TableFormatKind::Paimon {
            return Err(LakeError::Unsupported(format!(
                "{} on a {} table",
                action, self.kind
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileIO;
    use crate::schema::DataType;
    use crate::spec::Datum;

    fn schema() -> TableSchema {
        TableSchema::builder()
            .column("id", DataType::bigint().not_null())
            .column("v", DataType::string())
            .primary_keys(["id"])
            .build()
            .unwrap()
    }

    fn create(io: &Arc<MemoryFileIO>, config: Config) -> Table {
        let root = Path::new("/t");
        let dyn_io: Arc<dyn FileIO> = io.clone();
        let mut schema = schema();
        schema.options.insert(BUCKET_OPTION.into(), config.default_buckets.to_string());
        SchemaManager::new(dyn_io.clone(), root).create_table(&schema).unwrap();
        dyn_io.create_dir_all(&layout::snapshot_dir(root)).unwrap();
        dyn_io.create_dir_all(&layout::manifest_dir(root)).unwrap();
        Table::with_io(dyn_io, root, config).unwrap()
    }

    #[test]
    fn test_create_fills_bucket_options() {
        let config = Config::builder().default_buckets(3).build().unwrap();
        let table = Table::create("memory://table-create-test/t", schema(), config).unwrap();
        let schema = table.schema().unwrap();
        assert_eq!(table.kind(), TableFormatKind::Paimon);
        assert_eq!(schema.total_buckets().unwrap(), 3);
        assert_eq!(schema.options[BUCKET_FUNCTION_OPTION], "xxh3-v1");
    }

    #[test]
    fn test_write_commit_scan() {
        let io = Arc::new(MemoryFileIO::new());
        let table = create(&io, Config::default());

        let mut writer = table.new_writer(None).unwrap();
        writer.append(vec![Datum::Long(1), Datum::String("a".into())]).unwrap();
        writer.append(vec![Datum::Long(2), Datum::String("b".into())]).unwrap();
        let files = writer.close().unwrap();

        let id = table.commit(&CommitRequest::append(0, files)).unwrap();
        assert_eq!(id, 1);

        let plan = table.scan(&ScanOptions::new()).unwrap();
        assert_eq!(plan.row_count(), 2);
        assert_eq!(table.latest_snapshot().unwrap().unwrap().id, 1);
    }

    #[test]
    fn test_sequence_numbers_continue_across_writers() {
        let io = Arc::new(MemoryFileIO::new());
        let table = create(&io, Config::default());

        let mut first = table.new_writer(None).unwrap();
        first.append(vec![Datum::Long(1), Datum::Null]).unwrap();
        table.commit(&CommitRequest::append(0, first.close().unwrap())).unwrap();

        let mut second = table.new_writer(None).unwrap();
        second.append(vec![Datum::Long(1), Datum::String("x".into())]).unwrap();
        let files = second.close().unwrap();
        assert_eq!(files[0].file.min_sequence_number, 1);
    }

    #[test]
    fn test_try_commit_single_attempt() {
        let io = Arc::new(MemoryFileIO::new());
        let table = create(&io, Config::default());

        let mut writer = table.new_writer(None).unwrap();
        writer.append(vec![Datum::Long(7), Datum::Null]).unwrap();
        let files = writer.close().unwrap();
        assert_eq!(table.try_commit(&CommitRequest::append(0, files)).unwrap(), 1);
        assert_eq!(table.schema_by_id(0).unwrap().id, 0);
    }

    #[test]
    fn test_open_unknown_layout_is_unsupported() {
        let io: Arc<dyn FileIO> = Arc::new(MemoryFileIO::new());
        io.create_dir_all(Path::new("/plain/data")).unwrap();
        let err = Table::with_io(io, "/plain", Config::default()).unwrap_err();
        assert!(matches!(err, LakeError::Unsupported(_)));
    }
}
