//! Paimon layout

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::arena::MetadataArena;
use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::path;
use crate::scan::{FileScanner, ScanOptions, ScanPlan};
use crate::schema::{SchemaManager, TableSchema};
use crate::snapshot::SnapshotInfo;

use super::{TableFormat, TableFormatKind};

/// Full read support for the `schema/ snapshot/ manifest/` layout
#[derive(Debug, Clone)]
pub struct PaimonFormat {
    table_root: PathBuf,
    schemas: SchemaManager,
    scanner: FileScanner,
}

impl PaimonFormat {
    pub fn new(
        io: Arc<dyn FileIO>,
        table_root: &Path,
        arena: Arc<MetadataArena>,
        scan_parallelism: usize,
        verify_files: bool,
    ) -> Self {
        Self {
            table_root: table_root.to_path_buf(),
            schemas: SchemaManager::new(io.clone(), table_root),
            scanner: FileScanner::new(io, table_root, arena, scan_parallelism, verify_files),
        }
    }

    pub fn scanner(&self) -> &FileScanner {
        &self.scanner
    }
}

impl TableFormat for PaimonFormat {
    fn kind(&self) -> TableFormatKind {
        TableFormatKind::Paimon
    }

    fn detect(io: &dyn FileIO, table_root: &Path) -> Result<bool> {
        Ok(io.is_dir(&path::schema_dir(table_root))?
            && io.is_dir(&path::snapshot_dir(table_root))?
            && io.is_dir(&path::manifest_dir(table_root))?)
    }

    fn schema(&self) -> Result<TableSchema> {
        self.schemas
            .latest()?
            .ok_or_else(|| LakeError::not_found("schema", path::schema_dir(&self.table_root)))
    }

    fn resolve_live_files(&self, options: &ScanOptions) -> Result<ScanPlan> {
        self.scanner.scan(options)
    }

    fn snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        Ok(self
            .scanner
            .snapshots()
            .snapshots()?
            .iter()
            .map(|s| SnapshotInfo::from(s.as_ref()))
            .collect())
    }
}
