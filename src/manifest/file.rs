//! Manifest file and manifest list I/O

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::path::{self, PathFactory};
use crate::spec::StatsCollector;

use super::{
    decode_manifest, decode_manifest_list, encode_manifest, encode_manifest_list, ManifestEntry,
    ManifestFileMeta,
};

fn read_named(io: &dyn FileIO, table_root: &Path, what: &'static str, name: &str) -> Result<(PathBuf, bytes::Bytes)> {
    let file = path::manifest_dir(table_root).join(name);
    match io.read(&file) {
        Ok(bytes) => Ok((file, bytes)),
        Err(LakeError::NotFound { .. }) => Err(LakeError::not_found(what, file)),
        Err(e) => Err(e),
    }
}

fn name_of(file: &Path) -> Result<String> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| LakeError::InvalidArgument(format!("bad manifest path {}", file.display())))
}

// =============================================================================
// Manifest Files
// =============================================================================

/// Reads and writes `manifest/manifest-*` files
#[derive(Debug, Clone)]
pub struct ManifestFile {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
}

impl ManifestFile {
    pub fn new(io: Arc<dyn FileIO>, table_root: &Path) -> Self {
        Self {
            io,
            table_root: table_root.to_path_buf(),
        }
    }

    /// Read all entries of a manifest by file name
    pub fn read(&self, file_name: &str) -> Result<Vec<ManifestEntry>> {
        let (file, bytes) = read_named(self.io.as_ref(), &self.table_root, "manifest", file_name)?;
        decode_manifest(&file, &bytes)
    }

    /// Write one manifest and summarize it for the manifest list
    pub fn write(
        &self,
        factory: &PathFactory,
        entries: &[ManifestEntry],
        partition_keys: &[String],
        schema_id: u64,
    ) -> Result<ManifestFileMeta> {
        let file = factory.new_manifest();
        let bytes = encode_manifest(entries)?;
        self.io
            .write_atomic(&file, &bytes)
            .map_err(|e| LakeError::partial_write(&file, e))?;

        let mut partitions = StatsCollector::new(
            partition_keys.to_vec(),
            (0..partition_keys.len()).collect(),
        );
        let mut meta = ManifestFileMeta {
            file_name: name_of(&file)?,
            file_size: bytes.len() as u64,
            num_added_files: 0,
            num_deleted_files: 0,
            partition_stats: Default::default(),
            schema_id,
            min_bucket: None,
            max_bucket: None,
            min_level: None,
            max_level: None,
        };
        for entry in entries {
            if entry.kind.is_add() {
                meta.num_added_files += 1;
            } else {
                meta.num_deleted_files += 1;
            }
            partitions.update(&entry.partition);
            meta.min_bucket = Some(meta.min_bucket.map_or(entry.bucket, |b| b.min(entry.bucket)));
            meta.max_bucket = Some(meta.max_bucket.map_or(entry.bucket, |b| b.max(entry.bucket)));
            let level = entry.file.level;
            meta.min_level = Some(meta.min_level.map_or(level, |l| l.min(level)));
            meta.max_level = Some(meta.max_level.map_or(level, |l| l.max(level)));
        }
        meta.partition_stats = partitions.finish();

        debug!(file = %meta.file_name, entries = entries.len(), "Wrote manifest");
        Ok(meta)
    }

    /// Write entries split into manifests of at most `target_entries` each
    pub fn write_rolling(
        &self,
        factory: &PathFactory,
        entries: &[ManifestEntry],
        partition_keys: &[String],
        schema_id: u64,
        target_entries: usize,
    ) -> Result<Vec<ManifestFileMeta>> {
        entries
            .chunks(target_entries.max(1))
            .map(|chunk| self.write(factory, chunk, partition_keys, schema_id))
            .collect()
    }
}

// =============================================================================
// Manifest Lists
// =============================================================================

/// Reads and writes `manifest/manifest-list-*` files
#[derive(Debug, Clone)]
pub struct ManifestList {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
}

impl ManifestList {
    pub fn new(io: Arc<dyn FileIO>, table_root: &Path) -> Self {
        Self {
            io,
            table_root: table_root.to_path_buf(),
        }
    }

    pub fn read(&self, list_name: &str) -> Result<Vec<ManifestFileMeta>> {
        let (file, bytes) =
            read_named(self.io.as_ref(), &self.table_root, "manifest list", list_name)?;
        decode_manifest_list(&file, &bytes)
    }

    /// Write a manifest list and return its file name
    pub fn write(&self, factory: &PathFactory, metas: &[ManifestFileMeta]) -> Result<String> {
        let file = factory.new_manifest_list();
        let bytes = encode_manifest_list(metas)?;
        self.io
            .write_atomic(&file, &bytes)
            .map_err(|e| LakeError::partial_write(&file, e))?;
        debug!(file = %file.display(), manifests = metas.len(), "Wrote manifest list");
        name_of(&file)
    }
}
