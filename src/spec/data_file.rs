//! Data file metadata
//!
//! `DataFileMeta` is the canonical per-file unit carried by manifest entries.
//! Field names on the wire follow the table format (`_FILE_NAME`, ...).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::datum::Row;
use super::stats::SimpleStats;

/// Where a data file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FileSource {
    Append = 0,
    Compact = 1,
}

impl TryFrom<u8> for FileSource {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(FileSource::Append),
            1 => Ok(FileSource::Compact),
            other => Err(format!("unknown file source {}", other)),
        }
    }
}

impl From<FileSource> for u8 {
    fn from(v: FileSource) -> u8 {
        v as u8
    }
}

/// Metadata of one immutable data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileMeta {
    /// Path relative to the table root (`<partition>/bucket-<n>/data-...`)
    #[serde(rename = "_FILE_NAME")]
    pub file_name: String,

    #[serde(rename = "_FILE_SIZE")]
    pub file_size: u64,

    #[serde(rename = "_ROW_COUNT")]
    pub row_count: u64,

    #[serde(rename = "_MIN_KEY")]
    pub min_key: Row,

    #[serde(rename = "_MAX_KEY")]
    pub max_key: Row,

    #[serde(rename = "_KEY_STATS")]
    pub key_stats: SimpleStats,

    #[serde(rename = "_VALUE_STATS")]
    pub value_stats: SimpleStats,

    #[serde(rename = "_MIN_SEQUENCE_NUMBER")]
    pub min_sequence_number: i64,

    #[serde(rename = "_MAX_SEQUENCE_NUMBER")]
    pub max_sequence_number: i64,

    #[serde(rename = "_SCHEMA_ID")]
    pub schema_id: u64,

    /// LSM level (0 for freshly written files)
    #[serde(rename = "_LEVEL")]
    pub level: u32,

    #[serde(rename = "_EXTRA_FILES")]
    pub extra_files: Vec<String>,

    /// Unix millis
    #[serde(rename = "_CREATION_TIME")]
    pub creation_time: i64,

    #[serde(rename = "_DELETE_ROW_COUNT", default)]
    pub delete_row_count: Option<u64>,

    #[serde(rename = "_EMBEDDED_FILE_INDEX", default)]
    pub embedded_file_index: Option<Vec<u8>>,

    #[serde(rename = "_FILE_SOURCE")]
    pub file_source: FileSource,

    #[serde(rename = "_VALUE_STATS_COLS", default)]
    pub value_stats_cols: Option<Vec<String>>,

    /// Absolute location for files stored outside the table root
    #[serde(rename = "_EXTERNAL_PATH", default)]
    pub external_path: Option<String>,

    #[serde(rename = "_FIRST_ROW_ID", default)]
    pub first_row_id: Option<i64>,

    #[serde(rename = "_WRITE_COLS", default)]
    pub write_cols: Option<Vec<String>>,
}

impl DataFileMeta {
    /// Metadata with empty stats, level 0, appended now
    pub fn new(file_name: impl Into<String>, file_size: u64, row_count: u64, schema_id: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            row_count,
            min_key: Vec::new(),
            max_key: Vec::new(),
            key_stats: SimpleStats::empty(),
            value_stats: SimpleStats::empty(),
            min_sequence_number: 0,
            max_sequence_number: 0,
            schema_id,
            level: 0,
            extra_files: Vec::new(),
            creation_time: super::now_millis(),
            delete_row_count: None,
            embedded_file_index: None,
            file_source: FileSource::Append,
            value_stats_cols: None,
            external_path: None,
            first_row_id: None,
            write_cols: None,
        }
    }

    /// Rows contributed to the table (row count minus deleted rows)
    pub fn add_row_count(&self) -> u64 {
        self.row_count
            .saturating_sub(self.delete_row_count.unwrap_or(0))
    }

    /// Physical location of this file for a given table root
    pub fn resolve_path(&self, table_root: &Path) -> PathBuf {
        match &self.external_path {
            Some(external) => PathBuf::from(external),
            None => table_root.join(&self.file_name),
        }
    }
}

/// A data file together with the (partition, bucket) it belongs to.
///
/// Produced by the writer, consumed by commits and returned by scans.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketFile {
    /// Partition values in declared partition-key order
    pub partition: Row,
    pub bucket: u32,
    pub total_buckets: u32,
    pub file: DataFileMeta,
}

impl BucketFile {
    pub fn new(partition: Row, bucket: u32, total_buckets: u32, file: DataFileMeta) -> Self {
        Self {
            partition,
            bucket,
            total_buckets,
            file,
        }
    }
}
