//! Manifest entries
//!
//! One entry records that a data file was added to or removed from a
//! (partition, bucket).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::spec::{BucketFile, DataFileMeta, Row};

/// Kind of change a manifest entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FileKind {
    Add = 0,
    Delete = 1,
    /// Added by a rewrite of existing files; live like `Add`
    Compact = 2,
}

impl FileKind {
    /// Whether entries of this kind make a file live
    pub fn is_add(self) -> bool {
        matches!(self, FileKind::Add | FileKind::Compact)
    }
}

impl TryFrom<u8> for FileKind {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(FileKind::Add),
            1 => Ok(FileKind::Delete),
            2 => Ok(FileKind::Compact),
            other => Err(format!("unknown file kind {}", other)),
        }
    }
}

impl From<FileKind> for u8 {
    fn from(v: FileKind) -> u8 {
        v as u8
    }
}

/// A single add/delete record in a manifest file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "_KIND")]
    pub kind: FileKind,

    /// Partition values in declared partition-key order
    #[serde(rename = "_PARTITION")]
    pub partition: Row,

    #[serde(rename = "_BUCKET")]
    pub bucket: u32,

    /// Bucket count of the layout the file was written under
    #[serde(rename = "_TOTAL_BUCKETS")]
    pub total_buckets: u32,

    #[serde(rename = "_FILE")]
    pub file: DataFileMeta,
}

impl ManifestEntry {
    pub fn new(kind: FileKind, partition: Row, bucket: u32, total_buckets: u32, file: DataFileMeta) -> Self {
        Self {
            kind,
            partition,
            bucket,
            total_buckets,
            file,
        }
    }

    /// The same file, recorded as removed
    pub fn to_delete(&self) -> Self {
        Self {
            kind: FileKind::Delete,
            ..self.clone()
        }
    }

    pub fn identifier(&self) -> FileIdentifier {
        FileIdentifier::new(&self.partition, self.bucket, &self.file.file_name)
    }

    pub fn from_bucket_file(kind: FileKind, file: BucketFile) -> Self {
        Self::new(kind, file.partition, file.bucket, file.total_buckets, file.file)
    }

    pub fn into_bucket_file(self) -> BucketFile {
        BucketFile::new(self.partition, self.bucket, self.total_buckets, self.file)
    }
}

/// Hashable key of a live file: (partition, bucket, file name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentifier {
    partition: Vec<u8>,
    pub bucket: u32,
    pub file_name: String,
}

impl FileIdentifier {
    pub fn new(partition: &[crate::spec::Datum], bucket: u32, file_name: &str) -> Self {
        let mut bytes = Vec::new();
        for value in partition {
            value.write_canonical(&mut bytes);
        }
        Self {
            partition: bytes,
            bucket,
            file_name: file_name.to_string(),
        }
    }
}

/// Fold entries in commit order into the set of live files.
///
/// ADD and COMPACT insert, DELETE removes. A DELETE for a file that is not
/// live is logged and ignored. Output is ordered by identifier.
pub fn merge_entries<I>(entries: I) -> Vec<ManifestEntry>
where
    I: IntoIterator<Item = ManifestEntry>,
{
    let mut live: BTreeMap<FileIdentifier, ManifestEntry> = BTreeMap::new();
    for entry in entries {
        let id = entry.identifier();
        if entry.kind.is_add() {
            live.insert(id, entry);
        } else if live.remove(&id).is_none() {
            warn!(file = %entry.file.file_name, bucket = entry.bucket, "DELETE for a file that is not live");
        }
    }
    live.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Datum;

    fn add(part: &str, bucket: u32, name: &str) -> ManifestEntry {
        ManifestEntry::new(
            FileKind::Add,
            vec![Datum::from(part)],
            bucket,
            2,
            DataFileMeta::new(name, 1, 1, 0),
        )
    }

    #[test]
    fn test_merge_add_then_delete() {
        let a = add("US", 0, "f1");
        let b = add("US", 1, "f2");
        let live = merge_entries(vec![a.clone(), b.clone(), a.to_delete()]);
        assert_eq!(live, vec![b]);
    }

    #[test]
    fn test_same_name_in_other_bucket_is_distinct() {
        let a = add("US", 0, "f1");
        let b = add("US", 1, "f1");
        let live = merge_entries(vec![a, b.clone(), add("US", 0, "f1").to_delete()]);
        assert_eq!(live, vec![b]);
    }

    #[test]
    fn test_unknown_delete_is_ignored() {
        let a = add("US", 0, "f1");
        let live = merge_entries(vec![add("EU", 0, "f9").to_delete(), a.clone()]);
        assert_eq!(live, vec![a]);
    }

    #[test]
    fn test_compact_counts_as_add() {
        let mut c = add("US", 0, "f3");
        c.kind = FileKind::Compact;
        assert_eq!(merge_entries(vec![c.clone()]), vec![c]);
    }
}
