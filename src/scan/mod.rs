//! File Discovery
//!
//! Answers "which data files make up the table at snapshot N".
//!
//! ## Responsibilities
//! - Resolve live files from the base + delta manifest lists of a snapshot
//! - Time travel by snapshot id or commit timestamp
//! - Incremental scans: files added after a given snapshot and still live
//! - Exact-match partition pruning
//! - Best-effort raw directory scan for tables without usable metadata
//!
//! ```text
//! Snapshot ──▶ base list ──┐
//!          └─▶ delta list ─┴─▶ manifests (parallel) ──▶ ADD/DELETE fold ──▶ ScanPlan
//! ```

mod raw;
mod scanner;

use crate::spec::{compare_rows, BucketFile, Datum, Row};

pub use raw::{raw_scan, RawFile};
pub use scanner::FileScanner;

/// A live file returned by a scan
pub type ScanFile = BucketFile;

/// What to scan
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Read this snapshot instead of the latest
    pub snapshot_id: Option<u64>,
    /// Read the newest snapshot committed at or before this time (unix millis)
    pub snapshot_timestamp_ms: Option<i64>,
    /// Only return files added after this snapshot that are still live
    pub incremental_since_snapshot: Option<u64>,
    /// Exact-match filter on some or all partition keys
    pub partition: Option<Vec<(String, Datum)>>,
    /// Check that every returned file exists (`None` uses the table config)
    pub verify_files: Option<bool>,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_id(mut self, id: u64) -> Self {
        self.snapshot_id = Some(id);
        self
    }

    pub fn snapshot_timestamp_ms(mut self, ts: i64) -> Self {
        self.snapshot_timestamp_ms = Some(ts);
        self
    }

    pub fn incremental_since(mut self, id: u64) -> Self {
        self.incremental_since_snapshot = Some(id);
        self
    }

    pub fn partition<I, K>(mut self, spec: I) -> Self
    where
        I: IntoIterator<Item = (K, Datum)>,
        K: Into<String>,
    {
        self.partition = Some(spec.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn verify_files(mut self, verify: bool) -> Self {
        self.verify_files = Some(verify);
        self
    }
}

/// Result of a scan. Finite and restartable: iterate it as often as needed.
#[derive(Debug, Clone, Default)]
pub struct ScanPlan {
    snapshot_id: Option<u64>,
    schema_id: Option<u64>,
    files: Vec<ScanFile>,
}

impl ScanPlan {
    pub(crate) fn new(snapshot_id: Option<u64>, schema_id: Option<u64>, files: Vec<ScanFile>) -> Self {
        Self {
            snapshot_id,
            schema_id,
            files,
        }
    }

    /// Empty plan for a table without snapshots
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the plan was resolved against (`None` for an empty table)
    pub fn snapshot_id(&self) -> Option<u64> {
        self.snapshot_id
    }

    pub fn schema_id(&self) -> Option<u64> {
        self.schema_id
    }

    pub fn files(&self) -> &[ScanFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScanFile> {
        self.files.iter()
    }

    /// Sum of live rows across files
    pub fn row_count(&self) -> u64 {
        self.files.iter().map(|f| f.file.add_row_count()).sum()
    }

    /// Files in merge order.
    ///
    /// Sorted by `(min_sequence_number, max_sequence_number, creation_time,
    /// file_name)`: when two files carry the same sequence range the older
    /// file comes first, and the file name settles exact ties so the order
    /// is deterministic.
    pub fn ordered_for_merge(&self) -> Vec<&ScanFile> {
        let mut files: Vec<&ScanFile> = self.files.iter().collect();
        files.sort_by(|a, b| {
            let (a, b) = (&a.file, &b.file);
            a.min_sequence_number
                .cmp(&b.min_sequence_number)
                .then(a.max_sequence_number.cmp(&b.max_sequence_number))
                .then(a.creation_time.cmp(&b.creation_time))
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        files
    }

    /// Files grouped by (partition, bucket), each group in merge order
    pub fn by_bucket(&self) -> Vec<(Row, u32, Vec<&ScanFile>)> {
        let mut groups: Vec<(Row, u32, Vec<&ScanFile>)> = Vec::new();
        for file in self.ordered_for_merge() {
            match groups
                .iter_mut()
                .find(|(p, b, _)| *b == file.bucket && compare_rows(p, &file.partition).is_eq())
            {
                Some((_, _, files)) => files.push(file),
                None => groups.push((file.partition.clone(), file.bucket, vec![file])),
            }
        }
        groups.sort_by(|a, b| compare_rows(&a.0, &b.0).then(a.1.cmp(&b.1)));
        groups
    }
}

impl IntoIterator for ScanPlan {
    type Item = ScanFile;
    type IntoIter = std::vec::IntoIter<ScanFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl<'a> IntoIterator for &'a ScanPlan {
    type Item = &'a ScanFile;
    type IntoIter = std::slice::Iter<'a, ScanFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DataFileMeta;

    fn file(name: &str, min_seq: i64, max_seq: i64, created: i64) -> ScanFile {
        let mut meta = DataFileMeta::new(name, 1, 1, 0);
        meta.min_sequence_number = min_seq;
        meta.max_sequence_number = max_seq;
        meta.creation_time = created;
        BucketFile::new(vec![Datum::from("US")], 0, 1, meta)
    }

    #[test]
    fn test_merge_order_tie_break() {
        let plan = ScanPlan::new(
            Some(1),
            Some(0),
            vec![
                file("c", 5, 9, 100),
                file("b", 5, 9, 50),
                file("a", 5, 9, 50),
                file("z", 1, 2, 900),
            ],
        );
        let names: Vec<&str> = plan
            .ordered_for_merge()
            .iter()
            .map(|f| f.file.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["z", "a", "b", "c"]);
    }

    #[test]
    fn test_by_bucket_groups() {
        let mut other = file("x", 1, 1, 1);
        other.bucket = 1;
        let plan = ScanPlan::new(Some(1), Some(0), vec![file("a", 2, 2, 1), other, file("b", 1, 1, 1)]);
        let groups = plan.by_bucket();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1, 0);
        assert_eq!(groups[0].2.len(), 2);
        assert_eq!(groups[0].2[0].file.file_name, "b");
    }
}
