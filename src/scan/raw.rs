//! Raw directory scan
//!
//! Walks partition and bucket directories and returns every file whose
//! extension is in the configured list. Not transactional: it sees files
//! from uncommitted or failed writes too.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::path;

/// Top-level directories that never hold data files
const METADATA_DIRS: &[&str] = &[path::SCHEMA_DIR, path::SNAPSHOT_DIR, path::MANIFEST_DIR, "metadata"];

/// A file found by [`raw_scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: PathBuf,
    /// Path relative to the table root, `/`-separated
    pub relative: String,
    /// Partition key/value pairs parsed from `k=v` directories
    pub partition: Vec<(String, Option<String>)>,
    /// Bucket id if the file sits in a `bucket-<n>` directory
    pub bucket: Option<u32>,
    pub len: u64,
}

/// Best-effort listing of data files under a table root
pub fn raw_scan(io: &dyn FileIO, table_root: &Path, extensions: &[String]) -> Result<Vec<RawFile>> {
    if !io.is_dir(table_root)? {
        return Err(LakeError::not_found("table", table_root));
    }

    let mut out = Vec::new();
    let mut stack = vec![table_root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for status in io.list(&dir)? {
            let name = match status.file_name() {
                Some(n) => n.to_string(),
                None => continue,
            };
            if name.starts_with('.') {
                continue;
            }
            // `_`-prefixed entries are markers or staging dirs unless they are partitions
            if name.starts_with('_') && !(status.is_dir && name.contains('=')) {
                continue;
            }
            if status.is_dir {
                if dir == table_root && METADATA_DIRS.contains(&name.as_str()) {
                    continue;
                }
                stack.push(status.path);
                continue;
            }
            let matches = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
            if !matches {
                continue;
            }
            if let Some(file) = describe(table_root, status.path, status.len) {
                out.push(file);
            }
        }
    }

    out.sort_by(|a, b| a.relative.cmp(&b.relative));
    debug!(table = %table_root.display(), files = out.len(), "Raw directory scan");
    Ok(out)
}

fn describe(table_root: &Path, file: PathBuf, len: u64) -> Option<RawFile> {
    let relative = path::relative_to_root(table_root, &file)?;
    let mut segments: Vec<&str> = relative.split('/').collect();
    segments.pop();

    let mut bucket = None;
    let mut partition_segments = Vec::new();
    for segment in segments {
        if let Some(b) = path::parse_bucket(segment) {
            bucket = Some(b);
        } else if segment.contains('=') {
            partition_segments.push(segment);
        }
    }
    let partition = path::parse_partition_path(&partition_segments.join("/")).unwrap_or_default();

    Some(RawFile {
        path: file,
        relative,
        partition,
        bucket,
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileIO;

    #[test]
    fn test_raw_scan_filters_by_extension_and_skips_metadata() {
        let io = MemoryFileIO::new();
        let root = Path::new("/t");
        io.write_atomic(&root.join("schema/schema-0"), b"{}").unwrap();
        io.write_atomic(&root.join("manifest/manifest-a-0"), b"x").unwrap();
        io.write_atomic(&root.join("dt=2024/bucket-1/data-a-0.parquet"), b"1234").unwrap();
        io.write_atomic(&root.join("dt=2024/bucket-1/notes.txt"), b"x").unwrap();
        io.write_atomic(&root.join("bucket-0/data-b-0.ORC"), b"12").unwrap();
        io.write_atomic(&root.join("dt=2024/bucket-1/.data-c-0.parquet.tmp"), b"x").unwrap();

        let exts = vec!["parquet".to_string(), "orc".to_string()];
        let files = raw_scan(&io, root, &exts).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative, "bucket-0/data-b-0.ORC");
        assert_eq!(files[0].bucket, Some(0));
        assert!(files[0].partition.is_empty());
        assert_eq!(files[1].partition, vec![("dt".to_string(), Some("2024".to_string()))]);
        assert_eq!(files[1].len, 4);
    }

    #[test]
    fn test_raw_scan_keeps_underscore_partitions() {
        let io = MemoryFileIO::new();
        let root = Path::new("/t");
        io.write_atomic(&root.join("_region=eu/bucket-0/data-a-0.row"), b"123").unwrap();
        io.write_atomic(&root.join("_temporary/bucket-0/data-b-0.row"), b"1").unwrap();
        io.write_atomic(&root.join("_region=eu/_SUCCESS"), b"").unwrap();

        let files = raw_scan(&io, root, &["row".to_string()]).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "_region=eu/bucket-0/data-a-0.row");
        assert_eq!(files[0].partition, vec![("_region".to_string(), Some("eu".to_string()))]);
        assert_eq!(files[0].bucket, Some(0));
    }

    #[test]
    fn test_raw_scan_missing_root() {
        let io = MemoryFileIO::new();
        let err = raw_scan(&io, Path::new("/none"), &["row".to_string()]).unwrap_err();
        assert!(matches!(err, LakeError::NotFound { .. }));
    }
}
