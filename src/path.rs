//! Path Scheme
//!
//! Pure mapping from table root, partition values and bucket id to the
//! canonical layout. No I/O happens here.
//!
//! ## Layout
//! ```text
//! <table_root>/
//!   ├── schema/schema-<id>
//!   ├── snapshot/{snapshot-<id>, EARLIEST, LATEST}
//!   ├── manifest/{manifest-<uuid>-<n>, manifest-list-<uuid>-<n>}
//!   └── <k1>=<v1>/<k2>=<v2>/bucket-<b>/data-<uuid>-<n>.<ext>
//! ```
//!
//! File names embed a per-write UUID plus a counter owned by that write, so
//! concurrent writers never collide and never share a counter.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use url::form_urlencoded;
use uuid::Uuid;

use crate::error::{LakeError, Result};
use crate::spec::Datum;

// =============================================================================
// Layout Constants
// =============================================================================

pub const SCHEMA_DIR: &str = "schema";
pub const SNAPSHOT_DIR: &str = "snapshot";
pub const MANIFEST_DIR: &str = "manifest";

pub const SCHEMA_PREFIX: &str = "schema-";
pub const SNAPSHOT_PREFIX: &str = "snapshot-";
pub const MANIFEST_PREFIX: &str = "manifest-";
pub const MANIFEST_LIST_PREFIX: &str = "manifest-list-";
pub const DATA_FILE_PREFIX: &str = "data-";
pub const BUCKET_PREFIX: &str = "bucket-";

pub const EARLIEST: &str = "EARLIEST";
pub const LATEST: &str = "LATEST";

/// Directory name used for null partition values
pub const DEFAULT_PARTITION_NAME: &str = "__DEFAULT_PARTITION__";

// =============================================================================
// Partition and Bucket Paths
// =============================================================================

fn check_partition_token(kind: &str, token: &str) -> Result<()> {
    if token.is_empty() && kind == "key" {
        return Err(LakeError::InvalidPartition("empty partition key".to_string()));
    }
    if token.contains('/') || token.contains('=') || token.contains('\\') {
        return Err(LakeError::InvalidPartition(format!(
            "partition {} '{}' contains a path separator or '='",
            kind, token
        )));
    }
    Ok(())
}

fn encode_segment(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Relative partition path (`k1=v1/k2=v2`) in declared partition order.
///
/// Returns an empty string for unpartitioned tables. Keys or values that
/// contain `/` or `=` are rejected rather than escaped.
pub fn partition_path(spec: &[(String, Datum)]) -> Result<String> {
    let mut segments = Vec::with_capacity(spec.len());
    for (key, value) in spec {
        check_partition_token("key", key)?;
        let text = value
            .to_partition_string()
            .unwrap_or_else(|| DEFAULT_PARTITION_NAME.to_string());
        check_partition_token("value", &text)?;
        segments.push(format!("{}={}", encode_segment(key), encode_segment(&text)));
    }
    Ok(segments.join("/"))
}

/// Absolute partition directory under a table root
pub fn partition_dir(table_root: &Path, spec: &[(String, Datum)]) -> Result<PathBuf> {
    let rel = partition_path(spec)?;
    if rel.is_empty() {
        Ok(table_root.to_path_buf())
    } else {
        Ok(table_root.join(rel))
    }
}

/// `bucket-<id>` under a partition directory (or the table root)
pub fn bucket_dir(dir: &Path, bucket: u32) -> PathBuf {
    dir.join(format!("{}{}", BUCKET_PREFIX, bucket))
}

/// `data-<uuid>-<seq>.<ext>` under a bucket directory
pub fn data_file_path(bucket_dir: &Path, write_uuid: &Uuid, seq: u64, ext: &str) -> PathBuf {
    bucket_dir.join(data_file_name(write_uuid, seq, ext))
}

fn data_file_name(write_uuid: &Uuid, seq: u64, ext: &str) -> String {
    format!("{}{}-{}.{}", DATA_FILE_PREFIX, write_uuid, seq, ext)
}

/// Parse `k1=v1/k2=v2` back into key/value pairs (`None` for the default partition)
pub fn parse_partition_path(rel: &str) -> Result<Vec<(String, Option<String>)>> {
    let mut out = Vec::new();
    for segment in rel.split('/').filter(|s| !s.is_empty()) {
        if !segment.contains('=') {
            return Err(LakeError::InvalidPartition(format!(
                "segment '{}' is not key=value",
                segment
            )));
        }
        let (key, value) = form_urlencoded::parse(segment.as_bytes())
            .next()
            .ok_or_else(|| LakeError::InvalidPartition(format!("bad segment '{}'", segment)))?;
        let value = if value == DEFAULT_PARTITION_NAME {
            None
        } else {
            Some(value.into_owned())
        };
        out.push((key.into_owned(), value));
    }
    Ok(out)
}

/// `bucket-7` → 7
pub fn parse_bucket(name: &str) -> Option<u32> {
    name.strip_prefix(BUCKET_PREFIX)?.parse().ok()
}

/// Render `path` relative to the table root with `/` separators.
///
/// Returns `None` if `path` lies outside the root.
pub fn relative_to_root(table_root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(table_root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

// =============================================================================
// Metadata Paths
// =============================================================================

pub fn schema_dir(table_root: &Path) -> PathBuf {
    table_root.join(SCHEMA_DIR)
}

pub fn snapshot_dir(table_root: &Path) -> PathBuf {
    table_root.join(SNAPSHOT_DIR)
}

pub fn manifest_dir(table_root: &Path) -> PathBuf {
    table_root.join(MANIFEST_DIR)
}

pub fn schema_path(table_root: &Path, schema_id: u64) -> PathBuf {
    schema_dir(table_root).join(format!("{}{}", SCHEMA_PREFIX, schema_id))
}

pub fn snapshot_path(table_root: &Path, snapshot_id: u64) -> PathBuf {
    snapshot_dir(table_root).join(format!("{}{}", SNAPSHOT_PREFIX, snapshot_id))
}

pub fn latest_hint_path(table_root: &Path) -> PathBuf {
    snapshot_dir(table_root).join(LATEST)
}

pub fn earliest_hint_path(table_root: &Path) -> PathBuf {
    snapshot_dir(table_root).join(EARLIEST)
}

/// `manifest/manifest-<uuid>-<seq>`
pub fn manifest_path(table_root: &Path, write_uuid: &Uuid, seq: u64) -> PathBuf {
    manifest_dir(table_root).join(format!("{}{}-{}", MANIFEST_PREFIX, write_uuid, seq))
}

/// `manifest/manifest-list-<uuid>-<seq>`
pub fn manifest_list_path(table_root: &Path, write_uuid: &Uuid, seq: u64) -> PathBuf {
    manifest_dir(table_root).join(format!("{}{}-{}", MANIFEST_LIST_PREFIX, write_uuid, seq))
}

/// "snapshot-42" → Some(42)
pub fn parse_snapshot_id(name: &str) -> Option<u64> {
    name.strip_prefix(SNAPSHOT_PREFIX)?.parse().ok()
}

/// "schema-3" → Some(3)
pub fn parse_schema_id(name: &str) -> Option<u64> {
    name.strip_prefix(SCHEMA_PREFIX)?.parse().ok()
}

// =============================================================================
// Path Factory
// =============================================================================

/// Per-write path generator.
///
/// Owns the write UUID and the counters for data files, manifests and
/// manifest lists. Counters are local to one factory instance.
#[derive(Debug)]
pub struct PathFactory {
    table_root: PathBuf,
    write_uuid: Uuid,
    file_extension: String,
    data_seq: AtomicU64,
    manifest_seq: AtomicU64,
    manifest_list_seq: AtomicU64,
}

impl PathFactory {
    pub fn new(table_root: &Path, file_extension: &str) -> Self {
        Self::with_uuid(table_root, file_extension, Uuid::new_v4())
    }

    /// Factory with a caller-supplied write identifier
    pub fn with_uuid(table_root: &Path, file_extension: &str, write_uuid: Uuid) -> Self {
        Self {
            table_root: table_root.to_path_buf(),
            write_uuid,
            file_extension: file_extension.to_string(),
            data_seq: AtomicU64::new(0),
            manifest_seq: AtomicU64::new(0),
            manifest_list_seq: AtomicU64::new(0),
        }
    }

    pub fn table_root(&self) -> &Path {
        &self.table_root
    }

    pub fn write_uuid(&self) -> &Uuid {
        &self.write_uuid
    }

    /// Next data file: (absolute path, path relative to the table root)
    pub fn new_data_file(&self, partition: &[(String, Datum)], bucket: u32) -> Result<(PathBuf, String)> {
        let seq = self.data_seq.fetch_add(1, Ordering::SeqCst);
        let name = data_file_name(&self.write_uuid, seq, &self.file_extension);
        let part = partition_path(partition)?;
        let relative = if part.is_empty() {
            format!("{}{}/{}", BUCKET_PREFIX, bucket, name)
        } else {
            format!("{}/{}{}/{}", part, BUCKET_PREFIX, bucket, name)
        };
        Ok((self.table_root.join(&relative), relative))
    }

    pub fn new_manifest(&self) -> PathBuf {
        let seq = self.manifest_seq.fetch_add(1, Ordering::SeqCst);
        manifest_path(&self.table_root, &self.write_uuid, seq)
    }

    pub fn new_manifest_list(&self) -> PathBuf {
        let seq = self.manifest_list_seq.fetch_add(1, Ordering::SeqCst);
        manifest_list_path(&self.table_root, &self.write_uuid, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(pairs: &[(&str, Datum)]) -> Vec<(String, Datum)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_partition_path_in_declared_order() {
        let p = spec(&[("dt", Datum::from("2024-01-01")), ("country", Datum::from("US"))]);
        assert_eq!(partition_path(&p).unwrap(), "dt=2024-01-01/country=US");
    }

    #[test]
    fn test_partition_path_encodes_unsafe_chars() {
        let p = spec(&[("city", Datum::from("New York"))]);
        assert_eq!(partition_path(&p).unwrap(), "city=New+York");
    }

    #[test]
    fn test_partition_value_with_separator_fails_fast() {
        let p = spec(&[("dir", Datum::from("a/b"))]);
        assert!(matches!(partition_path(&p), Err(LakeError::InvalidPartition(_))));

        let p = spec(&[("expr", Datum::from("x=1"))]);
        assert!(matches!(partition_path(&p), Err(LakeError::InvalidPartition(_))));
    }

    #[test]
    fn test_null_partition_uses_default_name() {
        let p = spec(&[("country", Datum::Null)]);
        assert_eq!(partition_path(&p).unwrap(), "country=__DEFAULT_PARTITION__");
        let parsed = parse_partition_path("country=__DEFAULT_PARTITION__").unwrap();
        assert_eq!(parsed, vec![("country".to_string(), None)]);
    }

    #[test]
    fn test_parse_partition_path_decodes() {
        let parsed = parse_partition_path("city=New+York/dt=2024").unwrap();
        assert_eq!(
            parsed,
            vec![
                ("city".to_string(), Some("New York".to_string())),
                ("dt".to_string(), Some("2024".to_string())),
            ]
        );
    }

    #[test]
    fn test_unpartitioned_dir_is_root() {
        let root = Path::new("/t");
        assert_eq!(partition_dir(root, &[]).unwrap(), PathBuf::from("/t"));
        assert_eq!(bucket_dir(root, 3), PathBuf::from("/t/bucket-3"));
    }

    #[test]
    fn test_factory_names_are_unique_per_write() {
        let root = Path::new("/t");
        let factory = PathFactory::new(root, "row");
        let p = spec(&[("country", Datum::from("US"))]);

        let (abs1, rel1) = factory.new_data_file(&p, 0).unwrap();
        let (_, rel2) = factory.new_data_file(&p, 0).unwrap();

        assert_ne!(rel1, rel2);
        assert!(rel1.starts_with("country=US/bucket-0/data-"));
        assert!(rel1.ends_with("-0.row"));
        assert_eq!(abs1, root.join(&rel1));

        let other = PathFactory::new(root, "row");
        assert_ne!(factory.new_manifest(), other.new_manifest());
    }

    #[test]
    fn test_metadata_paths() {
        let root = Path::new("/t");
        assert_eq!(snapshot_path(root, 7), PathBuf::from("/t/snapshot/snapshot-7"));
        assert_eq!(schema_path(root, 0), PathBuf::from("/t/schema/schema-0"));
        assert_eq!(parse_snapshot_id("snapshot-12"), Some(12));
        assert_eq!(parse_snapshot_id("LATEST"), None);
        assert_eq!(parse_bucket("bucket-4"), Some(4));
    }

    #[test]
    fn test_relative_to_root() {
        let root = Path::new("/t");
        assert_eq!(
            relative_to_root(root, Path::new("/t/dt=1/bucket-0/data-x-0.row")),
            Some("dt=1/bucket-0/data-x-0.row".to_string())
        );
        assert_eq!(relative_to_root(root, Path::new("/other/f")), None);
    }
}
