//! Iceberg layout
//!
//! Reads table metadata JSON (schema and snapshot history). Iceberg
//! manifests are Avro and are not decoded, so live-file resolution reports
//! `Unsupported`; the raw directory scan still works on these tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::scan::{ScanOptions, ScanPlan};
use crate::schema::{DataField, DataType, TableSchema, TypeRoot};
use crate::snapshot::{CommitKind, SnapshotInfo};

use super::{TableFormat, TableFormatKind};

const METADATA_DIR: &str = "metadata";
const VERSION_HINT: &str = "version-hint.text";
const METADATA_SUFFIX: &str = ".metadata.json";

/// Metadata-only support for Iceberg tables
#[derive(Debug, Clone)]
pub struct IcebergFormat {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
}

impl IcebergFormat {
    pub fn new(io: Arc<dyn FileIO>, table_root: &Path) -> Self {
        Self {
            io,
            table_root: table_root.to_path_buf(),
        }
    }

    fn metadata_dir(&self) -> PathBuf {
        self.table_root.join(METADATA_DIR)
    }

    /// Locate the current metadata file: version hint first, else the
    /// highest-versioned `*.metadata.json`
    fn current_metadata_path(&self) -> Result<PathBuf> {
        let dir = self.metadata_dir();
        let hint = dir.join(VERSION_HINT);
        if self.io.exists(&hint)? {
            let raw = self.io.read(&hint)?;
            let version = String::from_utf8_lossy(&raw).trim().to_string();
            let candidate = dir.join(format!("v{}{}", version, METADATA_SUFFIX));
            if self.io.exists(&candidate)? {
                return Ok(candidate);
            }
            debug!(hint = %version, "Version hint has no matching metadata file");
        }

        self.io
            .list(&dir)?
            .into_iter()
            .filter(|s| !s.is_dir)
            .filter_map(|s| {
                let name = s.file_name()?.to_string();
                let stem = name.strip_suffix(METADATA_SUFFIX)?;
                Some((metadata_version(stem), name, s.path))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, _, path)| path)
            .ok_or_else(|| LakeError::not_found("iceberg metadata", dir))
    }

    fn read_metadata(&self) -> Result<(PathBuf, Value)> {
        let path = self.current_metadata_path()?;
        let bytes = self.io.read(&path)?;
        let value = serde_json::from_slice(&bytes).map_err(|e| LakeError::CorruptSchema {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok((path, value))
    }
}

/// `v3` → 3, `00003-<uuid>` → 3, anything else → 0
fn metadata_version(stem: &str) -> u64 {
    let digits: String = stem
        .trim_start_matches('v')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn iceberg_type(value: &Value, required: bool) -> DataType {
    let root = match value.as_str() {
        Some("boolean") => TypeRoot::Boolean,
        Some("int") => TypeRoot::Int,
        Some("long") => TypeRoot::BigInt,
        Some("double") => TypeRoot::Double,
        Some("string") => TypeRoot::String,
        Some("binary") => TypeRoot::Bytes,
        Some(other) => TypeRoot::Other(other.to_ascii_uppercase()),
        None => {
            let nested = value.get("type").and_then(Value::as_str).unwrap_or("struct");
            TypeRoot::Other(nested.to_ascii_uppercase())
        }
    };
    DataType {
        root,
        nullable: !required,
    }
}

/// Convert the current Iceberg schema into a [`TableSchema`]
fn parse_schema(path: &Path, meta: &Value) -> Result<TableSchema> {
    let corrupt = |reason: &str| LakeError::CorruptSchema {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let current_id = meta.get("current-schema-id").and_then(Value::as_u64);
    let schema = match (meta.get("schemas").and_then(Value::as_array), current_id) {
        (Some(schemas), Some(id)) => schemas
            .iter()
            .find(|s| s.get("schema-id").and_then(Value::as_u64) == Some(id))
            .ok_or_else(|| corrupt("current-schema-id not in schemas"))?,
        _ => meta.get("schema").ok_or_else(|| corrupt("no schema"))?,
    };

    let mut fields = Vec::new();
    for field in schema
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| corrupt("schema has no fields"))?
    {
        let id = field.get("id").and_then(Value::as_u64).ok_or_else(|| corrupt("field without id"))?;
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| corrupt("field without name"))?;
        let required = field.get("required").and_then(Value::as_bool).unwrap_or(false);
        fields.push(DataField {
            id: id as u32,
            name: name.to_string(),
            data_type: iceberg_type(field.get("type").unwrap_or(&Value::Null), required),
            description: field.get("doc").and_then(Value::as_str).map(str::to_string),
        });
    }

    let name_of = |id: u64| fields.iter().find(|f| f.id as u64 == id).map(|f| f.name.clone());

    let primary_keys: Vec<String> = schema
        .get("identifier-field-ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_u64).filter_map(name_of).collect())
        .unwrap_or_default();

    // Identity partition fields map onto partition keys
    let default_spec = meta.get("default-spec-id").and_then(Value::as_u64);
    let partition_keys: Vec<String> = meta
        .get("partition-specs")
        .and_then(Value::as_array)
        .and_then(|specs| {
            specs
                .iter()
                .find(|s| s.get("spec-id").and_then(Value::as_u64) == default_spec)
        })
        .and_then(|spec| spec.get("fields").and_then(Value::as_array))
        .map(|pf| {
            pf.iter()
                .filter(|f| f.get("transform").and_then(Value::as_str) == Some("identity"))
                .filter_map(|f| f.get("source-id").and_then(Value::as_u64))
                .filter_map(name_of)
                .collect()
        })
        .unwrap_or_default();

    Ok(TableSchema {
        version: 3,
        id: current_id.unwrap_or(0),
        highest_field_id: meta
            .get("last-column-id")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or_else(|| fields.iter().map(|f| f.id).max().unwrap_or(0)),
        fields,
        partition_keys,
        primary_keys,
        options: Default::default(),
        comment: None,
        time_millis: meta.get("last-updated-ms").and_then(Value::as_i64).unwrap_or(0),
    })
}

fn parse_snapshots(meta: &Value) -> Vec<SnapshotInfo> {
    let mut out: Vec<SnapshotInfo> = meta
        .get("snapshots")
        .and_then(Value::as_array)
        .map(|snapshots| {
            snapshots
                .iter()
                .filter_map(|s| {
                    let summary = s.get("summary");
                    let operation = summary
                        .and_then(|v| v.get("operation"))
                        .and_then(Value::as_str)
                        .unwrap_or("append");
                    Some(SnapshotInfo {
                        id: s.get("snapshot-id")?.as_u64()?,
                        schema_id: s.get("schema-id").and_then(Value::as_u64).unwrap_or(0),
                        time_millis: s.get("timestamp-ms").and_then(Value::as_i64).unwrap_or(0),
                        manifest_list: s
                            .get("manifest-list")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        commit_kind: match operation {
                            "overwrite" | "delete" => CommitKind::Overwrite,
                            "replace" => CommitKind::Compact,
                            _ => CommitKind::Append,
                        },
                        total_record_count: summary
                            .and_then(|v| v.get("total-records"))
                            .and_then(Value::as_str)
                            .and_then(|t| t.parse().ok())
                            .unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    out.sort_by_key(|s| (s.time_millis, s.id));
    out
}

impl TableFormat for IcebergFormat {
    fn kind(&self) -> TableFormatKind {
        TableFormatKind::Iceberg
    }

    fn detect(io: &dyn FileIO, table_root: &Path) -> Result<bool> {
        let dir = table_root.join(METADATA_DIR);
        if !io.is_dir(&dir)? {
            return Ok(false);
        }
        if io.exists(&dir.join(VERSION_HINT))? {
            return Ok(true);
        }
        Ok(io
            .list(&dir)?
            .iter()
            .any(|s| !s.is_dir && s.file_name().map_or(false, |n| n.ends_with(METADATA_SUFFIX))))
    }

    fn schema(&self) -> Result<TableSchema> {
        let (path, meta) = self.read_metadata()?;
        parse_schema(&path, &meta)
    }

    fn resolve_live_files(&self, _options: &ScanOptions) -> Result<ScanPlan> {
        Err(LakeError::Unsupported(format!(
            "live-file resolution for Iceberg table {} (use a raw scan)",
            self.table_root.display()
        )))
    }

    fn snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        let (_, meta) = self.read_metadata()?;
        Ok(parse_snapshots(&meta))
    }
}
