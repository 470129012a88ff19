//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use lakemeta::io::FileIO;
use lakemeta::schema::SchemaManager;
use lakemeta::{BucketFile, Config, DataType, Datum, Row, ScanPlan, Table, TableSchema};
use tempfile::TempDir;

/// `(id BIGINT NOT NULL, country STRING NOT NULL, name STRING)`
/// partitioned by country, keyed by (country, id)
pub fn keyed_schema(buckets: u32) -> TableSchema {
    TableSchema::builder()
        .column("id", DataType::bigint().not_null())
        .column("country", DataType::string().not_null())
        .column("name", DataType::string())
        .partition_keys(["country"])
        .primary_keys(["country", "id"])
        .buckets(buckets)
        .build()
        .unwrap()
}

/// Same columns without keys or partitions
pub fn append_schema() -> TableSchema {
    TableSchema::builder()
        .column("id", DataType::bigint().not_null())
        .column("country", DataType::string().not_null())
        .column("name", DataType::string())
        .build()
        .unwrap()
}

pub fn row(id: i64, country: &str, name: &str) -> Row {
    vec![
        Datum::Long(id),
        Datum::String(country.to_string()),
        Datum::String(name.to_string()),
    ]
}

/// Create a table in a fresh temporary directory
pub fn local_table(schema: TableSchema, config: Config) -> (TempDir, Table) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("t");
    let table = Table::create(root.to_str().unwrap(), schema, config).unwrap();
    (dir, table)
}

/// Lay out a Paimon table on an explicit backend and open it
pub fn table_on(io: Arc<dyn FileIO>, root: &Path, schema: TableSchema, config: Config) -> Table {
    SchemaManager::new(io.clone(), root).create_table(&schema).unwrap();
    io.create_dir_all(&root.join("snapshot")).unwrap();
    io.create_dir_all(&root.join("manifest")).unwrap();
    Table::with_io(io, root, config).unwrap()
}

/// Write rows with a fresh writer and return the produced files
pub fn write(table: &Table, rows: Vec<Row>) -> Vec<BucketFile> {
    let mut writer = table.new_writer(None).unwrap();
    for r in rows {
        writer.append(r).unwrap();
    }
    writer.close().unwrap()
}

pub fn names(files: &[BucketFile]) -> Vec<String> {
    let mut out: Vec<String> = files.iter().map(|f| f.file.file_name.clone()).collect();
    out.sort();
    out
}

pub fn plan_names(plan: &ScanPlan) -> Vec<String> {
    names(plan.files())
}
