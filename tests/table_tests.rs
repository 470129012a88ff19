//! Integration tests for table creation, detection and schema evolution

mod common;

use std::fs;
use std::path::Path;

use lakemeta::io::LocalFileIO;
use lakemeta::{
    detect, CommitRequest, Config, DataType, Datum, LakeError, ScanOptions, SchemaChange, Table,
    TableFormatKind,
};
use tempfile::TempDir;

use common::*;

// =============================================================================
// Detection
// =============================================================================

#[test]
fn test_both_format_markers_are_ambiguous() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for d in ["schema", "snapshot", "manifest", "metadata"] {
        fs::create_dir_all(root.join(d)).unwrap();
    }
    fs::write(root.join("metadata/v1.metadata.json"), b"{}").unwrap();

    let io = LocalFileIO::new(false);
    assert!(matches!(detect(&io, root), Err(LakeError::AmbiguousFormat { .. })));
    assert!(matches!(
        Table::open(root.to_str().unwrap(), Config::default()),
        Err(LakeError::AmbiguousFormat { .. })
    ));
}

#[test]
fn test_missing_root_is_not_found() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(
        Table::open(missing.to_str().unwrap(), Config::default()),
        Err(LakeError::NotFound { .. })
    ));
}

#[test]
fn test_plain_directory_is_unknown() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("data")).unwrap();
    let io = LocalFileIO::new(false);
    assert_eq!(detect(&io, dir.path()).unwrap(), TableFormatKind::Unknown);
}

#[test]
fn test_iceberg_table_metadata_and_raw_scan() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("metadata")).unwrap();
    fs::create_dir_all(root.join("data/region=eu")).unwrap();
    fs::write(root.join("metadata/version-hint.text"), b"1").unwrap();
    fs::write(
        root.join("metadata/v1.metadata.json"),
        br#"{
            "format-version": 1,
            "last-column-id": 2,
            "schema": {"fields": [
                {"id": 1, "name": "id", "required": true, "type": "long"},
                {"id": 2, "name": "region", "required": false, "type": "string"}
            ]},
            "snapshots": [{"snapshot-id": 10, "timestamp-ms": 5, "manifest-list": "m.avro",
                           "summary": {"operation": "append", "total-records": "3"}}]
        }"#,
    )
    .unwrap();
    fs::write(root.join("data/region=eu/part-0.parquet"), b"PAR1").unwrap();

    let table = Table::open(root.to_str().unwrap(), Config::default()).unwrap();
    assert_eq!(table.kind(), TableFormatKind::Iceberg);
    assert_eq!(table.schema().unwrap().field_names(), vec!["id", "region"]);
    assert_eq!(table.snapshots().unwrap()[0].total_record_count, 3);

    assert!(matches!(table.scan(&ScanOptions::new()), Err(LakeError::Unsupported(_))));
    assert!(matches!(table.new_writer(None), Err(LakeError::Unsupported(_))));

    let raw = table.raw_scan().unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].relative, "data/region=eu/part-0.parquet");
    assert_eq!(raw[0].partition, vec![("region".to_string(), Some("eu".to_string()))]);
}

// =============================================================================
// Creation
// =============================================================================

#[test]
fn test_create_then_reopen() {
    let (dir, table) = local_table(keyed_schema(4), Config::default());
    let root = table.root().to_path_buf();
    assert!(root.join("schema/schema-0").exists());
    assert!(root.join("snapshot").is_dir());
    assert!(root.join("manifest").is_dir());

    let files = write(&table, vec![row(1, "US", "a")]);
    table.commit(&CommitRequest::append(0, files)).unwrap();
    drop(table);

    let reopened = Table::open(root.to_str().unwrap(), Config::default()).unwrap();
    assert_eq!(reopened.kind(), TableFormatKind::Paimon);
    assert_eq!(reopened.schema().unwrap().total_buckets().unwrap(), 4);
    assert_eq!(reopened.scan(&ScanOptions::new()).unwrap().row_count(), 1);
    drop(dir);
}

#[test]
fn test_create_twice_fails() {
    let (_dir, table) = local_table(keyed_schema(1), Config::default());
    let again = Table::create(table.root().to_str().unwrap(), keyed_schema(1), Config::default());
    assert!(matches!(again, Err(LakeError::InvalidArgument(_))));
}

#[test]
fn test_default_buckets_from_config() {
    let config = Config::builder().default_buckets(8).build().unwrap();
    let (_dir, table) = local_table(append_schema(), config);
    let schema = table.schema().unwrap();
    assert_eq!(schema.total_buckets().unwrap(), 8);
    assert_eq!(schema.options["bucket-function"], "xxh3-v1");
}

#[test]
fn test_memory_locator_round_trip() {
    let table = Table::create("memory://table-tests/orders", keyed_schema(2), Config::default()).unwrap();
    let files = write(&table, vec![row(1, "US", "a"), row(2, "US", "b")]);
    table.commit(&CommitRequest::append(0, files)).unwrap();

    let reopened = Table::open("memory://table-tests/orders", Config::default()).unwrap();
    assert_eq!(reopened.root(), Path::new("/table-tests/orders"));
    assert_eq!(reopened.scan(&ScanOptions::new()).unwrap().row_count(), 2);
}

// =============================================================================
// Schema Evolution
// =============================================================================

#[test]
fn test_schema_evolution_keeps_old_files_readable() {
    let (_dir, table) = local_table(keyed_schema(1), Config::default());
    let old = write(&table, vec![row(1, "US", "a")]);
    table.commit(&CommitRequest::append(0, old)).unwrap();

    let next = table
        .evolve_schema(&[SchemaChange::AddColumn {
            name: "age".into(),
            data_type: DataType::int(),
            description: Some("years".into()),
        }])
        .unwrap();
    assert_eq!(next.id, 1);
    assert_eq!(next.fields.last().unwrap().id, 3);

    let mut writer = table.new_writer(None).unwrap();
    assert_eq!(writer.schema().id, 1);
    writer
        .append(vec![
            Datum::Long(2),
            Datum::String("US".into()),
            Datum::Null,
            Datum::Int(30),
        ])
        .unwrap();
    let new_files = writer.close().unwrap();
    table.commit(&CommitRequest::append(1, new_files)).unwrap();

    let plan = table.scan(&ScanOptions::new()).unwrap();
    assert_eq!(plan.schema_id(), Some(1));
    let mut schema_ids: Vec<u64> = plan.iter().map(|f| f.file.schema_id).collect();
    schema_ids.sort_unstable();
    assert_eq!(schema_ids, vec![0, 1]);

    assert_eq!(table.schema_by_id(0).unwrap().fields.len(), 3);
    assert_eq!(table.schema_by_id(1).unwrap().fields.len(), 4);
}

#[test]
fn test_writer_for_old_schema() {
    let (_dir, table) = local_table(keyed_schema(1), Config::default());
    table
        .evolve_schema(&[SchemaChange::RenameColumn {
            from: "name".into(),
            to: "full_name".into(),
        }])
        .unwrap();

    let writer = table.new_writer(Some(0)).unwrap();
    assert_eq!(writer.schema().field_names(), vec!["id", "country", "name"]);
    assert!(matches!(table.new_writer(Some(5)), Err(LakeError::NotFound { .. })));
}

#[test]
fn test_wrong_arity_row_rejected() {
    let (_dir, table) = local_table(keyed_schema(1), Config::default());
    let mut writer = table.new_writer(None).unwrap();
    assert!(matches!(
        writer.append(vec![Datum::Long(1)]),
        Err(LakeError::SchemaMismatch(_))
    ));
}
