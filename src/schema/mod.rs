//! Schema Manager
//!
//! Reads and writes the immutable `schema/schema-<id>` files.
//!
//! ## Responsibilities
//! - Discover existing schema ids
//! - Load a schema by id (snapshots and data files reference ids)
//! - Create the first schema of a new table
//! - Publish evolved schemas under the next id (create-if-absent)

mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::path;

pub use types::{
    DataField, DataType, SchemaBuilder, SchemaChange, TableSchema, TypeRoot, BUCKET_FUNCTION_OPTION,
    BUCKET_OPTION,
};

/// Access to the schema directory of one table
#[derive(Debug, Clone)]
pub struct SchemaManager {
    io: Arc<dyn FileIO>,
    table_root: PathBuf,
}

impl SchemaManager {
    pub fn new(io: Arc<dyn FileIO>, table_root: &Path) -> Self {
        Self {
            io,
            table_root: table_root.to_path_buf(),
        }
    }

    /// All schema ids present, ascending
    pub fn list_ids(&self) -> Result<Vec<u64>> {
        let dir = path::schema_dir(&self.table_root);
        if !self.io.exists(&dir)? {
            return Ok(Vec::new());
        }
        let mut ids: Vec<u64> = self
            .io
            .list(&dir)?
            .iter()
            .filter(|s| !s.is_dir)
            .filter_map(|s| s.file_name().and_then(path::parse_schema_id))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Whether `schema-<id>` exists
    pub fn exists(&self, schema_id: u64) -> Result<bool> {
        self.io.exists(&path::schema_path(&self.table_root, schema_id))
    }

    /// Load one schema. Missing files fail with `NotFound`.
    pub fn schema(&self, schema_id: u64) -> Result<TableSchema> {
        let file = path::schema_path(&self.table_root, schema_id);
        let bytes = self.io.read(&file).map_err(|e| match e {
            LakeError::NotFound { .. } => LakeError::not_found("schema", &file),
            other => other,
        })?;
        let schema: TableSchema =
            serde_json::from_slice(&bytes).map_err(|e| LakeError::CorruptSchema {
                path: file.clone(),
                reason: e.to_string(),
            })?;
        if schema.id != schema_id {
            return Err(LakeError::CorruptSchema {
                path: file,
                reason: format!("file holds schema id {}", schema.id),
            });
        }
        Ok(schema)
    }

    /// Newest schema, if any
    pub fn latest(&self) -> Result<Option<TableSchema>> {
        match self.list_ids()?.last() {
            Some(&id) => self.schema(id).map(Some),
            None => Ok(None),
        }
    }

    /// Write schema 0 of a new table
    pub fn create_table(&self, schema: &TableSchema) -> Result<TableSchema> {
        if schema.id != 0 {
            return Err(LakeError::InvalidArgument(format!(
                "initial schema must have id 0, got {}",
                schema.id
            )));
        }
        schema.validate()?;
        if !self.publish(schema)? {
            return Err(LakeError::InvalidArgument(format!(
                "table already exists at {}",
                self.table_root.display()
            )));
        }
        info!(table = %self.table_root.display(), "Created table schema 0");
        Ok(schema.clone())
    }

    /// Apply changes to the latest schema and publish the result.
    ///
    /// Losing the race for the next id fails with `ConcurrentModification`.
    pub fn commit_changes(&self, changes: &[SchemaChange]) -> Result<TableSchema> {
        let current = self
            .latest()?
            .ok_or_else(|| LakeError::not_found("schema", path::schema_dir(&self.table_root)))?;
        let next = current.apply_changes(changes)?;

        if !self.publish(&next)? {
            return Err(LakeError::ConcurrentModification {
                expected: Some(current.id),
                actual: self.list_ids()?.last().copied(),
            });
        }
        info!(schema_id = next.id, changes = changes.len(), "Published evolved schema");
        Ok(next)
    }

    fn publish(&self, schema: &TableSchema) -> Result<bool> {
        let file = path::schema_path(&self.table_root, schema.id);
        let json = serde_json::to_vec_pretty(schema)
            .map_err(|e| LakeError::Serialization(e.to_string()))?;
        self.io.create_dir_all(&path::schema_dir(&self.table_root))?;
        let won = self.io.write_new(&file, &json)?;
        debug!(path = %file.display(), won, "Schema publish attempt");
        Ok(won)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileIO;

    fn manager() -> SchemaManager {
        SchemaManager::new(Arc::new(MemoryFileIO::new()), Path::new("/t"))
    }

    fn schema() -> TableSchema {
        TableSchema::builder()
            .column("id", DataType::bigint().not_null())
            .column("v", DataType::string())
            .primary_keys(["id"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_and_load() {
        let m = manager();
        m.create_table(&schema()).unwrap();

        assert_eq!(m.list_ids().unwrap(), vec![0]);
        assert_eq!(m.schema(0).unwrap().field_names(), vec!["id", "v"]);
    }

    #[test]
    fn test_create_twice_fails() {
        let m = manager();
        m.create_table(&schema()).unwrap();
        assert!(matches!(
            m.create_table(&schema()),
            Err(LakeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_missing_schema_is_not_found() {
        let m = manager();
        assert!(matches!(m.schema(3), Err(LakeError::NotFound { .. })));
        assert!(m.latest().unwrap().is_none());
    }

    #[test]
    fn test_commit_changes_creates_next_id() {
        let m = manager();
        m.create_table(&schema()).unwrap();
        let next = m
            .commit_changes(&[SchemaChange::AddColumn {
                name: "extra".into(),
                data_type: DataType::int(),
                description: None,
            }])
            .unwrap();

        assert_eq!(next.id, 1);
        assert_eq!(m.latest().unwrap().unwrap().id, 1);
        // Old schema stays readable
        assert_eq!(m.schema(0).unwrap().fields.len(), 2);
    }

    #[test]
    fn test_garbage_schema_is_corrupt() {
        let m = manager();
        m.io.write_atomic(&path::schema_path(Path::new("/t"), 0), b"{not json")
            .unwrap();
        assert!(matches!(m.schema(0), Err(LakeError::CorruptSchema { .. })));
    }
}
