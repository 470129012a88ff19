//! Schema types
//!
//! Serialized as JSON in `schema/schema-<id>` using the table format's field
//! names. Type strings follow the SQL spelling (`BIGINT`, `STRING NOT NULL`);
//! spellings this crate does not model are preserved verbatim.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LakeError, Result};
use crate::spec::Datum;

/// Schema option holding the bucket count
pub const BUCKET_OPTION: &str = "bucket";
/// Schema option holding the bucket hash version
pub const BUCKET_FUNCTION_OPTION: &str = "bucket-function";

// =============================================================================
// Data Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRoot {
    Boolean,
    Int,
    BigInt,
    Double,
    String,
    Bytes,
    /// A type spelling written by another engine, kept as-is
    Other(String),
}

/// Column type plus nullability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataType {
    pub root: TypeRoot,
    pub nullable: bool,
}

impl DataType {
    fn of(root: TypeRoot) -> Self {
        Self { root, nullable: true }
    }

    pub fn boolean() -> Self {
        Self::of(TypeRoot::Boolean)
    }

    pub fn int() -> Self {
        Self::of(TypeRoot::Int)
    }

    pub fn bigint() -> Self {
        Self::of(TypeRoot::BigInt)
    }

    pub fn double() -> Self {
        Self::of(TypeRoot::Double)
    }

    pub fn string() -> Self {
        Self::of(TypeRoot::String)
    }

    pub fn bytes() -> Self {
        Self::of(TypeRoot::Bytes)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Whether a value may be stored in a column of this type
    pub fn accepts(&self, value: &Datum) -> bool {
        match (&self.root, value) {
            (_, Datum::Null) => self.nullable,
            (TypeRoot::Boolean, Datum::Boolean(_)) => true,
            (TypeRoot::Int, Datum::Int(_)) => true,
            (TypeRoot::BigInt, Datum::Long(_)) | (TypeRoot::BigInt, Datum::Int(_)) => true,
            (TypeRoot::Double, Datum::Double(_)) => true,
            (TypeRoot::String, Datum::String(_)) => true,
            (TypeRoot::Bytes, Datum::Bytes(_)) => true,
            (TypeRoot::Other(_), _) => true,
            _ => false,
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("empty type".to_string());
        }
        let upper = trimmed.to_ascii_uppercase();
        let (base, nullable) = match upper.strip_suffix(" NOT NULL") {
            Some(base) => (base.trim_end().to_string(), false),
            None => (upper.clone(), true),
        };
        let root = match base.as_str() {
            "BOOLEAN" => TypeRoot::Boolean,
            "INT" | "INTEGER" => TypeRoot::Int,
            "BIGINT" | "LONG" => TypeRoot::BigInt,
            "DOUBLE" => TypeRoot::Double,
            "STRING" => TypeRoot::String,
            "BYTES" => TypeRoot::Bytes,
            b if b.starts_with("VARCHAR") || b.starts_with("CHAR") => TypeRoot::String,
            b if b.starts_with("VARBINARY") || b.starts_with("BINARY") => TypeRoot::Bytes,
            _ => {
                let keep = match trimmed.len().checked_sub(" NOT NULL".len()) {
                    Some(cut) if !nullable => trimmed[..cut].trim_end().to_string(),
                    _ => trimmed.to_string(),
                };
                TypeRoot::Other(keep)
            }
        };
        Ok(Self { root, nullable })
    }
}

impl From<DataType> for String {
    fn from(t: DataType) -> String {
        t.to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match &self.root {
            TypeRoot::Boolean => "BOOLEAN",
            TypeRoot::Int => "INT",
            TypeRoot::BigInt => "BIGINT",
            TypeRoot::Double => "DOUBLE",
            TypeRoot::String => "STRING",
            TypeRoot::Bytes => "BYTES",
            TypeRoot::Other(s) => s.as_str(),
        };
        if self.nullable {
            write!(f, "{}", base)
        } else {
            write!(f, "{} NOT NULL", base)
        }
    }
}

// =============================================================================
// Fields and Schema
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One immutable schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    #[serde(default = "default_schema_version")]
    pub version: u32,
    pub id: u64,
    pub fields: Vec<DataField>,
    pub highest_field_id: u32,
    #[serde(default)]
    pub partition_keys: Vec<String>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub time_millis: i64,
}

fn default_schema_version() -> u32 {
    3
}

impl TableSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn indexes_of(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                self.field_index(n).ok_or_else(|| {
                    LakeError::SchemaMismatch(format!("schema {} has no column '{}'", self.id, n))
                })
            })
            .collect()
    }

    /// Column indexes of the partition keys, in declared order
    pub fn partition_indexes(&self) -> Result<Vec<usize>> {
        self.indexes_of(&self.partition_keys)
    }

    /// Column indexes of the primary key (empty for append-only tables)
    pub fn primary_key_indexes(&self) -> Result<Vec<usize>> {
        self.indexes_of(&self.primary_keys)
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_keys.is_empty()
    }

    /// Bucket count from the `bucket` option (defaults to 1)
    pub fn total_buckets(&self) -> Result<u32> {
        match self.options.get(BUCKET_OPTION) {
            None => Ok(1),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(LakeError::SchemaMismatch(format!(
                    "schema {} has unsupported bucket option '{}'",
                    self.id, raw
                ))),
            },
        }
    }

    /// Structural checks every persisted schema must pass
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(LakeError::SchemaMismatch(format!(
                    "duplicate column '{}'",
                    field.name
                )));
            }
        }
        self.partition_indexes()?;
        for idx in self.primary_key_indexes()? {
            if self.fields[idx].data_type.nullable {
                return Err(LakeError::SchemaMismatch(format!(
                    "primary key column '{}' must be NOT NULL",
                    self.fields[idx].name
                )));
            }
        }
        if !self.primary_keys.is_empty() {
            if let Some(missing) = self
                .partition_keys
                .iter()
                .find(|p| !self.primary_keys.contains(p))
            {
                return Err(LakeError::SchemaMismatch(format!(
                    "primary key must include partition column '{}'",
                    missing
                )));
            }
        }
        self.total_buckets()?;
        Ok(())
    }

    /// Apply schema changes, producing the next schema id
    pub fn apply_changes(&self, changes: &[SchemaChange]) -> Result<TableSchema> {
        let mut next = self.clone();
        next.id = self.id + 1;
        next.time_millis = crate::spec::now_millis();

        for change in changes {
            match change {
                SchemaChange::AddColumn {
                    name,
                    data_type,
                    description,
                } => {
                    if next.field_index(name).is_some() {
                        return Err(LakeError::InvalidArgument(format!(
                            "column '{}' already exists",
                            name
                        )));
                    }
                    if !data_type.nullable {
                        return Err(LakeError::InvalidArgument(format!(
                            "added column '{}' must be nullable",
                            name
                        )));
                    }
                    next.highest_field_id += 1;
                    next.fields.push(DataField {
                        id: next.highest_field_id,
                        name: name.clone(),
                        data_type: data_type.clone(),
                        description: description.clone(),
                    });
                }
                SchemaChange::DropColumn { name } => {
                    next.ensure_not_key(name, "drop")?;
                    let idx = next.field_index(name).ok_or_else(|| {
                        LakeError::InvalidArgument(format!("column '{}' does not exist", name))
                    })?;
                    next.fields.remove(idx);
                    if next.fields.is_empty() {
                        return Err(LakeError::InvalidArgument(
                            "cannot drop the last column".to_string(),
                        ));
                    }
                }
                SchemaChange::RenameColumn { from, to } => {
                    next.ensure_not_key(from, "rename")?;
                    if next.field_index(to).is_some() {
                        return Err(LakeError::InvalidArgument(format!(
                            "column '{}' already exists",
                            to
                        )));
                    }
                    let idx = next.field_index(from).ok_or_else(|| {
                        LakeError::InvalidArgument(format!("column '{}' does not exist", from))
                    })?;
                    next.fields[idx].name = to.clone();
                }
            }
        }

        next.validate()?;
        Ok(next)
    }

    fn ensure_not_key(&self, name: &str, action: &str) -> Result<()> {
        if self.partition_keys.iter().any(|k| k == name) || self.primary_keys.iter().any(|k| k == name) {
            return Err(LakeError::InvalidArgument(format!(
                "cannot {} key column '{}'",
                action, name
            )));
        }
        Ok(())
    }
}

/// A single schema evolution step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    AddColumn {
        name: String,
        data_type: DataType,
        description: Option<String>,
    },
    DropColumn {
        name: String,
    },
    RenameColumn {
        from: String,
        to: String,
    },
}

// =============================================================================
// Builder
// =============================================================================

/// Builds the first schema (id 0) of a new table
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, DataType)>,
    partition_keys: Vec<String>,
    primary_keys: Vec<String>,
    options: BTreeMap<String, String>,
    comment: Option<String>,
}

impl SchemaBuilder {
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.fields.push((name.into(), data_type));
        self
    }

    pub fn partition_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn buckets(self, buckets: u32) -> Self {
        self.option(BUCKET_OPTION, buckets.to_string())
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn build(self) -> Result<TableSchema> {
        if self.fields.is_empty() {
            return Err(LakeError::InvalidArgument("schema has no columns".to_string()));
        }
        let fields: Vec<DataField> = self
            .fields
            .into_iter()
            .enumerate()
            .map(|(i, (name, data_type))| DataField {
                id: i as u32,
                name,
                data_type,
                description: None,
            })
            .collect();
        let schema = TableSchema {
            version: default_schema_version(),
            id: 0,
            highest_field_id: fields.len().saturating_sub(1) as u32,
            fields,
            partition_keys: self.partition_keys,
            primary_keys: self.primary_keys,
            options: self.options,
            comment: self.comment,
            time_millis: crate::spec::now_millis(),
        };
        schema.validate()?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableSchema {
        TableSchema::builder()
            .column("id", DataType::bigint().not_null())
            .column("country", DataType::string().not_null())
            .column("name", DataType::string())
            .partition_keys(["country"])
            .primary_keys(["country", "id"])
            .buckets(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_type_string_round_trip() {
        let t = DataType::try_from("bigint not null".to_string()).unwrap();
        assert_eq!(t, DataType::bigint().not_null());
        assert_eq!(String::from(t), "BIGINT NOT NULL");

        let other = DataType::try_from("DECIMAL(10, 2) NOT NULL".to_string()).unwrap();
        assert_eq!(other.root, TypeRoot::Other("DECIMAL(10, 2)".to_string()));
        assert_eq!(other.to_string(), "DECIMAL(10, 2) NOT NULL");
    }

    #[test]
    fn test_schema_json_uses_format_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("partitionKeys").is_some());
        assert!(json.get("highestFieldId").is_some());
        assert_eq!(json["fields"][0]["type"], "BIGINT NOT NULL");
    }

    #[test]
    fn test_primary_key_must_cover_partition() {
        let err = TableSchema::builder()
            .column("id", DataType::bigint().not_null())
            .column("country", DataType::string())
            .partition_keys(["country"])
            .primary_keys(["id"])
            .build()
            .unwrap_err();
        assert!(matches!(err, LakeError::SchemaMismatch(_)));
    }

    #[test]
    fn test_apply_changes_bumps_id_and_field_ids() {
        let schema = sample();
        let next = schema
            .apply_changes(&[
                SchemaChange::AddColumn {
                    name: "age".into(),
                    data_type: DataType::int(),
                    description: None,
                },
                SchemaChange::RenameColumn {
                    from: "name".into(),
                    to: "full_name".into(),
                },
            ])
            .unwrap();

        assert_eq!(next.id, 1);
        assert_eq!(next.highest_field_id, 3);
        assert_eq!(next.field_names(), vec!["id", "country", "full_name", "age"]);
    }

    #[test]
    fn test_cannot_drop_key_column() {
        let err = sample()
            .apply_changes(&[SchemaChange::DropColumn { name: "id".into() }])
            .unwrap_err();
        assert!(matches!(err, LakeError::InvalidArgument(_)));
    }
}
