//! Partition & Bucket Router
//!
//! Decides which `(partition, bucket)` a row belongs to.
//!
//! ## Bucket function
//! ```text
//! bucket = xxh3_64(canonical(partition values ++ key values)) % total_buckets
//! ```
//! `key values` are the primary-key columns, or the whole row for tables
//! without a primary key. The canonical encoding is [`Datum::write_canonical`].
//! The function is versioned and the version is stored in the schema
//! options, so a later change cannot silently move existing rows.

use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{LakeError, Result};
use crate::schema::{TableSchema, BUCKET_FUNCTION_OPTION};
use crate::spec::{Datum, Row};

/// Versioned bucket hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketFunction {
    #[default]
    Xxh3V1,
}

impl BucketFunction {
    /// Schema option value naming this function
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketFunction::Xxh3V1 => "xxh3-v1",
        }
    }

    /// Hash canonical bytes into `[0, total_buckets)`
    pub fn bucket(&self, canonical: &[u8], total_buckets: u32) -> u32 {
        match self {
            BucketFunction::Xxh3V1 => (xxh3_64(canonical) % total_buckets as u64) as u32,
        }
    }

    /// Function recorded in a schema (defaults to xxh3-v1)
    pub fn for_schema(schema: &TableSchema) -> Result<Self> {
        match schema.options.get(BUCKET_FUNCTION_OPTION) {
            None => Ok(BucketFunction::default()),
            Some(name) => name.parse(),
        }
    }
}

impl FromStr for BucketFunction {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "xxh3-v1" => Ok(BucketFunction::Xxh3V1),
            other => Err(LakeError::Unsupported(format!("bucket function '{}'", other))),
        }
    }
}

impl fmt::Display for BucketFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a row goes
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Partition values in declared partition-key order
    pub partition: Row,
    pub bucket: u32,
}

/// Pre-resolved routing for one schema
#[derive(Debug, Clone)]
pub struct BucketRouter {
    arity: usize,
    partition_keys: Vec<String>,
    partition_indexes: Vec<usize>,
    key_indexes: Vec<usize>,
    total_buckets: u32,
    function: BucketFunction,
}

impl BucketRouter {
    pub fn new(schema: &TableSchema) -> Result<Self> {
        let key_indexes = if schema.primary_keys.is_empty() {
            (0..schema.fields.len()).collect()
        } else {
            schema.primary_key_indexes()?
        };
        Ok(Self {
            arity: schema.fields.len(),
            partition_keys: schema.partition_keys.clone(),
            partition_indexes: schema.partition_indexes()?,
            key_indexes,
            total_buckets: schema.total_buckets()?,
            function: BucketFunction::for_schema(schema)?,
        })
    }

    pub fn total_buckets(&self) -> u32 {
        self.total_buckets
    }

    pub fn function(&self) -> BucketFunction {
        self.function
    }

    /// Route one row. Rows with the wrong arity fail with `SchemaMismatch`.
    pub fn route(&self, row: &[Datum]) -> Result<Route> {
        if row.len() != self.arity {
            return Err(LakeError::SchemaMismatch(format!(
                "row has {} values, schema has {} columns",
                row.len(),
                self.arity
            )));
        }

        let partition: Row = self.partition_indexes.iter().map(|&i| row[i].clone()).collect();

        let mut canonical = Vec::with_capacity(64);
        for value in &partition {
            value.write_canonical(&mut canonical);
        }
        for &i in &self.key_indexes {
            row[i].write_canonical(&mut canonical);
        }
        let bucket = self.function.bucket(&canonical, self.total_buckets);

        Ok(Route { partition, bucket })
    }

    /// Pair partition values with their key names (for path building)
    pub fn partition_spec(&self, partition: &[Datum]) -> Vec<(String, Datum)> {
        self.partition_keys
            .iter()
            .cloned()
            .zip(partition.iter().cloned())
            .collect()
    }
}

/// One-shot routing: `route(row, schema) -> (partition, bucket)`
pub fn route(row: &[Datum], schema: &TableSchema) -> Result<(Row, u32)> {
    let r = BucketRouter::new(schema)?.route(row)?;
    Ok((r.partition, r.bucket))
}
