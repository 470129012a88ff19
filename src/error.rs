//! Error types for lakemeta
//!
//! Provides a unified error type for all table metadata operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using LakeError
pub type Result<T> = std::result::Result<T, LakeError>;

/// Unified error type for lakemeta operations
#[derive(Debug, Error)]
pub enum LakeError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A table root, schema, snapshot, manifest or data file is missing.
    /// Never silently skipped: a dangling reference means corruption or a
    /// race that must be retried.
    #[error("{what} not found: {path}")]
    NotFound { what: &'static str, path: PathBuf },

    // -------------------------------------------------------------------------
    // Metadata Errors
    // -------------------------------------------------------------------------
    #[error("corrupt manifest {path}: {reason}")]
    CorruptManifest { path: PathBuf, reason: String },

    #[error("corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("corrupt schema {path}: {reason}")]
    CorruptSchema { path: PathBuf, reason: String },

    #[error("corrupt data file {path}: {reason}")]
    CorruptDataFile { path: PathBuf, reason: String },

    #[error("ambiguous table format at {path}: both Paimon and Iceberg markers present")]
    AmbiguousFormat { path: PathBuf },

    // -------------------------------------------------------------------------
    // Commit Errors
    // -------------------------------------------------------------------------
    /// LATEST moved between reading the base and publishing the candidate.
    #[error("concurrent modification: expected latest snapshot {expected:?}, found {actual:?}")]
    ConcurrentModification {
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A write below the snapshot pointer failed; nothing became visible.
    #[error("partial write failure at {path}: {source}")]
    PartialWriteFailure {
        path: PathBuf,
        #[source]
        source: Box<LakeError>,
    },

    #[error("commit conflict: {0}")]
    CommitConflict(String),

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("invalid partition: {0}")]
    InvalidPartition(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LakeError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        LakeError::NotFound {
            what,
            path: path.into(),
        }
    }

    /// Wrap an error raised while writing a file below the snapshot pointer.
    pub fn partial_write(path: impl Into<PathBuf>, source: LakeError) -> Self {
        LakeError::PartialWriteFailure {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Only concurrent modification is recovered locally (bounded retry).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LakeError::ConcurrentModification { .. })
    }
}
