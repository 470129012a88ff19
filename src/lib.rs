//! # lakemeta
//!
//! Metadata and file-layout engine for Paimon-style lakehouse tables:
//! - Versioned, checksummed manifest files and manifest lists
//! - Immutable numbered snapshots with optimistic, create-if-absent commits
//! - Deterministic partition and bucket routing
//! - Snapshot-consistent file discovery with time travel and incremental scans
//! - Format detection for Paimon and (metadata-only) Iceberg tables
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Table                               │
//! │          (detect · scan · write · commit · evolve)           │
//! └──────┬───────────────┬────────────────┬─────────────────────┘
//!        │               │                │
//!        ▼               ▼                ▼
//!  ┌───────────┐   ┌───────────┐   ┌──────────────┐
//!  │  Writer   │   │  Scanner  │   │    Commit    │
//!  │ (router)  │   │ (parallel)│   │ Coordinator  │
//!  └─────┬─────┘   └─────┬─────┘   └──────┬───────┘
//!        │               │                │
//!        │         ┌─────▼────────────────▼─────┐
//!        │         │ Snapshot Store · Manifests │
//!        │         │     (MetadataArena cache)  │
//!        │         └─────────────┬──────────────┘
//!        │                       │
//!        ▼                       ▼
//!  ┌─────────────────────────────────────────────┐
//!  │            FileIO (local · memory)          │
//!  └─────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod io;
pub mod path;
pub mod spec;
pub mod schema;
pub mod router;
pub mod manifest;
pub mod snapshot;
pub mod arena;
pub mod writer;
pub mod scan;
pub mod commit;
pub mod format;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LakeError, Result};
pub use config::Config;
pub use table::Table;

pub use commit::{CommitCoordinator, CommitRequest};
pub use format::{detect, TableFormat, TableFormatKind};
pub use router::{route, BucketFunction, BucketRouter};
pub use scan::{ScanFile, ScanOptions, ScanPlan};
pub use schema::{DataType, SchemaChange, TableSchema};
pub use snapshot::{CommitKind, Snapshot, SnapshotInfo};
pub use spec::{BucketFile, DataFileMeta, Datum, Row};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lakemeta
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
