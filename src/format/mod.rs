//! Table Formats
//!
//! Classifies a table root and exposes each on-disk format behind one
//! capability trait.
//!
//! ## Detection probes (in priority order)
//! ```text
//! Paimon  : schema/ ∧ snapshot/ ∧ manifest/
//! Iceberg : metadata/ ∧ (metadata/version-hint.text ∨ metadata/*.metadata.json)
//! both    : AmbiguousFormat
//! neither : Unknown
//! ```

mod iceberg;
mod paimon;

use std::fmt;
use std::path::Path;

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::scan::{ScanOptions, ScanPlan};
use crate::schema::TableSchema;
use crate::snapshot::SnapshotInfo;

pub use iceberg::IcebergFormat;
pub use paimon::PaimonFormat;

/// Result of format detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormatKind {
    Paimon,
    Iceberg,
    Unknown,
}

impl fmt::Display for TableFormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableFormatKind::Paimon => "paimon",
            TableFormatKind::Iceberg => "iceberg",
            TableFormatKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// What the engine can do with a table of a given format
pub trait TableFormat: Send + Sync + fmt::Debug {
    fn kind(&self) -> TableFormatKind;

    /// Whether `table_root` has this format's layout
    fn detect(io: &dyn FileIO, table_root: &Path) -> Result<bool>
    where
        Self: Sized;

    /// Current schema
    fn schema(&self) -> Result<TableSchema>;

    /// Live data files for the requested snapshot
    fn resolve_live_files(&self, options: &ScanOptions) -> Result<ScanPlan>;

    /// Snapshot history, oldest first
    fn snapshots(&self) -> Result<Vec<SnapshotInfo>>;
}

/// Classify a table root. Missing roots fail with `NotFound`.
pub fn detect(io: &dyn FileIO, table_root: &Path) -> Result<TableFormatKind> {
    if !io.exists(table_root)? {
        return Err(LakeError::not_found("table", table_root));
    }

    let paimon = PaimonFormat::detect(io, table_root)?;
    let iceberg = IcebergFormat::detect(io, table_root)?;

    match (paimon, iceberg) {
        (true, true) => Err(LakeError::AmbiguousFormat {
            path: table_root.to_path_buf(),
        }),
        (true, false) => Ok(TableFormatKind::Paimon),
        (false, true) => Ok(TableFormatKind::Iceberg),
        (false, false) => Ok(TableFormatKind::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileIO;

    fn paimon_layout(io: &MemoryFileIO, root: &Path) {
        io.create_dir_all(&root.join("schema")).unwrap();
        io.create_dir_all(&root.join("snapshot")).unwrap();
        io.create_dir_all(&root.join("manifest")).unwrap();
    }

    #[test]
    fn test_detect_paimon() {
        let io = MemoryFileIO::new();
        let root = Path::new("/t");
        paimon_layout(&io, root);
        assert_eq!(detect(&io, root).unwrap(), TableFormatKind::Paimon);
    }

    #[test]
    fn test_detect_iceberg_by_metadata_json() {
        let io = MemoryFileIO::new();
        let root = Path::new("/t");
        io.write_atomic(&root.join("metadata/v1.metadata.json"), b"{}").unwrap();
        assert_eq!(detect(&io, root).unwrap(), TableFormatKind::Iceberg);
    }

    #[test]
    fn test_partial_paimon_is_unknown() {
        let io = MemoryFileIO::new();
        let root = Path::new("/t");
        io.create_dir_all(&root.join("schema")).unwrap();
        io.create_dir_all(&root.join("metadata")).unwrap();
        assert_eq!(detect(&io, root).unwrap(), TableFormatKind::Unknown);
    }

    #[test]
    fn test_both_layouts_is_ambiguous() {
        let io = MemoryFileIO::new();
        let root = Path::new("/t");
        paimon_layout(&io, root);
        io.write_atomic(&root.join("metadata/version-hint.text"), b"1").unwrap();
        assert!(matches!(detect(&io, root), Err(LakeError::AmbiguousFormat { .. })));
    }

    #[test]
    fn test_missing_root() {
        let io = MemoryFileIO::new();
        assert!(matches!(
            detect(&io, Path::new("/nope")),
            Err(LakeError::NotFound { .. })
        ));
    }
}
