//! Writer Module
//!
//! Turns appended rows into immutable data files plus their metadata.
//!
//! ## Responsibilities
//! - Route each row to its (partition, bucket)
//! - Buffer rows per bucket; for primary-key tables the latest append of a
//!   key wins and rows are written in key order
//! - Write row files, rolling at `target_file_rows`
//! - Compute row count, key range, stats and sequence range per file
//!
//! ## Row File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "LKRW" (4) | Version: u16 (2) | Rows: u64 (8)  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [RowLen: u32][bincode(Vec<Datum>)]                    │
//! │   ... repeated for each row ...                         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                        │
//! │   DataCRC: u32 (4) | Padding (4)                        │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod row_file;
mod table_writer;

pub use row_file::{DataFileBuilder, FinishedFile, RowFileReader, RowIterator};
pub use table_writer::TableWriter;

// =============================================================================
// Shared Constants (used by builder and reader)
// =============================================================================

/// Magic bytes identifying a row file
pub(crate) const MAGIC: &[u8; 4] = b"LKRW";

/// Current row file version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + RowCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: usize = 14;

/// Footer size: DataCRC (4) + Padding (4) = 8 bytes
pub(crate) const FOOTER_SIZE: usize = 8;
