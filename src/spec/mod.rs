//! Shared value types
//!
//! Types that flow through every component: typed values, column stats and
//! the per-file metadata unit.

mod data_file;
mod datum;
mod stats;

use std::time::{SystemTime, UNIX_EPOCH};

pub use data_file::{BucketFile, DataFileMeta, FileSource};
pub use datum::{compare_rows, Datum, Row};
pub use stats::{ColumnStats, SimpleStats, StatsCollector};

/// Current time as unix millis
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
