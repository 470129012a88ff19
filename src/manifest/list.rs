//! Manifest list records

use serde::{Deserialize, Serialize};

use crate::spec::SimpleStats;

/// Summary of one manifest file, as stored in a manifest list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFileMeta {
    /// Name under `manifest/`
    #[serde(rename = "_FILE_NAME")]
    pub file_name: String,

    #[serde(rename = "_FILE_SIZE")]
    pub file_size: u64,

    #[serde(rename = "_NUM_ADDED_FILES")]
    pub num_added_files: u64,

    #[serde(rename = "_NUM_DELETED_FILES")]
    pub num_deleted_files: u64,

    /// Min/max of each partition column across the manifest's entries
    #[serde(rename = "_PARTITION_STATS")]
    pub partition_stats: SimpleStats,

    #[serde(rename = "_SCHEMA_ID")]
    pub schema_id: u64,

    #[serde(rename = "_MIN_BUCKET", default)]
    pub min_bucket: Option<u32>,

    #[serde(rename = "_MAX_BUCKET", default)]
    pub max_bucket: Option<u32>,

    #[serde(rename = "_MIN_LEVEL", default)]
    pub min_level: Option<u32>,

    #[serde(rename = "_MAX_LEVEL", default)]
    pub max_level: Option<u32>,
}
