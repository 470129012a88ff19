//! Snapshot Module
//!
//! Immutable, numbered descriptions of the complete table state.
//!
//! ## Responsibilities
//! - Snapshot JSON model (`snapshot/snapshot-<id>`)
//! - Latest/earliest resolution through the LATEST and EARLIEST hints
//! - Two-phase commit: publish `snapshot-<id>` if absent, then move LATEST
//!
//! ## States
//! ```text
//!   NoSnapshot ──commit(1)──▶ Active(1) ──commit(2)──▶ Active(2) ...
//! ```

mod store;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use store::SnapshotStore;

/// Snapshot JSON version written by this crate
pub const SNAPSHOT_VERSION: u32 = 3;

/// Why a snapshot was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitKind {
    Append,
    Compact,
    Overwrite,
}

impl fmt::Display for CommitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommitKind::Append => "APPEND",
            CommitKind::Compact => "COMPACT",
            CommitKind::Overwrite => "OVERWRITE",
        };
        write!(f, "{}", s)
    }
}

/// One committed table state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub id: u64,
    pub schema_id: u64,
    /// Manifest list holding every file live before this commit
    pub base_manifest_list: String,
    /// Manifest list holding this commit's changes
    pub delta_manifest_list: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_manifest_list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_manifest: Option<String>,
    pub commit_user: String,
    pub commit_identifier: i64,
    pub commit_kind: CommitKind,
    /// Unix millis
    pub time_millis: i64,
    #[serde(default)]
    pub log_offsets: BTreeMap<u32, i64>,
    #[serde(default)]
    pub total_record_count: u64,
    /// Rows added minus rows deleted by this commit
    #[serde(default)]
    pub delta_record_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_record_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<i64>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

/// Listing view of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub id: u64,
    pub schema_id: u64,
    pub time_millis: i64,
    pub manifest_list: String,
    pub commit_kind: CommitKind,
    pub total_record_count: u64,
}

impl From<&Snapshot> for SnapshotInfo {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id,
            schema_id: s.schema_id,
            time_millis: s.time_millis,
            manifest_list: s.delta_manifest_list.clone(),
            commit_kind: s.commit_kind,
            total_record_count: s.total_record_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_field_names() {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            id: 1,
            schema_id: 0,
            base_manifest_list: "manifest-list-a-0".into(),
            delta_manifest_list: "manifest-list-a-1".into(),
            changelog_manifest_list: None,
            index_manifest: None,
            commit_user: "u".into(),
            commit_identifier: 7,
            commit_kind: CommitKind::Append,
            time_millis: 1000,
            log_offsets: BTreeMap::new(),
            total_record_count: 3,
            delta_record_count: 3,
            changelog_record_count: None,
            watermark: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["schemaId"], 0);
        assert_eq!(json["baseManifestList"], "manifest-list-a-0");
        assert_eq!(json["commitKind"], "APPEND");
        assert!(json.get("watermark").is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = r#"{
            "version": 3, "id": 4, "schemaId": 1,
            "baseManifestList": "b", "deltaManifestList": "d",
            "commitUser": "x", "commitIdentifier": 1, "commitKind": "COMPACT",
            "timeMillis": 5, "totalRecordCount": 10, "deltaRecordCount": 0,
            "statistics": "stats-1", "futureField": {"a": 1}
        }"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.id, 4);
        assert_eq!(snapshot.commit_kind, CommitKind::Compact);
    }
}
