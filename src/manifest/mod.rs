//! Manifest Codec
//!
//! Binary container for manifest files and manifest lists.
//!
//! ## Responsibilities
//! - Frame records with a CRC32 each so torn or flipped bytes are detected
//! - Encode record payloads as self-describing maps keyed by field name
//! - Tolerate unknown fields (newer writers), reject missing required ones
//! - Read/write manifest files and manifest lists through [`FileIO`]
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Header                                               │
//! │ ┌───────────┬─────────────┬──────────┬─────────────┐ │
//! │ │ Magic (4) │ Version (2) │ Kind (1) │ Records (8) │ │
//! │ └───────────┴─────────────┴──────────┴─────────────┘ │
//! ├──────────────────────────────────────────────────────┤
//! │ Record 1                                             │
//! │ ┌─────────┬─────────┬──────────────────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ MessagePack map (Len bytes)  │ │
//! │ └─────────┴─────────┴──────────────────────────────┘ │
//! ├──────────────────────────────────────────────────────┤
//! │ Record 2 ...                                         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! [`FileIO`]: crate::io::FileIO

mod entry;
mod file;
mod list;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LakeError, Result};

pub use entry::{merge_entries, FileIdentifier, FileKind, ManifestEntry};
pub use file::{ManifestFile, ManifestList};
pub use list::ManifestFileMeta;

/// Magic bytes at the start of every manifest container
pub const MAGIC: &[u8; 4] = b"LKMF";

/// Container version written by this crate
pub const FORMAT_VERSION: u16 = 1;

/// Header: magic (4) + version (2) + kind (1) + record count (8)
pub const HEADER_SIZE: usize = 15;

/// Per-record prefix: payload length (4) + CRC32 (4)
pub const RECORD_HEADER_SIZE: usize = 8;

/// What a container holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Records are [`ManifestEntry`]
    Manifest = 0,
    /// Records are [`ManifestFileMeta`]
    ManifestList = 1,
}

impl ContainerKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ContainerKind::Manifest),
            1 => Some(ContainerKind::ManifestList),
            _ => None,
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode records into a container.
///
/// Generic over the record type so tooling can write raw maps; the engine
/// itself only writes [`ManifestEntry`] and [`ManifestFileMeta`].
pub fn encode_records<T: Serialize>(kind: ContainerKind, records: &[T]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + records.len() * 256);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.push(kind as u8);
    buf.extend_from_slice(&(records.len() as u64).to_le_bytes());

    for record in records {
        let payload = rmp_serde::to_vec_named(record)
            .map_err(|e| LakeError::Serialization(e.to_string()))?;
        let crc = crc32fast::hash(&payload);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&payload);
    }

    Ok(buf)
}

/// Decode a container, failing with `CorruptManifest` on any damage.
///
/// `path` is only used for error reporting.
pub fn decode_records<T: DeserializeOwned>(
    path: &Path,
    kind: ContainerKind,
    bytes: &[u8],
) -> Result<Vec<T>> {
    let corrupt = |reason: String| LakeError::CorruptManifest {
        path: path.to_path_buf(),
        reason,
    };

    // Step 1: Header
    if bytes.len() < HEADER_SIZE {
        return Err(corrupt(format!("truncated header ({} bytes)", bytes.len())));
    }
    if &bytes[0..4] != MAGIC {
        return Err(corrupt(format!("bad magic {:?}", &bytes[0..4])));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version == 0 {
        return Err(corrupt("container version 0".to_string()));
    }
    match ContainerKind::from_byte(bytes[6]) {
        Some(k) if k == kind => {}
        Some(k) => return Err(corrupt(format!("expected {:?}, found {:?}", kind, k))),
        None => return Err(corrupt(format!("unknown container kind {}", bytes[6]))),
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[7..15]);
    let expected = u64::from_le_bytes(count_bytes);

    // Step 2: Records
    let mut records = Vec::new();
    let mut pos = HEADER_SIZE;
    while pos < bytes.len() {
        let index = records.len();
        if pos + RECORD_HEADER_SIZE > bytes.len() {
            return Err(corrupt(format!("record {} header truncated", index)));
        }
        let len = u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
            as usize;
        let crc = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]);
        pos += RECORD_HEADER_SIZE;

        if pos + len > bytes.len() {
            return Err(corrupt(format!("record {} payload truncated", index)));
        }
        let payload = &bytes[pos..pos + len];
        pos += len;

        if crc32fast::hash(payload) != crc {
            return Err(corrupt(format!("record {} checksum mismatch", index)));
        }
        let record: T = rmp_serde::from_slice(payload)
            .map_err(|e| corrupt(format!("record {}: {}", index, e)))?;
        records.push(record);
    }

    // Step 3: Count check catches a file cut exactly on a record boundary
    if records.len() as u64 != expected {
        return Err(corrupt(format!(
            "header declares {} records, found {}",
            expected,
            records.len()
        )));
    }

    Ok(records)
}

pub fn encode_manifest(entries: &[ManifestEntry]) -> Result<Vec<u8>> {
    encode_records(ContainerKind::Manifest, entries)
}

pub fn decode_manifest(path: &Path, bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    decode_records(path, ContainerKind::Manifest, bytes)
}

pub fn encode_manifest_list(metas: &[ManifestFileMeta]) -> Result<Vec<u8>> {
    encode_records(ContainerKind::ManifestList, metas)
}

pub fn decode_manifest_list(path: &Path, bytes: &[u8]) -> Result<Vec<ManifestFileMeta>> {
    decode_records(path, ContainerKind::ManifestList, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{DataFileMeta, Datum};

    fn entry(name: &str) -> ManifestEntry {
        ManifestEntry::new(
            FileKind::Add,
            vec![Datum::from("US")],
            0,
            2,
            DataFileMeta::new(name, 100, 10, 0),
        )
    }

    #[test]
    fn test_empty_container_round_trips() {
        let bytes = encode_manifest(&[]).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert!(decode_manifest(Path::new("m"), &bytes).unwrap().is_empty());
    }

    #[test]
    fn test_flipped_byte_is_detected() {
        let mut bytes = encode_manifest(&[entry("a"), entry("b")]).unwrap();
        let last = bytes.len() - 3;
        bytes[last] ^= 0xff;

        let err = decode_manifest(Path::new("m"), &bytes).unwrap_err();
        assert!(matches!(err, LakeError::CorruptManifest { .. }));
    }

    #[test]
    fn test_truncated_on_record_boundary_is_detected() {
        let one = encode_manifest(&[entry("a")]).unwrap();
        let mut two = encode_manifest(&[entry("a"), entry("b")]).unwrap();
        two.truncate(one.len());

        let err = decode_manifest(Path::new("m"), &two).unwrap_err();
        match err {
            LakeError::CorruptManifest { reason, .. } => assert!(reason.contains("declares 2")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let bytes = encode_manifest(&[entry("a")]).unwrap();
        assert!(decode_manifest_list(Path::new("m"), &bytes).is_err());
    }

    #[test]
    fn test_newer_container_version_is_read() {
        let mut bytes = encode_manifest(&[entry("a")]).unwrap();
        bytes[4..6].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert_eq!(decode_manifest(Path::new("m"), &bytes).unwrap().len(), 1);
    }
}
