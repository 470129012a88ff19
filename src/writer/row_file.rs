//! Row file builder and reader

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::spec::{Datum, Row, SimpleStats, StatsCollector};

use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

// =============================================================================
// Builder
// =============================================================================

/// Result of [`DataFileBuilder::finish`]
#[derive(Debug, Clone)]
pub struct FinishedFile {
    pub bytes: Vec<u8>,
    pub row_count: u64,
    pub min_key: Row,
    pub max_key: Row,
    pub key_stats: SimpleStats,
    pub value_stats: SimpleStats,
}

/// Builds one row file in memory
///
/// Writes the header immediately; call `add()` in key order, then
/// `finish()` to patch the row count and append the footer.
pub struct DataFileBuilder {
    buf: Vec<u8>,
    row_count: u64,
    key_indexes: Vec<usize>,
    /// Track min/max keys for metadata
    min_key: Option<Row>,
    max_key: Option<Row>,
    key_stats: StatsCollector,
    value_stats: StatsCollector,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl DataFileBuilder {
    /// `key_*` describe the primary key (empty for append-only tables);
    /// value stats cover every column.
    pub fn new(key_names: Vec<String>, key_indexes: Vec<usize>, field_names: Vec<String>) -> Self {
        let mut buf = Vec::with_capacity(4096);

        // Row count placeholder, patched in finish
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());

        let all: Vec<usize> = (0..field_names.len()).collect();
        Self {
            buf,
            row_count: 0,
            key_stats: StatsCollector::new(key_names, key_indexes.clone()),
            key_indexes,
            min_key: None,
            max_key: None,
            value_stats: StatsCollector::new(field_names, all),
            data_hasher: crc32fast::Hasher::new(),
        }
    }

    /// Append a row (must be called in key order for keyed tables)
    pub fn add(&mut self, row: &[Datum]) -> Result<()> {
        let payload = bincode::serialize(row).map_err(|e| LakeError::Serialization(e.to_string()))?;
        let len_bytes = (payload.len() as u32).to_le_bytes();

        self.buf.extend_from_slice(&len_bytes);
        self.buf.extend_from_slice(&payload);
        self.data_hasher.update(&len_bytes);
        self.data_hasher.update(&payload);

        if !self.key_indexes.is_empty() {
            let key: Row = self.key_indexes.iter().map(|&i| row[i].clone()).collect();
            if self.min_key.is_none() {
                self.min_key = Some(key.clone());
            }
            self.max_key = Some(key);
        }
        self.key_stats.update(row);
        self.value_stats.update(row);
        self.row_count += 1;
        Ok(())
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Finish building: write footer and return the bytes plus metadata
    pub fn finish(mut self) -> FinishedFile {
        let data_crc = self.data_hasher.finalize();
        self.buf.extend_from_slice(&data_crc.to_le_bytes());
        self.buf.extend_from_slice(&[0u8; 4]); // Padding for alignment

        // Patch row count in header (after magic + version)
        self.buf[6..HEADER_SIZE].copy_from_slice(&self.row_count.to_le_bytes());

        FinishedFile {
            bytes: self.buf,
            row_count: self.row_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            key_stats: self.key_stats.finish(),
            value_stats: self.value_stats.finish(),
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Validated view of a row file
#[derive(Debug, Clone)]
pub struct RowFileReader {
    path: PathBuf,
    data: Bytes,
    row_count: u64,
}

impl RowFileReader {
    /// Read and validate a row file (header, footer and data checksum)
    pub fn open(io: &dyn FileIO, path: &Path) -> Result<Self> {
        let data = io.read(path)?;
        Self::from_bytes(path, data)
    }

    pub fn from_bytes(path: &Path, data: Bytes) -> Result<Self> {
        let corrupt = |reason: String| LakeError::CorruptDataFile {
            path: path.to_path_buf(),
            reason,
        };

        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(corrupt(format!("file too short ({} bytes)", data.len())));
        }
        if &data[0..4] != MAGIC {
            return Err(corrupt(format!("invalid magic {:?}", &data[0..4])));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(corrupt(format!("unsupported version {}", version)));
        }
        let mut count = [0u8; 8];
        count.copy_from_slice(&data[6..HEADER_SIZE]);
        let row_count = u64::from_le_bytes(count);

        let footer_start = data.len() - FOOTER_SIZE;
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[footer_start..footer_start + 4]);
        let expected_crc = u32::from_le_bytes(crc);
        if crc32fast::hash(&data[HEADER_SIZE..footer_start]) != expected_crc {
            return Err(corrupt("data checksum mismatch".to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            row_count,
        })
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Iterate rows in file order
    pub fn iter(&self) -> RowIterator<'_> {
        RowIterator {
            reader: self,
            pos: HEADER_SIZE,
            end: self.data.len() - FOOTER_SIZE,
        }
    }

    /// Read every row, checking the count against the header
    pub fn read_all(&self) -> Result<Vec<Row>> {
        let rows = self.iter().collect::<Result<Vec<_>>>()?;
        if rows.len() as u64 != self.row_count {
            return Err(LakeError::CorruptDataFile {
                path: self.path.clone(),
                reason: format!("header declares {} rows, found {}", self.row_count, rows.len()),
            });
        }
        Ok(rows)
    }
}

/// Iterator over the rows of a [`RowFileReader`]
pub struct RowIterator<'a> {
    reader: &'a RowFileReader,
    pos: usize,
    /// Stop reading at the footer
    end: usize,
}

impl<'a> Iterator for RowIterator<'a> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let reader: &'a RowFileReader = self.reader;
        let data = &reader.data;
        let corrupt = |reason: &str| LakeError::CorruptDataFile {
            path: reader.path.clone(),
            reason: reason.to_string(),
        };

        if self.pos + 4 > self.end {
            self.pos = self.end;
            return Some(Err(corrupt("truncated row length")));
        }
        let len = u32::from_le_bytes([
            data[self.pos],
            data[self.pos + 1],
            data[self.pos + 2],
            data[self.pos + 3],
        ]) as usize;
        self.pos += 4;

        if self.pos + len > self.end {
            self.pos = self.end;
            return Some(Err(corrupt("truncated row payload")));
        }
        let row = bincode::deserialize::<Row>(&data[self.pos..self.pos + len])
            .map_err(|e| corrupt(&e.to_string()));
        self.pos += len;
        Some(row)
    }
}
