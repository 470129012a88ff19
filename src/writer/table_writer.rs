//! Table writer

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::{LakeError, Result};
use crate::io::FileIO;
use crate::path::PathFactory;
use crate::router::BucketRouter;
use crate::schema::TableSchema;
use crate::spec::{compare_rows, BucketFile, DataFileMeta, Datum, FileSource, Row};

use super::DataFileBuilder;

/// Primary key with the total order of [`compare_rows`]
#[derive(Debug, Clone)]
struct KeyOrd(Row);

impl PartialEq for KeyOrd {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyOrd {}

impl PartialOrd for KeyOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_rows(&self.0, &other.0)
    }
}

/// Rows buffered for one (partition, bucket), each with its sequence number
#[derive(Debug)]
enum BucketRows {
    /// Primary-key table: latest append per key
    Keyed(BTreeMap<KeyOrd, (i64, Row)>),
    /// Append-only table: arrival order
    Append(Vec<(i64, Row)>),
}

#[derive(Debug)]
struct BucketBuffer {
    partition: Row,
    bucket: u32,
    rows: BucketRows,
}

impl BucketBuffer {
    fn drain_sorted(self) -> Vec<(i64, Row)> {
        match self.rows {
            BucketRows::Keyed(map) => map.into_values().collect(),
            BucketRows::Append(rows) => rows,
        }
    }
}

/// Buffers rows and writes them as data files on [`close`](TableWriter::close).
///
/// Nothing becomes visible until the returned files are committed.
pub struct TableWriter {
    io: Arc<dyn FileIO>,
    schema: Arc<TableSchema>,
    router: BucketRouter,
    factory: PathFactory,
    key_indexes: Vec<usize>,
    target_file_rows: usize,
    next_sequence: i64,
    buffers: HashMap<(Vec<u8>, u32), BucketBuffer>,
}

impl TableWriter {
    /// `first_sequence` must exceed every sequence number already live
    pub fn new(
        io: Arc<dyn FileIO>,
        schema: Arc<TableSchema>,
        factory: PathFactory,
        target_file_rows: usize,
        first_sequence: i64,
    ) -> Result<Self> {
        let router = BucketRouter::new(&schema)?;
        let key_indexes = schema.primary_key_indexes()?;
        Ok(Self {
            io,
            schema,
            router,
            factory,
            key_indexes,
            target_file_rows: target_file_rows.max(1),
            next_sequence: first_sequence,
            buffers: HashMap::new(),
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Rows currently buffered (after per-key deduplication)
    pub fn buffered_rows(&self) -> usize {
        self.buffers
            .values()
            .map(|b| match &b.rows {
                BucketRows::Keyed(map) => map.len(),
                BucketRows::Append(rows) => rows.len(),
            })
            .sum()
    }

    /// Route and buffer one row
    pub fn append(&mut self, row: Row) -> Result<()> {
        let route = self.router.route(&row)?;
        for (field, value) in self.schema.fields.iter().zip(row.iter()) {
            if !field.data_type.accepts(value) {
                return Err(LakeError::SchemaMismatch(format!(
                    "column '{}' of type {} cannot hold {}",
                    field.name, field.data_type, value
                )));
            }
        }

        let seq = self.next_sequence;
        self.next_sequence += 1;

        let mut partition_bytes = Vec::new();
        for value in &route.partition {
            value.write_canonical(&mut partition_bytes);
        }
        let keyed = !self.key_indexes.is_empty();
        let buffer = self
            .buffers
            .entry((partition_bytes, route.bucket))
            .or_insert_with(|| BucketBuffer {
                partition: route.partition.clone(),
                bucket: route.bucket,
                rows: if keyed {
                    BucketRows::Keyed(BTreeMap::new())
                } else {
                    BucketRows::Append(Vec::new())
                },
            });

        match &mut buffer.rows {
            BucketRows::Keyed(map) => {
                let key: Row = self.key_indexes.iter().map(|&i| row[i].clone()).collect();
                map.insert(KeyOrd(key), (seq, row));
            }
            BucketRows::Append(rows) => rows.push((seq, row)),
        }
        Ok(())
    }

    /// Write every buffered bucket and return the new files.
    ///
    /// Write failures surface as `PartialWriteFailure`; already written
    /// files stay orphaned and invisible.
    pub fn close(mut self) -> Result<Vec<BucketFile>> {
        let mut buffers: Vec<BucketBuffer> = self.buffers.drain().map(|(_, b)| b).collect();
        buffers.sort_by(|a, b| {
            compare_rows(&a.partition, &b.partition).then(a.bucket.cmp(&b.bucket))
        });

        let mut files = Vec::new();
        for buffer in buffers {
            let partition = buffer.partition.clone();
            let bucket = buffer.bucket;
            let rows = buffer.drain_sorted();
            for chunk in rows.chunks(self.target_file_rows) {
                let meta = self.write_file(&partition, bucket, chunk)?;
                files.push(BucketFile::new(
                    partition.clone(),
                    bucket,
                    self.router.total_buckets(),
                    meta,
                ));
            }
        }

        debug!(files = files.len(), schema_id = self.schema.id, "Closed table writer");
        Ok(files)
    }

    fn write_file(&self, partition: &[Datum], bucket: u32, rows: &[(i64, Row)]) -> Result<DataFileMeta> {
        let spec = self.router.partition_spec(partition);
        let (abs, relative) = self.factory.new_data_file(&spec, bucket)?;

        let mut builder = DataFileBuilder::new(
            self.schema.primary_keys.clone(),
            self.key_indexes.clone(),
            self.schema.field_names(),
        );
        let mut min_seq = i64::MAX;
        let mut max_seq = i64::MIN;
        for (seq, row) in rows {
            builder.add(row)?;
            min_seq = min_seq.min(*seq);
            max_seq = max_seq.max(*seq);
        }
        let finished = builder.finish();

        self.io
            .write_atomic(&abs, &finished.bytes)
            .map_err(|e| LakeError::partial_write(&abs, e))?;

        let mut meta = DataFileMeta::new(
            relative,
            finished.bytes.len() as u64,
            finished.row_count,
            self.schema.id,
        );
        meta.min_key = finished.min_key;
        meta.max_key = finished.max_key;
        meta.key_stats = finished.key_stats;
        meta.value_stats = finished.value_stats;
        meta.min_sequence_number = min_seq;
        meta.max_sequence_number = max_seq;
        meta.file_source = FileSource::Append;
        meta.delete_row_count = Some(0);

        debug!(file = %meta.file_name, rows = meta.row_count, "Wrote data file");
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileIO;
    use crate::schema::DataType;
    use crate::writer::RowFileReader;
    use std::path::Path;

    fn writer(pk: bool, target_rows: usize) -> (Arc<dyn FileIO>, TableWriter) {
        let mut builder = TableSchema::builder()
            .column("id", DataType::bigint().not_null())
            .column("country", DataType::string().not_null())
            .column("name", DataType::string())
            .partition_keys(["country"])
            .buckets(2);
        if pk {
            builder = builder.primary_keys(["country", "id"]);
        }
        let schema = Arc::new(builder.build().unwrap());
        let io: Arc<dyn FileIO> = Arc::new(MemoryFileIO::new());
        let factory = PathFactory::new(Path::new("/t"), "row");
        let w = TableWriter::new(io.clone(), schema, factory, target_rows, 1).unwrap();
        (io, w)
    }

    fn row(id: i64, country: &str, name: &str) -> Row {
        vec![Datum::Long(id), Datum::from(country), Datum::from(name)]
    }

    #[test]
    fn test_latest_append_wins_per_key() {
        let (io, mut w) = writer(true, 100);
        w.append(row(1, "US", "old")).unwrap();
        w.append(row(1, "US", "new")).unwrap();
        assert_eq!(w.buffered_rows(), 1);

        let files = w.close().unwrap();
        assert_eq!(files.len(), 1);
        let meta = &files[0].file;
        assert_eq!(meta.row_count, 1);
        assert_eq!(meta.min_sequence_number, 2);

        let reader = RowFileReader::open(io.as_ref(), &meta.resolve_path(Path::new("/t"))).unwrap();
        assert_eq!(reader.read_all().unwrap(), vec![row(1, "US", "new")]);
    }

    #[test]
    fn test_files_land_in_partition_bucket_dirs() {
        let (_, mut w) = writer(true, 100);
        for id in 0..20 {
            w.append(row(id, if id % 2 == 0 { "US" } else { "EU" }, "x")).unwrap();
        }
        let files = w.close().unwrap();
        let total: u64 = files.iter().map(|f| f.file.row_count).sum();
        assert_eq!(total, 20);
        for f in &files {
            let country = f.partition[0].to_partition_string().unwrap();
            let prefix = format!("country={}/bucket-{}/data-", country, f.bucket);
            assert!(f.file.file_name.starts_with(&prefix), "{}", f.file.file_name);
            assert_eq!(f.total_buckets, 2);
        }
    }

    #[test]
    fn test_rolls_at_target_rows() {
        let (_, mut w) = writer(false, 3);
        for id in 0..7 {
            w.append(row(id, "US", "x")).unwrap();
        }
        let files = w.close().unwrap();
        let total: u64 = files.iter().map(|f| f.file.row_count).sum();
        assert_eq!(total, 7);
        assert!(files.iter().all(|f| f.file.row_count <= 3));
        assert!(files.iter().all(|f| f.file.min_key.is_empty()));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let (_, mut w) = writer(true, 100);
        let err = w
            .append(vec![Datum::from("x"), Datum::from("US"), Datum::Null])
            .unwrap_err();
        assert!(matches!(err, LakeError::SchemaMismatch(_)));
    }
}
