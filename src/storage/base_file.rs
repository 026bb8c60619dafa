//! Parquet-backed base files.
//!
//! Rows are buffered as [`DynRecord`]s and flushed to the parquet writer as
//! arrow batches. The smallest and largest record keys written are recorded
//! in the file footer.

use std::{collections::VecDeque, fmt, io::Write, path::Path, sync::Arc};

use arrow::{
    array::{
        Array, ArrayRef, AsArray, BinaryBuilder, BooleanBuilder, Float64Builder, Int64Builder,
        StringBuilder,
    },
    datatypes::{DataType, Float64Type, Int64Type},
    record_batch::RecordBatch,
};
use bytes::Bytes;
use parquet::{
    arrow::{
        arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder},
        ArrowWriter,
    },
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
    format::KeyValue,
};

use super::{StorageError, StorageWriter, StorageWriterFactory};
use crate::{
    fs::FileSystem,
    record::{DynRecord, RecordError, RecordKey, RecordSchema, RecordSchemaRef, Value},
};

/// Footer key holding the smallest record key in the file.
pub const MIN_RECORD_KEY_METADATA: &str = "lakemerge.min_record_key";
/// Footer key holding the largest record key in the file.
pub const MAX_RECORD_KEY_METADATA: &str = "lakemerge.max_record_key";

static NULL_VALUE: Value = Value::Null;

/// Compression choices supported by the base file writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FileCompression {
    /// Leave pages uncompressed (useful for tests and debugging).
    None,
    /// Apply Zstd compression with default tuning.
    #[default]
    Zstd,
}

impl FileCompression {
    fn parquet(self) -> Compression {
        match self {
            FileCompression::None => Compression::UNCOMPRESSED,
            FileCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        }
    }
}

/// Opens [`ParquetStorageWriter`]s through a [`FileSystem`].
#[derive(Clone)]
pub struct ParquetWriterFactory {
    fs: Arc<dyn FileSystem>,
    max_rows_per_batch: usize,
    max_row_group_size: Option<usize>,
    compression: FileCompression,
}

impl ParquetWriterFactory {
    /// Factory writing through `fs` with default batching and compression.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            max_rows_per_batch: 1024,
            max_row_group_size: None,
            compression: FileCompression::default(),
        }
    }

    /// Rows buffered before they are handed to parquet as one batch.
    pub fn with_max_rows_per_batch(mut self, rows: usize) -> Self {
        self.max_rows_per_batch = rows.max(1);
        self
    }

    /// Rows per parquet row group; parquet's default when unset.
    pub fn with_max_row_group_size(mut self, rows: usize) -> Self {
        self.max_row_group_size = Some(rows.max(1));
        self
    }

    /// Compression codec of written files.
    pub fn with_compression(mut self, compression: FileCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Open a writer for the base file at `path`.
    pub fn open(
        &self,
        commit_time: &str,
        path: &Path,
        schema: &RecordSchemaRef,
    ) -> Result<ParquetStorageWriter, StorageError> {
        let file = self.fs.create(path)?;
        let mut props = WriterProperties::builder()
            .set_compression(self.compression.parquet())
            .set_created_by(format!("lakemerge commit {commit_time}"));
        if let Some(rows) = self.max_row_group_size {
            props = props.set_max_row_group_size(rows);
        }
        let writer =
            ArrowWriter::try_new(file, Arc::clone(schema.arrow_schema()), Some(props.build()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(ParquetStorageWriter {
            writer,
            schema: Arc::clone(schema),
            commit_time: commit_time.to_string(),
            file_name,
            buffer: Vec::with_capacity(self.max_rows_per_batch),
            max_rows_per_batch: self.max_rows_per_batch,
            min_key: None,
            max_key: None,
        })
    }
}

impl fmt::Debug for ParquetWriterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParquetWriterFactory")
            .field("max_rows_per_batch", &self.max_rows_per_batch)
            .field("max_row_group_size", &self.max_row_group_size)
            .field("compression", &self.compression)
            .finish()
    }
}

impl StorageWriterFactory for ParquetWriterFactory {
    fn open_writer(
        &self,
        commit_time: &str,
        path: &Path,
        schema: &RecordSchemaRef,
    ) -> Result<Box<dyn StorageWriter>, StorageError> {
        Ok(Box::new(self.open(commit_time, path, schema)?))
    }
}

/// Buffered parquet writer for one base file.
///
/// A record whose write fails is never persisted: when the flush it triggers
/// is rejected, the record is taken back out of the buffer and the rows
/// accepted before it stay buffered for the next flush.
pub struct ParquetStorageWriter {
    writer: ArrowWriter<Box<dyn Write + Send>>,
    schema: RecordSchemaRef,
    commit_time: String,
    file_name: String,
    buffer: Vec<DynRecord>,
    max_rows_per_batch: usize,
    min_key: Option<String>,
    max_key: Option<String>,
}

impl ParquetStorageWriter {
    fn push(&mut self, record_key: &str, record: DynRecord) -> Result<(), StorageError> {
        self.schema.validate(&record)?;
        self.buffer.push(record);
        if self.buffer.len() >= self.max_rows_per_batch {
            if let Err(err) = self.flush() {
                self.buffer.pop();
                return Err(err);
            }
        }
        self.track_key(record_key);
        Ok(())
    }

    fn track_key(&mut self, record_key: &str) {
        match &self.min_key {
            Some(current) if current.as_str() <= record_key => {}
            _ => self.min_key = Some(record_key.to_string()),
        }
        match &self.max_key {
            Some(current) if current.as_str() >= record_key => {}
            _ => self.max_key = Some(record_key.to_string()),
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = rows_to_batch(&self.schema, &self.buffer)?;
        self.writer.write(&batch)?;
        self.buffer.clear();
        Ok(())
    }
}

impl StorageWriter for ParquetStorageWriter {
    fn write_with_metadata(
        &mut self,
        mut record: DynRecord,
        key: &RecordKey,
    ) -> Result<(), StorageError> {
        record.stamp_metadata(&self.commit_time, key, &self.file_name);
        self.push(key.record_key(), record)
    }

    fn write(&mut self, record_key: &str, record: &DynRecord) -> Result<(), StorageError> {
        self.push(record_key, record.clone())
    }

    fn close(mut self: Box<Self>) -> Result<(), StorageError> {
        self.flush()?;
        if let Some(min_key) = self.min_key.take() {
            self.writer.append_key_value_metadata(KeyValue::new(
                MIN_RECORD_KEY_METADATA.to_string(),
                min_key,
            ));
        }
        if let Some(max_key) = self.max_key.take() {
            self.writer.append_key_value_metadata(KeyValue::new(
                MAX_RECORD_KEY_METADATA.to_string(),
                max_key,
            ));
        }
        self.writer.close()?;
        Ok(())
    }
}

fn rows_to_batch(schema: &RecordSchema, rows: &[DynRecord]) -> Result<RecordBatch, StorageError> {
    let arrow_schema = schema.arrow_schema();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(arrow_schema.fields().len());
    for (idx, field) in arrow_schema.fields().iter().enumerate() {
        let values = rows.iter().map(|row| row.get(idx).unwrap_or(&NULL_VALUE));
        let column: ArrayRef = match field.data_type() {
            DataType::Boolean => {
                let mut builder = BooleanBuilder::with_capacity(rows.len());
                for value in values {
                    match value {
                        Value::Boolean(v) => builder.append_value(*v),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Int64 => {
                let mut builder = Int64Builder::with_capacity(rows.len());
                for value in values {
                    match value {
                        Value::Int64(v) => builder.append_value(*v),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Float64 => {
                let mut builder = Float64Builder::with_capacity(rows.len());
                for value in values {
                    match value {
                        Value::Float64(v) => builder.append_value(*v),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Utf8 => {
                let mut builder = StringBuilder::new();
                for value in values {
                    match value {
                        Value::String(v) => builder.append_value(v),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            DataType::Binary => {
                let mut builder = BinaryBuilder::new();
                for value in values {
                    match value {
                        Value::Binary(v) => builder.append_value(v),
                        _ => builder.append_null(),
                    }
                }
                Arc::new(builder.finish())
            }
            other => {
                return Err(RecordError::UnsupportedType {
                    field: field.name().clone(),
                    data_type: other.clone(),
                }
                .into())
            }
        };
        columns.push(column);
    }
    Ok(RecordBatch::try_new(Arc::clone(arrow_schema), columns)?)
}

/// Streams the records of a base file in file order.
pub struct ParquetRecordReader {
    batches: ParquetRecordBatchReader,
    schema: RecordSchemaRef,
    pending: VecDeque<DynRecord>,
    key_range: Option<(String, String)>,
}

impl ParquetRecordReader {
    /// Open `path`, projecting each row onto `schema` by column name.
    ///
    /// Columns missing from the file read as null when the field is nullable.
    pub fn open(
        fs: &dyn FileSystem,
        path: &Path,
        schema: RecordSchemaRef,
    ) -> Result<Self, StorageError> {
        let bytes = Bytes::from(fs.read(path)?);
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
        let key_range = {
            let lookup = |name: &str| {
                builder
                    .metadata()
                    .file_metadata()
                    .key_value_metadata()
                    .and_then(|entries| entries.iter().find(|kv| kv.key == name))
                    .and_then(|kv| kv.value.clone())
            };
            lookup(MIN_RECORD_KEY_METADATA).zip(lookup(MAX_RECORD_KEY_METADATA))
        };
        Ok(Self {
            batches: builder.build()?,
            schema,
            pending: VecDeque::new(),
            key_range,
        })
    }

    /// Smallest and largest record keys recorded in the footer.
    pub fn key_range(&self) -> Option<(&str, &str)> {
        self.key_range
            .as_ref()
            .map(|(min, max)| (min.as_str(), max.as_str()))
    }
}

impl Iterator for ParquetRecordReader {
    type Item = Result<DynRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.is_empty() {
            match self.batches.next()? {
                Ok(batch) => match batch_to_rows(&self.schema, &batch) {
                    Ok(rows) => self.pending.extend(rows),
                    Err(err) => return Some(Err(err)),
                },
                Err(err) => return Some(Err(err.into())),
            }
        }
        self.pending.pop_front().map(Ok)
    }
}

fn batch_to_rows(
    schema: &RecordSchema,
    batch: &RecordBatch,
) -> Result<Vec<DynRecord>, StorageError> {
    let num_rows = batch.num_rows();
    let mut rows = vec![Vec::with_capacity(schema.len()); num_rows];
    let batch_schema = batch.schema();
    for field in schema.arrow_schema().fields() {
        let Ok(column_idx) = batch_schema.index_of(field.name()) else {
            if !field.is_nullable() {
                return Err(RecordError::NullNotAllowed {
                    field: field.name().clone(),
                }
                .into());
            }
            rows.iter_mut().for_each(|row| row.push(Value::Null));
            continue;
        };
        let column = batch.column(column_idx);
        let mismatch = || RecordError::TypeMismatch {
            field: field.name().clone(),
            expected: field.data_type().clone(),
            actual: column.data_type().clone(),
        };
        for (row_idx, row) in rows.iter_mut().enumerate() {
            if column.is_null(row_idx) {
                row.push(Value::Null);
                continue;
            }
            let value = match field.data_type() {
                DataType::Boolean => column
                    .as_boolean_opt()
                    .map(|array| Value::Boolean(array.value(row_idx))),
                DataType::Int64 => column
                    .as_primitive_opt::<Int64Type>()
                    .map(|array| Value::Int64(array.value(row_idx))),
                DataType::Float64 => column
                    .as_primitive_opt::<Float64Type>()
                    .map(|array| Value::Float64(array.value(row_idx))),
                DataType::Utf8 => column
                    .as_string_opt::<i32>()
                    .map(|array| Value::String(array.value(row_idx).to_string())),
                DataType::Binary => column
                    .as_binary_opt::<i32>()
                    .map(|array| Value::Binary(array.value(row_idx).to_vec())),
                _ => None,
            };
            row.push(value.ok_or_else(mismatch)?);
        }
    }
    Ok(rows.into_iter().map(DynRecord::new).collect())
}

#[cfg(test)]
mod tests {
    use std::{io, path::PathBuf};

    use arrow::datatypes::Field;
    use tempfile::TempDir;

    use super::*;
    use crate::fs::{FileStatus, LocalFs};

    /// Local filesystem whose created files reject every write.
    #[derive(Debug)]
    struct BrokenSinkFs;

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    impl FileSystem for BrokenSinkFs {
        fn exists(&self, path: &Path) -> io::Result<bool> {
            LocalFs.exists(path)
        }

        fn delete(&self, path: &Path) -> io::Result<()> {
            LocalFs.delete(path)
        }

        fn file_len(&self, path: &Path) -> io::Result<u64> {
            LocalFs.file_len(path)
        }

        fn create(&self, _path: &Path) -> io::Result<Box<dyn Write + Send>> {
            Ok(Box::new(BrokenSink))
        }

        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            LocalFs.read(path)
        }

        fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            LocalFs.write(path, contents)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            LocalFs.rename(from, to)
        }

        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            LocalFs.create_dir_all(path)
        }

        fn list(&self, dir: &Path) -> io::Result<Vec<FileStatus>> {
            LocalFs.list(dir)
        }
    }

    fn schema() -> RecordSchemaRef {
        Arc::new(
            RecordSchema::new(vec![
                Field::new("name", DataType::Utf8, false),
                Field::new("score", DataType::Float64, true),
                Field::new("active", DataType::Boolean, true),
                Field::new("blob", DataType::Binary, true),
            ])
            .unwrap(),
        )
    }

    fn file_path(dir: &TempDir) -> PathBuf {
        dir.path().join("p").join("fg_0_001.parquet")
    }

    #[test]
    fn written_rows_read_back_in_order() {
        let dir = TempDir::new().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
        let schema = schema();
        let path = file_path(&dir);
        let factory = ParquetWriterFactory::new(Arc::clone(&fs)).with_max_rows_per_batch(2);

        let mut writer = factory.open_writer("001", &path, &schema).unwrap();
        for (key, score) in [("k2", 2.5), ("k1", 1.0), ("k3", 3.0)] {
            let record = schema.record(vec![
                key.into(),
                Value::Float64(score),
                Value::Boolean(true),
                Value::Null,
            ]);
            writer
                .write_with_metadata(record, &RecordKey::new(key, "p"))
                .unwrap();
        }
        writer.close().unwrap();

        let reader = ParquetRecordReader::open(fs.as_ref(), &path, Arc::clone(&schema)).unwrap();
        assert_eq!(reader.key_range(), Some(("k1", "k3")));
        let rows = reader.collect::<Result<Vec<_>, _>>().unwrap();
        let keys: Vec<_> = rows.iter().map(|row| row.record_key().unwrap()).collect();
        assert_eq!(keys, vec!["k2", "k1", "k3"]);
        assert_eq!(rows[0].commit_time(), Some("001"));
        assert_eq!(rows[0].file_name(), Some("fg_0_001.parquet"));
        assert_eq!(rows[1].user_values()[1], Value::Float64(1.0));
        assert_eq!(rows[2].user_values()[3], Value::Null);
    }

    #[test]
    fn mismatched_rows_are_rejected_before_buffering() {
        let dir = TempDir::new().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
        let schema = schema();
        let factory = ParquetWriterFactory::new(fs).with_compression(FileCompression::None);
        let mut writer = factory
            .open_writer("001", &file_path(&dir), &schema)
            .unwrap();

        let bad = schema.record(vec![Value::Int64(1), Value::Null, Value::Null, Value::Null]);
        let err = writer.write("k", &bad).expect_err("type mismatch");
        assert!(err.is_schema_mismatch());
        writer.close().unwrap();
    }

    #[test]
    fn failed_flush_drops_the_rejected_record() {
        let dir = TempDir::new().unwrap();
        let schema = schema();
        let factory = ParquetWriterFactory::new(Arc::new(BrokenSinkFs))
            .with_max_rows_per_batch(1)
            .with_max_row_group_size(1)
            .with_compression(FileCompression::None);
        let mut writer = factory.open("001", &file_path(&dir), &schema).unwrap();

        // larger than any write buffer in front of the sink
        let record = schema.record(vec![
            "k1".into(),
            Value::Float64(1.0),
            Value::Boolean(true),
            Value::Binary(vec![7; 64 * 1024]),
        ]);
        let err = writer
            .write_with_metadata(record, &RecordKey::new("k1", "p"))
            .expect_err("sink rejects writes");
        assert!(!err.is_schema_mismatch());
        assert!(writer.buffer.is_empty());
        assert_eq!(writer.min_key, None);
        assert_eq!(writer.max_key, None);
    }
}
