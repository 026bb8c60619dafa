//! Test-only payloads, tables and base-file fixtures.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::datatypes::{DataType, Field};
use tempfile::TempDir;

use crate::{
    fs::{make_data_file_name, FileSystem, LocalFs},
    option::WriteConfig,
    record::{
        DynRecord, PayloadError, PayloadMetadata, PendingRecord, RecordKey, RecordPayload,
        RecordSchema, RecordSchemaRef, Value,
    },
    storage::{ParquetRecordReader, StorageError, StorageWriter, StorageWriterFactory},
    table::TableContext,
};

pub(crate) const PARTITION: &str = "2024/01/01";

/// `total: Int64` (required) and `note: Utf8`.
pub(crate) fn schema() -> RecordSchemaRef {
    Arc::new(
        RecordSchema::new(vec![
            Field::new("total", DataType::Int64, false),
            Field::new("note", DataType::Utf8, true),
        ])
        .unwrap(),
    )
}

pub(crate) fn table(dir: &TempDir) -> TableContext {
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFs);
    TableContext::new(WriteConfig::from(dir.path()), schema(), fs)
}

pub(crate) fn row(total: i64, note: &str) -> DynRecord {
    schema().record(vec![Value::Int64(total), Value::from(note)])
}

/// Scripted merge behaviour.
#[derive(Debug, Clone)]
pub(crate) enum TestPayload {
    /// Adds to the stored total; inserts the delta itself.
    Add(i64),
    Delete,
    /// Produces a record the writer rejects.
    Malformed,
    FailCombine,
    FailInsert,
}

impl RecordPayload for TestPayload {
    fn combine_and_get_update_value(
        &self,
        current: &DynRecord,
        schema: &RecordSchema,
    ) -> Result<Option<DynRecord>, PayloadError> {
        match self {
            TestPayload::Add(delta) => {
                let total = schema
                    .index_of("total")
                    .and_then(|idx| current.get(idx))
                    .and_then(|value| match value {
                        Value::Int64(total) => Some(*total),
                        _ => None,
                    })
                    .unwrap_or_default();
                Ok(Some(row(total + delta, "merged")))
            }
            TestPayload::Delete => Ok(None),
            TestPayload::Malformed => Ok(Some(DynRecord::new(vec![Value::Int64(1)]))),
            TestPayload::FailCombine => Err(PayloadError::Merge("scripted".into())),
            TestPayload::FailInsert => Ok(Some(current.clone())),
        }
    }

    fn get_insert_value(&self, _schema: &RecordSchema) -> Result<Option<DynRecord>, PayloadError> {
        match self {
            TestPayload::Add(delta) => Ok(Some(row(*delta, "inserted"))),
            TestPayload::Delete => Ok(None),
            TestPayload::Malformed => Ok(Some(DynRecord::new(vec![Value::Int64(1)]))),
            TestPayload::FailCombine => Ok(Some(row(0, "inserted"))),
            TestPayload::FailInsert => Err(PayloadError::Merge("scripted".into())),
        }
    }

    fn metadata(&self) -> Option<PayloadMetadata> {
        match self {
            TestPayload::Add(delta) => Some(PayloadMetadata::from([(
                "delta".to_string(),
                delta.to_string(),
            )])),
            _ => None,
        }
    }
}

pub(crate) fn pending(key: &str, payload: TestPayload) -> PendingRecord<TestPayload> {
    PendingRecord::new(RecordKey::new(key, PARTITION), payload)
}

/// Write a base file for `file_group_id` holding `rows` of `(key, total)`.
pub(crate) fn seed_base_file(
    table: &TableContext,
    file_group_id: &str,
    commit_time: &str,
    rows: &[(&str, i64)],
) -> PathBuf {
    let path = table
        .config()
        .partition_dir(PARTITION)
        .join(make_data_file_name(commit_time, 0, file_group_id));
    let mut writer = table
        .writer_factory()
        .open_writer(commit_time, &path, table.schema())
        .unwrap();
    for (key, total) in rows {
        writer
            .write_with_metadata(row(*total, "seed"), &RecordKey::new(*key, PARTITION))
            .unwrap();
    }
    writer.close().unwrap();
    path
}

/// `(key, total, note)` of every row of a base file, in file order.
pub(crate) fn read_rows(table: &TableContext, path: &Path) -> Vec<(String, i64, String)> {
    ParquetRecordReader::open(table.fs().as_ref(), path, Arc::clone(table.schema()))
        .unwrap()
        .map(|record| {
            let record = record.unwrap();
            let key = record.record_key().unwrap().to_string();
            let total = match record.user_values()[0] {
                Value::Int64(total) => total,
                ref other => panic!("unexpected total {other:?}"),
            };
            let note = record.user_values()[1].as_str().unwrap_or_default().to_string();
            (key, total, note)
        })
        .collect()
}

/// Factory whose writers can never be opened.
#[derive(Debug)]
pub(crate) struct UnavailableWriterFactory;

impl StorageWriterFactory for UnavailableWriterFactory {
    fn open_writer(
        &self,
        _commit_time: &str,
        _path: &Path,
        _schema: &RecordSchemaRef,
    ) -> Result<Box<dyn StorageWriter>, StorageError> {
        Err(StorageError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "storage unavailable",
        )))
    }
}
