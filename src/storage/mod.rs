//! Writer contracts for producing base files, plus the parquet implementation.

mod base_file;

use std::{fmt, io, path::Path};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

pub use base_file::{
    FileCompression, ParquetRecordReader, ParquetStorageWriter, ParquetWriterFactory,
    MAX_RECORD_KEY_METADATA, MIN_RECORD_KEY_METADATA,
};

use crate::record::{DynRecord, RecordError, RecordKey, RecordSchemaRef};

/// Failure to read or write a base file.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    /// Parquet encoding or decoding failure.
    #[error("storage parquet error: {0}")]
    Parquet(#[from] ParquetError),
    /// Arrow conversion failure.
    #[error("storage arrow error: {0}")]
    Arrow(#[from] ArrowError),
    /// A record does not fit the schema.
    #[error("record does not match schema: {0}")]
    SchemaMismatch(#[from] RecordError),
}

impl StorageError {
    /// Schema mismatches are reported apart from generic I/O failures.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, StorageError::SchemaMismatch(_))
    }
}

/// Sink for the records of one new base file version.
pub trait StorageWriter: Send {
    /// Write a freshly merged or inserted value, stamping its metadata columns
    /// from `key`.
    fn write_with_metadata(&mut self, record: DynRecord, key: &RecordKey)
        -> Result<(), StorageError>;

    /// Copy a stored record forward unchanged.
    fn write(&mut self, record_key: &str, record: &DynRecord) -> Result<(), StorageError>;

    /// Flush buffered rows and seal the file.
    fn close(self: Box<Self>) -> Result<(), StorageError>;
}

/// Opens [`StorageWriter`]s bound to a table schema.
pub trait StorageWriterFactory: Send + Sync + fmt::Debug {
    /// Open a writer for a new base file at `path`.
    fn open_writer(
        &self,
        commit_time: &str,
        path: &Path,
        schema: &RecordSchemaRef,
    ) -> Result<Box<dyn StorageWriter>, StorageError>;
}
