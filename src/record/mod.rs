//! Row-level records flowing through the merge engine.
//!
//! A [`DynRecord`] is a single row shaped by a [`RecordSchema`]. Every schema
//! starts with the metadata columns (commit time, record key, partition path,
//! file name) followed by the table's own columns. Pending changes arrive as
//! [`PendingRecord`]s whose [`RecordPayload`] decides how they fold into the
//! stored value.

mod error;
pub mod payload;
mod schema;
mod value;

use std::fmt;

pub use error::RecordError;
pub use payload::{OverwriteWithLatestPayload, PayloadError, PayloadMetadata, RecordPayload};
pub use schema::{
    RecordSchema, RecordSchemaRef, COMMIT_TIME_FIELD, FILE_NAME_FIELD, METADATA_FIELDS,
    PARTITION_PATH_FIELD, RECORD_KEY_FIELD,
};
pub(crate) use schema::{COMMIT_TIME_POS, FILE_NAME_POS, PARTITION_PATH_POS, RECORD_KEY_POS};
pub use value::Value;

use crate::location::RecordLocation;

/// One row, full schema width including metadata columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DynRecord {
    values: Vec<Value>,
}

impl DynRecord {
    /// Record from values in schema order.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// All values, metadata columns first.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at column `idx`.
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Replace the value at `idx`; out-of-range indices are ignored.
    pub fn set(&mut self, idx: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(idx) {
            *slot = value;
        }
    }

    /// Columns after the metadata prefix.
    pub fn user_values(&self) -> &[Value] {
        self.values.get(METADATA_FIELDS.len()..).unwrap_or(&[])
    }

    /// Key stored in the record key metadata column, if any.
    pub fn record_key(&self) -> Option<&str> {
        self.get(RECORD_KEY_POS).and_then(Value::as_str)
    }

    /// Commit that wrote the record, if stamped.
    pub fn commit_time(&self) -> Option<&str> {
        self.get(COMMIT_TIME_POS).and_then(Value::as_str)
    }

    /// Base file the record was written to, if stamped.
    pub fn file_name(&self) -> Option<&str> {
        self.get(FILE_NAME_POS).and_then(Value::as_str)
    }

    pub(crate) fn stamp_metadata(&mut self, commit_time: &str, key: &RecordKey, file_name: &str) {
        self.set(COMMIT_TIME_POS, Value::from(commit_time));
        self.set(RECORD_KEY_POS, Value::from(key.record_key()));
        self.set(PARTITION_PATH_POS, Value::from(key.partition_path()));
        self.set(FILE_NAME_POS, Value::from(file_name));
    }
}

impl fmt::Display for DynRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}

/// Identity of a logical row: record key plus partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    record_key: String,
    partition_path: String,
}

impl RecordKey {
    /// Key of `record_key` within `partition_path`.
    pub fn new(record_key: impl Into<String>, partition_path: impl Into<String>) -> Self {
        Self {
            record_key: record_key.into(),
            partition_path: partition_path.into(),
        }
    }

    /// Record key within the partition.
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Partition holding the record.
    pub fn partition_path(&self) -> &str {
        &self.partition_path
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_path, self.record_key)
    }
}

/// A pending change for one record key, waiting to be merged into a file group.
#[derive(Debug, Clone)]
pub struct PendingRecord<P> {
    key: RecordKey,
    data: Option<P>,
    current_location: Option<RecordLocation>,
    new_location: Option<RecordLocation>,
}

impl<P> PendingRecord<P> {
    /// Pending change of `key` carrying `payload`.
    pub fn new(key: RecordKey, payload: P) -> Self {
        Self {
            key,
            data: Some(payload),
            current_location: None,
            new_location: None,
        }
    }

    /// Full key of the record.
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Record key within the partition.
    pub fn record_key(&self) -> &str {
        self.key.record_key()
    }

    /// Partition holding the record.
    pub fn partition_path(&self) -> &str {
        self.key.partition_path()
    }

    /// Payload, or `None` once it has been released by [`PendingRecord::deflate`].
    pub fn payload(&self) -> Option<&P> {
        self.data.as_ref()
    }

    /// Release the payload once its value has been persisted.
    pub fn deflate(&mut self) {
        self.data = None;
    }

    /// Whether the payload was released.
    pub fn is_deflated(&self) -> bool {
        self.data.is_none()
    }

    /// Location the record was found at by indexing, if it already existed.
    pub fn current_location(&self) -> Option<&RecordLocation> {
        self.current_location.as_ref()
    }

    /// Record where indexing found the key.
    pub fn set_current_location(&mut self, location: RecordLocation) {
        self.current_location = Some(location);
    }

    /// Location the record is being written to.
    pub fn new_location(&self) -> Option<&RecordLocation> {
        self.new_location.as_ref()
    }

    /// Record where the key is being written.
    pub fn set_new_location(&mut self, location: RecordLocation) {
        self.new_location = Some(location);
    }
}
