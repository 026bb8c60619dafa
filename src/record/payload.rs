//! Payload capability consulted by the merge engine.
//!
//! Payloads own their merge logic: given the stored value they produce the
//! replacement (or nothing, for a delete), and without one they produce the
//! value to insert. Implementations are picked statically through the
//! handle's type parameter.

use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use super::{DynRecord, RecordError, RecordSchema};

/// Free-form metadata a payload attaches to its write outcome.
pub type PayloadMetadata = BTreeMap<String, String>;

/// Failure raised by a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The produced record does not fit the schema.
    #[error("payload record error: {0}")]
    Record(#[from] RecordError),
    /// Payload-specific merge failure.
    #[error("payload merge failed: {0}")]
    Merge(String),
}

/// Merge behaviour of a pending record.
pub trait RecordPayload: fmt::Debug {
    /// Combine with the value currently stored for the key.
    ///
    /// `Ok(None)` means the key is deleted.
    fn combine_and_get_update_value(
        &self,
        current: &DynRecord,
        schema: &RecordSchema,
    ) -> Result<Option<DynRecord>, PayloadError>;

    /// Value to write when no stored value exists for the key.
    fn get_insert_value(&self, schema: &RecordSchema) -> Result<Option<DynRecord>, PayloadError>;

    /// Metadata attached to the write outcome of the record.
    fn metadata(&self) -> Option<PayloadMetadata> {
        None
    }
}

/// The incoming value replaces whatever is stored; an empty payload deletes.
#[derive(Debug, Clone, PartialEq)]
pub struct OverwriteWithLatestPayload {
    record: Option<DynRecord>,
}

impl OverwriteWithLatestPayload {
    /// A payload that writes `record`.
    pub fn new(record: DynRecord) -> Self {
        Self {
            record: Some(record),
        }
    }

    /// A payload that removes the key.
    pub fn delete() -> Self {
        Self { record: None }
    }
}

impl RecordPayload for OverwriteWithLatestPayload {
    fn combine_and_get_update_value(
        &self,
        _current: &DynRecord,
        schema: &RecordSchema,
    ) -> Result<Option<DynRecord>, PayloadError> {
        self.get_insert_value(schema)
    }

    fn get_insert_value(&self, _schema: &RecordSchema) -> Result<Option<DynRecord>, PayloadError> {
        Ok(self.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::{DataType, Field};

    use super::*;
    use crate::record::Value;

    #[test]
    fn overwrite_ignores_stored_value() {
        let schema = RecordSchema::new(vec![Field::new("v", DataType::Int64, false)]).unwrap();
        let stored = schema.record(vec![Value::Int64(1)]);
        let incoming = schema.record(vec![Value::Int64(2)]);

        let payload = OverwriteWithLatestPayload::new(incoming.clone());
        let merged = payload
            .combine_and_get_update_value(&stored, &schema)
            .unwrap();
        assert_eq!(merged, Some(incoming));

        let delete = OverwriteWithLatestPayload::delete();
        assert_eq!(
            delete.combine_and_get_update_value(&stored, &schema).unwrap(),
            None
        );
        assert_eq!(delete.get_insert_value(&schema).unwrap(), None);
    }
}
