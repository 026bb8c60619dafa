use arrow::datatypes::DataType;
use thiserror::Error;

/// Errors raised while shaping or validating records against a schema.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Value count differs from the field count.
    #[error("record has {actual} values but schema has {expected} fields")]
    ArityMismatch {
        /// Fields in the schema.
        expected: usize,
        /// Values in the record.
        actual: usize,
    },
    /// A value has the wrong type for its field.
    #[error("field `{field}` expects {expected}, got {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type declared by the schema.
        expected: DataType,
        /// Type of the value.
        actual: DataType,
    },
    /// A null value was given for a non-nullable field.
    #[error("null value not allowed for field `{field}`")]
    NullNotAllowed {
        /// Field name.
        field: String,
    },
    /// The schema uses a type records cannot hold.
    #[error("unsupported data type {data_type} for field `{field}`")]
    UnsupportedType {
        /// Field name.
        field: String,
        /// Declared type.
        data_type: DataType,
    },
    /// The schema does not start with the metadata columns.
    #[error("schema field {position} must be metadata field `{expected}`, found `{actual}`")]
    MissingMetadataField {
        /// Column index.
        position: usize,
        /// Metadata column expected at `position`.
        expected: &'static str,
        /// Column found instead.
        actual: String,
    },
}
