use std::{fmt, sync::Arc};

use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef};

use super::{DynRecord, RecordError, Value};

/// Commit that last wrote the record.
pub const COMMIT_TIME_FIELD: &str = "_commit_time";
/// Record key, unique within a partition.
pub const RECORD_KEY_FIELD: &str = "_record_key";
/// Partition the record belongs to.
pub const PARTITION_PATH_FIELD: &str = "_partition_path";
/// Name of the base file holding the record.
pub const FILE_NAME_FIELD: &str = "_file_name";

/// Metadata columns leading every table schema, in order.
pub const METADATA_FIELDS: [&str; 4] = [
    COMMIT_TIME_FIELD,
    RECORD_KEY_FIELD,
    PARTITION_PATH_FIELD,
    FILE_NAME_FIELD,
];

pub(crate) const COMMIT_TIME_POS: usize = 0;
pub(crate) const RECORD_KEY_POS: usize = 1;
pub(crate) const PARTITION_PATH_POS: usize = 2;
pub(crate) const FILE_NAME_POS: usize = 3;

/// Shared handle to a [`RecordSchema`].
pub type RecordSchemaRef = Arc<RecordSchema>;

/// Table schema: the metadata columns followed by user columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    arrow_schema: SchemaRef,
}

impl RecordSchema {
    /// Build a schema from user fields, prepending the metadata columns.
    pub fn new(user_fields: Vec<Field>) -> Result<Self, RecordError> {
        let fields = METADATA_FIELDS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true))
            .chain(user_fields)
            .collect::<Vec<_>>();
        Self::from_arrow(Arc::new(ArrowSchema::new(fields)))
    }

    /// Wrap an arrow schema that already carries the metadata columns.
    pub fn from_arrow(arrow_schema: SchemaRef) -> Result<Self, RecordError> {
        for (position, expected) in METADATA_FIELDS.iter().enumerate() {
            let actual = arrow_schema
                .fields()
                .get(position)
                .map(|field| field.name().clone())
                .unwrap_or_default();
            if actual != *expected {
                return Err(RecordError::MissingMetadataField {
                    position,
                    expected,
                    actual,
                });
            }
        }
        for field in arrow_schema.fields() {
            if !is_supported(field.data_type()) {
                return Err(RecordError::UnsupportedType {
                    field: field.name().clone(),
                    data_type: field.data_type().clone(),
                });
            }
        }
        Ok(Self { arrow_schema })
    }

    /// Underlying arrow schema.
    pub fn arrow_schema(&self) -> &SchemaRef {
        &self.arrow_schema
    }

    /// Number of columns including metadata columns.
    pub fn len(&self) -> usize {
        self.arrow_schema.fields().len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column index of `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.arrow_schema.index_of(name).ok()
    }

    /// Build a record from user values, leaving the metadata columns null.
    pub fn record(&self, user_values: Vec<Value>) -> DynRecord {
        let mut values = vec![Value::Null; METADATA_FIELDS.len()];
        values.extend(user_values);
        DynRecord::new(values)
    }

    /// Check that `record` has the shape this schema describes.
    pub fn validate(&self, record: &DynRecord) -> Result<(), RecordError> {
        let fields = self.arrow_schema.fields();
        if record.values().len() != fields.len() {
            return Err(RecordError::ArityMismatch {
                expected: fields.len(),
                actual: record.values().len(),
            });
        }
        for (field, value) in fields.iter().zip(record.values()) {
            if value.is_null() {
                if !field.is_nullable() {
                    return Err(RecordError::NullNotAllowed {
                        field: field.name().clone(),
                    });
                }
                continue;
            }
            if &value.data_type() != field.data_type() {
                return Err(RecordError::TypeMismatch {
                    field: field.name().clone(),
                    expected: field.data_type().clone(),
                    actual: value.data_type(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, field) in self.arrow_schema.fields().iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field.name(), field.data_type())?;
            if field.is_nullable() {
                write!(f, "?")?;
            }
        }
        write!(f, "}}")
    }
}

fn is_supported(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Boolean | DataType::Int64 | DataType::Float64 | DataType::Utf8 | DataType::Binary
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("age", DataType::Int64, true),
        ])
        .expect("schema")
    }

    #[test]
    fn metadata_columns_lead_the_schema() {
        let schema = schema();
        assert_eq!(schema.len(), 6);
        assert_eq!(schema.index_of(RECORD_KEY_FIELD), Some(RECORD_KEY_POS));
        assert_eq!(schema.index_of("age"), Some(5));
    }

    #[test]
    fn validate_reports_shape_problems() {
        let schema = schema();
        let ok = schema.record(vec!["alice".into(), Value::Null]);
        schema.validate(&ok).expect("valid");

        let short = schema.record(vec!["alice".into()]);
        assert!(matches!(
            schema.validate(&short),
            Err(RecordError::ArityMismatch {
                expected: 6,
                actual: 5
            })
        ));

        let wrong_type = schema.record(vec![Value::Int64(1), Value::Null]);
        assert!(matches!(
            schema.validate(&wrong_type),
            Err(RecordError::TypeMismatch { .. })
        ));

        let null_name = schema.record(vec![Value::Null, Value::Int64(3)]);
        assert!(matches!(
            schema.validate(&null_name),
            Err(RecordError::NullNotAllowed { .. })
        ));
    }

    #[test]
    fn arrow_schema_without_metadata_is_rejected() {
        let arrow = Arc::new(ArrowSchema::new(vec![Field::new(
            "name",
            DataType::Utf8,
            false,
        )]));
        assert!(matches!(
            RecordSchema::from_arrow(arrow),
            Err(RecordError::MissingMetadataField { position: 0, .. })
        ));
    }

    #[test]
    fn unsupported_types_are_rejected() {
        let err = RecordSchema::new(vec![Field::new("ts", DataType::Date32, false)])
            .expect_err("date32 unsupported");
        assert!(matches!(err, RecordError::UnsupportedType { .. }));
    }
}
