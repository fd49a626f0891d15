//! Declared table schemas, primary keys and batch conformance checks.

use std::{collections::HashSet, fmt, sync::Arc};

use arrow::{
    array::RecordBatch,
    datatypes::{DataType, Field, Schema, SchemaRef},
};

use crate::error::LakeError;

/// Builder for a declared table schema from ordered `(column, type)` pairs.
///
/// Columns are declared nullable; conformance checks compare names and types
/// only.
#[derive(Clone, Debug, Default)]
pub struct TableSchema {
    columns: Vec<(String, DataType)>,
}

impl TableSchema {
    /// Start an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push((name.into(), data_type));
        self
    }

    /// Finalise into an Arrow schema, rejecting empty and duplicate declarations.
    pub fn build(self) -> Result<SchemaRef, LakeError> {
        if self.columns.is_empty() {
            return Err(LakeError::InvalidSchema {
                reason: "schema declares no columns".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for (name, _) in &self.columns {
            if name.trim().is_empty() {
                return Err(LakeError::InvalidSchema {
                    reason: "column name cannot be empty".to_string(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(LakeError::InvalidSchema {
                    reason: format!("duplicate column {name}"),
                });
            }
        }
        let fields = self
            .columns
            .into_iter()
            .map(|(name, data_type)| Field::new(name, data_type, true))
            .collect::<Vec<_>>();
        Ok(Arc::new(Schema::new(fields)))
    }
}

impl<S> FromIterator<(S, DataType)> for TableSchema
where
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, DataType)>>(iter: I) -> Self {
        Self {
            columns: iter
                .into_iter()
                .map(|(name, data_type)| (name.into(), data_type))
                .collect(),
        }
    }
}

/// Ordered primary-key columns of a table.
///
/// The comma-joined form ([`PrimaryKey::composite`]) is the representation
/// stored as the engine-side table description and recovered on rebuild.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    columns: Vec<String>,
}

impl PrimaryKey {
    /// Key over the given columns, in declared order.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the comma-joined form. Segments are trimmed and empty ones dropped.
    pub fn parse(composite: &str) -> Self {
        Self {
            columns: composite
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Key columns in declared order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the key names no column.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Comma-joined form, e.g. `"id,region"`.
    pub fn composite(&self) -> String {
        self.columns.join(",")
    }

    pub(crate) fn check_against(&self, schema: &Schema) -> Result<(), LakeError> {
        if self.columns.is_empty() {
            return Err(LakeError::InvalidPrimaryKey {
                reason: "at least one key column is required".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if schema.field_with_name(column).is_err() {
                return Err(LakeError::InvalidPrimaryKey {
                    reason: format!("column {column} is not part of the schema"),
                });
            }
            if !seen.insert(column.as_str()) {
                return Err(LakeError::InvalidPrimaryKey {
                    reason: format!("column {column} is listed twice"),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite())
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::parse(value)
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        PrimaryKey::parse(&value)
    }
}

impl From<Vec<String>> for PrimaryKey {
    fn from(columns: Vec<String>) -> Self {
        PrimaryKey { columns }
    }
}

impl From<&[&str]> for PrimaryKey {
    fn from(columns: &[&str]) -> Self {
        PrimaryKey::new(columns.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for PrimaryKey {
    fn from(columns: [&str; N]) -> Self {
        PrimaryKey::new(columns)
    }
}

/// Whether `batch` has exactly the declared columns with exactly the declared types.
///
/// Column order and nullability are not compared.
pub fn conforms(declared: &Schema, batch: &RecordBatch) -> bool {
    let actual = batch.schema();
    if actual.fields().len() != declared.fields().len() {
        return false;
    }
    declared.fields().iter().all(|field| {
        actual
            .field_with_name(field.name())
            .map(|candidate| candidate.data_type() == field.data_type())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{Int32Array, Int64Array, RecordBatch, StringArray},
        datatypes::{DataType, Field, Schema},
    };

    use super::{conforms, PrimaryKey, TableSchema};
    use crate::error::LakeError;

    fn declared() -> Arc<Schema> {
        TableSchema::new()
            .column("id", DataType::Int32)
            .column("v", DataType::Utf8)
            .build()
            .expect("schema")
    }

    #[test]
    fn composite_key_joins_in_declared_order() {
        let key = PrimaryKey::from(["b", "a"]);
        assert_eq!(key.composite(), "b,a");
        assert_eq!(PrimaryKey::from("id").composite(), "id");
    }

    #[test]
    fn parse_trims_and_drops_empty_segments() {
        let key = PrimaryKey::parse(" a , b,,");
        assert_eq!(key.columns(), &["a".to_string(), "b".to_string()]);
        assert!(PrimaryKey::parse("").is_empty());
    }

    #[test]
    fn key_must_reference_schema_columns() {
        let schema = declared();
        assert!(PrimaryKey::from("id").check_against(&schema).is_ok());
        assert!(matches!(
            PrimaryKey::from("missing").check_against(&schema),
            Err(LakeError::InvalidPrimaryKey { .. })
        ));
        assert!(matches!(
            PrimaryKey::default().check_against(&schema),
            Err(LakeError::InvalidPrimaryKey { .. })
        ));
        assert!(matches!(
            PrimaryKey::from(["id", "id"]).check_against(&schema),
            Err(LakeError::InvalidPrimaryKey { .. })
        ));
    }

    #[test]
    fn schema_builder_rejects_duplicates() {
        let err = TableSchema::new()
            .column("id", DataType::Int32)
            .column("id", DataType::Utf8)
            .build()
            .unwrap_err();
        assert!(matches!(err, LakeError::InvalidSchema { .. }));
        assert!(TableSchema::new().build().is_err());
    }

    #[test]
    fn conformance_ignores_order_and_nullability() {
        let schema = declared();
        let reordered = Arc::new(Schema::new(vec![
            Field::new("v", DataType::Utf8, false),
            Field::new("id", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            reordered,
            vec![
                Arc::new(StringArray::from(vec!["a"])),
                Arc::new(Int32Array::from(vec![1])),
            ],
        )
        .expect("batch");
        assert!(conforms(&schema, &batch));
    }

    #[test]
    fn conformance_rejects_widened_types_and_extra_columns() {
        let schema = declared();
        let widened = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int64, true),
                Field::new("v", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["a"])),
            ],
        )
        .expect("batch");
        assert!(!conforms(&schema, &widened));

        let extra = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("id", DataType::Int32, true),
                Field::new("v", DataType::Utf8, true),
                Field::new("w", DataType::Utf8, true),
            ])),
            vec![
                Arc::new(Int32Array::from(vec![1])),
                Arc::new(StringArray::from(vec!["a"])),
                Arc::new(StringArray::from(vec!["b"])),
            ],
        )
        .expect("batch");
        assert!(!conforms(&schema, &extra));
    }
}
