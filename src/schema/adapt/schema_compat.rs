//! Schema-level compatibility checks and batch adaptation.

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::schema::adapt::compatibility::check_type_compatibility;
use crate::schema::adapt::conversions::convert_array;
use crate::schema::adapt::types::{AdapterError, DateFormatConfig, Result, TypeCompatibility};

/// Outcome of comparing an observed schema with a declared one
#[derive(Debug, Default)]
pub struct SchemaCompatibilityReport {
    /// Declared columns whose observed type cannot be loaded as declared
    pub issues: Vec<SchemaIssue>,
    /// Declared columns that need a type conversion on load
    pub adaptations: Vec<SchemaAdaptation>,
    /// Declared columns absent from the observed schema
    pub missing: Vec<String>,
    /// Observed columns that are not declared
    pub undeclared: Vec<String>,
}

impl SchemaCompatibilityReport {
    /// Whether every present declared column can be loaded
    #[must_use]
    pub fn compatible(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A column whose observed type cannot be loaded as declared
#[derive(Debug)]
pub struct SchemaIssue {
    pub field_name: String,
    pub observed: DataType,
    pub declared: DataType,
}

/// A column that will be converted on load
#[derive(Debug)]
pub struct SchemaAdaptation {
    pub field_name: String,
    pub observed: DataType,
    pub declared: DataType,
}

/// Compare an observed (inferred) schema with a declared one, by column name
#[must_use]
pub fn check_schema_compatibility(observed: &Schema, declared: &Schema) -> SchemaCompatibilityReport {
    let mut report = SchemaCompatibilityReport::default();

    for declared_field in declared.fields() {
        let name = declared_field.name();
        let Ok(observed_field) = observed.field_with_name(name) else {
            report.missing.push(name.clone());
            continue;
        };

        match check_type_compatibility(observed_field.data_type(), declared_field.data_type()) {
            TypeCompatibility::Exact => {}
            TypeCompatibility::Compatible => report.adaptations.push(SchemaAdaptation {
                field_name: name.clone(),
                observed: observed_field.data_type().clone(),
                declared: declared_field.data_type().clone(),
            }),
            TypeCompatibility::Incompatible => report.issues.push(SchemaIssue {
                field_name: name.clone(),
                observed: observed_field.data_type().clone(),
                declared: declared_field.data_type().clone(),
            }),
        }
    }

    report.undeclared = observed
        .fields()
        .iter()
        .filter(|f| declared.field_with_name(f.name()).is_err())
        .map(|f| f.name().clone())
        .collect();

    report
}

/// Convert a record batch to match the target schema
///
/// Columns are matched by name and emitted in target order. Every target
/// column must be present in the batch.
pub fn adapt_record_batch(
    batch: &RecordBatch,
    target_schema: &SchemaRef,
    date_config: &DateFormatConfig,
) -> Result<RecordBatch> {
    let source_schema = batch.schema();
    let columns = target_schema
        .fields()
        .iter()
        .map(|target_field| {
            let name = target_field.name();
            let idx = source_schema
                .index_of(name)
                .map_err(|_| AdapterError::MissingColumn(name.clone()))?;
            convert_array(name, batch.column(idx), target_field.data_type(), date_config)
        })
        .collect::<Result<Vec<ArrayRef>>>()?;

    RecordBatch::try_new(Arc::clone(target_schema), columns).map_err(AdapterError::Arrow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;

    #[test]
    fn report_separates_missing_undeclared_and_issues() {
        let observed = Schema::new(vec![
            Field::new("Id", DataType::Utf8, true),
            Field::new("ZIP", DataType::Int64, true),
            Field::new("COST", DataType::Utf8, true),
            Field::new("EXTRA", DataType::Utf8, true),
        ]);
        let declared = Schema::new(vec![
            Field::new("Id", DataType::Utf8, false),
            Field::new("ZIP", DataType::Utf8, true),
            Field::new("COST", DataType::Float64, true),
            Field::new("GENDER", DataType::Utf8, true),
        ]);

        let report = check_schema_compatibility(&observed, &declared);
        assert!(!report.compatible());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].field_name, "COST");
        assert_eq!(report.adaptations.len(), 1);
        assert_eq!(report.adaptations[0].field_name, "ZIP");
        assert_eq!(report.missing, vec!["GENDER".to_string()]);
        assert_eq!(report.undeclared, vec!["EXTRA".to_string()]);
    }
}
