//! Filtering rows by membership of a key column in a set of identifiers.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, StringArray};
use arrow::compute::kernels::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;

use crate::error::{PipelineError, Result};
use crate::filter::core::{BatchFilter, filter_record_batch};

/// Keeps rows whose key column value is in (or, when negated, not in) a set
#[derive(Debug, Clone)]
pub struct KeySetFilter {
    keys: FxHashSet<String>,
    column: String,
    negated: bool,
}

impl KeySetFilter {
    /// Create a filter keeping rows whose `column` value is one of `keys`
    #[must_use]
    pub fn new<I, S>(column: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            column: column.into(),
            negated: false,
        }
    }

    /// Invert the filter: keep rows whose key is not in the set
    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    fn mask(&self, keys: &StringArray) -> BooleanArray {
        keys.iter()
            .map(|value| {
                let hit = value.is_some_and(|k| self.keys.contains(k));
                // Null keys are never members, whichever way the filter points
                Some(value.is_some() && hit != self.negated)
            })
            .collect()
    }
}

/// View a key column as strings, casting non-string identifiers
pub fn key_column_as_strings(batch: &RecordBatch, column: &str) -> Result<ArrayRef> {
    let idx = batch.schema().index_of(column).map_err(|_| {
        PipelineError::schema("key filter", format!("key column '{column}' not found"))
    })?;
    let array = batch.column(idx);
    if array.data_type() == &DataType::Utf8 {
        Ok(Arc::clone(array))
    } else {
        Ok(cast::cast(array, &DataType::Utf8)?)
    }
}

impl BatchFilter for KeySetFilter {
    fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let keys = key_column_as_strings(batch, &self.column)?;
        let keys = keys
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                PipelineError::schema(
                    "key filter",
                    format!("key column '{}' is not a string array", self.column),
                )
            })?;
        filter_record_batch(batch, &self.mask(keys))
    }

    fn required_columns(&self) -> HashSet<String> {
        HashSet::from([self.column.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, Schema};

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "PATIENT_ID",
            DataType::Utf8,
            true,
        )]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec![
                Some("P1"),
                Some("P9"),
                None,
            ]))],
        )
        .expect("batch")
    }

    #[test]
    fn keeps_members() {
        let filter = KeySetFilter::new("PATIENT_ID", ["P1"]);
        assert_eq!(filter.filter(&batch()).expect("filter").num_rows(), 1);
    }

    #[test]
    fn negated_keeps_non_members_but_not_nulls() {
        let filter = KeySetFilter::new("PATIENT_ID", ["P1"]).negated();
        assert_eq!(filter.filter(&batch()).expect("filter").num_rows(), 1);
    }
}
