//! Core row filtering for Arrow record batches.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::{filter as arrow_filter, is_not_null};
use arrow::record_batch::RecordBatch;

use crate::error::{PipelineError, Result};

/// Filter a record batch based on a boolean mask
///
/// # Arguments
/// * `batch` - The record batch to filter
/// * `mask` - The boolean mask indicating which rows to keep
pub fn filter_record_batch(batch: &RecordBatch, mask: &BooleanArray) -> Result<RecordBatch> {
    if batch.num_rows() != mask.len() {
        return Err(PipelineError::schema(
            "filter",
            format!(
                "mask length ({}) doesn't match batch row count ({})",
                mask.len(),
                batch.num_rows()
            ),
        ));
    }

    let filtered_columns: Vec<ArrayRef> = batch
        .columns()
        .iter()
        .map(|col| arrow_filter(col, mask))
        .collect::<std::result::Result<_, _>>()?;

    Ok(RecordBatch::try_new(batch.schema(), filtered_columns)?)
}

/// Trait for objects that can filter record batches
pub trait BatchFilter: std::fmt::Debug {
    /// Filter a record batch
    fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Returns the set of column names required by this filter
    fn required_columns(&self) -> HashSet<String>;
}

/// Shared, thread-safe filter handle
pub type SharedFilter = Arc<dyn BatchFilter + Send + Sync>;

/// Keeps rows whose value in `column` is not null
#[derive(Debug, Clone)]
pub struct NotNullFilter {
    column: String,
}

impl NotNullFilter {
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl BatchFilter for NotNullFilter {
    fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let idx = batch.schema().index_of(&self.column).map_err(|_| {
            PipelineError::schema("filter", format!("column '{}' not found", self.column))
        })?;
        let mask = is_not_null(batch.column(idx).as_ref())?;
        filter_record_batch(batch, &mask)
    }

    fn required_columns(&self) -> HashSet<String> {
        HashSet::from([self.column.clone()])
    }
}

/// A filter that combines multiple filters with a logical AND
#[derive(Debug, Clone)]
pub struct AndFilter {
    filters: Vec<SharedFilter>,
}

impl AndFilter {
    #[must_use]
    pub fn new(filters: Vec<SharedFilter>) -> Self {
        Self { filters }
    }
}

impl BatchFilter for AndFilter {
    fn filter(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let mut result = batch.clone();
        for filter in &self.filters {
            if result.num_rows() == 0 {
                break;
            }
            result = filter.filter(&result)?;
        }
        Ok(result)
    }

    fn required_columns(&self) -> HashSet<String> {
        self.filters
            .iter()
            .flat_map(|f| f.required_columns())
            .collect()
    }
}
