//! In-memory tabular dataset: a named schema plus its record batches.

use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// A named collection of record batches sharing one schema
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Dataset {
    /// Create a dataset, checking that every batch carries `schema`'s fields
    pub fn try_new(
        name: impl Into<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = batches
            .iter()
            .find(|b| b.schema().fields() != schema.fields())
        {
            return Err(PipelineError::schema(
                &name,
                format!(
                    "batch columns [{}] do not match dataset columns [{}]",
                    bad.schema().fields().iter().map(|f| f.name()).join(", "),
                    schema.fields().iter().map(|f| f.name()).join(", ")
                ),
            ));
        }
        Ok(Self {
            name,
            schema,
            batches,
        })
    }

    /// Create a dataset from a single batch
    pub fn from_batch(name: impl Into<String>, batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        Self::try_new(name, schema, vec![batch])
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Rename the dataset, keeping its data
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.index_of(name).is_ok()
    }

    /// Concatenate all batches into one
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Rename a column in the schema and every batch
    pub fn rename_column(self, from: &str, to: &str) -> Result<Self> {
        let idx = self.schema.index_of(from).map_err(|_| {
            PipelineError::schema(&self.name, format!("column '{from}' not found"))
        })?;
        if from != to && self.has_column(to) {
            return Err(PipelineError::schema(
                &self.name,
                format!("cannot rename '{from}' to '{to}': column '{to}' already exists"),
            ));
        }

        let fields = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == idx {
                    Arc::new(Field::new(to, f.data_type().clone(), f.is_nullable()))
                } else {
                    Arc::clone(f)
                }
            })
            .collect::<Vec<_>>();
        let schema = Arc::new(Schema::new_with_metadata(
            fields,
            self.schema.metadata().clone(),
        ));

        let batches = self
            .batches
            .iter()
            .map(|b| RecordBatch::try_new(Arc::clone(&schema), b.columns().to_vec()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name: self.name,
            schema,
            batches,
        })
    }

    /// Keep only the named columns, in the given order
    pub fn project(&self, columns: &[&str]) -> Result<Self> {
        let indices = columns
            .iter()
            .map(|c| {
                self.schema.index_of(c).map_err(|_| {
                    PipelineError::schema(&self.name, format!("column '{c}' not found"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let schema = Arc::new(self.schema.project(&indices)?);
        let batches = self
            .batches
            .par_iter()
            .map(|b| b.project(&indices))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name: self.name.clone(),
            schema,
            batches,
        })
    }

    /// Remove the named columns; every name must exist
    pub fn drop_columns(&self, columns: &[&str]) -> Result<Self> {
        let missing = columns.iter().filter(|c| !self.has_column(c)).collect_vec();
        if !missing.is_empty() {
            return Err(PipelineError::schema(
                &self.name,
                format!("cannot drop absent column(s) {missing:?}"),
            ));
        }
        let keep = self
            .column_names()
            .into_iter()
            .filter(|c| !columns.contains(c))
            .collect_vec();
        self.project(&keep)
    }

    /// Keep at most `limit` rows
    #[must_use]
    pub fn limit(&self, limit: usize) -> Self {
        let mut remaining = limit;
        let mut batches = Vec::new();
        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            batches.push(batch.slice(0, take));
            remaining -= take;
        }
        Self {
            name: self.name.clone(),
            schema: Arc::clone(&self.schema),
            batches,
        }
    }
}
