//! Error handling for the pipeline.
//!
//! Every stage reports failures through [`PipelineError`]. Data-shape errors
//! (`Ingest`, `Schema`, `KeyConflict`, `DuplicateKey`, `UnmatchedKeys`) signal a
//! contract violation between tiers and are never retried.

pub mod util;

use std::io;
use std::path::{Path, PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;

use crate::schema::adapt::AdapterError;

/// Specialized error type for the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or unreadable source file
    #[error("Ingest error in {}: {message}", .path.display())]
    Ingest { path: PathBuf, message: String },

    /// An expected column is missing or has the wrong shape
    #[error("Schema error in '{table}': {message}")]
    Schema { table: String, message: String },

    /// Non-key columns with the same name on both sides of a join
    #[error("Key conflict between '{left}' and '{right}': ambiguous column(s) {columns:?}")]
    KeyConflict {
        left: String,
        right: String,
        columns: Vec<String>,
    },

    /// Destination already holds a committed snapshot
    #[error("Write conflict: table '{table}' already has snapshot version {version}")]
    WriteConflict { table: String, version: u64 },

    /// A key that must be unique occurs more than once
    #[error("Duplicate key '{key}' in column '{column}' of '{table}'")]
    DuplicateKey {
        table: String,
        column: String,
        key: String,
    },

    /// Encounters whose patient is unknown, under the strict join policy
    #[error("{count} encounter(s) reference patients missing from the patient table (first: '{example}')")]
    UnmatchedKeys { count: usize, example: String },

    /// A stage was started before its input tier was committed
    #[error("Stage '{stage}' requires table '{table}', which has no committed snapshot")]
    MissingPredecessor { stage: String, table: String },

    /// No committed snapshot or catalog entry under this name
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Catalog state could not be read or updated
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error tied to a path
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Type adaptation error: {0}")]
    Adapter(#[from] AdapterError),
}

impl PipelineError {
    /// Create an ingest error for a source file
    pub fn ingest(path: impl AsRef<Path>, message: impl std::fmt::Display) -> Self {
        Self::Ingest {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Create a schema error for a table
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the error signals a data contract violation rather than an
    /// environmental failure
    #[must_use]
    pub const fn is_data_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Ingest { .. }
                | Self::Schema { .. }
                | Self::KeyConflict { .. }
                | Self::DuplicateKey { .. }
                | Self::UnmatchedKeys { .. }
        )
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
