//! Shared types of the schema adapter.

use arrow::error::ArrowError;
use serde::{Deserialize, Serialize};

/// Failure while adapting a batch to its declared schema
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Type conversion error: {0}")]
    Conversion(String),

    /// A non-empty temporal value that no configured format accepts
    #[error("Column '{column}', row {row}: '{value}' is not a recognised date or timestamp")]
    UnparseableTemporal {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Column '{0}' missing from batch")]
    MissingColumn(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

/// How an inferred column type relates to its declared type
#[derive(Debug, PartialEq, Eq)]
pub enum TypeCompatibility {
    Exact,
    /// Castable without changing meaning, e.g. integer widening or text to date
    Compatible,
    Incompatible,
}

/// Accepted textual forms of dates and timestamps
///
/// Synthea writes ISO dates and RFC 3339 timestamps; the remaining formats
/// cover extracts that went through a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateFormatConfig {
    /// Tried in order for date columns
    pub date_formats: Vec<String>,
    /// Tried in order for timestamp columns, after RFC 3339
    pub timestamp_formats: Vec<String>,
    /// Fall back to shape-based detection when no listed format matches
    pub enable_format_detection: bool,
}

impl Default for DateFormatConfig {
    fn default() -> Self {
        let owned = |formats: &[&str]| formats.iter().map(|f| (*f).to_string()).collect();
        Self {
            date_formats: owned(&["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%d %b %Y"]),
            timestamp_formats: owned(&[
                "%Y-%m-%dT%H:%M:%SZ",
                "%Y-%m-%dT%H:%M:%S%.fZ",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M:%S",
            ]),
            enable_format_detection: true,
        }
    }
}
