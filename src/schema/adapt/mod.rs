//! Adapting inferred column types to declared ones.

pub mod compatibility;
pub mod conversions;
pub mod date_utils;
pub mod schema_compat;
pub mod types;

pub use compatibility::{check_type_compatibility, is_string, is_temporal};
pub use conversions::{convert_array, create_null_array};
pub use date_utils::{detect_date_format, parse_date_string, parse_timestamp_string};
pub use schema_compat::{
    SchemaAdaptation, SchemaCompatibilityReport, SchemaIssue, adapt_record_batch,
    check_schema_compatibility,
};
pub use types::{AdapterError, DateFormatConfig, Result, TypeCompatibility};
