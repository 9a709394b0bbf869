//! Row filters over Arrow record batches.
//!
//! Used by the cleaning stage (dropping incomplete records) and by catalog
//! queries (restricting a table to a set of patients).

pub mod core;
pub mod key;

pub use self::core::{AndFilter, BatchFilter, NotNullFilter, SharedFilter, filter_record_batch};
pub use self::key::{KeySetFilter, key_column_as_strings};
