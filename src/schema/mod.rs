//! Declared source schemas, the shared key mapping and type adaptation.

pub mod adapt;
pub mod entity;
pub mod field;
pub mod keys;

pub use adapt::{AdapterError, DateFormatConfig, adapt_record_batch, check_schema_compatibility};
pub use entity::{Entity, EntitySchema, REASON_DESCRIPTION};
pub use field::{ColumnRole, FieldDefinition, FieldType};
pub use keys::{KeyMapping, PATIENT_ID};
