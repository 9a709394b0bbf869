//! Field definitions for declared source schemas.

use std::fmt;

use arrow::datatypes::{DataType, Field, TimeUnit};

/// Semantic type of a source column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Opaque identifier (patient or encounter id)
    Identifier,
    /// Free text
    String,
    /// Coded categorical value (gender, race, encounter class)
    Category,
    /// Decimal value
    Decimal,
    /// Calendar date
    Date,
    /// Point in time
    Timestamp,
}

impl FieldType {
    /// Arrow type a column of this kind is stored as
    #[must_use]
    pub fn to_arrow_type(self) -> DataType {
        match self {
            Self::Identifier | Self::String | Self::Category => DataType::Utf8,
            Self::Decimal => DataType::Float64,
            Self::Date => DataType::Date32,
            Self::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
        }
    }

    /// Whether values are parsed from text with a date format
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identifier => "Identifier",
            Self::String => "String",
            Self::Category => "Category",
            Self::Decimal => "Decimal",
            Self::Date => "Date",
            Self::Timestamp => "Timestamp",
        };
        f.write_str(name)
    }
}

/// What the pipeline relies on a column for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Primary identifier of the entity; never null
    Key,
    /// Reference to another entity's key
    ForeignKey,
    /// Directly identifies a person; removed before the silver tier
    DirectIdentifier,
    /// Rows lacking a value are dropped before the silver tier
    Required,
    /// Plain descriptive attribute
    Attribute,
}

impl ColumnRole {
    /// Whether ingest rejects a source file that lacks this column
    #[must_use]
    pub const fn is_mandatory(self) -> bool {
        !matches!(self, Self::Attribute)
    }
}

/// A declared column of a source entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Column name as it appears in the source header
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Semantic type
    pub field_type: FieldType,
    /// Role in the pipeline
    pub role: ColumnRole,
}

impl FieldDefinition {
    #[must_use]
    pub fn new(name: &str, description: &str, field_type: FieldType, role: ColumnRole) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            field_type,
            role,
        }
    }

    /// Arrow field for this column; only keys are non-nullable
    #[must_use]
    pub fn to_arrow_field(&self) -> Field {
        Field::new(
            &self.name,
            self.field_type.to_arrow_type(),
            !matches!(self.role, ColumnRole::Key),
        )
    }
}
