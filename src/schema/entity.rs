//! Declared schemas for the source entities.
//!
//! Column names and types follow the Synthea CSV export. The declared schema
//! is the contract ingest validates inferred types against, and the single
//! place that marks which columns are direct identifiers.

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::schema::field::{ColumnRole, FieldDefinition, FieldType};

/// Column dropped from the encounter tier when null
pub const REASON_DESCRIPTION: &str = "REASONDESCRIPTION";

/// A source entity of the EHR extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Patients,
    Encounters,
}

impl Entity {
    /// All entities, in pipeline order
    pub const ALL: [Self; 2] = [Self::Patients, Self::Encounters];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::Encounters => "encounters",
        }
    }

    /// Declared schema of this entity
    #[must_use]
    pub fn schema(self) -> EntitySchema {
        match self {
            Self::Patients => EntitySchema::patients(),
            Self::Encounters => EntitySchema::encounters(),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The declared column set of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    entity: Entity,
    fields: Vec<FieldDefinition>,
}

impl EntitySchema {
    /// Declared schema of `patients.csv`
    #[must_use]
    pub fn patients() -> Self {
        use ColumnRole::{Attribute, DirectIdentifier, Key};
        use FieldType::{Category, Date, Identifier, String};

        let f = FieldDefinition::new;
        Self {
            entity: Entity::Patients,
            fields: vec![
                f("Id", "Patient identifier", Identifier, Key),
                f("BIRTHDATE", "Date of birth", Date, Attribute),
                f("DEATHDATE", "Date of death", Date, Attribute),
                f("SSN", "Social security number", String, DirectIdentifier),
                f("DRIVERS", "Driver's license number", String, DirectIdentifier),
                f("PASSPORT", "Passport number", String, DirectIdentifier),
                f("PREFIX", "Name prefix", String, DirectIdentifier),
                f("FIRST", "First name", String, DirectIdentifier),
                f("LAST", "Last name", String, DirectIdentifier),
                f("SUFFIX", "Name suffix", String, DirectIdentifier),
                f("MAIDEN", "Maiden name", String, DirectIdentifier),
                f("MARITAL", "Marital status", Category, Attribute),
                f("RACE", "Race", Category, Attribute),
                f("ETHNICITY", "Ethnicity", Category, Attribute),
                f("GENDER", "Gender", Category, Attribute),
                f("BIRTHPLACE", "Place of birth", String, DirectIdentifier),
                f("ADDRESS", "Street address", String, DirectIdentifier),
                f("CITY", "City of residence", String, Attribute),
                f("STATE", "State of residence", String, Attribute),
                f("ZIP", "Postal code", String, Attribute),
            ],
        }
    }

    /// Declared schema of `encounters.csv`
    #[must_use]
    pub fn encounters() -> Self {
        use ColumnRole::{Attribute, ForeignKey, Required};
        use FieldType::{Category, Decimal, Identifier, String, Timestamp};

        let f = FieldDefinition::new;
        Self {
            entity: Entity::Encounters,
            fields: vec![
                f("Id", "Encounter identifier", Identifier, Attribute),
                f("START", "Encounter start", Timestamp, Attribute),
                f("STOP", "Encounter end", Timestamp, Attribute),
                f("PATIENT", "Owning patient", Identifier, ForeignKey),
                f("ENCOUNTERCLASS", "Encounter class", Category, Attribute),
                f("CODE", "Encounter type code", String, Attribute),
                f("DESCRIPTION", "Encounter type description", String, Attribute),
                f("COST", "Encounter cost", Decimal, Attribute),
                f("REASONCODE", "Reason code", String, Attribute),
                f(REASON_DESCRIPTION, "Reason description", String, Required),
            ],
        }
    }

    #[must_use]
    pub const fn entity(&self) -> Entity {
        self.entity
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared column names, in declaration order
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Columns holding direct identifiers
    #[must_use]
    pub fn direct_identifiers(&self) -> Vec<&str> {
        self.columns_with_role(ColumnRole::DirectIdentifier)
    }

    /// Columns whose absence drops the row at the silver tier
    #[must_use]
    pub fn required_columns(&self) -> Vec<&str> {
        self.columns_with_role(ColumnRole::Required)
    }

    fn columns_with_role(&self, role: ColumnRole) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.role == role)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Arrow schema of the declared columns
    #[must_use]
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.fields
                .iter()
                .map(FieldDefinition::to_arrow_field)
                .collect::<Vec<_>>(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patient_identifiers_are_enumerated() {
        let schema = EntitySchema::patients();
        assert_eq!(
            schema.direct_identifiers(),
            vec![
                "SSN", "DRIVERS", "PASSPORT", "PREFIX", "FIRST", "LAST", "SUFFIX", "MAIDEN",
                "BIRTHPLACE", "ADDRESS"
            ]
        );
        assert!(EntitySchema::encounters().direct_identifiers().is_empty());
    }

    #[test]
    fn only_the_key_is_non_nullable() {
        let schema = EntitySchema::patients().arrow_schema();
        let non_null: Vec<_> = schema
            .fields()
            .iter()
            .filter(|f| !f.is_nullable())
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(non_null, vec!["Id"]);
    }
}
