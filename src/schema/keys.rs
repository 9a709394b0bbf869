//! The shared join-key mapping.
//!
//! Both source entities identify the patient under their own column name.
//! This mapping is the one place those names are defined; the cleaning stage
//! and the join stage both normalize through it.

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::schema::entity::Entity;

/// Shared logical name of the patient identity column
pub const PATIENT_ID: &str = "PATIENT_ID";

/// Maps each entity's patient-identity column to one shared name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyMapping {
    /// Name both entities are normalized to
    pub shared: String,
    /// Patient primary-key column in the patient source
    pub patients: String,
    /// Patient foreign-key column in the encounter source
    pub encounters: String,
}

impl Default for KeyMapping {
    fn default() -> Self {
        Self {
            shared: PATIENT_ID.to_string(),
            patients: "Id".to_string(),
            encounters: "PATIENT".to_string(),
        }
    }
}

impl KeyMapping {
    #[must_use]
    pub fn shared_key(&self) -> &str {
        &self.shared
    }

    /// Source column name of the patient identity for `entity`
    #[must_use]
    pub fn source_key(&self, entity: Entity) -> &str {
        match entity {
            Entity::Patients => &self.patients,
            Entity::Encounters => &self.encounters,
        }
    }

    /// Rename `entity`'s identity column to the shared name
    ///
    /// Already-normalized datasets pass through unchanged, so the cleaning
    /// and join stages can both apply it.
    pub fn normalize(&self, entity: Entity, dataset: Dataset) -> Result<Dataset> {
        let source = self.source_key(entity);
        let shared = self.shared_key();
        if source == shared {
            return self.require_shared(dataset);
        }

        match (dataset.has_column(source), dataset.has_column(shared)) {
            (true, false) => dataset.rename_column(source, shared),
            (false, true) => Ok(dataset),
            (true, true) => Err(PipelineError::KeyConflict {
                left: dataset.name().to_string(),
                right: dataset.name().to_string(),
                columns: vec![source.to_string(), shared.to_string()],
            }),
            (false, false) => Err(PipelineError::schema(
                dataset.name(),
                format!("neither key column '{source}' nor '{shared}' is present"),
            )),
        }
    }

    fn require_shared(&self, dataset: Dataset) -> Result<Dataset> {
        if dataset.has_column(self.shared_key()) {
            Ok(dataset)
        } else {
            Err(PipelineError::schema(
                dataset.name(),
                format!("key column '{}' is not present", self.shared_key()),
            ))
        }
    }

    /// Check the mapping names are usable
    pub fn validate(&self) -> Result<()> {
        if [&self.shared, &self.patients, &self.encounters]
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(PipelineError::Config(
                "key mapping column names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
