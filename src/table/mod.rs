//! Versioned table snapshots and the catalog of published tables.

pub mod catalog;
pub mod snapshot;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::entity::Entity;

pub use catalog::{Catalog, CatalogEntry, TableQuery};
pub use snapshot::{DataFile, SnapshotManifest, StagedSnapshot, TableReader, TableWriter, WritePolicy};

/// Name of the gold table joining encounters with patient demographics
pub const GOLD_TABLE: &str = "encounter_patients";

/// Refinement level of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Raw ingested data, column names verbatim from the source
    Bronze,
    /// Cleaned and de-identified data
    Silver,
    /// Joined, analytics-ready data
    Gold,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        })
    }
}

/// Bronze table name of an entity (`patients_raw`, `encounters_raw`)
#[must_use]
pub fn bronze_table(entity: Entity) -> String {
    format!("{}_raw", entity.name())
}

/// Silver table name of an entity (`patients`, `encounters`)
#[must_use]
pub fn silver_table(entity: Entity) -> String {
    entity.name().to_string()
}
