//! Tier-to-tier transformations.

pub mod clean;
pub mod join;

pub use clean::{clean_entity, deidentify_patients, drop_incomplete_encounters};
pub use join::{JoinOutcome, JoinPolicy, join_encounter_patients};
