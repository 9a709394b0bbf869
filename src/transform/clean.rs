//! Cleaning and de-identification of bronze data into the silver tier.

use std::sync::Arc;

use rayon::prelude::*;

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::filter::core::{AndFilter, BatchFilter, NotNullFilter, SharedFilter};
use crate::schema::entity::{Entity, EntitySchema};
use crate::schema::keys::KeyMapping;
use crate::table::silver_table;

/// Remove every direct-identifier column and normalize the patient key
///
/// The row count is unchanged. Every enumerated identifier must be present;
/// an absent one means the upstream extract changed shape.
pub fn deidentify_patients(bronze: &Dataset, keys: &KeyMapping) -> Result<Dataset> {
    let schema = EntitySchema::patients();
    let identifiers = schema.direct_identifiers();
    let missing = identifiers
        .iter()
        .filter(|c| !bronze.has_column(c))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PipelineError::schema(
            bronze.name(),
            format!("direct identifier column(s) {missing:?} not found"),
        ));
    }

    let cleaned = bronze
        .drop_columns(&identifiers)?
        .with_name(silver_table(Entity::Patients));
    log::info!(
        "Removed {} direct identifier columns from {} patients",
        identifiers.len(),
        cleaned.num_rows()
    );
    keys.normalize(Entity::Patients, cleaned)
}

/// Drop encounters lacking a value in any required column (the reason
/// description) and normalize the patient key
///
/// No value is altered; surviving rows keep their order.
pub fn drop_incomplete_encounters(bronze: &Dataset, keys: &KeyMapping) -> Result<Dataset> {
    let schema = EntitySchema::encounters();
    let required = schema.required_columns();
    if let Some(missing) = required.iter().find(|c| !bronze.has_column(c)) {
        return Err(PipelineError::schema(
            bronze.name(),
            format!("column '{missing}' not found"),
        ));
    }

    let filter = AndFilter::new(
        required
            .iter()
            .map(|c| Arc::new(NotNullFilter::new(*c)) as SharedFilter)
            .collect(),
    );
    let batches = bronze
        .batches()
        .par_iter()
        .map(|batch| filter.filter(batch))
        .collect::<Result<Vec<_>>>()?;

    let cleaned = Dataset::try_new(silver_table(Entity::Encounters), bronze.schema(), batches)?;
    log::info!(
        "Dropped {} of {} encounters lacking {}",
        bronze.num_rows() - cleaned.num_rows(),
        bronze.num_rows(),
        required.join(", ")
    );
    keys.normalize(Entity::Encounters, cleaned)
}

/// Produce the silver dataset of `entity` from its bronze dataset
pub fn clean_entity(entity: Entity, bronze: &Dataset, keys: &KeyMapping) -> Result<Dataset> {
    match entity {
        Entity::Patients => deidentify_patients(bronze, keys),
        Entity::Encounters => drop_incomplete_encounters(bronze, keys),
    }
}
