//! Joining silver encounters with silver patient demographics.
//!
//! A hash join on the shared patient key: the patient side is indexed in an
//! `FxHashMap`, encounter batches probe it in parallel and output rows keep
//! encounter order.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::filter::key::key_column_as_strings;
use crate::schema::entity::Entity;
use crate::schema::keys::KeyMapping;
use crate::table::GOLD_TABLE;

/// How encounters whose patient is missing from the patient table are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Drop them
    #[default]
    Inner,
    /// Keep them with null patient columns
    LeftOuter,
    /// Fail the join
    Strict,
}

impl JoinPolicy {
    const NAMES: [(&'static str, Self); 3] = [
        ("inner", Self::Inner),
        ("left_outer", Self::LeftOuter),
        ("strict", Self::Strict),
    ];
}

impl fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::NAMES
            .iter()
            .find(|(_, policy)| policy == self)
            .map_or("inner", |(name, _)| *name);
        f.write_str(name)
    }
}

impl FromStr for JoinPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, policy)| *policy)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "unknown join policy '{s}', expected one of {}",
                    Self::NAMES.iter().map(|(name, _)| name).join(", ")
                ))
            })
    }
}

/// Result of a join with its match statistics
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub dataset: Dataset,
    /// Encounters that found their patient
    pub matched: usize,
    /// Encounters whose patient is not in the patient table
    pub unmatched_encounters: usize,
    /// Patients no encounter refers to
    pub patients_without_encounters: usize,
}

/// Patient rows indexed by key value
struct PatientIndex {
    batch: RecordBatch,
    rows: FxHashMap<String, u32>,
}

impl PatientIndex {
    fn build(patients: &Dataset, key: &str) -> Result<Self> {
        let batch = patients.concat()?;
        let keys = key_column_as_strings(&batch, key)?;
        let keys = keys.as_string_opt::<i32>().ok_or_else(|| {
            PipelineError::schema(patients.name(), format!("key column '{key}' is not text"))
        })?;

        let mut rows = FxHashMap::default();
        rows.reserve(keys.len());
        for (row, value) in keys.iter().enumerate() {
            // A patient without an identity cannot be joined to anything
            let Some(value) = value else { continue };
            let row = u32::try_from(row).map_err(|_| {
                PipelineError::schema(patients.name(), "too many patient rows to index")
            })?;
            if rows.insert(value.to_string(), row).is_some() {
                return Err(PipelineError::DuplicateKey {
                    table: patients.name().to_string(),
                    column: key.to_string(),
                    key: value.to_string(),
                });
            }
        }
        Ok(Self { batch, rows })
    }
}

/// Rows of one encounter batch after probing the patient index
struct ProbedBatch {
    batch: RecordBatch,
    matched: usize,
    unmatched: usize,
    first_unmatched: Option<String>,
    patient_rows: FxHashSet<u32>,
}

/// Join silver encounters with silver patients on the shared patient key
///
/// Both inputs are normalized through `keys` first. Output columns are the
/// key, then the encounter columns, then the patient columns, each in their
/// input order.
pub fn join_encounter_patients(
    encounters: Dataset,
    patients: Dataset,
    keys: &KeyMapping,
    policy: JoinPolicy,
) -> Result<JoinOutcome> {
    let encounters = keys.normalize(Entity::Encounters, encounters)?;
    let patients = keys.normalize(Entity::Patients, patients)?;
    let key = keys.shared_key();

    let encounter_columns = encounters
        .column_names()
        .into_iter()
        .filter(|c| *c != key)
        .collect_vec();
    let patient_columns = patients
        .column_names()
        .into_iter()
        .filter(|c| *c != key)
        .collect_vec();

    let conflicts = encounter_columns
        .iter()
        .filter(|c| patient_columns.contains(c))
        .map(|c| (*c).to_string())
        .collect_vec();
    if !conflicts.is_empty() {
        return Err(PipelineError::KeyConflict {
            left: encounters.name().to_string(),
            right: patients.name().to_string(),
            columns: conflicts,
        });
    }

    let index = PatientIndex::build(&patients, key)?;
    let encounter_schema = encounters.schema();
    let patient_schema = patients.schema();
    let encounter_indices = std::iter::once(key)
        .chain(encounter_columns.iter().copied())
        .map(|c| encounter_schema.index_of(c))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let patient_indices = patient_columns
        .iter()
        .map(|c| patient_schema.index_of(c))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let output_schema = joined_schema(
        &encounter_schema,
        &encounter_indices,
        &patient_schema,
        &patient_indices,
        policy,
    );

    let probe = |batch: &RecordBatch| -> Result<ProbedBatch> {
        let probe_keys = key_column_as_strings(batch, key)?;
        let probe_keys = probe_keys.as_string_opt::<i32>().ok_or_else(|| {
            PipelineError::schema(encounters.name(), format!("key column '{key}' is not text"))
        })?;

        let mut left = Vec::with_capacity(batch.num_rows());
        let mut right = Vec::with_capacity(batch.num_rows());
        let mut unmatched = 0;
        let mut first_unmatched = None;
        let mut patient_rows = FxHashSet::default();

        for (row, value) in probe_keys.iter().enumerate() {
            let found = value.and_then(|v| index.rows.get(v).copied());
            match found {
                Some(patient_row) => {
                    patient_rows.insert(patient_row);
                }
                None => {
                    unmatched += 1;
                    if first_unmatched.is_none() {
                        first_unmatched = Some(value.unwrap_or("<null>").to_string());
                    }
                    if policy != JoinPolicy::LeftOuter {
                        continue;
                    }
                }
            }
            left.push(u32::try_from(row).map_err(|_| {
                PipelineError::schema(encounters.name(), "encounter batch too large to join")
            })?);
            right.push(found);
        }

        let left = UInt32Array::from(left);
        let right = UInt32Array::from(right);
        let mut columns: Vec<ArrayRef> =
            Vec::with_capacity(encounter_indices.len() + patient_indices.len());
        for &i in &encounter_indices {
            columns.push(take(batch.column(i).as_ref(), &left, None)?);
        }
        for &i in &patient_indices {
            columns.push(take(index.batch.column(i).as_ref(), &right, None)?);
        }

        Ok(ProbedBatch {
            batch: RecordBatch::try_new(Arc::clone(&output_schema), columns)?,
            matched: right.len() - right.null_count(),
            unmatched,
            first_unmatched,
            patient_rows,
        })
    };

    let probed = encounters
        .batches()
        .par_iter()
        .map(probe)
        .collect::<Result<Vec<_>>>()?;

    let matched = probed.iter().map(|p| p.matched).sum::<usize>();
    let unmatched = probed.iter().map(|p| p.unmatched).sum::<usize>();
    let referenced = probed
        .iter()
        .flat_map(|p| p.patient_rows.iter().copied())
        .collect::<FxHashSet<_>>();
    let patients_without_encounters = index.rows.len() - referenced.len();

    if unmatched > 0 {
        let example = probed
            .iter()
            .find_map(|p| p.first_unmatched.clone())
            .unwrap_or_default();
        if policy == JoinPolicy::Strict {
            return Err(PipelineError::UnmatchedKeys {
                count: unmatched,
                example,
            });
        }
        log::warn!(
            "{unmatched} encounter(s) reference patients missing from '{}' (first: '{example}'); {}",
            patients.name(),
            if policy == JoinPolicy::LeftOuter {
                "kept with null patient columns"
            } else {
                "excluded from the join"
            }
        );
    }

    let dataset = Dataset::try_new(
        GOLD_TABLE,
        output_schema,
        probed.into_iter().map(|p| p.batch).collect(),
    )?;
    log::info!(
        "Joined {matched} encounters with patients ({policy} join, {} rows, {patients_without_encounters} patients without encounters)",
        dataset.num_rows()
    );

    Ok(JoinOutcome {
        dataset,
        matched,
        unmatched_encounters: unmatched,
        patients_without_encounters,
    })
}

/// Schema of the joined rows; patient columns become nullable when
/// unmatched encounters are kept
fn joined_schema(
    encounters: &Schema,
    encounter_indices: &[usize],
    patients: &Schema,
    patient_indices: &[usize],
    policy: JoinPolicy,
) -> SchemaRef {
    let encounter_fields = encounter_indices
        .iter()
        .map(|&i| Arc::clone(&encounters.fields()[i]));
    let patient_fields = patient_indices.iter().map(|&i| {
        let field = &patients.fields()[i];
        if policy == JoinPolicy::LeftOuter && !field.is_nullable() {
            Arc::new(Field::new(field.name(), field.data_type().clone(), true))
        } else {
            Arc::clone(field)
        }
    });
    Arc::new(Schema::new(
        encounter_fields.chain(patient_fields).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names_round_trip() {
        for policy in [JoinPolicy::Inner, JoinPolicy::LeftOuter, JoinPolicy::Strict] {
            assert_eq!(policy.to_string().parse::<JoinPolicy>().expect("parse"), policy);
        }
        assert_eq!("left-outer".parse::<JoinPolicy>().expect("parse"), JoinPolicy::LeftOuter);
        assert!("outer".parse::<JoinPolicy>().is_err());
    }
}
