//! A bronze/silver/gold data-lake pipeline for EHR extracts: raw patient and
//! encounter files are ingested verbatim, de-identified and cleaned, then
//! joined into one analytics-ready table. Every tier is persisted as an
//! immutable, versioned Parquet snapshot.

pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod schema;
pub mod table;
pub mod transform;
pub mod utils;

// Core types
pub use config::{PipelineConfig, Workspace};
pub use dataset::Dataset;
pub use error::{PipelineError, Result};
pub use pipeline::{JoinSummary, Pipeline, RunReport, StageTable};

// Schemas and keys
pub use schema::{Entity, EntitySchema, KeyMapping, PATIENT_ID};

// Tables
pub use table::{
    Catalog, CatalogEntry, GOLD_TABLE, SnapshotManifest, TableQuery, TableReader, TableWriter,
    Tier, WritePolicy, bronze_table, silver_table,
};

// Stage operations
pub use ingest::{IngestOptions, read_delimited};
pub use transform::{
    JoinOutcome, JoinPolicy, deidentify_patients, drop_incomplete_encounters,
    join_encounter_patients,
};

// Arrow types
pub use arrow::record_batch::RecordBatch;
