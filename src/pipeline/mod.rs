//! Sequencing of the bronze, silver and gold stages.
//!
//! Each stage reads its inputs only from committed snapshots of the previous
//! tier, so any stage can be replayed from persisted state. A failed stage
//! leaves every earlier tier untouched.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::util::validate_directory;
use crate::error::{PipelineError, Result};
use crate::ingest::read_delimited;
use crate::schema::entity::Entity;
use crate::table::snapshot::{SnapshotManifest, TableReader, TableWriter, WritePolicy};
use crate::table::{Catalog, GOLD_TABLE, Tier, bronze_table, silver_table};
use crate::transform::clean::clean_entity;
use crate::transform::join::{JoinPolicy, join_encounter_patients};
use crate::utils::logging::log_stage;

/// A table written by a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTable {
    pub table: String,
    pub tier: Tier,
    pub version: u64,
    pub rows: u64,
}

impl From<&SnapshotManifest> for StageTable {
    fn from(manifest: &SnapshotManifest) -> Self {
        Self {
            table: manifest.table.clone(),
            tier: manifest.tier,
            version: manifest.version,
            rows: manifest.row_count,
        }
    }
}

/// Match statistics of the gold join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSummary {
    pub policy: JoinPolicy,
    pub matched: usize,
    pub unmatched_encounters: usize,
    pub patients_without_encounters: usize,
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub namespace: String,
    pub tables: Vec<StageTable>,
    pub join: JoinSummary,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Entry of `table`, if the run wrote it
    #[must_use]
    pub fn table(&self, table: &str) -> Option<&StageTable> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// The three-stage pipeline over one workspace
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    writer: TableWriter,
    reader: TableReader,
    catalog: Catalog,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let workspace = config.workspace.clone();
        let reader = TableReader::new(workspace.clone()).with_batch_size(config.batch_size);
        Ok(Self {
            writer: TableWriter::new(workspace.clone()),
            catalog: Catalog::open(workspace).with_reader(reader.clone()),
            reader,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn reader(&self) -> &TableReader {
        &self.reader
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn check_namespace(&self) -> Result<()> {
        validate_directory(&self.config.workspace.path(), "pipeline namespace")
    }

    /// Fail before writing anything if a destination already has a snapshot
    /// and recreation was not requested
    fn check_writable(&self, tables: &[String]) -> Result<()> {
        if self.config.write_policy == WritePolicy::Recreate {
            return Ok(());
        }
        for table in tables {
            if let Some(version) = self.reader.latest_version(table)? {
                return Err(PipelineError::WriteConflict {
                    table: table.clone(),
                    version,
                });
            }
        }
        Ok(())
    }

    fn require(&self, stage: &str, tables: &[String]) -> Result<()> {
        for table in tables {
            if !self.reader.exists(table)? {
                return Err(PipelineError::MissingPredecessor {
                    stage: stage.to_string(),
                    table: table.clone(),
                });
            }
        }
        Ok(())
    }

    fn write(&self, table: &str, tier: Tier, dataset: &Dataset) -> Result<StageTable> {
        let manifest = self
            .writer
            .write(table, tier, dataset, self.config.write_policy)?;
        Ok(StageTable::from(&manifest))
    }

    /// Ingest both source files and persist them verbatim as bronze tables
    ///
    /// Both files are read and validated, and both data files written, before
    /// either table is committed. A failure up to that point leaves the bronze
    /// tier at its previous versions.
    pub fn ingest_bronze(&self, patients_csv: &Path, encounters_csv: &Path) -> Result<Vec<StageTable>> {
        log_stage(Tier::Bronze, "ingesting raw extracts");
        self.check_namespace()?;
        let tables = Entity::ALL.map(bronze_table);
        self.check_writable(&tables)?;

        let options = &self.config.ingest;
        let dates = &self.config.date_format_config;
        let (patients, encounters) = rayon::join(
            || read_delimited(patients_csv, &Entity::Patients.schema(), options, dates),
            || read_delimited(encounters_csv, &Entity::Encounters.schema(), options, dates),
        );
        let datasets = [patients?, encounters?];

        let staged = tables
            .iter()
            .zip(&datasets)
            .map(|(table, dataset)| {
                self.writer
                    .stage(table, Tier::Bronze, dataset, self.config.write_policy)
            })
            .collect::<Result<Vec<_>>>()?;
        staged
            .into_iter()
            .map(|snapshot| Ok(StageTable::from(&snapshot.commit()?)))
            .collect()
    }

    /// Clean the bronze tables into the silver tier
    ///
    /// Entities are cleaned in parallel. An entity that cleans successfully
    /// is written even when the other fails; the failure is returned after.
    pub fn build_silver(&self) -> Result<Vec<StageTable>> {
        log_stage(Tier::Silver, "cleaning and de-identifying");
        self.check_namespace()?;
        self.require("silver", &Entity::ALL.map(bronze_table))?;
        self.check_writable(&Entity::ALL.map(silver_table))?;

        let keys = &self.config.keys;
        let clean = |entity: Entity| -> Result<Dataset> {
            let bronze = self.reader.read(&bronze_table(entity))?;
            clean_entity(entity, &bronze, keys)
        };
        let (patients, encounters) = rayon::join(
            || clean(Entity::Patients),
            || clean(Entity::Encounters),
        );

        let mut written = Vec::with_capacity(2);
        let mut first_error = None;
        for (entity, cleaned) in [(Entity::Patients, patients), (Entity::Encounters, encounters)] {
            match cleaned.and_then(|ds| self.write(&silver_table(entity), Tier::Silver, &ds)) {
                Ok(table) => written.push(table),
                Err(e) => {
                    log::error!("Silver stage failed for {entity}: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Join the silver tables into the gold table and register it
    pub fn build_gold(&self) -> Result<(StageTable, JoinSummary)> {
        log_stage(Tier::Gold, "joining encounters with patients");
        self.check_namespace()?;
        self.require("gold", &Entity::ALL.map(silver_table))?;
        self.check_writable(&[GOLD_TABLE.to_string()])?;

        let (encounters, patients) = rayon::join(
            || self.reader.read(&silver_table(Entity::Encounters)),
            || self.reader.read(&silver_table(Entity::Patients)),
        );
        let policy = self.config.join_policy;
        let outcome = join_encounter_patients(encounters?, patients?, &self.config.keys, policy)?;

        let table = self.write(GOLD_TABLE, Tier::Gold, &outcome.dataset)?;
        self.catalog
            .register_version(GOLD_TABLE, GOLD_TABLE, table.version)?;

        let summary = JoinSummary {
            policy,
            matched: outcome.matched,
            unmatched_encounters: outcome.unmatched_encounters,
            patients_without_encounters: outcome.patients_without_encounters,
        };
        Ok((table, summary))
    }

    /// Run bronze, silver and gold in order
    pub fn run(&self, patients_csv: &Path, encounters_csv: &Path) -> Result<RunReport> {
        let start = Instant::now();
        let mut tables = self.ingest_bronze(patients_csv, encounters_csv)?;
        tables.extend(self.build_silver()?);
        let (gold, join) = self.build_gold()?;
        tables.push(gold);

        let report = RunReport {
            namespace: self.config.workspace.namespace.clone(),
            tables,
            join,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        log_stage(
            "done",
            &format!(
                "{} tables written in namespace '{}' in {} ms",
                report.tables.len(),
                report.namespace,
                report.elapsed_ms
            ),
        );
        Ok(report)
    }
}
