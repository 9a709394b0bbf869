//! Immutable, versioned table snapshots.
//!
//! A table is a directory under the workspace namespace:
//!
//! ```text
//! <table>/
//!   _log/00000000000000000001.json   commit manifest of version 1
//!   v1/part-00000.parquet            data file of version 1
//! ```
//!
//! Data files are staged in a hidden directory, flushed and renamed into
//! their version directory before the commit manifest is published. The
//! manifest is published with a no-clobber link, so a version is committed
//! exactly once and a table without a manifest does not exist.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arrow::datatypes::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::workspace::Workspace;
use crate::dataset::Dataset;
use crate::error::util::IoResultExt;
use crate::error::{PipelineError, Result};
use crate::table::Tier;
use crate::utils::io::fs::{publish_json_no_clobber, read_json, sync_dir};
use crate::utils::io::parquet::{DEFAULT_BATCH_SIZE, read_parquet_files, write_parquet};
use crate::utils::logging::log_operation_complete;

/// Directory holding commit manifests
pub const LOG_DIR: &str = "_log";

const DATA_FILE_NAME: &str = "part-00000.parquet";

/// What a writer does when the table already has a committed snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Refuse to write
    #[default]
    FailIfExists,
    /// Commit a new version that supersedes the latest one
    Recreate,
}

/// A data file belonging to a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    /// Path relative to the table directory
    pub path: String,
    pub rows: u64,
    pub size_bytes: u64,
}

/// Column recorded in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

impl ColumnInfo {
    fn from_schema(schema: &Schema) -> Vec<Self> {
        schema
            .fields()
            .iter()
            .map(|f| Self {
                name: f.name().clone(),
                data_type: f.data_type().to_string(),
                nullable: f.is_nullable(),
            })
            .collect()
    }
}

/// Commit record of one table version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub table: String,
    pub tier: Tier,
    pub version: u64,
    pub files: Vec<DataFile>,
    pub row_count: u64,
    pub columns: Vec<ColumnInfo>,
    pub committed_at: DateTime<Utc>,
}

impl SnapshotManifest {
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

fn log_dir(table_dir: &Path) -> PathBuf {
    table_dir.join(LOG_DIR)
}

fn manifest_path(table_dir: &Path, version: u64) -> PathBuf {
    log_dir(table_dir).join(format!("{version:020}.json"))
}

/// Committed versions of the table at `table_dir`, ascending
fn committed_versions(table_dir: &Path) -> Result<Vec<u64>> {
    let dir = log_dir(table_dir);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in fs::read_dir(&dir).at_path(&dir)? {
        let entry = entry.at_path(&dir)?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        // Temporary siblings start with '.' and never parse
        if let Some(version) = name
            .strip_suffix(".json")
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// Writes snapshots of tables in one workspace
#[derive(Debug, Clone)]
pub struct TableWriter {
    workspace: Workspace,
}

impl TableWriter {
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// Persist `dataset` as a new snapshot of `table`
    ///
    /// Either the whole snapshot becomes visible or nothing does. Under
    /// [`WritePolicy::FailIfExists`] an existing snapshot is a
    /// [`PipelineError::WriteConflict`]; under [`WritePolicy::Recreate`] the
    /// new snapshot is committed as the next version.
    pub fn write(
        &self,
        table: &str,
        tier: Tier,
        dataset: &Dataset,
        policy: WritePolicy,
    ) -> Result<SnapshotManifest> {
        self.stage(table, tier, dataset, policy)?.commit()
    }

    /// Write the data files of the next snapshot of `table` without
    /// publishing it
    ///
    /// The snapshot stays invisible until [`StagedSnapshot::commit`]. Several
    /// tables can be staged first and committed together, so a failing data
    /// write leaves none of them at a new version.
    pub fn stage(
        &self,
        table: &str,
        tier: Tier,
        dataset: &Dataset,
        policy: WritePolicy,
    ) -> Result<StagedSnapshot> {
        let start = Instant::now();
        let table_dir = self.workspace.table_path(table);
        let latest = committed_versions(&table_dir)?.last().copied();

        let version = match (latest, policy) {
            (Some(version), WritePolicy::FailIfExists) => {
                return Err(PipelineError::WriteConflict {
                    table: table.to_string(),
                    version,
                });
            }
            (Some(version), WritePolicy::Recreate) => version + 1,
            (None, _) => 1,
        };

        fs::create_dir_all(log_dir(&table_dir)).at_path(&table_dir)?;

        // Leftovers of an interrupted write of this version are never committed
        let staging = table_dir.join(format!(".staging-{version}"));
        let version_dir = table_dir.join(format!("v{version}"));
        for stale in [&staging, &version_dir] {
            if stale.exists() {
                log::warn!("Removing uncommitted data at {}", stale.display());
                fs::remove_dir_all(stale).at_path(stale)?;
            }
        }
        fs::create_dir_all(&staging).at_path(&staging)?;

        let stats = write_parquet(
            &staging.join(DATA_FILE_NAME),
            dataset.schema(),
            dataset.batches(),
        )?;
        sync_dir(&staging)?;
        fs::rename(&staging, &version_dir).at_path(&version_dir)?;
        sync_dir(&table_dir)?;

        let manifest = SnapshotManifest {
            table: table.to_string(),
            tier,
            version,
            files: vec![DataFile {
                path: format!("v{version}/{DATA_FILE_NAME}"),
                rows: stats.rows,
                size_bytes: stats.size_bytes,
            }],
            row_count: stats.rows,
            columns: ColumnInfo::from_schema(&dataset.schema()),
            committed_at: Utc::now(),
        };
        log::debug!(
            "Staged {tier} v{version} of {table} in {:?}",
            start.elapsed()
        );
        Ok(StagedSnapshot { table_dir, manifest })
    }
}

/// Data files of a snapshot that is written but not yet committed
///
/// Dropping it without committing leaves an orphaned version directory that
/// the next write of the table removes.
#[derive(Debug)]
#[must_use = "a staged snapshot is invisible until committed"]
pub struct StagedSnapshot {
    table_dir: PathBuf,
    manifest: SnapshotManifest,
}

impl StagedSnapshot {
    #[must_use]
    pub fn version(&self) -> u64 {
        self.manifest.version
    }

    /// Publish the commit manifest, making the snapshot visible
    pub fn commit(mut self) -> Result<SnapshotManifest> {
        let version = self.manifest.version;
        self.manifest.committed_at = Utc::now();
        if !publish_json_no_clobber(&manifest_path(&self.table_dir, version), &self.manifest)? {
            return Err(PipelineError::WriteConflict {
                table: self.manifest.table,
                version,
            });
        }

        log_operation_complete(
            &format!("committed {} snapshot v{version} with", self.manifest.tier),
            &self.table_dir,
            usize::try_from(self.manifest.row_count).unwrap_or(usize::MAX),
            None,
        );
        Ok(self.manifest)
    }
}

/// Reads committed snapshots of tables in one workspace
#[derive(Debug, Clone)]
pub struct TableReader {
    workspace: Workspace,
    batch_size: usize,
}

impl TableReader {
    #[must_use]
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Latest committed version of `table`, if any
    pub fn latest_version(&self, table: &str) -> Result<Option<u64>> {
        Ok(committed_versions(&self.workspace.table_path(table))?
            .last()
            .copied())
    }

    /// Whether `table` has a committed snapshot
    pub fn exists(&self, table: &str) -> Result<bool> {
        Ok(self.latest_version(table)?.is_some())
    }

    /// Manifest of `version`, or of the latest version when `None`
    pub fn manifest(&self, table: &str, version: Option<u64>) -> Result<SnapshotManifest> {
        let version = match version {
            Some(v) => v,
            None => self
                .latest_version(table)?
                .ok_or_else(|| PipelineError::TableNotFound(table.to_string()))?,
        };
        let path = manifest_path(&self.workspace.table_path(table), version);
        if !path.is_file() {
            return Err(PipelineError::TableNotFound(format!("{table} version {version}")));
        }
        read_json(&path)
    }

    /// Manifests of every committed version, oldest first
    pub fn history(&self, table: &str) -> Result<Vec<SnapshotManifest>> {
        committed_versions(&self.workspace.table_path(table))?
            .into_iter()
            .map(|v| self.manifest(table, Some(v)))
            .collect()
    }

    /// Read the latest snapshot of `table`
    pub fn read(&self, table: &str) -> Result<Dataset> {
        self.read_snapshot(table, None, None)
    }

    /// Read a specific version of `table`
    pub fn read_version(&self, table: &str, version: u64) -> Result<Dataset> {
        self.read_snapshot(table, Some(version), None)
    }

    /// Read only `columns` of the latest snapshot of `table`
    pub fn read_projected(&self, table: &str, columns: &[String]) -> Result<Dataset> {
        self.read_snapshot(table, None, Some(columns))
    }

    /// Read `columns` (all when `None`, in the requested order) of `version`
    /// (latest when `None`)
    pub fn read_snapshot(
        &self,
        table: &str,
        version: Option<u64>,
        columns: Option<&[String]>,
    ) -> Result<Dataset> {
        let start = Instant::now();
        let manifest = self.manifest(table, version)?;
        let table_dir = self.workspace.table_path(table);
        let paths = manifest
            .files
            .iter()
            .map(|f| table_dir.join(&f.path))
            .collect::<Vec<_>>();

        let (schema, batches) = read_parquet_files(
            &paths,
            columns,
            self.batch_size,
            Arc::new(Schema::empty()),
        )?;
        let dataset = Dataset::try_new(table, schema, batches)?;
        // Projection masks yield file order
        let dataset = match columns {
            Some(columns) => dataset.project(&columns.iter().map(String::as_str).collect::<Vec<_>>())?,
            None => dataset,
        };

        log_operation_complete(
            &format!("read {} v{}:", manifest.tier, manifest.version),
            &table_dir,
            dataset.num_rows(),
            Some(start.elapsed()),
        );
        Ok(dataset)
    }
}
