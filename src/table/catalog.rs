//! Registration of published tables under logical names.
//!
//! The catalog is a JSON file in the namespace directory mapping a logical
//! name to a table location and the snapshot version it was registered at.
//! Consumers look tables up by name and never build physical paths.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::workspace::Workspace;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::filter::core::SharedFilter;
use crate::table::Tier;
use crate::table::snapshot::TableReader;
use crate::utils::io::fs::{read_json, write_json_atomic};

/// A registered table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Logical name consumers use
    pub name: String,
    /// Table directory, relative to the namespace
    pub location: String,
    pub tier: Tier,
    /// Snapshot version the name resolves to
    pub version: u64,
    pub columns: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    entries: BTreeMap<String, CatalogEntry>,
}

/// Declarative read of a registered table
#[derive(Debug, Clone, Default)]
pub struct TableQuery {
    columns: Option<Vec<String>>,
    filter: Option<SharedFilter>,
    limit: Option<usize>,
}

impl TableQuery {
    /// Query returning every row and column
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Return only these columns, in this order
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Keep only rows passing `filter`
    #[must_use]
    pub fn filter(mut self, filter: SharedFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Columns to read: the requested ones plus any the filter needs
    fn read_columns(&self) -> Option<Vec<String>> {
        let columns = self.columns.as_ref()?;
        let extra = self
            .filter
            .iter()
            .flat_map(|f| f.required_columns())
            .filter(|c| !columns.contains(c))
            .sorted()
            .collect_vec();
        Some(columns.iter().cloned().chain(extra).collect())
    }
}

/// The catalog of one workspace namespace
#[derive(Debug, Clone)]
pub struct Catalog {
    workspace: Workspace,
    reader: TableReader,
}

impl Catalog {
    #[must_use]
    pub fn open(workspace: Workspace) -> Self {
        let reader = TableReader::new(workspace.clone());
        Self { workspace, reader }
    }

    #[must_use]
    pub fn with_reader(mut self, reader: TableReader) -> Self {
        self.reader = reader;
        self
    }

    fn load(&self) -> Result<CatalogFile> {
        let path = self.workspace.catalog_path();
        if path.is_file() {
            read_json(&path)
        } else {
            Ok(CatalogFile::default())
        }
    }

    /// Register the latest committed snapshot of `table` under `name`
    ///
    /// Registration is metadata only. A table without a committed snapshot
    /// cannot be registered.
    pub fn register(&self, name: &str, table: &str) -> Result<CatalogEntry> {
        self.pin(name, table, None)
    }

    /// Register committed `version` of `table` under `name`
    pub fn register_version(&self, name: &str, table: &str, version: u64) -> Result<CatalogEntry> {
        self.pin(name, table, Some(version))
    }

    fn pin(&self, name: &str, table: &str, version: Option<u64>) -> Result<CatalogEntry> {
        let manifest = match self.reader.manifest(table, version) {
            Ok(manifest) => manifest,
            Err(PipelineError::TableNotFound(what)) => {
                return Err(PipelineError::Catalog(format!(
                    "cannot register '{name}': no committed snapshot of {what}"
                )));
            }
            Err(e) => return Err(e),
        };

        let entry = CatalogEntry {
            name: name.to_string(),
            location: table.to_string(),
            tier: manifest.tier,
            version: manifest.version,
            columns: manifest.columns.into_iter().map(|c| c.name).collect(),
            registered_at: Utc::now(),
        };

        let mut file = self.load()?;
        file.entries.insert(name.to_string(), entry.clone());
        write_json_atomic(&self.workspace.catalog_path(), &file)?;
        log::info!(
            "Registered '{name}' -> {table} v{} in namespace '{}'",
            entry.version,
            self.workspace.namespace
        );
        Ok(entry)
    }

    /// Look up a registered name
    pub fn resolve(&self, name: &str) -> Result<CatalogEntry> {
        self.load()?
            .entries
            .remove(name)
            .ok_or_else(|| PipelineError::TableNotFound(name.to_string()))
    }

    /// All registrations, ordered by name
    pub fn list(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.load()?.entries.into_values().collect())
    }

    /// Read a registered table by name
    ///
    /// Reads the version pinned at registration, applies the query's filter,
    /// then its column selection and row limit.
    pub fn select(&self, name: &str, query: &TableQuery) -> Result<Dataset> {
        let entry = self.resolve(name)?;
        let read_columns = query.read_columns();
        let dataset =
            self.reader
                .read_snapshot(&entry.location, Some(entry.version), read_columns.as_deref())?;

        let dataset = match &query.filter {
            Some(filter) => {
                let schema = dataset.schema();
                let batches = dataset
                    .batches()
                    .iter()
                    .map(|b| filter.filter(b))
                    .collect::<Result<Vec<_>>>()?;
                Dataset::try_new(name, schema, batches)?
            }
            None => dataset.with_name(name),
        };

        let dataset = match &query.columns {
            Some(columns) => {
                dataset.project(&columns.iter().map(String::as_str).collect_vec())?
            }
            None => dataset,
        };

        Ok(match query.limit {
            Some(limit) => dataset.limit(limit),
            None => dataset,
        })
    }
}
