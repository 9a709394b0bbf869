//! Configuration for a pipeline run.

pub mod workspace;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::ingest::IngestOptions;
use crate::schema::{DateFormatConfig, KeyMapping};
use crate::table::snapshot::WritePolicy;
use crate::transform::join::JoinPolicy;
use crate::utils::io::parquet::{DEFAULT_BATCH_SIZE, get_batch_size};

pub use workspace::{Workspace, namespace_for_user};

/// Configuration for the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root path and namespace all tables are written under
    pub workspace: Workspace,
    /// What a writer does when its table already has a snapshot
    pub write_policy: WritePolicy,
    /// How encounters without a matching patient are treated
    pub join_policy: JoinPolicy,
    /// Source column names of the patient identity
    pub keys: KeyMapping,
    /// Delimited-file parsing options
    pub ingest: IngestOptions,
    /// Rows per batch when reading snapshots
    pub batch_size: usize,
    /// Formats used to parse dates and timestamps at ingest
    pub date_format_config: DateFormatConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace: Workspace::default(),
            write_policy: WritePolicy::default(),
            join_policy: JoinPolicy::default(),
            keys: KeyMapping::default(),
            ingest: IngestOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            date_format_config: DateFormatConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration for the given workspace
    #[must_use]
    pub fn for_workspace(workspace: Workspace) -> Self {
        Self {
            workspace,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file; absent fields take defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = crate::utils::io::read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (`EHR_LAKE_BATCH_SIZE`)
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(batch_size) = get_batch_size() {
            self.batch_size = batch_size;
        }
        self
    }

    #[must_use]
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    #[must_use]
    pub fn with_join_policy(mut self, policy: JoinPolicy) -> Self {
        self.join_policy = policy;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        self.workspace.validate()?;
        self.keys.validate()?;
        self.ingest.validate()?;
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}
