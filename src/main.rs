//! Command-line driver for the EHR data-lake pipeline.
//!
//! ```sh
//! ehr-lake --root /data/lake --user jane run data/patients.csv data/encounters.csv
//! ehr-lake --root /data/lake --user jane show encounter_patients --rows 10
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ehr_lake::config::{PipelineConfig, Workspace};
use ehr_lake::table::{Catalog, TableQuery};
use ehr_lake::utils::logging::{
    abandon_progress_bar, create_spinner, finish_progress_bar, print_catalog, print_sample_rows,
    print_schema_info, print_table_summary,
};
use ehr_lake::{JoinPolicy, Pipeline, WritePolicy};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "ehr-lake", version, about = "Bronze/silver/gold pipeline for EHR extracts")]
struct Cli {
    /// JSON configuration file; command-line flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the lake
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Namespace to work in
    #[arg(long, global = true, conflicts_with = "user")]
    namespace: Option<String>,

    /// Derive the namespace from a user name (ehrdemo_<user>)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Commit new versions over existing snapshots instead of failing
    #[arg(long, global = true)]
    recreate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run all three stages
    Run {
        patients: PathBuf,
        encounters: PathBuf,
        /// Drop and recreate the namespace first
        #[arg(long)]
        fresh: bool,
        /// Source files have no header row
        #[arg(long)]
        no_header: bool,
        /// inner, left_outer or strict
        #[arg(long)]
        join_policy: Option<JoinPolicy>,
    },
    /// Ingest the source files into the bronze tier
    Bronze {
        patients: PathBuf,
        encounters: PathBuf,
        #[arg(long)]
        no_header: bool,
    },
    /// Clean the bronze tier into the silver tier
    Silver,
    /// Join the silver tier into the gold table
    Gold {
        #[arg(long)]
        join_policy: Option<JoinPolicy>,
    },
    /// Print a table snapshot
    Show {
        table: String,
        /// Sample rows to print
        #[arg(long, default_value_t = 5)]
        rows: usize,
        /// Snapshot version (latest by default)
        #[arg(long)]
        version: Option<u64>,
    },
    /// List registered tables
    Tables,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| config.workspace.root.clone());
    if let Some(namespace) = &cli.namespace {
        config.workspace = Workspace::new(root, namespace.clone());
    } else if let Some(user) = &cli.user {
        config.workspace = Workspace::for_user(root, user);
    } else {
        config.workspace.root = root;
    }
    if cli.recreate {
        config.write_policy = WritePolicy::Recreate;
    }

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Run a stage under a spinner
fn with_spinner<T>(message: &str, stage: impl FnOnce() -> ehr_lake::Result<T>) -> Result<T> {
    let pb = create_spinner(message);
    match stage() {
        Ok(value) => {
            finish_progress_bar(&pb, &format!("{message}: done"));
            Ok(value)
        }
        Err(e) => {
            abandon_progress_bar(&pb, &format!("{message}: failed"));
            Err(e).context(message.to_string())
        }
    }
}

fn show(config: &PipelineConfig, table: &str, rows: usize, version: Option<u64>) -> Result<()> {
    let pipeline = Pipeline::new(config.clone())?;
    let reader = pipeline.reader();
    let manifest = reader.manifest(table, version)?;
    let dataset = reader.read_snapshot(table, Some(manifest.version), None)?;
    print_table_summary(&manifest);
    print_schema_info(&dataset.schema());
    print_sample_rows(&dataset, rows);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    info!(
        "Workspace {} (namespace '{}')",
        config.workspace.root.display(),
        config.workspace.namespace
    );

    match cli.command {
        Command::Run {
            patients,
            encounters,
            fresh,
            no_header,
            join_policy,
        } => {
            config.workspace.provision(fresh)?;
            config.ingest.has_header = !no_header;
            if let Some(policy) = join_policy {
                config.join_policy = policy;
            }
            let pipeline = Pipeline::new(config)?;
            let report = with_spinner("Running pipeline", || pipeline.run(&patients, &encounters))?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            let gold = pipeline
                .catalog()
                .select(ehr_lake::GOLD_TABLE, &TableQuery::all().limit(5))?;
            print_sample_rows(&gold, 5);
        }
        Command::Bronze {
            patients,
            encounters,
            no_header,
        } => {
            config.workspace.provision(false)?;
            config.ingest.has_header = !no_header;
            let pipeline = Pipeline::new(config)?;
            let tables = with_spinner("Ingesting bronze tier", || {
                pipeline.ingest_bronze(&patients, &encounters)
            })?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        Command::Silver => {
            let pipeline = Pipeline::new(config)?;
            let tables = with_spinner("Building silver tier", || pipeline.build_silver())?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        Command::Gold { join_policy } => {
            if let Some(policy) = join_policy {
                config.join_policy = policy;
            }
            let pipeline = Pipeline::new(config)?;
            let (table, summary) = with_spinner("Building gold table", || pipeline.build_gold())?;
            println!("{}", serde_json::to_string_pretty(&(table, summary))?);
        }
        Command::Show {
            table,
            rows,
            version,
        } => show(&config, &table, rows, version)?,
        Command::Tables => print_catalog(&Catalog::open(config.workspace).list()?),
    }

    Ok(())
}
