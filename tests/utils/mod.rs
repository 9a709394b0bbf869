#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use ehr_lake::config::{PipelineConfig, Workspace};
use ehr_lake::{Dataset, JoinPolicy, Pipeline, WritePolicy};
use tempfile::TempDir;

/// Namespace used by every test workspace
pub const TEST_NAMESPACE: &str = "ehrdemo_test";

pub const PATIENTS_HEADER: &str = "Id,BIRTHDATE,DEATHDATE,SSN,DRIVERS,PASSPORT,PREFIX,FIRST,LAST,SUFFIX,MAIDEN,MARITAL,RACE,ETHNICITY,GENDER,BIRTHPLACE,ADDRESS,CITY,STATE,ZIP";

pub const PATIENT_ROWS: [&str; 2] = [
    "P1,1980-04-12,,999-12-3456,S99912345,X12345678X,Mr.,John,Doe,,,M,white,nonhispanic,M,Boston Massachusetts US,1 Main St,Boston,Massachusetts,02139",
    "P2,1975-09-30,2020-01-02,999-65-4321,,,Mrs.,Jane,Roe,,Smith,M,black,nonhispanic,F,Worcester Massachusetts US,2 Elm St,Cambridge,Massachusetts,02118",
];

pub const ENCOUNTERS_HEADER: &str =
    "Id,START,STOP,PATIENT,ENCOUNTERCLASS,CODE,DESCRIPTION,COST,REASONCODE,REASONDESCRIPTION";

/// E1 and E3 are complete, E2 lacks a reason, E4 belongs to an unknown patient
pub const ENCOUNTER_ROWS: [&str; 4] = [
    "E1,2019-01-01T10:00:00Z,2019-01-01T10:30:00Z,P1,ambulatory,185345009,Encounter for symptom,129.16,6142004,Flu",
    "E2,2019-02-01T10:00:00Z,2019-02-01T10:30:00Z,P1,wellness,162673000,General examination of patient,129.16,,",
    "E3,2019-03-01T09:00:00Z,2019-03-01T09:45:00Z,P2,emergency,50849002,Emergency room admission,250.5,44465007,Sprain of ankle",
    "E4,2019-04-01T09:00:00Z,2019-04-01T09:15:00Z,P9,ambulatory,185345009,Encounter for symptom,99.0,10509002,Acute bronchitis",
];

/// Write a file into the test directory
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

/// Build delimited text from a header and rows
pub fn csv(header: Option<&str>, rows: &[&str]) -> String {
    header
        .into_iter()
        .chain(rows.iter().copied())
        .map(|line| format!("{line}\n"))
        .collect()
}

/// Write the standard patient and encounter extracts
pub fn sample_files(dir: &Path) -> (PathBuf, PathBuf) {
    (
        write_file(dir, "patients.csv", &csv(Some(PATIENTS_HEADER), &PATIENT_ROWS)),
        write_file(
            dir,
            "encounters.csv",
            &csv(Some(ENCOUNTERS_HEADER), &ENCOUNTER_ROWS),
        ),
    )
}

/// A provisioned workspace inside a temporary directory
pub fn test_workspace(dir: &TempDir) -> Workspace {
    let workspace = Workspace::new(dir.path().join("lake"), TEST_NAMESPACE);
    workspace.provision(false).expect("provision workspace");
    workspace
}

/// Pipeline configuration over a provisioned test workspace
pub fn test_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig::for_workspace(test_workspace(dir))
}

pub fn test_pipeline(dir: &TempDir, policy: JoinPolicy) -> Pipeline {
    Pipeline::new(test_config(dir).with_join_policy(policy)).expect("pipeline")
}

pub fn recreating_pipeline(dir: &TempDir) -> Pipeline {
    let config = PipelineConfig::for_workspace(Workspace::new(dir.path().join("lake"), TEST_NAMESPACE))
        .with_write_policy(WritePolicy::Recreate);
    Pipeline::new(config).expect("pipeline")
}

/// Values of a column across all batches, rendered as text
pub fn column_strings(dataset: &Dataset, column: &str) -> Vec<Option<String>> {
    let mut values = Vec::new();
    for batch in dataset.batches() {
        let idx = batch.schema().index_of(column).expect("column present");
        let array = batch.column(idx);
        for row in 0..array.len() {
            values.push(if array.is_null(row) {
                None
            } else {
                Some(array_value_to_string(array.as_ref(), row).expect("render value"))
            });
        }
    }
    values
}

/// Build a dataset of text columns
pub fn string_dataset(name: &str, columns: &[(&str, Vec<Option<&str>>)]) -> Dataset {
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(col, _)| Field::new(*col, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.clone())) as ArrayRef)
        .collect::<Vec<_>>();
    let batch = RecordBatch::try_new(schema, arrays).expect("batch");
    Dataset::from_batch(name, batch).expect("dataset")
}

/// Raw bytes of the data files of one snapshot version
pub fn data_file_bytes(workspace: &Workspace, table: &str, version: u64) -> Vec<u8> {
    let dir = workspace.table_path(table).join(format!("v{version}"));
    let mut files = fs::read_dir(&dir)
        .expect("version directory")
        .map(|e| e.expect("entry").path())
        .collect::<Vec<_>>();
    files.sort();
    files
        .iter()
        .flat_map(|f| fs::read(f).expect("read data file"))
        .collect()
}
