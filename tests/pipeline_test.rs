mod utils;

use std::fs;

use ehr_lake::schema::EntitySchema;
use ehr_lake::table::{GOLD_TABLE, TableQuery, Tier};
use ehr_lake::{JoinPolicy, Pipeline, PipelineConfig, PipelineError, Workspace};
use utils::{
    ENCOUNTER_ROWS, ENCOUNTERS_HEADER, TEST_NAMESPACE, column_strings, csv, data_file_bytes,
    recreating_pipeline, sample_files, test_pipeline, write_file,
};

#[test]
fn test_full_run_writes_every_tier() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    let pipeline = test_pipeline(&dir, JoinPolicy::Inner);

    let report = pipeline.run(&patients, &encounters).expect("run");

    assert_eq!(report.namespace, TEST_NAMESPACE);
    let rows = |table: &str| report.table(table).expect("table in report").rows;
    assert_eq!(rows("patients_raw"), 2);
    assert_eq!(rows("encounters_raw"), 4);
    assert_eq!(rows("patients"), 2);
    assert_eq!(rows("encounters"), 3);
    assert_eq!(rows(GOLD_TABLE), 2);
    assert!(report.tables.iter().all(|t| t.version == 1));
    assert_eq!(report.table(GOLD_TABLE).expect("gold").tier, Tier::Gold);

    assert_eq!(report.join.matched, 2);
    assert_eq!(report.join.unmatched_encounters, 1);
    assert_eq!(report.join.policy, JoinPolicy::Inner);

    let json = serde_json::to_string(&report).expect("serialize");
    assert!(json.contains("encounter_patients"));
}

#[test]
fn test_gold_is_readable_by_name_and_deidentified() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    let pipeline = test_pipeline(&dir, JoinPolicy::Inner);
    pipeline.run(&patients, &encounters).expect("run");

    let gold = pipeline
        .catalog()
        .select(GOLD_TABLE, &TableQuery::all())
        .expect("select gold");
    assert_eq!(gold.num_rows(), 2);
    for identifier in EntitySchema::patients().direct_identifiers() {
        assert!(!gold.has_column(identifier), "{identifier} leaked into gold");
    }
    assert_eq!(
        column_strings(&gold, "REASONDESCRIPTION"),
        vec![Some("Flu".to_string()), Some("Sprain of ankle".to_string())]
    );

    let silver = pipeline.reader().read("patients").expect("silver patients");
    for identifier in EntitySchema::patients().direct_identifiers() {
        assert!(!silver.has_column(identifier), "{identifier} leaked into silver");
    }
}

#[test]
fn test_stages_require_their_predecessor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = test_pipeline(&dir, JoinPolicy::Inner);

    let err = pipeline.build_silver().expect_err("no bronze");
    assert!(
        matches!(&err, PipelineError::MissingPredecessor { stage, table } if stage == "silver" && table == "patients_raw"),
        "{err}"
    );

    let err = pipeline.build_gold().expect_err("no silver");
    assert!(matches!(err, PipelineError::MissingPredecessor { .. }), "{err}");
}

#[test]
fn test_stages_can_run_separately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    let pipeline = test_pipeline(&dir, JoinPolicy::LeftOuter);

    let bronze = pipeline.ingest_bronze(&patients, &encounters).expect("bronze");
    assert_eq!(bronze.len(), 2);
    let silver = pipeline.build_silver().expect("silver");
    assert_eq!(silver.iter().map(|t| t.rows).collect::<Vec<_>>(), vec![2, 3]);
    let (gold, summary) = pipeline.build_gold().expect("gold");
    assert_eq!(gold.rows, 3);
    assert_eq!(summary.unmatched_encounters, 1);
}

#[test]
fn test_rerun_without_recreate_conflicts_and_keeps_tiers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    let pipeline = test_pipeline(&dir, JoinPolicy::Inner);
    pipeline.run(&patients, &encounters).expect("first run");

    let err = pipeline.run(&patients, &encounters).expect_err("second run");
    assert!(matches!(err, PipelineError::WriteConflict { version: 1, .. }), "{err}");
    for table in ["patients_raw", "encounters_raw", "patients", "encounters", GOLD_TABLE] {
        assert_eq!(
            pipeline.reader().latest_version(table).expect("version"),
            Some(1),
            "{table}"
        );
    }
}

#[test]
fn test_silver_rebuild_is_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    test_pipeline(&dir, JoinPolicy::Inner)
        .run(&patients, &encounters)
        .expect("run");

    let pipeline = recreating_pipeline(&dir);
    let rebuilt = pipeline.build_silver().expect("rebuild silver");
    assert!(rebuilt.iter().all(|t| t.version == 2));

    let workspace = &pipeline.config().workspace;
    for table in ["patients", "encounters"] {
        assert_eq!(
            data_file_bytes(workspace, table, 1),
            data_file_bytes(workspace, table, 2),
            "{table}"
        );
    }
}

#[test]
fn test_recreate_rerun_publishes_new_gold_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    test_pipeline(&dir, JoinPolicy::Inner)
        .run(&patients, &encounters)
        .expect("run");

    let pipeline = recreating_pipeline(&dir);
    let report = pipeline.run(&patients, &encounters).expect("rerun");
    assert!(report.tables.iter().all(|t| t.version == 2));
    let entry = pipeline.catalog().resolve(GOLD_TABLE).expect("registered");
    assert_eq!(entry.version, 2);
}

#[test]
fn test_failed_ingest_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, _) = sample_files(dir.path());
    let bad = ENCOUNTER_ROWS[0].replace("2019-01-01T10:00:00Z", "last tuesday");
    let encounters = write_file(
        dir.path(),
        "bad_encounters.csv",
        &csv(Some(ENCOUNTERS_HEADER), &[&bad, ENCOUNTER_ROWS[1]]),
    );
    let pipeline = test_pipeline(&dir, JoinPolicy::Inner);

    let err = pipeline.run(&patients, &encounters).expect_err("bad timestamp");
    assert!(matches!(err, PipelineError::Ingest { .. }), "{err}");
    assert!(!pipeline.reader().exists("patients_raw").expect("exists"));
    assert!(!pipeline.reader().exists("encounters_raw").expect("exists"));
}

#[test]
fn test_failed_bronze_recreate_commits_neither_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    test_pipeline(&dir, JoinPolicy::Inner)
        .ingest_bronze(&patients, &encounters)
        .expect("first ingest");

    // Make the encounters table unwritable: its directory becomes a file
    let pipeline = recreating_pipeline(&dir);
    let blocked = pipeline.config().workspace.table_path("encounters_raw");
    fs::remove_dir_all(&blocked).expect("remove table");
    fs::write(&blocked, b"not a table").expect("block table");

    let err = pipeline
        .ingest_bronze(&patients, &encounters)
        .expect_err("encounters write fails");
    assert!(matches!(err, PipelineError::Io { .. }), "{err}");
    assert_eq!(
        pipeline.reader().latest_version("patients_raw").expect("version"),
        Some(1)
    );
    assert_eq!(pipeline.reader().read("patients_raw").expect("read").num_rows(), 2);
}

#[test]
fn test_strict_policy_fails_gold_and_keeps_silver() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    let pipeline = test_pipeline(&dir, JoinPolicy::Strict);

    let err = pipeline.run(&patients, &encounters).expect_err("orphan encounter");
    assert!(matches!(err, PipelineError::UnmatchedKeys { count: 1, .. }), "{err}");
    assert!(pipeline.reader().exists("encounters").expect("exists"));
    assert!(!pipeline.reader().exists(GOLD_TABLE).expect("exists"));
    assert!(pipeline.catalog().list().expect("list").is_empty());
}

#[test]
fn test_pipeline_requires_provisioned_namespace() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (patients, encounters) = sample_files(dir.path());
    let config = PipelineConfig::for_workspace(Workspace::new(dir.path().join("lake"), "ehrdemo_absent"));
    let pipeline = Pipeline::new(config).expect("pipeline");

    let err = pipeline.run(&patients, &encounters).expect_err("no namespace");
    assert!(matches!(err, PipelineError::Io { .. }), "{err}");
}

#[test]
fn test_invalid_namespace_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig::for_workspace(Workspace::new(dir.path(), "Bad Namespace"));
    assert!(matches!(Pipeline::new(config), Err(PipelineError::Config(_))));
}
