mod utils;

use std::sync::Arc;

use ehr_lake::filter::{AndFilter, KeySetFilter, NotNullFilter};
use ehr_lake::table::{Catalog, TableQuery, TableWriter, Tier, WritePolicy};
use ehr_lake::{Dataset, PATIENT_ID, PipelineError};
use utils::{column_strings, string_dataset, test_workspace};

fn gold(ids: &[&str]) -> Dataset {
    string_dataset(
        "encounter_patients",
        &[
            (PATIENT_ID, ids.iter().map(|_| Some("P1")).collect()),
            ("Id", ids.iter().map(|id| Some(*id)).collect()),
            ("GENDER", ids.iter().map(|_| Some("F")).collect()),
        ],
    )
}

#[test]
fn test_register_requires_committed_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = Catalog::open(test_workspace(&dir));

    let err = catalog
        .register("encounter_patients", "encounter_patients")
        .expect_err("nothing written");
    assert!(matches!(err, PipelineError::Catalog(_)), "{err}");
    assert!(catalog.list().expect("list").is_empty());
}

#[test]
fn test_register_and_resolve() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = test_workspace(&dir);
    TableWriter::new(workspace.clone())
        .write("encounter_patients", Tier::Gold, &gold(&["E1", "E3"]), WritePolicy::FailIfExists)
        .expect("write");
    let catalog = Catalog::open(workspace);

    let entry = catalog
        .register("encounter_patients", "encounter_patients")
        .expect("register");
    assert_eq!(entry.version, 1);
    assert_eq!(entry.tier, Tier::Gold);
    assert_eq!(entry.columns, vec![PATIENT_ID, "Id", "GENDER"]);

    assert_eq!(catalog.resolve("encounter_patients").expect("resolve"), entry);
    assert_eq!(catalog.list().expect("list"), vec![entry]);

    let err = catalog.resolve("encounters").expect_err("unregistered");
    assert!(matches!(err, PipelineError::TableNotFound(_)), "{err}");
}

#[test]
fn test_select_by_name_with_columns_filter_and_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = test_workspace(&dir);
    TableWriter::new(workspace.clone())
        .write(
            "encounter_patients",
            Tier::Gold,
            &gold(&["E1", "E3", "E5"]),
            WritePolicy::FailIfExists,
        )
        .expect("write");
    let catalog = Catalog::open(workspace);
    catalog
        .register("encounter_patients", "encounter_patients")
        .expect("register");

    let all = catalog
        .select("encounter_patients", &TableQuery::all())
        .expect("select");
    assert_eq!(all.num_rows(), 3);
    assert_eq!(all.column_names(), vec![PATIENT_ID, "Id", "GENDER"]);

    let query = TableQuery::all()
        .columns(["GENDER"])
        .filter(Arc::new(AndFilter::new(vec![
            Arc::new(KeySetFilter::new("Id", ["E3", "E5"])),
            Arc::new(NotNullFilter::new("GENDER")),
        ])))
        .limit(1);
    let selected = catalog.select("encounter_patients", &query).expect("select");
    assert_eq!(selected.column_names(), vec!["GENDER"]);
    assert_eq!(column_strings(&selected, "GENDER"), vec![Some("F".to_string())]);
}

#[test]
fn test_registration_pins_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = test_workspace(&dir);
    let writer = TableWriter::new(workspace.clone());
    writer
        .write("encounter_patients", Tier::Gold, &gold(&["E1"]), WritePolicy::FailIfExists)
        .expect("v1");
    let catalog = Catalog::open(workspace);
    catalog
        .register("encounter_patients", "encounter_patients")
        .expect("register");

    writer
        .write("encounter_patients", Tier::Gold, &gold(&["E1", "E3"]), WritePolicy::Recreate)
        .expect("v2");
    let pinned = catalog
        .select("encounter_patients", &TableQuery::all())
        .expect("select");
    assert_eq!(pinned.num_rows(), 1);

    let entry = catalog
        .register("encounter_patients", "encounter_patients")
        .expect("re-register");
    assert_eq!(entry.version, 2);
    let current = catalog
        .select("encounter_patients", &TableQuery::all())
        .expect("select");
    assert_eq!(current.num_rows(), 2);
}

#[test]
fn test_register_explicit_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = test_workspace(&dir);
    let writer = TableWriter::new(workspace.clone());
    let v1 = writer
        .write("encounter_patients", Tier::Gold, &gold(&["E1"]), WritePolicy::FailIfExists)
        .expect("v1");
    writer
        .write("encounter_patients", Tier::Gold, &gold(&["E1", "E3"]), WritePolicy::Recreate)
        .expect("v2");
    let catalog = Catalog::open(workspace);

    let entry = catalog
        .register_version("encounter_patients", "encounter_patients", v1.version)
        .expect("register v1");
    assert_eq!(entry.version, 1);
    let pinned = catalog
        .select("encounter_patients", &TableQuery::all())
        .expect("select");
    assert_eq!(pinned.num_rows(), 1);

    let err = catalog
        .register_version("encounter_patients", "encounter_patients", 7)
        .expect_err("uncommitted version");
    assert!(matches!(err, PipelineError::Catalog(_)), "{err}");
    assert_eq!(catalog.resolve("encounter_patients").expect("resolve").version, 1);
}
