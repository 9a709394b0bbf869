//! Console output utilities
//!
//! Plain-text rendering of table snapshots for the command line.

use arrow::array::Array;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;

use crate::dataset::Dataset;
use crate::table::catalog::CatalogEntry;
use crate::table::snapshot::SnapshotManifest;

/// Print summary information about a committed snapshot
pub fn print_table_summary(manifest: &SnapshotManifest) {
    println!(
        "{} ({}) version {} committed {}",
        manifest.table, manifest.tier, manifest.version, manifest.committed_at
    );
    println!(
        "  {} rows in {} file(s), {} bytes",
        manifest.row_count,
        manifest.files.len(),
        manifest.files.iter().map(|f| f.size_bytes).sum::<u64>()
    );
}

/// Print catalog registrations
pub fn print_catalog(entries: &[CatalogEntry]) {
    if entries.is_empty() {
        println!("No registered tables");
        return;
    }
    for entry in entries {
        println!(
            "{:<24} {:<6} v{:<4} {}",
            entry.name, entry.tier, entry.version, entry.location
        );
    }
}

/// Print column names and types
pub fn print_schema_info(schema: &Schema) {
    println!("Schema:");
    for field in schema.fields() {
        let nullable = if field.is_nullable() { "" } else { " not null" };
        println!("  - {} ({}{nullable})", field.name(), field.data_type());
    }
}

/// Print the first `num_rows` rows of a dataset
pub fn print_sample_rows(dataset: &Dataset, num_rows: usize) {
    println!("First {} of {} rows:", num_rows.min(dataset.num_rows()), dataset.num_rows());
    let mut printed = 0;
    for batch in dataset.batches() {
        for row_idx in 0..batch.num_rows() {
            if printed == num_rows {
                return;
            }
            println!("  {}", format_row(batch, row_idx));
            printed += 1;
        }
    }
}

fn format_row(batch: &RecordBatch, row_idx: usize) -> String {
    let schema = batch.schema();
    batch
        .columns()
        .iter()
        .zip(schema.fields())
        .map(|(column, field)| {
            let value = if column.is_null(row_idx) {
                "NULL".to_string()
            } else {
                array_value_to_string(column.as_ref(), row_idx).unwrap_or_else(|_| "?".to_string())
            };
            format!("{}: {value}", field.name())
        })
        .collect::<Vec<_>>()
        .join(", ")
}
