//! Parquet file operations
//!
//! Reading snapshot data files into Arrow record batches and writing them
//! back out with fixed writer properties, so identical input produces
//! byte-identical files.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use itertools::Itertools;
use parquet::arrow::ArrowWriter;
use parquet::arrow::{ProjectionMask, arrow_reader::ParquetRecordBatchReaderBuilder};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::schema::types::SchemaDescriptor;
use rayon::prelude::*;

use crate::error::util::IoResultExt;
use crate::error::{PipelineError, Result};
use crate::utils::logging::{log_operation_complete, log_operation_start};

/// Default batch size for Parquet reading
pub const DEFAULT_BATCH_SIZE: usize = 16384;

/// Value recorded as the writer of every data file
pub const CREATED_BY: &str = concat!("ehr-lake ", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the read batch size
pub const BATCH_SIZE_ENV: &str = "EHR_LAKE_BATCH_SIZE";

/// Helper function to get batch size from environment
#[must_use]
pub fn get_batch_size() -> Option<usize> {
    std::env::var(BATCH_SIZE_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
}

/// Size and row count of a written data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub rows: u64,
    pub size_bytes: u64,
}

/// Create a projection mask selecting `columns` from a file
///
/// Every requested column must exist in the file.
pub fn create_projection(
    columns: &[String],
    file_schema: &Schema,
    parquet_schema: &SchemaDescriptor,
    path: &Path,
) -> Result<ProjectionMask> {
    let indices = columns
        .iter()
        .map(|name| {
            file_schema.index_of(name).map_err(|_| {
                PipelineError::schema(
                    path.display().to_string(),
                    format!("column '{name}' not found in data file"),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ProjectionMask::roots(parquet_schema, indices))
}

/// Read a parquet file into Arrow record batches
///
/// # Arguments
/// * `path` - Path to the Parquet file
/// * `columns` - Optional column projection
/// * `batch_size` - Rows per output batch
///
/// # Returns
/// The (possibly projected) schema and the batches, in file order
pub fn read_parquet(
    path: &Path,
    columns: Option<&[String]>,
    batch_size: usize,
) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let start = std::time::Instant::now();
    log::debug!("Reading parquet file {}", path.display());

    let file = File::open(path).at_path(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(batch_size);

    let builder = match columns {
        Some(columns) => {
            let mask =
                create_projection(columns, builder.schema(), builder.parquet_schema(), path)?;
            builder.with_projection(mask)
        }
        None => builder,
    };

    let reader = builder.build()?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

    log::debug!(
        "Read {} rows from {} in {:?}",
        batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        path.display(),
        start.elapsed()
    );
    Ok((schema, batches))
}

/// Read several parquet files in parallel, preserving file order
///
/// All files must share a schema; `fallback_schema` is returned when the
/// list is empty.
pub fn read_parquet_files(
    paths: &[PathBuf],
    columns: Option<&[String]>,
    batch_size: usize,
    fallback_schema: SchemaRef,
) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let results = paths
        .par_iter()
        .map(|path| read_parquet(path, columns, batch_size))
        .collect::<Vec<_>>();

    let mut schema = None;
    let mut batches = Vec::new();
    for (path, result) in paths.iter().zip(results) {
        let (file_schema, file_batches) = result?;
        match &schema {
            None => schema = Some(file_schema),
            Some(s) if s.fields() == file_schema.fields() => {}
            Some(s) => {
                return Err(PipelineError::schema(
                    path.display().to_string(),
                    format!(
                        "data file columns [{}] differ from snapshot columns [{}]",
                        file_schema.fields().iter().map(|f| f.name()).join(", "),
                        s.fields().iter().map(|f| f.name()).join(", ")
                    ),
                ));
            }
        }
        batches.extend(file_batches);
    }

    Ok((schema.unwrap_or(fallback_schema), batches))
}

/// Writer properties shared by every data file
#[must_use]
pub fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_created_by(CREATED_BY.to_string())
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Write batches to a new parquet file and flush it to disk
pub fn write_parquet(path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<WriteStats> {
    log_operation_start("Writing parquet file", path);

    let file = File::create(path).at_path(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(writer_properties()))?;
    for batch in batches {
        writer.write(batch)?;
    }
    let metadata = writer.close()?;

    let file = File::open(path).at_path(path)?;
    file.sync_all().at_path(path)?;
    let size_bytes = file.metadata().at_path(path)?.len();

    let rows = u64::try_from(metadata.num_rows).unwrap_or_default();
    log_operation_complete("wrote", path, usize::try_from(rows).unwrap_or(usize::MAX), None);
    Ok(WriteStats { rows, size_bytes })
}
