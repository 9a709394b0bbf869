//! Raw ingest of delimited source files.
//!
//! The file's schema is inferred once, checked against the entity's declared
//! schema, and the file is then read with declared types for every declared
//! column. Dates and timestamps are read as text and parsed with the
//! configured formats, so a value that parses under no format fails the
//! ingest instead of becoming null.

use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::util::{IoResultExt, safe_open_file};
use crate::error::{PipelineError, Result};
use crate::schema::adapt::{DateFormatConfig, adapt_record_batch, check_schema_compatibility};
use crate::schema::entity::EntitySchema;
use crate::utils::logging::{log_operation_complete, log_operation_start, log_warning};

/// Default rows per batch when reading a source file
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 8192;

/// Options controlling how a delimited file is parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Whether the first line holds column names
    pub has_header: bool,
    /// Field delimiter; must be a single ASCII character
    pub delimiter: char,
    /// Records sampled for schema inference; `None` scans the whole file
    ///
    /// With a bound, undeclared columns are kept as text since later rows
    /// may not fit the sampled type.
    pub infer_max_records: Option<usize>,
    /// Rows per record batch
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: ',',
            infer_max_records: None,
            batch_size: DEFAULT_INGEST_BATCH_SIZE,
        }
    }
}

impl IngestOptions {
    #[must_use]
    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    /// Infer column types from the first `records` rows only
    #[must_use]
    pub fn with_infer_max_records(mut self, records: usize) -> Self {
        self.infer_max_records = Some(records);
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Delimiter as the byte the CSV reader expects
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "delimiter {:?} is not a single ASCII character",
                    self.delimiter
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if self.infer_max_records == Some(0) || self.batch_size == 0 {
            return Err(PipelineError::Config(
                "ingest infer_max_records and batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn format(&self) -> Result<Format> {
        Ok(Format::default()
            .with_header(self.has_header)
            .with_delimiter(self.delimiter_byte()?))
    }
}

/// The schemas a source file is read and stored with
struct ReadPlan {
    /// Types the CSV reader parses into; temporal columns stay text
    read_schema: SchemaRef,
    /// Types the dataset is stored with
    target_schema: SchemaRef,
}

/// Read a delimited file as one dataset of `entity_schema`'s entity
///
/// Column names are taken verbatim from the header (or from the declared
/// schema, in declaration order, when the file has none). Declared columns
/// that are not mandatory may be absent; undeclared columns are kept with
/// their inferred type. Rows are not filtered.
pub fn read_delimited(
    path: &Path,
    entity_schema: &EntitySchema,
    options: &IngestOptions,
    date_config: &DateFormatConfig,
) -> Result<Dataset> {
    let start = Instant::now();
    log_operation_start("Ingesting", path);
    options.validate()?;

    let mut file = safe_open_file(path, "raw ingest")?;
    let format = options.format()?;
    let (inferred, _) = format
        .infer_schema(BufReader::new(&file), options.infer_max_records)
        .map_err(|e| PipelineError::ingest(path, format!("schema inference failed: {e}")))?;
    file.seek(SeekFrom::Start(0)).at_path(path)?;

    let observed = name_columns(path, inferred, entity_schema, options.has_header)?;
    let sampled = options.infer_max_records.is_some();
    let plan = plan_read(path, &observed, entity_schema, sampled)?;

    let reader = ReaderBuilder::new(Arc::clone(&plan.read_schema))
        .with_format(format)
        .with_batch_size(options.batch_size)
        .build(file)
        .map_err(|e| PipelineError::ingest(path, e))?;

    let batches = reader
        .map(|batch| {
            let batch = batch.map_err(|e| PipelineError::ingest(path, e))?;
            adapt_record_batch(&batch, &plan.target_schema, date_config)
                .map_err(|e| PipelineError::ingest(path, e))
        })
        .collect::<Result<Vec<RecordBatch>>>()?;

    let dataset = Dataset::try_new(entity_schema.entity().name(), plan.target_schema, batches)?;
    log_operation_complete("ingested", path, dataset.num_rows(), Some(start.elapsed()));
    Ok(dataset)
}

/// Give the inferred columns their names: header names as-is, or declared
/// names by position for headerless files
fn name_columns(
    path: &Path,
    inferred: Schema,
    entity_schema: &EntitySchema,
    has_header: bool,
) -> Result<Schema> {
    if inferred.fields().is_empty() {
        return Err(PipelineError::ingest(path, "file has no columns"));
    }

    if has_header {
        if let Some(name) = inferred.fields().iter().map(|f| f.name()).duplicates().next() {
            return Err(PipelineError::ingest(
                path,
                format!("column '{name}' appears more than once in the header"),
            ));
        }
        return Ok(inferred);
    }

    let declared = entity_schema.column_names();
    if inferred.fields().len() != declared.len() {
        return Err(PipelineError::ingest(
            path,
            format!(
                "headerless file has {} columns but {} declares {}",
                inferred.fields().len(),
                entity_schema.entity(),
                declared.len()
            ),
        ));
    }

    let fields = inferred
        .fields()
        .iter()
        .zip(declared)
        .map(|(f, name)| Field::new(name, f.data_type().clone(), true))
        .collect::<Vec<_>>();
    Ok(Schema::new(fields))
}

/// Validate the observed columns against the declared schema and decide the
/// read and storage type of every column
///
/// `sampled` marks types inferred from a prefix of the file; undeclared
/// columns are then read as text.
fn plan_read(
    path: &Path,
    observed: &Schema,
    entity_schema: &EntitySchema,
    sampled: bool,
) -> Result<ReadPlan> {
    let declared = entity_schema.arrow_schema();
    let report = check_schema_compatibility(observed, &declared);

    let missing_mandatory = report
        .missing
        .iter()
        .filter(|name| {
            entity_schema
                .field(name)
                .is_some_and(|f| f.role.is_mandatory())
        })
        .collect_vec();
    if !missing_mandatory.is_empty() {
        return Err(PipelineError::ingest(
            path,
            format!(
                "missing declared column(s) {} required for {}",
                missing_mandatory.iter().join(", "),
                entity_schema.entity()
            ),
        ));
    }
    if !report.missing.is_empty() {
        log_warning(
            &format!("Optional columns absent: {}", report.missing.iter().join(", ")),
            Some(path),
        );
    }

    if !report.compatible() {
        let detail = report
            .issues
            .iter()
            .map(|i| format!("{} inferred as {} but declared {}", i.field_name, i.observed, i.declared))
            .join("; ");
        return Err(PipelineError::ingest(path, format!("incompatible column types: {detail}")));
    }
    for adaptation in &report.adaptations {
        log::debug!(
            "Column {} inferred as {}, loading as {}",
            adaptation.field_name,
            adaptation.observed,
            adaptation.declared
        );
    }
    if !report.undeclared.is_empty() {
        log_warning(
            &format!(
                "Keeping undeclared columns {}",
                report.undeclared.iter().join(", ")
            ),
            Some(path),
        );
    }

    let mut read_fields = Vec::with_capacity(observed.fields().len());
    let mut target_fields = Vec::with_capacity(observed.fields().len());
    for field in observed.fields() {
        match entity_schema.field(field.name()) {
            Some(definition) => {
                let target = definition.to_arrow_field();
                let read_type = if definition.field_type.is_temporal() {
                    DataType::Utf8
                } else {
                    target.data_type().clone()
                };
                read_fields.push(Field::new(field.name(), read_type, true));
                target_fields.push(target);
            }
            None => {
                let inferred_type = match field.data_type() {
                    DataType::Null => DataType::Utf8,
                    _ if sampled => DataType::Utf8,
                    other => other.clone(),
                };
                read_fields.push(Field::new(field.name(), inferred_type.clone(), true));
                target_fields.push(Field::new(field.name(), inferred_type, true));
            }
        }
    }

    Ok(ReadPlan {
        read_schema: Arc::new(Schema::new(read_fields)),
        target_schema: Arc::new(Schema::new(target_fields)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_must_be_ascii() {
        assert_eq!(IngestOptions::default().delimiter_byte().expect("comma"), b',');
        assert!(IngestOptions::default().with_delimiter('§').validate().is_err());
    }

    #[test]
    fn headerless_names_follow_declaration_order() {
        let schema = EntitySchema::encounters();
        let inferred = Schema::new(
            (1..=schema.fields().len())
                .map(|i| Field::new(format!("column_{i}"), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        );
        let named = name_columns(Path::new("e.csv"), inferred, &schema, false).expect("named");
        assert_eq!(named.field(0).name(), "Id");
        assert_eq!(named.field(3).name(), "PATIENT");
    }

    #[test]
    fn temporal_columns_are_read_as_text() {
        let schema = EntitySchema::patients();
        let observed = Schema::new(vec![
            Field::new("Id", DataType::Utf8, true),
            Field::new("BIRTHDATE", DataType::Date32, true),
            Field::new("ZIP", DataType::Int64, true),
            Field::new("SSN", DataType::Utf8, true),
            Field::new("DRIVERS", DataType::Null, true),
            Field::new("PASSPORT", DataType::Utf8, true),
            Field::new("PREFIX", DataType::Utf8, true),
            Field::new("FIRST", DataType::Utf8, true),
            Field::new("LAST", DataType::Utf8, true),
            Field::new("SUFFIX", DataType::Null, true),
            Field::new("MAIDEN", DataType::Null, true),
            Field::new("BIRTHPLACE", DataType::Utf8, true),
            Field::new("ADDRESS", DataType::Utf8, true),
        ]);
        let plan = plan_read(Path::new("p.csv"), &observed, &schema, false).expect("plan");
        let read = plan.read_schema;
        let target = plan.target_schema;
        assert_eq!(read.field_with_name("BIRTHDATE").expect("f").data_type(), &DataType::Utf8);
        assert_eq!(target.field_with_name("BIRTHDATE").expect("f").data_type(), &DataType::Date32);
        assert_eq!(target.field_with_name("ZIP").expect("f").data_type(), &DataType::Utf8);
        assert!(!target.field_with_name("Id").expect("f").is_nullable());
    }

    #[test]
    fn sampled_inference_keeps_undeclared_columns_as_text() {
        let observed = Schema::new(vec![
            Field::new("Id", DataType::Utf8, true),
            Field::new("START", DataType::Utf8, true),
            Field::new("PATIENT", DataType::Utf8, true),
            Field::new("REASONDESCRIPTION", DataType::Utf8, true),
            Field::new("INCOME", DataType::Int64, true),
        ]);
        let schema = EntitySchema::encounters();
        let income = |sampled| {
            plan_read(Path::new("e.csv"), &observed, &schema, sampled)
                .expect("plan")
                .target_schema
                .field_with_name("INCOME")
                .expect("f")
                .data_type()
                .clone()
        };
        assert_eq!(income(true), DataType::Utf8);
        assert_eq!(income(false), DataType::Int64);
    }
}
