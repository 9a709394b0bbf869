//! Converting columns between Arrow types.
//!
//! Text to temporal conversion is strict: a non-empty value that matches no
//! configured format is an error, never a silent null.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Date32Array, NullArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::compute::kernels::cast;
use arrow::datatypes::{DataType, TimeUnit};
use chrono::NaiveDate;

use crate::schema::adapt::compatibility::is_string;
use crate::schema::adapt::date_utils::{parse_date_string, parse_timestamp_string};
use crate::schema::adapt::types::{AdapterError, DateFormatConfig, Result};

/// Convert an Arrow array to the target data type
///
/// # Arguments
/// * `column` - Column name, used in error messages
/// * `array` - The source array
/// * `target_type` - The declared type
/// * `date_config` - Formats used when parsing text into dates and timestamps
pub fn convert_array(
    column: &str,
    array: &ArrayRef,
    target_type: &DataType,
    date_config: &DateFormatConfig,
) -> Result<ArrayRef> {
    let source_type = array.data_type();
    if source_type == target_type {
        return Ok(Arc::clone(array));
    }

    match (source_type, target_type) {
        (DataType::Null, t) => create_null_array(t, array.len()),
        (s, DataType::Date32) if is_string(s) => {
            convert_string_to_date32(column, array, date_config)
        }
        (s, DataType::Timestamp(unit, tz)) if is_string(s) && tz.is_none() => {
            convert_string_to_timestamp(column, array, *unit, date_config)
        }
        _ => cast::cast(array, target_type).map_err(|e| {
            AdapterError::Conversion(format!(
                "column '{column}': cannot convert {source_type:?} to {target_type:?}: {e}"
            ))
        }),
    }
}

/// Create a null array of the specified type and length
pub fn create_null_array(data_type: &DataType, length: usize) -> Result<ArrayRef> {
    let null_array: ArrayRef = Arc::new(NullArray::new(length));
    cast::cast(&null_array, data_type).map_err(|e| {
        AdapterError::Conversion(format!(
            "Failed to create null array of type {data_type:?}: {e}"
        ))
    })
}

fn as_string_array<'a>(column: &str, array: &'a ArrayRef) -> Result<&'a StringArray> {
    array.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
        AdapterError::Conversion(format!("column '{column}' is not a Utf8 array"))
    })
}

fn convert_string_to_date32(
    column: &str,
    array: &ArrayRef,
    date_config: &DateFormatConfig,
) -> Result<ArrayRef> {
    let strings = as_string_array(column, array)?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| AdapterError::Conversion("invalid epoch".to_string()))?;

    let mut builder = Date32Array::builder(strings.len());
    for (row, value) in strings.iter().enumerate() {
        match value {
            None => builder.append_null(),
            Some(raw) if raw.trim().is_empty() => builder.append_null(),
            Some(raw) => {
                let date = parse_date_string(raw, date_config).ok_or_else(|| {
                    AdapterError::UnparseableTemporal {
                        column: column.to_string(),
                        row,
                        value: raw.to_string(),
                    }
                })?;
                let days = i32::try_from(date.signed_duration_since(epoch).num_days())
                    .map_err(|_| {
                        AdapterError::Conversion(format!(
                            "column '{column}': date {date} out of range"
                        ))
                    })?;
                builder.append_value(days);
            }
        }
    }

    Ok(Arc::new(builder.finish()) as ArrayRef)
}

fn convert_string_to_timestamp(
    column: &str,
    array: &ArrayRef,
    unit: TimeUnit,
    date_config: &DateFormatConfig,
) -> Result<ArrayRef> {
    let strings = as_string_array(column, array)?;

    let values = strings
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => {
                let ts = parse_timestamp_string(raw, date_config)
                    .ok_or_else(|| AdapterError::UnparseableTemporal {
                        column: column.to_string(),
                        row,
                        value: raw.to_string(),
                    })?
                    .and_utc();
                let scaled = match unit {
                    TimeUnit::Second => Some(ts.timestamp()),
                    TimeUnit::Millisecond => Some(ts.timestamp_millis()),
                    TimeUnit::Microsecond => Some(ts.timestamp_micros()),
                    TimeUnit::Nanosecond => ts.timestamp_nanos_opt(),
                };
                scaled.map(Some).ok_or_else(|| {
                    AdapterError::Conversion(format!(
                        "column '{column}': timestamp '{raw}' out of range"
                    ))
                })
            }
        })
        .collect::<Result<Vec<Option<i64>>>>()?;

    let array: ArrayRef = match unit {
        TimeUnit::Second => Arc::new(TimestampSecondArray::from(values)),
        TimeUnit::Millisecond => Arc::new(TimestampMillisecondArray::from(values)),
        TimeUnit::Microsecond => Arc::new(TimestampMicrosecondArray::from(values)),
        TimeUnit::Nanosecond => Arc::new(TimestampNanosecondArray::from(values)),
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: Vec<Option<&str>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    #[test]
    fn converts_dates_and_keeps_nulls() {
        let array = strings(vec![Some("1970-01-02"), None, Some("")]);
        let converted =
            convert_array("BIRTHDATE", &array, &DataType::Date32, &DateFormatConfig::default())
                .expect("valid dates");
        let dates = converted
            .as_any()
            .downcast_ref::<Date32Array>()
            .expect("date32");
        assert_eq!(dates.value(0), 1);
        assert!(dates.is_null(1));
        assert!(dates.is_null(2));
    }

    #[test]
    fn bad_date_is_an_error() {
        let array = strings(vec![Some("1970-01-02"), Some("yesterday")]);
        let err =
            convert_array("BIRTHDATE", &array, &DataType::Date32, &DateFormatConfig::default())
                .expect_err("unparseable date");
        match err {
            AdapterError::UnparseableTemporal { column, row, value } => {
                assert_eq!(column, "BIRTHDATE");
                assert_eq!(row, 1);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn converts_timestamps_to_millis() {
        let array = strings(vec![Some("1970-01-01T00:00:01Z")]);
        let converted = convert_array(
            "START",
            &array,
            &DataType::Timestamp(TimeUnit::Millisecond, None),
            &DateFormatConfig::default(),
        )
        .expect("valid timestamp");
        let ts = converted
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .expect("millis");
        assert_eq!(ts.value(0), 1000);
    }
}
