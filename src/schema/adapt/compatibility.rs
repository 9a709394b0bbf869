//! Type compatibility rules between an inferred and a declared column type.

use arrow::datatypes::DataType;

use crate::schema::adapt::types::TypeCompatibility;

/// Check whether values inferred as `from` can be loaded as `to`
///
/// Widening numeric conversions and anything to text are accepted. Temporal
/// columns are parsed from their text form, so any inferred type fits a
/// declared date or timestamp. A column inferred as `Null` (every sampled
/// value empty) fits any declared type.
#[must_use]
pub fn check_type_compatibility(from: &DataType, to: &DataType) -> TypeCompatibility {
    if from == to {
        return TypeCompatibility::Exact;
    }

    match (from, to) {
        (DataType::Null, _) => TypeCompatibility::Compatible,

        // Everything has a text form; codes and postal codes often infer as numbers
        (_, DataType::Utf8 | DataType::LargeUtf8) => TypeCompatibility::Compatible,

        (DataType::Int8, DataType::Int16 | DataType::Int32 | DataType::Int64)
        | (DataType::Int16, DataType::Int32 | DataType::Int64)
        | (DataType::Int32, DataType::Int64)
        | (DataType::Float32, DataType::Float64) => TypeCompatibility::Compatible,

        (
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64,
            DataType::Float64,
        ) => TypeCompatibility::Compatible,

        // Compact dates such as 19800412 infer as integers
        (_, t) if is_temporal(t) => TypeCompatibility::Compatible,

        _ => TypeCompatibility::Incompatible,
    }
}

/// Identifies whether a data type is a string type
#[must_use]
pub const fn is_string(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Utf8 | DataType::LargeUtf8)
}

/// Identifies whether a data type is a date or timestamp type
#[must_use]
pub const fn is_temporal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _)
    )
}
