//! Arrow array construction and extraction helpers

use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Float64Builder, ListBuilder, StringArray,
    StringBuilder, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Float64Type, UInt32Type, UInt64Type};
use std::sync::Arc;

/// UTF-8 array from owned strings.
#[must_use]
pub fn utf8_array<I, S>(values: I) -> ArrayRef
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Arc::new(StringArray::from_iter_values(values))
}

/// Nullable UTF-8 array.
#[must_use]
pub fn optional_utf8_array(values: &[Option<String>]) -> ArrayRef {
    Arc::new(values.iter().map(Option::as_deref).collect::<StringArray>())
}

/// List-of-strings array.
#[must_use]
pub fn string_list_array(rows: &[Vec<String>]) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for row in rows {
        for value in row {
            builder.values().append_value(value);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// List-of-float64 array.
#[must_use]
pub fn float_list_array(rows: &[Vec<f64>]) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        for value in row {
            builder.values().append_value(*value);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// Float64 array.
#[must_use]
pub fn float64_array(values: Vec<f64>) -> ArrayRef {
    Arc::new(Float64Array::from(values))
}

/// UInt32 array.
#[must_use]
pub fn uint32_array(values: Vec<u32>) -> ArrayRef {
    Arc::new(UInt32Array::from(values))
}

/// UInt64 array.
#[must_use]
pub fn uint64_array(values: Vec<u64>) -> ArrayRef {
    Arc::new(UInt64Array::from(values))
}

fn type_error(column: &str, expected: &str, actual: &DataType) -> Error {
    Error::Storage(format!(
        "column '{column}' has type {actual}, expected {expected}"
    ))
}

/// Read a UTF-8 column; nulls become empty strings.
pub(crate) fn read_strings(column: &str, array: &dyn Array) -> Result<Vec<String>> {
    let strings = array
        .as_string_opt::<i32>()
        .ok_or_else(|| type_error(column, "Utf8", array.data_type()))?;
    Ok((0..strings.len())
        .map(|i| {
            if strings.is_null(i) {
                String::new()
            } else {
                strings.value(i).to_string()
            }
        })
        .collect())
}

/// Read a nullable UTF-8 column.
pub(crate) fn read_optional_strings(column: &str, array: &dyn Array) -> Result<Vec<Option<String>>> {
    let strings = array
        .as_string_opt::<i32>()
        .ok_or_else(|| type_error(column, "Utf8", array.data_type()))?;
    Ok((0..strings.len())
        .map(|i| (!strings.is_null(i)).then(|| strings.value(i).to_string()))
        .collect())
}

/// Read a list-of-strings column; null lists become empty lists.
pub(crate) fn read_string_lists(column: &str, array: &dyn Array) -> Result<Vec<Vec<String>>> {
    let lists = array
        .as_list_opt::<i32>()
        .ok_or_else(|| type_error(column, "List(Utf8)", array.data_type()))?;
    (0..lists.len())
        .map(|i| {
            if lists.is_null(i) {
                Ok(Vec::new())
            } else {
                read_strings(column, lists.value(i).as_ref())
            }
        })
        .collect()
}

/// Read a list-of-float64 column; null lists become empty lists.
pub(crate) fn read_float_lists(column: &str, array: &dyn Array) -> Result<Vec<Vec<f64>>> {
    let lists = array
        .as_list_opt::<i32>()
        .ok_or_else(|| type_error(column, "List(Float64)", array.data_type()))?;
    (0..lists.len())
        .map(|i| {
            if lists.is_null(i) {
                return Ok(Vec::new());
            }
            let values = lists.value(i);
            let floats = values
                .as_primitive_opt::<Float64Type>()
                .ok_or_else(|| type_error(column, "List(Float64)", array.data_type()))?;
            Ok(floats.iter().map(|v| v.unwrap_or(0.0)).collect())
        })
        .collect()
}

/// Read a Float64 column; nulls become 0.0.
pub(crate) fn read_f64s(column: &str, array: &dyn Array) -> Result<Vec<f64>> {
    let floats = array
        .as_primitive_opt::<Float64Type>()
        .ok_or_else(|| type_error(column, "Float64", array.data_type()))?;
    Ok(floats.iter().map(|v| v.unwrap_or(0.0)).collect())
}

/// Read a UInt32 column; nulls become 0.
pub(crate) fn read_u32s(column: &str, array: &dyn Array) -> Result<Vec<u32>> {
    let ints = array
        .as_primitive_opt::<UInt32Type>()
        .ok_or_else(|| type_error(column, "UInt32", array.data_type()))?;
    Ok(ints.iter().map(|v| v.unwrap_or(0)).collect())
}

/// Read a UInt64 column; nulls become 0.
pub(crate) fn read_u64s(column: &str, array: &dyn Array) -> Result<Vec<u64>> {
    let ints = array
        .as_primitive_opt::<UInt64Type>()
        .ok_or_else(|| type_error(column, "UInt64", array.data_type()))?;
    Ok(ints.iter().map(|v| v.unwrap_or(0)).collect())
}
