//! Arrow array to DuckDB vector conversion.
//!
//! `write_column` copies `count` values starting at `src_offset` from one
//! Arrow array into one output vector. Nulls mark the row invalid and skip
//! the value write. Lists and structs with flat children emit into the
//! corresponding nested vectors; anything deeper falls back to Arrow's
//! printable representation. Callers cap `count` at `HOST_CHUNK_MAX`.

use std::error::Error;

use arrow::util::display::array_value_to_string;
use arrow_array::types::{
    Date32Type, Date64Type, Decimal128Type, Decimal256Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, Time32MillisecondType, Time32SecondType,
    Time64MicrosecondType, Time64NanosecondType, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{
    Array, ArrayRef, BinaryArray, BooleanArray, LargeBinaryArray, LargeListArray,
    LargeStringArray, ListArray, PrimitiveArray, StringArray, StructArray,
};
use arrow_schema::{DataType, TimeUnit};
use duckdb::core::{DataChunkHandle, FlatVector, Inserter, ListVector, LogicalTypeHandle,
    LogicalTypeId, StructVector};

use crate::error::DuckArrowError;

pub const HOST_CHUNK_MAX: usize = 2048;
pub const MAX_DECIMAL_WIDTH: u8 = 38;

const DEFAULT_DECIMAL_WIDTH: u8 = 18;
const DEFAULT_DECIMAL_SCALE: u8 = 3;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Host-side logical type for catalog advertisement. Array decoding never
/// goes through this; it works on Arrow types directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    Boolean,
    Tinyint,
    Smallint,
    Integer,
    Bigint,
    Hugeint,
    Float,
    Double,
    Decimal { width: u8, scale: u8 },
    Varchar,
    Blob,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl HostType {
    pub fn to_logical_type(self) -> LogicalTypeHandle {
        match self {
            HostType::Boolean => LogicalTypeHandle::from(LogicalTypeId::Boolean),
            HostType::Tinyint => LogicalTypeHandle::from(LogicalTypeId::Tinyint),
            HostType::Smallint => LogicalTypeHandle::from(LogicalTypeId::Smallint),
            HostType::Integer => LogicalTypeHandle::from(LogicalTypeId::Integer),
            HostType::Bigint => LogicalTypeHandle::from(LogicalTypeId::Bigint),
            HostType::Hugeint => LogicalTypeHandle::from(LogicalTypeId::Hugeint),
            HostType::Float => LogicalTypeHandle::from(LogicalTypeId::Float),
            HostType::Double => LogicalTypeHandle::from(LogicalTypeId::Double),
            HostType::Decimal { width, scale } => LogicalTypeHandle::decimal(width, scale),
            HostType::Varchar => LogicalTypeHandle::from(LogicalTypeId::Varchar),
            HostType::Blob => LogicalTypeHandle::from(LogicalTypeId::Blob),
            HostType::Uuid => LogicalTypeHandle::from(LogicalTypeId::Uuid),
            HostType::Date => LogicalTypeHandle::from(LogicalTypeId::Date),
            HostType::Time => LogicalTypeHandle::from(LogicalTypeId::Time),
            HostType::Timestamp => LogicalTypeHandle::from(LogicalTypeId::Timestamp),
            HostType::TimestampTz => LogicalTypeHandle::from(LogicalTypeId::TimestampTZ),
        }
    }
}

/// Case-insensitive mapping of remote type strings (as reported by column
/// metadata) to host types. Unknown strings fall back to VARCHAR.
pub fn map_type_string(remote_type: &str) -> HostType {
    let normalized = remote_type
        .trim()
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if normalized.starts_with("DECIMAL") || normalized.starts_with("NUMERIC") {
        let (width, scale) = parse_decimal_params(&normalized);
        return HostType::Decimal { width, scale };
    }
    if normalized == "TIMESTAMP WITH TIME ZONE" || normalized == "TIMESTAMPTZ" {
        return HostType::TimestampTz;
    }
    let base = normalized.split('(').next().unwrap_or("").trim_end();
    match base {
        "TEXT" | "STRING" | "CHAR" | "VARCHAR" | "NCHAR" | "NVARCHAR" => HostType::Varchar,
        "TINYINT" | "INT1" => HostType::Tinyint,
        "SMALLINT" | "INT2" => HostType::Smallint,
        "INT" | "INTEGER" | "INT4" => HostType::Integer,
        "BIGINT" | "INT8" | "LONG" => HostType::Bigint,
        "HUGEINT" | "INT128" => HostType::Hugeint,
        "FLOAT" | "REAL" => HostType::Float,
        "DOUBLE" | "DOUBLE PRECISION" => HostType::Double,
        "BOOL" | "BOOLEAN" => HostType::Boolean,
        "DATE" => HostType::Date,
        "TIME" => HostType::Time,
        "TIMESTAMP" | "DATETIME" => HostType::Timestamp,
        "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => HostType::Blob,
        "UUID" => HostType::Uuid,
        "JSON" | "JSONB" => HostType::Varchar,
        _ => HostType::Varchar,
    }
}

fn parse_decimal_params(normalized: &str) -> (u8, u8) {
    let default = (DEFAULT_DECIMAL_WIDTH, DEFAULT_DECIMAL_SCALE);
    let inner = match normalized.split_once('(') {
        Some((_, rest)) => match rest.split_once(')') {
            Some((inner, _)) => inner,
            None => return default,
        },
        // Bare DECIMAL/NUMERIC
        None => return default,
    };
    let mut parts = inner.split(',').map(str::trim);
    let width = match parts.next().and_then(|p| p.parse::<u32>().ok()) {
        Some(width) if width > 0 => width.min(MAX_DECIMAL_WIDTH as u32) as u8,
        _ => return default,
    };
    let scale = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(0)
        .min(width as u32) as u8;
    (width, scale)
}

/// SQL-flavored name for an Arrow type, used when column descriptors are
/// derived from a wire schema rather than information_schema strings.
pub fn sql_type_name(data_type: &DataType) -> String {
    match data_type {
        DataType::Boolean => "BOOLEAN".to_string(),
        DataType::Int8 => "TINYINT".to_string(),
        DataType::Int16 => "SMALLINT".to_string(),
        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),
        DataType::UInt8 => "UTINYINT".to_string(),
        DataType::UInt16 => "USMALLINT".to_string(),
        DataType::UInt32 => "UINTEGER".to_string(),
        DataType::UInt64 => "UBIGINT".to_string(),
        DataType::Float32 => "FLOAT".to_string(),
        DataType::Float64 => "DOUBLE".to_string(),
        DataType::Utf8 | DataType::LargeUtf8 => "VARCHAR".to_string(),
        DataType::Binary | DataType::LargeBinary => "BLOB".to_string(),
        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Time32(_) | DataType::Time64(_) => "TIME".to_string(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMP WITH TIME ZONE".to_string(),
        DataType::Timestamp(_, None) => "TIMESTAMP".to_string(),
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => {
            format!("DECIMAL({},{})", p, s)
        }
        other => format!("{}", other),
    }
}

fn is_flat(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Binary
            | DataType::LargeBinary
            | DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(_, _)
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _)
    )
}

fn struct_is_emittable(fields: &arrow_schema::Fields) -> bool {
    fields.iter().all(|f| is_flat(f.data_type()))
}

fn list_is_emittable(data_type: &DataType) -> bool {
    match data_type {
        DataType::List(field) | DataType::LargeList(field) => is_flat(field.data_type()),
        _ => false,
    }
}

/// Bind-time registration type for a column streamed with this Arrow type.
pub fn logical_type_for_arrow(data_type: &DataType) -> LogicalTypeHandle {
    match data_type {
        DataType::Boolean => LogicalTypeHandle::from(LogicalTypeId::Boolean),
        DataType::Int8 => LogicalTypeHandle::from(LogicalTypeId::Tinyint),
        DataType::Int16 => LogicalTypeHandle::from(LogicalTypeId::Smallint),
        DataType::Int32 => LogicalTypeHandle::from(LogicalTypeId::Integer),
        DataType::Int64 => LogicalTypeHandle::from(LogicalTypeId::Bigint),
        DataType::UInt8 => LogicalTypeHandle::from(LogicalTypeId::UTinyint),
        DataType::UInt16 => LogicalTypeHandle::from(LogicalTypeId::USmallint),
        DataType::UInt32 => LogicalTypeHandle::from(LogicalTypeId::UInteger),
        DataType::UInt64 => LogicalTypeHandle::from(LogicalTypeId::UBigint),
        DataType::Float32 => LogicalTypeHandle::from(LogicalTypeId::Float),
        DataType::Float64 => LogicalTypeHandle::from(LogicalTypeId::Double),
        DataType::Utf8 | DataType::LargeUtf8 => LogicalTypeHandle::from(LogicalTypeId::Varchar),
        DataType::Binary | DataType::LargeBinary => LogicalTypeHandle::from(LogicalTypeId::Blob),
        DataType::Date32 | DataType::Date64 => LogicalTypeHandle::from(LogicalTypeId::Date),
        DataType::Time32(_) | DataType::Time64(_) => LogicalTypeHandle::from(LogicalTypeId::Time),
        DataType::Timestamp(_, Some(_)) => LogicalTypeHandle::from(LogicalTypeId::TimestampTZ),
        DataType::Timestamp(_, None) => LogicalTypeHandle::from(LogicalTypeId::Timestamp),
        DataType::Decimal128(p, s) | DataType::Decimal256(p, s) => {
            LogicalTypeHandle::decimal(clamp_decimal_width(*p), (*s).max(0) as u8)
        }
        DataType::List(field) | DataType::LargeList(field) if is_flat(field.data_type()) => {
            LogicalTypeHandle::list(&logical_type_for_arrow(field.data_type()))
        }
        DataType::Struct(fields) if struct_is_emittable(fields) => {
            let children: Vec<(&str, LogicalTypeHandle)> = fields
                .iter()
                .map(|f| (f.name().as_str(), logical_type_for_arrow(f.data_type())))
                .collect();
            LogicalTypeHandle::struct_type(&children)
        }
        _ => LogicalTypeHandle::from(LogicalTypeId::Varchar),
    }
}

pub fn clamp_decimal_width(width: u8) -> u8 {
    width.min(MAX_DECIMAL_WIDTH)
}

pub fn write_column(
    chunk: &mut DataChunkHandle,
    col: usize,
    array: &ArrayRef,
    src_offset: usize,
    count: usize,
) -> Result<(), Box<dyn Error>> {
    match array.data_type() {
        DataType::List(_) | DataType::LargeList(_) if list_is_emittable(array.data_type()) => {
            write_list(&mut chunk.list_vector(col), array, src_offset, count)
        }
        DataType::Struct(fields) if struct_is_emittable(fields) => {
            write_struct(&mut chunk.struct_vector(col), array, src_offset, count)
        }
        _ => write_flat(&mut chunk.flat_vector(col), array, src_offset, 0, count),
    }
}

fn downcast<'a, T: 'static>(array: &'a dyn Array, what: &str) -> Result<&'a T, Box<dyn Error>> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        DuckArrowError::remote(
            &format!("unexpected array layout for {}", what),
            "column conversion",
        ) as Box<dyn Error>
    })
}

fn write_mapped<T, Out, F>(
    vector: &mut FlatVector,
    array: &dyn Array,
    src_offset: usize,
    dst_offset: usize,
    count: usize,
    map: F,
) -> Result<(), Box<dyn Error>>
where
    T: arrow_array::types::ArrowPrimitiveType,
    Out: Copy,
    F: Fn(T::Native) -> Out,
{
    let arr = downcast::<PrimitiveArray<T>>(array, "primitive column")?;
    for i in 0..count {
        let src = src_offset + i;
        if arr.is_null(src) {
            vector.set_null(dst_offset + i);
        } else {
            let slice = unsafe { vector.as_mut_slice::<Out>() };
            slice[dst_offset + i] = map(arr.value(src));
        }
    }
    Ok(())
}

fn write_flat(
    vector: &mut FlatVector,
    array: &dyn Array,
    src_offset: usize,
    dst_offset: usize,
    count: usize,
) -> Result<(), Box<dyn Error>> {
    match array.data_type() {
        DataType::Boolean => {
            let arr = downcast::<BooleanArray>(array, "boolean column")?;
            for i in 0..count {
                let src = src_offset + i;
                if arr.is_null(src) {
                    vector.set_null(dst_offset + i);
                } else {
                    let slice = unsafe { vector.as_mut_slice::<bool>() };
                    slice[dst_offset + i] = arr.value(src);
                }
            }
            Ok(())
        }
        DataType::Int8 => {
            write_mapped::<Int8Type, i8, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Int16 => {
            write_mapped::<Int16Type, i16, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Int32 => {
            write_mapped::<Int32Type, i32, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Int64 => {
            write_mapped::<Int64Type, i64, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::UInt8 => {
            write_mapped::<UInt8Type, u8, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::UInt16 => {
            write_mapped::<UInt16Type, u16, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::UInt32 => {
            write_mapped::<UInt32Type, u32, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::UInt64 => {
            write_mapped::<UInt64Type, u64, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Float32 => {
            write_mapped::<Float32Type, f32, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Float64 => {
            write_mapped::<Float64Type, f64, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Utf8 => {
            let arr = downcast::<StringArray>(array, "string column")?;
            for i in 0..count {
                let src = src_offset + i;
                if arr.is_null(src) {
                    vector.set_null(dst_offset + i);
                } else {
                    vector.insert(dst_offset + i, arr.value(src));
                }
            }
            Ok(())
        }
        DataType::LargeUtf8 => {
            let arr = downcast::<LargeStringArray>(array, "string column")?;
            for i in 0..count {
                let src = src_offset + i;
                if arr.is_null(src) {
                    vector.set_null(dst_offset + i);
                } else {
                    vector.insert(dst_offset + i, arr.value(src));
                }
            }
            Ok(())
        }
        DataType::Binary => {
            let arr = downcast::<BinaryArray>(array, "binary column")?;
            for i in 0..count {
                let src = src_offset + i;
                if arr.is_null(src) {
                    vector.set_null(dst_offset + i);
                } else {
                    vector.insert(dst_offset + i, arr.value(src));
                }
            }
            Ok(())
        }
        DataType::LargeBinary => {
            let arr = downcast::<LargeBinaryArray>(array, "binary column")?;
            for i in 0..count {
                let src = src_offset + i;
                if arr.is_null(src) {
                    vector.set_null(dst_offset + i);
                } else {
                    vector.insert(dst_offset + i, arr.value(src));
                }
            }
            Ok(())
        }
        DataType::Date32 => {
            write_mapped::<Date32Type, i32, _>(vector, array, src_offset, dst_offset, count, |v| v)
        }
        DataType::Date64 => write_mapped::<Date64Type, i32, _>(
            vector,
            array,
            src_offset,
            dst_offset,
            count,
            date64_to_days,
        ),
        DataType::Time32(TimeUnit::Second) => write_mapped::<Time32SecondType, i64, _>(
            vector,
            array,
            src_offset,
            dst_offset,
            count,
            |v| v as i64 * 1_000_000,
        ),
        DataType::Time32(TimeUnit::Millisecond) => write_mapped::<Time32MillisecondType, i64, _>(
            vector,
            array,
            src_offset,
            dst_offset,
            count,
            |v| v as i64 * 1_000,
        ),
        DataType::Time64(TimeUnit::Microsecond) => write_mapped::<Time64MicrosecondType, i64, _>(
            vector,
            array,
            src_offset,
            dst_offset,
            count,
            |v| v,
        ),
        DataType::Time64(TimeUnit::Nanosecond) => write_mapped::<Time64NanosecondType, i64, _>(
            vector,
            array,
            src_offset,
            dst_offset,
            count,
            |v| v / 1_000,
        ),
        DataType::Timestamp(TimeUnit::Second, _) => write_mapped::<TimestampSecondType, i64, _>(
            vector,
            array,
            src_offset,
            dst_offset,
            count,
            |v| timestamp_to_micros(TimeUnit::Second, v),
        ),
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            write_mapped::<TimestampMillisecondType, i64, _>(
                vector,
                array,
                src_offset,
                dst_offset,
                count,
                |v| timestamp_to_micros(TimeUnit::Millisecond, v),
            )
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            write_mapped::<TimestampMicrosecondType, i64, _>(
                vector,
                array,
                src_offset,
                dst_offset,
                count,
                |v| v,
            )
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            write_mapped::<TimestampNanosecondType, i64, _>(
                vector,
                array,
                src_offset,
                dst_offset,
                count,
                |v| timestamp_to_micros(TimeUnit::Nanosecond, v),
            )
        }
        DataType::Decimal128(width, _) => {
            write_decimal128(vector, array, src_offset, dst_offset, count, *width)
        }
        DataType::Decimal256(_, _) => {
            let arr = downcast::<PrimitiveArray<Decimal256Type>>(array, "decimal column")?;
            for i in 0..count {
                let src = src_offset + i;
                if arr.is_null(src) {
                    vector.set_null(dst_offset + i);
                    continue;
                }
                match arr.value(src).to_i128() {
                    Some(value) => {
                        let slice = unsafe { vector.as_mut_slice::<i128>() };
                        slice[dst_offset + i] = value;
                    }
                    // Beyond the host's 38-digit range.
                    None => vector.set_null(dst_offset + i),
                }
            }
            Ok(())
        }
        _ => {
            for i in 0..count {
                let src = src_offset + i;
                if array.is_null(src) {
                    vector.set_null(dst_offset + i);
                } else {
                    let text = array_value_to_string(array, src)
                        .map_err(|e| DuckArrowError::remote(&e.to_string(), "column conversion"))?;
                    vector.insert(dst_offset + i, text.as_str());
                }
            }
            Ok(())
        }
    }
}

/// DuckDB stores decimals in the narrowest integer that fits the declared
/// width; the bind-side registration clamps the width the same way.
fn write_decimal128(
    vector: &mut FlatVector,
    array: &dyn Array,
    src_offset: usize,
    dst_offset: usize,
    count: usize,
    width: u8,
) -> Result<(), Box<dyn Error>> {
    let arr = downcast::<PrimitiveArray<Decimal128Type>>(array, "decimal column")?;
    let width = clamp_decimal_width(width);
    for i in 0..count {
        let src = src_offset + i;
        if arr.is_null(src) {
            vector.set_null(dst_offset + i);
            continue;
        }
        let value = arr.value(src);
        if width <= 4 {
            let slice = unsafe { vector.as_mut_slice::<i16>() };
            slice[dst_offset + i] = value as i16;
        } else if width <= 9 {
            let slice = unsafe { vector.as_mut_slice::<i32>() };
            slice[dst_offset + i] = value as i32;
        } else if width <= 18 {
            let slice = unsafe { vector.as_mut_slice::<i64>() };
            slice[dst_offset + i] = value as i64;
        } else {
            let slice = unsafe { vector.as_mut_slice::<i128>() };
            slice[dst_offset + i] = value;
        }
    }
    Ok(())
}

fn write_list(
    vector: &mut ListVector,
    array: &dyn Array,
    src_offset: usize,
    count: usize,
) -> Result<(), Box<dyn Error>> {
    let (values, offsets): (ArrayRef, Vec<(usize, usize)>) = match array.data_type() {
        DataType::List(_) => {
            let arr = downcast::<ListArray>(array, "list column")?;
            let offsets = (0..count)
                .map(|i| {
                    let src = src_offset + i;
                    (
                        arr.value_offsets()[src] as usize,
                        arr.value_length(src) as usize,
                    )
                })
                .collect();
            (arr.values().clone(), offsets)
        }
        _ => {
            let arr = downcast::<LargeListArray>(array, "list column")?;
            let offsets = (0..count)
                .map(|i| {
                    let src = src_offset + i;
                    (
                        arr.value_offsets()[src] as usize,
                        arr.value_length(src) as usize,
                    )
                })
                .collect();
            (arr.values().clone(), offsets)
        }
    };
    let total: usize = (0..count)
        .filter(|&i| !array.is_null(src_offset + i))
        .map(|i| offsets[i].1)
        .sum();
    let mut child = vector.child(total);
    let mut child_offset = 0usize;
    for i in 0..count {
        if array.is_null(src_offset + i) {
            vector.set_null(i);
            vector.set_entry(i, child_offset, 0);
            continue;
        }
        let (start, len) = offsets[i];
        write_flat(&mut child, values.as_ref(), start, child_offset, len)?;
        vector.set_entry(i, child_offset, len);
        child_offset += len;
    }
    vector.set_len(total);
    Ok(())
}

fn write_struct(
    vector: &mut StructVector,
    array: &dyn Array,
    src_offset: usize,
    count: usize,
) -> Result<(), Box<dyn Error>> {
    let arr = downcast::<StructArray>(array, "struct column")?;
    for (child_idx, column) in arr.columns().iter().enumerate() {
        let mut child = vector.child(child_idx, count);
        write_flat(&mut child, column.as_ref(), src_offset, 0, count)?;
    }
    for i in 0..count {
        if arr.is_null(src_offset + i) {
            vector.set_null(i);
        }
    }
    Ok(())
}

fn date64_to_days(millis: i64) -> i32 {
    millis.div_euclid(MILLIS_PER_DAY) as i32
}

fn timestamp_to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_type_string_synonyms() {
        assert_eq!(map_type_string("text"), HostType::Varchar);
        assert_eq!(map_type_string("STRING"), HostType::Varchar);
        assert_eq!(map_type_string("VarChar"), HostType::Varchar);
        assert_eq!(map_type_string("VARCHAR(255)"), HostType::Varchar);
        assert_eq!(map_type_string("int"), HostType::Integer);
        assert_eq!(map_type_string("INT4"), HostType::Integer);
        assert_eq!(map_type_string("bigint"), HostType::Bigint);
        assert_eq!(map_type_string("INT8"), HostType::Bigint);
        assert_eq!(map_type_string("LONG"), HostType::Bigint);
        assert_eq!(map_type_string("float"), HostType::Float);
        assert_eq!(map_type_string("REAL"), HostType::Float);
        assert_eq!(map_type_string("double"), HostType::Double);
        assert_eq!(map_type_string("DOUBLE PRECISION"), HostType::Double);
        assert_eq!(map_type_string("bool"), HostType::Boolean);
        assert_eq!(map_type_string("BOOLEAN"), HostType::Boolean);
        assert_eq!(map_type_string("BLOB"), HostType::Blob);
        assert_eq!(map_type_string("bytea"), HostType::Blob);
        assert_eq!(map_type_string("BINARY"), HostType::Blob);
        assert_eq!(map_type_string("UUID"), HostType::Uuid);
        assert_eq!(map_type_string("JSON"), HostType::Varchar);
        assert_eq!(map_type_string("JSONB"), HostType::Varchar);
        assert_eq!(map_type_string("HUGEINT"), HostType::Hugeint);
        assert_eq!(map_type_string("INT128"), HostType::Hugeint);
    }

    #[test]
    fn test_map_type_string_timestamps() {
        assert_eq!(map_type_string("TIMESTAMP"), HostType::Timestamp);
        assert_eq!(map_type_string("timestamptz"), HostType::TimestampTz);
        assert_eq!(
            map_type_string("timestamp with time zone"),
            HostType::TimestampTz
        );
    }

    #[test]
    fn test_map_type_string_decimal() {
        assert_eq!(
            map_type_string("DECIMAL(10,2)"),
            HostType::Decimal { width: 10, scale: 2 }
        );
        assert_eq!(
            map_type_string("numeric(12)"),
            HostType::Decimal { width: 12, scale: 0 }
        );
        assert_eq!(
            map_type_string("DECIMAL( 20 , 4 )"),
            HostType::Decimal { width: 20, scale: 4 }
        );
    }

    #[test]
    fn test_map_type_string_decimal_clamps_width() {
        assert_eq!(
            map_type_string("DECIMAL(76,10)"),
            HostType::Decimal { width: 38, scale: 10 }
        );
    }

    #[test]
    fn test_map_type_string_decimal_default_on_parse_failure() {
        let default = HostType::Decimal { width: 18, scale: 3 };
        assert_eq!(map_type_string("DECIMAL"), default);
        assert_eq!(map_type_string("DECIMAL(abc)"), default);
        assert_eq!(map_type_string("NUMERIC()"), default);
    }

    #[test]
    fn test_map_type_string_unknown_falls_back() {
        assert_eq!(map_type_string("GEOMETRY"), HostType::Varchar);
        assert_eq!(map_type_string(""), HostType::Varchar);
    }

    #[test]
    fn test_sql_type_name() {
        assert_eq!(sql_type_name(&DataType::Int8), "TINYINT");
        assert_eq!(sql_type_name(&DataType::Int64), "BIGINT");
        assert_eq!(sql_type_name(&DataType::Utf8), "VARCHAR");
        assert_eq!(
            sql_type_name(&DataType::Timestamp(TimeUnit::Nanosecond, None)),
            "TIMESTAMP"
        );
        assert_eq!(
            sql_type_name(&DataType::Timestamp(
                TimeUnit::Microsecond,
                Some("UTC".into())
            )),
            "TIMESTAMP WITH TIME ZONE"
        );
        assert_eq!(sql_type_name(&DataType::Decimal128(12, 4)), "DECIMAL(12,4)");
    }

    #[test]
    fn test_timestamp_to_micros() {
        assert_eq!(timestamp_to_micros(TimeUnit::Second, 2), 2_000_000);
        assert_eq!(timestamp_to_micros(TimeUnit::Millisecond, 1_500), 1_500_000);
        assert_eq!(timestamp_to_micros(TimeUnit::Microsecond, 42), 42);
        assert_eq!(timestamp_to_micros(TimeUnit::Nanosecond, 42_000), 42);
    }

    #[test]
    fn test_date64_to_days() {
        assert_eq!(date64_to_days(0), 0);
        assert_eq!(date64_to_days(MILLIS_PER_DAY), 1);
        assert_eq!(date64_to_days(-1), -1);
        assert_eq!(date64_to_days(-MILLIS_PER_DAY), -1);
    }

    #[test]
    fn test_clamp_decimal_width() {
        assert_eq!(clamp_decimal_width(18), 18);
        assert_eq!(clamp_decimal_width(38), 38);
        assert_eq!(clamp_decimal_width(76), 38);
    }

    #[test]
    fn test_flat_predicates() {
        assert!(is_flat(&DataType::Int32));
        assert!(is_flat(&DataType::Utf8));
        assert!(!is_flat(&DataType::List(
            arrow_schema::Field::new("item", DataType::Int32, true).into()
        )));
    }
}
