//! Row-to-JSON type mappings.
//!
//! Result tables cross the gateway as JSON rows, so procedure output stays
//! generic: the executor negotiates shape, it does not model domain entities.
//! Conversion is two-phase: `TypeCategory` classifies the column type, then a
//! backend-specific decoder extracts the value.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// One row of a result table.
pub type ProcRow = serde_json::Map<String, JsonValue>;

/// One result table: an ordered sequence of rows.
pub type RecordSet = Vec<ProcRow>;

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Json,
    Uuid,
    Binary,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }
    if lower.contains("timestamp") || lower == "datetime" || lower == "date" || lower == "time" {
        return TypeCategory::Temporal;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings, preserving the
/// exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Decode binary data to JSON: UTF-8 text when possible, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> ProcRow;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> ProcRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                let value = decode_column::<sqlx::Postgres, _>(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> ProcRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                let value = decode_column::<sqlx::MySql, _>(self, idx, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

/// Decode one column by logical category, falling back to Null when the
/// driver cannot produce the requested type.
fn decode_column<DB, R>(row: &R, idx: usize, category: TypeCategory) -> JsonValue
where
    DB: sqlx::Database,
    R: Row<Database = DB>,
    usize: sqlx::ColumnIndex<R>,
    for<'a> i64: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> f64: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> bool: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> String: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> Vec<u8>: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> RawDecimal: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> JsonValue: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> uuid::Uuid: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> DateTime<Utc>: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> NaiveDateTime: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> NaiveDate: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> NaiveTime: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
{
    match category {
        TypeCategory::Integer => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or(JsonValue::Null),
        TypeCategory::Float => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(float_to_json)
            .unwrap_or(JsonValue::Null),
        TypeCategory::Decimal => row
            .try_get::<Option<RawDecimal>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.0))
            .unwrap_or(JsonValue::Null),
        TypeCategory::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null),
        TypeCategory::Temporal => decode_temporal(row, idx),
        TypeCategory::Json => row
            .try_get::<Option<JsonValue>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null),
        TypeCategory::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null),
        TypeCategory::Binary => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| decode_binary_value(&v))
            .unwrap_or(JsonValue::Null),
        TypeCategory::Text => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null),
    }
}

/// Temporal columns render as ISO-8601 strings. Tries the richest
/// representation first since the exact column type varies per backend.
fn decode_temporal<DB, R>(row: &R, idx: usize) -> JsonValue
where
    DB: sqlx::Database,
    R: Row<Database = DB>,
    usize: sqlx::ColumnIndex<R>,
    for<'a> DateTime<Utc>: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> NaiveDateTime: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> NaiveDate: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
    for<'a> NaiveTime: sqlx::Type<DB> + sqlx::Decode<'a, DB>,
{
    if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
        return JsonValue::String(v.to_rfc3339());
    }
    if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    JsonValue::Null
}
