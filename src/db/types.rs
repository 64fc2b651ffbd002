//! Row decoding for routine output.
//!
//! Routine result sets are handed to callers as JSON objects. Decoding uses a
//! two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! A value whose typed decode fails is read back as text. Only values that
//! are neither decodable nor printable become null, and those are logged.

use crate::models::Row;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::{Column, ColumnIndex, Decode, Row as _, Type, TypeInfo};
use tracing::error;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Timestamp,
    Date,
    Time,
    TimeTz,
    Interval,
    Uuid,
    Text,
    Unknown,
}

/// Classify a database type name into a logical category.
///
/// Names are matched exactly (ignoring case and an `UNSIGNED` suffix) so that
/// types like `interval` or `point` are never mistaken for integers.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let base = lower.strip_suffix(" unsigned").unwrap_or(&lower);

    match base {
        "decimal" | "numeric" => TypeCategory::Decimal,
        "bool" | "boolean" => TypeCategory::Boolean,
        "int2" | "int4" | "int8" | "smallint" | "integer" | "int" | "bigint" | "tinyint"
        | "mediumint" | "smallserial" | "serial" | "bigserial" | "serial2" | "serial4"
        | "serial8" | "bit" | "year" => TypeCategory::Integer,
        "float4" | "float8" | "float" | "double" | "double precision" | "real" => {
            TypeCategory::Float
        }
        "json" | "jsonb" => TypeCategory::Json,
        "timestamp" | "timestamptz" | "datetime" => TypeCategory::Timestamp,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "timetz" => TypeCategory::TimeTz,
        "interval" => TypeCategory::Interval,
        "uuid" => TypeCategory::Uuid,
        "bytea" | "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            TypeCategory::Binary
        }
        "text" | "varchar" | "char" | "bpchar" | "name" | "citext" | "tinytext" | "mediumtext"
        | "longtext" | "enum" | "set" => TypeCategory::Text,
        // user-defined enums, domains, network and geometric types
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC value, kept as the exact string the server sent.
#[derive(Debug)]
pub struct RawDecimal(pub String);

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
        match value.format() {
            PgValueFormat::Text => {
                let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
                Ok(RawDecimal(s.to_string()))
            }
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

/// Render the binary NUMERIC wire format (base-10000 digit groups) as text.
fn pg_numeric_to_string(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    const NEGATIVE: u16 = 0x4000;
    const NAN: u16 = 0xC000;

    let word = |i: usize| -> Result<u16, sqlx::error::BoxDynError> {
        bytes
            .get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i64;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    if sign == NAN {
        return Ok("NaN".to_string());
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<_>, _>>()?;
    let group = |k: i64| -> u16 {
        usize::try_from(k)
            .ok()
            .and_then(|k| digits.get(k).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NEGATIVE {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for k in 1..=weight {
            out.push_str(&format!("{:04}", group(k)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let mut k = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(k)));
            k += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Any column value read back as its textual wire form.
///
/// Accepts every column type. Binary-format values are only accepted when
/// they are valid UTF-8 without control characters, which holds for enum
/// labels and other text-like types sent in binary.
#[derive(Debug)]
pub struct RawText(pub String);

fn printable_text(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let s = std::str::from_utf8(bytes)?;
    if s.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')) {
        return Err("value has no textual representation".into());
    }
    Ok(s.to_string())
}

impl Type<sqlx::MySql> for RawText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(_ty: &MySqlTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let bytes = <&[u8] as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawText(printable_text(bytes)?))
    }
}

impl Type<sqlx::Postgres> for RawText {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawText(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawText(printable_text(value.as_bytes()?)?)),
        }
    }
}

/// Render a Postgres interval as an ISO 8601 duration, e.g. `P1Y2M3DT4H5M6.5S`.
fn iso8601_interval(months: i32, days: i32, microseconds: i64) -> String {
    let mut out = String::from("P");
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        out.push_str(&format!("{}Y", years));
    }
    if months != 0 {
        out.push_str(&format!("{}M", months));
    }
    if days != 0 {
        out.push_str(&format!("{}D", days));
    }

    let sign = if microseconds < 0 { "-" } else { "" };
    let micros = microseconds.unsigned_abs();
    let hours = micros / 3_600_000_000;
    let minutes = micros / 60_000_000 % 60;
    let seconds = micros / 1_000_000 % 60;
    let fraction = micros % 1_000_000;

    if micros != 0 {
        out.push('T');
        if hours != 0 {
            out.push_str(&format!("{}{}H", sign, hours));
        }
        if minutes != 0 {
            out.push_str(&format!("{}{}M", sign, minutes));
        }
        if seconds != 0 || fraction != 0 {
            let mut secs = format!("{}{}", sign, seconds);
            if fraction != 0 {
                let digits = format!("{:06}", fraction);
                secs.push('.');
                secs.push_str(digits.trim_end_matches('0'));
            }
            out.push_str(&secs);
            out.push('S');
        }
    }

    if out == "P" {
        out.push_str("T0S");
    }
    out
}

/// Binary columns are returned base64 encoded.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Typed decode of one column. `None` when the column does not decode as `T`.
fn decode_as<'r, R, T, F>(row: &'r R, idx: usize, to_json: F) -> Option<JsonValue>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
    F: FnOnce(T) -> JsonValue,
{
    row.try_get::<Option<T>, _>(idx)
        .ok()
        .map(|value| value.map_or(JsonValue::Null, to_json))
}

/// Last resort for a column: its textual form, or null with an error log.
fn decode_raw<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    RawText: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<RawText>, _>(idx) {
        Ok(value) => value.map_or(JsonValue::Null, |v| JsonValue::String(v.0)),
        Err(e) => {
            let column = &row.columns()[idx];
            error!(
                column = column.name(),
                type_name = column.type_info().name(),
                error = %e,
                "Column value could not be decoded"
            );
            JsonValue::Null
        }
    }
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Conversion of a database row into a routine output row.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                let value = mysql::decode_column(self, idx, category)
                    .unwrap_or_else(|| decode_raw(self, idx));
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name());
                let value = postgres::decode_column(self, idx, category)
                    .unwrap_or_else(|| decode_raw(self, idx));
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    /// `None` sends the column to the textual fallback.
    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        match category {
            TypeCategory::Decimal => decode_as(row, idx, |v: RawDecimal| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_as(row, idx, |v: i64| JsonValue::from(v))
                .or_else(|| decode_as(row, idx, |v: u64| JsonValue::from(v))),
            TypeCategory::Boolean => decode_as(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_as(row, idx, float_value)
                .or_else(|| decode_as(row, idx, |v: f32| float_value(v as f64))),
            TypeCategory::Binary => decode_as(row, idx, |v: Vec<u8>| encode_binary_value(&v)),
            TypeCategory::Json => decode_as(row, idx, |v: JsonValue| v),
            TypeCategory::Timestamp => decode_as(row, idx, |v: NaiveDateTime| {
                JsonValue::String(v.and_utc().to_rfc3339())
            }),
            TypeCategory::Date => decode_as(row, idx, |v: NaiveDate| JsonValue::String(v.to_string())),
            TypeCategory::Time => decode_as(row, idx, |v: NaiveTime| JsonValue::String(v.to_string())),
            TypeCategory::Text => decode_as(row, idx, JsonValue::String),
            TypeCategory::TimeTz
            | TypeCategory::Interval
            | TypeCategory::Uuid
            | TypeCategory::Unknown => None,
        }
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::postgres::types::{PgInterval, PgTimeTz};
    use sqlx::types::Uuid;

    /// `None` sends the column to the textual fallback.
    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        match category {
            TypeCategory::Decimal => decode_as(row, idx, |v: RawDecimal| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_as(row, idx, |v: i64| JsonValue::from(v))
                .or_else(|| decode_as(row, idx, |v: i32| JsonValue::from(v)))
                .or_else(|| decode_as(row, idx, |v: i16| JsonValue::from(v))),
            TypeCategory::Boolean => decode_as(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_as(row, idx, float_value)
                .or_else(|| decode_as(row, idx, |v: f32| float_value(v as f64))),
            TypeCategory::Binary => decode_as(row, idx, |v: Vec<u8>| encode_binary_value(&v)),
            TypeCategory::Json => decode_as(row, idx, |v: JsonValue| v),
            // timestamptz decodes as DateTime<Utc>, timestamp as NaiveDateTime
            TypeCategory::Timestamp => {
                decode_as(row, idx, |v: DateTime<Utc>| JsonValue::String(v.to_rfc3339())).or_else(
                    || {
                        decode_as(row, idx, |v: NaiveDateTime| {
                            JsonValue::String(v.and_utc().to_rfc3339())
                        })
                    },
                )
            }
            TypeCategory::Date => decode_as(row, idx, |v: NaiveDate| JsonValue::String(v.to_string())),
            TypeCategory::Time => decode_as(row, idx, |v: NaiveTime| JsonValue::String(v.to_string())),
            TypeCategory::TimeTz => decode_as(row, idx, |v: PgTimeTz<NaiveTime, FixedOffset>| {
                JsonValue::String(format!("{}{}", v.time, v.offset))
            }),
            TypeCategory::Interval => decode_as(row, idx, |v: PgInterval| {
                JsonValue::String(iso8601_interval(v.months, v.days, v.microseconds))
            }),
            TypeCategory::Uuid => decode_as(row, idx, |v: Uuid| JsonValue::String(v.to_string())),
            TypeCategory::Text => decode_as(row, idx, JsonValue::String),
            TypeCategory::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIT"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_is_not_substring_based() {
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Interval);
        assert_eq!(categorize_type("POINT"), TypeCategory::Unknown);
        assert_eq!(categorize_type("INT4RANGE"), TypeCategory::Unknown);
        assert_eq!(categorize_type("INT4[]"), TypeCategory::Unknown);
        assert_eq!(categorize_type("INET"), TypeCategory::Unknown);
        assert_eq!(categorize_type("mood"), TypeCategory::Unknown);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("TIME"), TypeCategory::Time);
        assert_eq!(categorize_type("TIMETZ"), TypeCategory::TimeTz);
    }

    #[test]
    fn test_categorize_type_text() {
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("BPCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("ENUM"), TypeCategory::Text);
        assert_eq!(categorize_type("UUID"), TypeCategory::Uuid);
    }

    #[test]
    fn test_printable_text() {
        assert_eq!(printable_text(b"happy").unwrap(), "happy");
        assert_eq!(printable_text(b"line\nbreak").unwrap(), "line\nbreak");
        assert!(printable_text(&[0, 0, 0, 7]).is_err());
        assert!(printable_text(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_iso8601_interval() {
        assert_eq!(iso8601_interval(14, 3, 14_706_500_000), "P1Y2M3DT4H5M6.5S");
        assert_eq!(iso8601_interval(0, 0, 0), "PT0S");
        assert_eq!(iso8601_interval(0, 1, 0), "P1D");
        assert_eq!(iso8601_interval(0, 0, -90_000_000), "PT-1M-30S");
        assert_eq!(iso8601_interval(-1, 0, 1), "P-1MT0.000001S");
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_non_finite_float_becomes_string() {
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
    }

    fn numeric_bytes(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for word in [digits.len() as u16, weight as u16, sign, dscale] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        for d in digits {
            bytes.extend_from_slice(&d.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_pg_numeric_binary() {
        // 12345.678
        let value = numeric_bytes(1, 0, 3, &[1, 2345, 6780]);
        assert_eq!(pg_numeric_to_string(&value).unwrap(), "12345.678");

        // -0.05
        let value = numeric_bytes(-1, 0x4000, 2, &[500]);
        assert_eq!(pg_numeric_to_string(&value).unwrap(), "-0.05");

        // 20000 (trailing zero groups are omitted on the wire)
        let value = numeric_bytes(1, 0, 0, &[2]);
        assert_eq!(pg_numeric_to_string(&value).unwrap(), "20000");

        assert_eq!(pg_numeric_to_string(&numeric_bytes(0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert!(pg_numeric_to_string(&[0, 1]).is_err());
    }
}
