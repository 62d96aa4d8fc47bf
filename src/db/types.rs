//! Driver value decoding and result normalization.
//!
//! Conversion is two-phase:
//! 1. Each engine decodes its native values into the driver-independent `SqlValue`
//! 2. `normalize` turns a `SqlValue` into a JSON-safe value
//!
//! Keeping the second phase engine-agnostic means every tool shares one set of
//! serialization rules.

use crate::db::DatabaseType;
use crate::error::{ToolError, ToolResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// A decoded database value, independent of the driver it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact decimal in its textual database form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Uuid(uuid::Uuid),
    Json(JsonValue),
    /// Anything without a dedicated variant, already rendered as text.
    Other(String),
}

/// Convert a decoded value into a JSON-safe value. Never fails.
///
/// Temporal values become ISO-8601 strings and decimals become floats (precision
/// loss accepted). Bytes become base64 and non-finite floats become strings.
pub fn normalize(value: SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Bool(b) => JsonValue::Bool(b),
        SqlValue::Int(i) => JsonValue::from(i),
        SqlValue::UInt(u) => JsonValue::from(u),
        SqlValue::Float(f) => float_value(f),
        SqlValue::Decimal(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => float_value(f),
            _ => JsonValue::String(s),
        },
        SqlValue::Text(s) | SqlValue::Other(s) => JsonValue::String(s),
        SqlValue::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
        SqlValue::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
        SqlValue::Time(t) => JsonValue::String(t.format("%H:%M:%S%.f").to_string()),
        SqlValue::DateTime(dt) => JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        SqlValue::DateTimeTz(dt) => JsonValue::String(dt.to_rfc3339()),
        SqlValue::Uuid(u) => JsonValue::String(u.to_string()),
        SqlValue::Json(j) => j,
    }
}

fn float_value(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(f.to_string()))
}

/// Zip each row's positional values with `columns`.
///
/// Duplicate column names collapse to a single key; the last value wins.
pub fn rows_to_mappings(columns: &[String], rows: Vec<Vec<SqlValue>>) -> Vec<Map<String, JsonValue>> {
    rows.into_iter()
        .map(|row| {
            let mut map = Map::with_capacity(columns.len());
            for (name, value) in columns.iter().zip(row) {
                // Remove first so a duplicate moves to its last position.
                map.remove(name);
                map.insert(name.clone(), normalize(value));
            }
            map
        })
        .collect()
}

/// Column names plus decoded rows from one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_mappings(self) -> Vec<Map<String, JsonValue>> {
        rows_to_mappings(&self.columns, self.rows)
    }

    /// First column of the first row as an integer, for COUNT-style queries.
    pub fn scalar_i64(&self) -> Option<i64> {
        match self.rows.first()?.first()? {
            SqlValue::Int(i) => Some(*i),
            SqlValue::UInt(u) => i64::try_from(*u).ok(),
            SqlValue::Float(f) => Some(*f as i64),
            SqlValue::Decimal(s) | SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The value of a `COUNT(*)` result, or a query error when it has none.
    pub fn row_count(&self) -> ToolResult<i64> {
        self.scalar_i64().ok_or_else(|| {
            let found = self.rows.first().and_then(|row| row.first());
            ToolError::query(
                format!("Row count query returned no integer value (got {:?})", found),
                None,
            )
        })
    }
}

/// Interpret a normalized flag column (`bit`, `bool`, `0/1`, `YES/NO`).
pub fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => matches!(s.to_ascii_uppercase().as_str(), "YES" | "Y" | "TRUE" | "1"),
        _ => false,
    }
}

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
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Classify a column type name reported by sqlx into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Temporal types first; "interval" and "point" would otherwise hit the integer check.
    match lower.as_str() {
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        "timestamptz" => return TypeCategory::TimestampTz,
        // MySQL TIMESTAMP is stored in UTC
        "timestamp" if db == DatabaseType::MySql => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "interval" | "point" => return TypeCategory::Unknown,
        _ => {}
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
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

    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
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
        // Simple queries return text; prepared (bound) queries return binary.
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => pg_numeric_text(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const PG_NUMERIC_NEG: u16 = 0x4000;
const PG_NUMERIC_NAN: u16 = 0xC000;
const PG_NUMERIC_PINF: u16 = 0xD000;
const PG_NUMERIC_NINF: u16 = 0xF000;

/// Render a binary PostgreSQL NUMERIC the way `numeric_out` prints it.
///
/// Layout: digit count, weight, sign and display scale (16 bits each), then
/// base-10000 digits. `weight` is the power of 10000 of the first digit.
fn pg_numeric_text(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    if bytes.len() < 8 || bytes.len() % 2 != 0 {
        return Err(format!("invalid NUMERIC length {}", bytes.len()).into());
    }
    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let (ndigits, weight, sign, dscale) = (
        usize::from(words[0]),
        i32::from(words[1] as i16),
        words[2],
        usize::from(words[3]),
    );
    let digits = &words[4..];
    if digits.len() != ndigits {
        return Err(format!("NUMERIC declares {} digits, found {}", ndigits, digits.len()).into());
    }

    match sign {
        PG_NUMERIC_NAN => return Ok("NaN".to_string()),
        PG_NUMERIC_PINF => return Ok("Infinity".to_string()),
        PG_NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digit = |idx: i32| -> u16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == PG_NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                out.push_str(&digit(idx).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(idx)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(idx)));
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Column names of a sqlx row in result order.
pub fn column_names<R: Row>(row: &R) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

pub fn decode_mysql_row(row: &MySqlRow) -> Vec<SqlValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name(), DatabaseType::MySql);
            mysql::decode_column(row, idx, category)
        })
        .collect()
}

pub fn decode_postgres_row(row: &PgRow) -> Vec<SqlValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name(), DatabaseType::Postgres);
            postgres::decode_column(row, idx, category)
        })
        .collect()
}

/// SQLite values decode by their runtime storage class, not the declared type.
pub fn decode_sqlite_row(row: &SqliteRow) -> Vec<SqlValue> {
    (0..row.columns().len())
        .map(|idx| sqlite::decode_column(row, idx))
        .collect()
}

/// Decode a SQL Server row, consuming it.
pub fn decode_tds_row(row: tiberius::Row) -> Vec<SqlValue> {
    row.into_iter().map(mssql::decode_value).collect()
}

/// Try each decoder in turn; the first non-error result wins.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $( $ty:ty => $wrap:expr ),+ $(,)?) => {{
        $(
            if let Ok(v) = $row.try_get::<Option<$ty>, _>($idx) {
                return v.map($wrap).unwrap_or(SqlValue::Null);
            }
        )+
    }};
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return SqlValue::Null;
        }
        match category {
            TypeCategory::Decimal => first_decoded!(row, idx, RawDecimal => |d: RawDecimal| SqlValue::Decimal(d.0)),
            TypeCategory::Integer => first_decoded!(row, idx,
                i64 => SqlValue::Int,
                u64 => SqlValue::UInt,
                i32 => |v: i32| SqlValue::Int(v.into()),
                u32 => |v: u32| SqlValue::UInt(v.into()),
                i16 => |v: i16| SqlValue::Int(v.into()),
                u16 => |v: u16| SqlValue::UInt(v.into()),
                i8 => |v: i8| SqlValue::Int(v.into()),
                u8 => |v: u8| SqlValue::UInt(v.into()),
            ),
            TypeCategory::Boolean => first_decoded!(row, idx, bool => SqlValue::Bool),
            TypeCategory::Float => first_decoded!(row, idx,
                f64 => SqlValue::Float,
                f32 => |v: f32| SqlValue::Float(v.into()),
            ),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => SqlValue::Bytes),
            TypeCategory::Json => first_decoded!(row, idx, JsonValue => SqlValue::Json),
            TypeCategory::Date => first_decoded!(row, idx, NaiveDate => SqlValue::Date),
            TypeCategory::Time => first_decoded!(row, idx, NaiveTime => SqlValue::Time),
            TypeCategory::Timestamp => first_decoded!(row, idx, NaiveDateTime => SqlValue::DateTime),
            TypeCategory::TimestampTz => first_decoded!(row, idx,
                DateTime<Utc> => |v: DateTime<Utc>| SqlValue::DateTimeTz(v.fixed_offset()),
                NaiveDateTime => SqlValue::DateTime,
            ),
            _ => {}
        }
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .or_else(|| row.try_get::<Option<Vec<u8>>, _>(idx).ok().flatten().map(bytes_or_text))
            .unwrap_or_else(|| unsupported(row, idx))
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> SqlValue {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return SqlValue::Null;
        }
        match category {
            TypeCategory::Decimal => first_decoded!(row, idx, RawDecimal => |d: RawDecimal| SqlValue::Decimal(d.0)),
            TypeCategory::Integer => first_decoded!(row, idx,
                i64 => SqlValue::Int,
                i32 => |v: i32| SqlValue::Int(v.into()),
                i16 => |v: i16| SqlValue::Int(v.into()),
                i8 => |v: i8| SqlValue::Int(v.into()),
            ),
            TypeCategory::Boolean => first_decoded!(row, idx, bool => SqlValue::Bool),
            TypeCategory::Float => first_decoded!(row, idx,
                f64 => SqlValue::Float,
                f32 => |v: f32| SqlValue::Float(v.into()),
            ),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => SqlValue::Bytes),
            TypeCategory::Json => first_decoded!(row, idx, JsonValue => SqlValue::Json),
            TypeCategory::Uuid => first_decoded!(row, idx, uuid::Uuid => SqlValue::Uuid),
            TypeCategory::Date => first_decoded!(row, idx, NaiveDate => SqlValue::Date),
            TypeCategory::Time => first_decoded!(row, idx, NaiveTime => SqlValue::Time),
            TypeCategory::Timestamp => first_decoded!(row, idx, NaiveDateTime => SqlValue::DateTime),
            TypeCategory::TimestampTz => first_decoded!(row, idx,
                DateTime<Utc> => |v: DateTime<Utc>| SqlValue::DateTimeTz(v.fixed_offset()),
            ),
            _ => {}
        }
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or_else(|| unsupported(row, idx))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize) -> SqlValue {
        let storage = match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return SqlValue::Null,
            Ok(value) => value.type_info().name().to_string(),
            Err(_) => return SqlValue::Null,
        };
        let decoded = match storage.as_str() {
            "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(SqlValue::Int),
            "REAL" => row.try_get_unchecked::<f64, _>(idx).map(SqlValue::Float),
            "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(SqlValue::Bytes),
            _ => row.try_get_unchecked::<String, _>(idx).map(SqlValue::Text),
        };
        decoded.unwrap_or_else(|_| unsupported(row, idx))
    }
}

mod mssql {
    use super::*;
    use tiberius::{ColumnData, FromSql};

    pub fn decode_value(data: ColumnData<'static>) -> SqlValue {
        match data {
            ColumnData::U8(v) => v.map(|v| SqlValue::Int(v.into())).unwrap_or(SqlValue::Null),
            ColumnData::I16(v) => v.map(|v| SqlValue::Int(v.into())).unwrap_or(SqlValue::Null),
            ColumnData::I32(v) => v.map(|v| SqlValue::Int(v.into())).unwrap_or(SqlValue::Null),
            ColumnData::I64(v) => v.map(SqlValue::Int).unwrap_or(SqlValue::Null),
            ColumnData::F32(v) => v.map(|v| SqlValue::Float(v.into())).unwrap_or(SqlValue::Null),
            ColumnData::F64(v) => v.map(SqlValue::Float).unwrap_or(SqlValue::Null),
            ColumnData::Bit(v) => v.map(SqlValue::Bool).unwrap_or(SqlValue::Null),
            ColumnData::String(v) => v
                .map(|s| SqlValue::Text(s.into_owned()))
                .unwrap_or(SqlValue::Null),
            ColumnData::Guid(v) => v.map(SqlValue::Uuid).unwrap_or(SqlValue::Null),
            ColumnData::Binary(v) => v
                .map(|b| SqlValue::Bytes(b.into_owned()))
                .unwrap_or(SqlValue::Null),
            ColumnData::Numeric(v) => v
                .map(|n| SqlValue::Decimal(n.to_string()))
                .unwrap_or(SqlValue::Null),
            ColumnData::Xml(v) => v
                .map(|x| SqlValue::Text(x.into_owned().into_string()))
                .unwrap_or(SqlValue::Null),
            ColumnData::Date(_) => temporal::<NaiveDate>(&data, SqlValue::Date),
            ColumnData::Time(_) => temporal::<NaiveTime>(&data, SqlValue::Time),
            ColumnData::DateTimeOffset(_) => {
                temporal::<DateTime<FixedOffset>>(&data, SqlValue::DateTimeTz)
            }
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                temporal::<NaiveDateTime>(&data, SqlValue::DateTime)
            }
        }
    }

    fn temporal<T>(data: &ColumnData<'static>, wrap: fn(T) -> SqlValue) -> SqlValue
    where
        T: for<'a> FromSql<'a>,
    {
        match T::from_sql(data) {
            Ok(Some(v)) => wrap(v),
            Ok(None) => SqlValue::Null,
            Err(e) => SqlValue::Other(format!("{:?} ({})", data, e)),
        }
    }
}

fn bytes_or_text(bytes: Vec<u8>) -> SqlValue {
    match String::from_utf8(bytes) {
        Ok(s) => SqlValue::Text(s),
        Err(e) => SqlValue::Bytes(e.into_bytes()),
    }
}

/// Last resort for values no decoder accepted: keep the type name visible.
fn unsupported<R: Row>(row: &R, idx: usize) -> SqlValue {
    let type_name = row
        .columns()
        .get(idx)
        .map(|c| c.type_info().name().to_string())
        .unwrap_or_default();
    tracing::debug!(column = idx, type_name = %type_name, "Unsupported column type");
    SqlValue::Other(format!("<{}>", type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_primitives_pass_through() {
        assert_eq!(normalize(SqlValue::Null), JsonValue::Null);
        assert_eq!(normalize(SqlValue::Bool(true)), JsonValue::Bool(true));
        assert_eq!(normalize(SqlValue::Int(-4)), JsonValue::from(-4));
        assert_eq!(normalize(SqlValue::UInt(u64::MAX)), JsonValue::from(u64::MAX));
        assert_eq!(normalize(SqlValue::Text("x".into())), JsonValue::from("x"));
    }

    #[test]
    fn test_normalize_decimal_to_float() {
        assert_eq!(normalize(SqlValue::Decimal("12.50".into())), JsonValue::from(12.5));
        assert_eq!(
            normalize(SqlValue::Decimal("not-a-number".into())),
            JsonValue::from("not-a-number")
        );
    }

    #[test]
    fn test_normalize_non_finite_float_is_string() {
        assert_eq!(normalize(SqlValue::Float(f64::INFINITY)), JsonValue::from("inf"));
        assert_eq!(normalize(SqlValue::Float(f64::NAN)), JsonValue::from("NaN"));
    }

    #[test]
    fn test_normalize_bytes_base64() {
        assert_eq!(
            normalize(SqlValue::Bytes(b"hello world".to_vec())),
            JsonValue::from("aGVsbG8gd29ybGQ=")
        );
        assert_eq!(normalize(SqlValue::Bytes(vec![])), JsonValue::from(""));
    }

    #[test]
    fn test_normalize_temporal_iso8601() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(normalize(SqlValue::Date(date)), JsonValue::from("2024-02-29"));

        let dt = date.and_hms_milli_opt(13, 5, 9, 250).unwrap();
        assert_eq!(
            normalize(SqlValue::DateTime(dt)),
            JsonValue::from("2024-02-29T13:05:09.250")
        );

        let time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        assert_eq!(normalize(SqlValue::Time(time)), JsonValue::from("08:00:00"));
    }

    #[test]
    fn test_temporal_round_trip_same_instant() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let original = offset.with_ymd_and_hms(2023, 11, 5, 22, 14, 3).unwrap();
        let JsonValue::String(text) = normalize(SqlValue::DateTimeTz(original)) else {
            panic!("expected a string");
        };
        let parsed = DateTime::parse_from_rfc3339(&text).unwrap();
        assert_eq!(parsed, original);

        let naive = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_micro_opt(23, 59, 59, 123456)
            .unwrap();
        let JsonValue::String(text) = normalize(SqlValue::DateTime(naive)) else {
            panic!("expected a string");
        };
        assert_eq!(NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f").unwrap(), naive);
    }

    #[test]
    fn test_normalize_uuid_and_json() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            normalize(SqlValue::Uuid(id)),
            JsonValue::from("00000000-0000-0000-0000-000000000000")
        );
        let doc = serde_json::json!({"a": [1, 2]});
        assert_eq!(normalize(SqlValue::Json(doc.clone())), doc);
    }

    #[test]
    fn test_rows_to_mappings_preserves_column_order() {
        let columns = vec!["zeta".to_string(), "alpha".to_string()];
        let rows = vec![vec![SqlValue::Int(1), SqlValue::Text("a".into())]];
        let maps = rows_to_mappings(&columns, rows);
        let keys: Vec<&String> = maps[0].keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_rows_to_mappings_duplicate_column_last_wins() {
        let columns = vec!["id".to_string(), "id".to_string()];
        let rows = vec![vec![SqlValue::Int(1), SqlValue::Int(2)]];
        let maps = rows_to_mappings(&columns, rows);
        assert_eq!(maps[0].len(), 1);
        assert_eq!(maps[0]["id"], JsonValue::from(2));
    }

    #[test]
    fn test_scalar_i64() {
        let set = RowSet {
            columns: vec!["count".into()],
            rows: vec![vec![SqlValue::Decimal("42".into())]],
        };
        assert_eq!(set.scalar_i64(), Some(42));
        assert_eq!(RowSet::default().scalar_i64(), None);
    }

    fn numeric_bytes(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&weight.to_be_bytes());
        bytes.extend_from_slice(&sign.to_be_bytes());
        bytes.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            bytes.extend_from_slice(&d.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_binary_numeric_renders_exact_text() {
        let cases: &[(Vec<u8>, &str)] = &[
            (numeric_bytes(0, 0, 2, &[12, 5000]), "12.50"),
            (numeric_bytes(-2, 0, 5, &[1000]), "0.00001"),
            (numeric_bytes(1, 0x4000, 3, &[123, 4567, 8910]), "-1234567.891"),
            (numeric_bytes(1, 0, 0, &[1]), "10000"),
            (numeric_bytes(0, 0, 0, &[]), "0"),
            (numeric_bytes(0, 0, 2, &[]), "0.00"),
            (numeric_bytes(0, 0xC000, 0, &[]), "NaN"),
            (numeric_bytes(0, 0xF000, 0, &[]), "-Infinity"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(pg_numeric_text(bytes).unwrap(), *expected);
        }
    }

    #[test]
    fn test_binary_numeric_rejects_truncated_input() {
        assert!(pg_numeric_text(&[0, 1, 0]).is_err());
        let mut short = numeric_bytes(0, 0, 0, &[7, 8]);
        short.truncate(10);
        assert!(pg_numeric_text(&short).is_err());
    }

    #[test]
    fn test_row_count_rejects_missing_value() {
        let set = RowSet {
            columns: vec!["count".into()],
            rows: vec![vec![SqlValue::Int(7)]],
        };
        assert_eq!(set.row_count().unwrap(), 7);

        let err = RowSet::default().row_count().unwrap_err();
        assert_eq!(err.kind(), "QueryError");

        let text = RowSet {
            columns: vec!["count".into()],
            rows: vec![vec![SqlValue::Text("many".into())]],
        };
        assert!(text.row_count().unwrap_err().to_string().contains("many"));
    }

    #[test]
    fn test_truthy_flags() {
        assert!(truthy(&JsonValue::Bool(true)));
        assert!(truthy(&JsonValue::from(1)));
        assert!(truthy(&JsonValue::from("YES")));
        assert!(!truthy(&JsonValue::from("NO")));
        assert!(!truthy(&JsonValue::from(0)));
        assert!(!truthy(&JsonValue::Null));
    }

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT", DatabaseType::MySql), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT", DatabaseType::Postgres), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC", DatabaseType::Postgres), TypeCategory::Decimal);
        assert_eq!(categorize_type("jsonb", DatabaseType::Postgres), TypeCategory::Json);
        assert_eq!(categorize_type("TIMESTAMPTZ", DatabaseType::Postgres), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("TIMESTAMP", DatabaseType::Postgres), TypeCategory::Timestamp);
        assert_eq!(categorize_type("TIMESTAMP", DatabaseType::MySql), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("DATETIME", DatabaseType::MySql), TypeCategory::Timestamp);
        assert_eq!(categorize_type("INTERVAL", DatabaseType::Postgres), TypeCategory::Unknown);
        assert_eq!(categorize_type("VARCHAR", DatabaseType::MySql), TypeCategory::Text);
    }
}
