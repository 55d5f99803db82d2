//! Result materialization.
//!
//! Rows coming back from the driver are turned into JSON maps (column name to
//! value) so every adapter hands out the same shape regardless of backend.
//!
//! Conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's declared type
//! 2. a per-backend decoder tries the Rust types that backend supports for
//!    that category, first match wins

use crate::models::{DatabaseType, Row, StatementOutput};
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlQueryResult, MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgQueryResult, PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx::{Column, Decode, Either, Row as _, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Binary,
    Json,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Checked first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower == "tiny" {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower.starts_with("timestamp") || lower == "datetime" || lower == "date" || lower == "time"
    {
        return TypeCategory::Temporal;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

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
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary columns are base64 encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// Try each listed Rust type in order and convert the first one that decodes.
/// A SQL NULL decodes successfully as `None` and becomes `JsonValue::Null`.
macro_rules! decode_first {
    ($row:expr, $idx:expr, $convert:expr; $($ty:ty),+ $(,)?) => {{
        let mut decoded: Option<JsonValue> = None;
        $(
            if decoded.is_none() {
                if let Ok(value) = $row.try_get::<Option<$ty>, _>($idx) {
                    decoded = Some(value.map($convert).unwrap_or(JsonValue::Null));
                }
            }
        )+
        decoded.unwrap_or(JsonValue::Null)
    }};
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let idx = col.ordinal();
                let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
                let value = match category {
                    TypeCategory::Decimal => decode_first!(self, idx, |v: RawDecimal| JsonValue::String(v.0); RawDecimal),
                    TypeCategory::Integer => decode_first!(self, idx, JsonValue::from; i64, u64, i32, u32, i16, u16, i8, u8),
                    TypeCategory::Boolean => decode_first!(self, idx, JsonValue::Bool; bool),
                    TypeCategory::Float => decode_first!(self, idx, JsonValue::from; f64, f32),
                    TypeCategory::Temporal => decode_first!(self, idx, |v| JsonValue::String(v.to_string());
                        chrono::NaiveDateTime, chrono::NaiveDate, chrono::NaiveTime),
                    TypeCategory::Binary => decode_first!(self, idx, |v: Vec<u8>| encode_binary(&v); Vec<u8>),
                    TypeCategory::Json => decode_first!(self, idx, |v| v; JsonValue),
                    TypeCategory::Text => decode_first!(self, idx, JsonValue::String; String),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let idx = col.ordinal();
                let category =
                    categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
                let value = match category {
                    TypeCategory::Decimal => decode_first!(self, idx, |v: RawDecimal| JsonValue::String(v.0); RawDecimal),
                    TypeCategory::Integer => decode_first!(self, idx, JsonValue::from; i64, i32, i16),
                    TypeCategory::Boolean => decode_first!(self, idx, JsonValue::Bool; bool),
                    TypeCategory::Float => decode_first!(self, idx, JsonValue::from; f64, f32),
                    TypeCategory::Temporal => decode_first!(self, idx, |v| JsonValue::String(v.to_string());
                        chrono::DateTime<chrono::Utc>, chrono::NaiveDateTime, chrono::NaiveDate,
                        chrono::NaiveTime),
                    TypeCategory::Binary => decode_first!(self, idx, |v: Vec<u8>| encode_binary(&v); Vec<u8>),
                    TypeCategory::Json => decode_first!(self, idx, |v| v; JsonValue),
                    TypeCategory::Text => decode_first!(self, idx, JsonValue::String; String),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Row {
        self.columns()
            .iter()
            .map(|col| {
                let idx = col.ordinal();
                // Expression columns have no declared type; "NULL" falls through to the
                // dynamic decode below.
                let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                let value = match category {
                    TypeCategory::Integer => decode_first!(self, idx, JsonValue::from; i64),
                    TypeCategory::Boolean => decode_first!(self, idx, JsonValue::Bool; bool),
                    TypeCategory::Float | TypeCategory::Decimal => {
                        decode_first!(self, idx, JsonValue::from; f64)
                    }
                    TypeCategory::Binary => decode_first!(self, idx, |v: Vec<u8>| encode_binary(&v); Vec<u8>),
                    _ => decode_first!(self, idx, JsonValue::from; i64, f64, String),
                };
                (col.name().to_string(), value)
            })
            .collect()
    }
}

/// Summary fields of a finished statement. `rows_affected` and the generated
/// id are inherent methods on each backend's result type.
pub trait StatementSummary {
    fn affected(&self) -> u64;
    fn insert_id(&self) -> Option<String>;
}

impl StatementSummary for MySqlQueryResult {
    fn affected(&self) -> u64 {
        self.rows_affected()
    }

    fn insert_id(&self) -> Option<String> {
        // MySQL reports 0 for statements that generated nothing
        match self.last_insert_id() {
            0 => None,
            id => Some(id.to_string()),
        }
    }
}

impl StatementSummary for SqliteQueryResult {
    fn affected(&self) -> u64 {
        self.rows_affected()
    }

    fn insert_id(&self) -> Option<String> {
        // last_insert_rowid is connection-wide; only trust it after a write
        if self.rows_affected() == 0 {
            return None;
        }
        Some(self.last_insert_rowid().to_string())
    }
}

impl StatementSummary for PgQueryResult {
    fn affected(&self) -> u64 {
        self.rows_affected()
    }

    fn insert_id(&self) -> Option<String> {
        None
    }
}

/// Collect everything a statement produced from sqlx's `fetch_many` stream.
///
/// Callers obtain the stream from whichever executor they hold: a pool, a
/// plain connection or an open transaction.
pub async fn collect_output<R, Q>(
    mut stream: BoxStream<'_, Result<Either<Q, R>, sqlx::Error>>,
) -> Result<StatementOutput, sqlx::Error>
where
    R: RowToJson,
    Q: StatementSummary,
{
    let mut output = StatementOutput::default();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                output.rows_affected += done.affected();
                if let Some(id) = done.insert_id() {
                    output.last_insert_id = Some(id);
                }
            }
            Either::Right(row) => output.rows.push(row.to_json_map()),
        }
    }
    Ok(output)
}
