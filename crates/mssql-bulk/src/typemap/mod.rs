//! Registry of supported SQL Server column types.
//!
//! Maps a physical type name, as reported by the catalog, to the buffer
//! representation used for it and the zero value substituted into unmapped
//! non-nullable columns. The table is built once and is read-only.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::core::value::{SqlType, SqlValue};
use crate::error::{BulkError, Result};

/// A supported physical type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry {
    /// Physical type name (lowercase).
    pub type_name: &'static str,
    /// Buffer representation.
    pub representation: SqlType,
    /// Value written for unmapped non-nullable columns.
    pub zero_value: SqlValue<'static>,
}

static REGISTRY: Lazy<HashMap<&'static str, TypeEntry>> = Lazy::new(|| {
    const TYPES: &[(&str, SqlType)] = &[
        ("image", SqlType::Bytes),
        ("text", SqlType::String),
        ("uniqueidentifier", SqlType::Uuid),
        ("date", SqlType::DateTime),
        ("time", SqlType::Time),
        ("datetime2", SqlType::DateTime),
        ("datetimeoffset", SqlType::DateTimeOffset),
        ("tinyint", SqlType::U8),
        ("smallint", SqlType::I16),
        ("int", SqlType::I32),
        ("smalldatetime", SqlType::DateTime),
        ("real", SqlType::F32),
        ("money", SqlType::Decimal),
        ("datetime", SqlType::DateTime),
        ("float", SqlType::F64),
        ("ntext", SqlType::String),
        ("bit", SqlType::Bool),
        ("decimal", SqlType::Decimal),
        ("numeric", SqlType::Decimal),
        ("smallmoney", SqlType::Decimal),
        ("bigint", SqlType::I64),
        ("varbinary", SqlType::Bytes),
        ("varchar", SqlType::String),
        ("binary", SqlType::Bytes),
        ("char", SqlType::String),
        ("timestamp", SqlType::Bytes),
        ("nvarchar", SqlType::String),
        ("nchar", SqlType::String),
        ("xml", SqlType::String),
        ("sysname", SqlType::String),
    ];

    TYPES
        .iter()
        .map(|&(type_name, representation)| {
            let entry = TypeEntry {
                type_name,
                representation,
                zero_value: zero_value(representation),
            };
            (type_name, entry)
        })
        .collect()
});

/// 0001-01-01 00:00:00, the zero point of the date/time types.
fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

/// Zero value of a representation type.
fn zero_value(sql_type: SqlType) -> SqlValue<'static> {
    match sql_type {
        SqlType::Bool => SqlValue::Bool(false),
        SqlType::U8 => SqlValue::U8(0),
        SqlType::I16 => SqlValue::I16(0),
        SqlType::I32 => SqlValue::I32(0),
        SqlType::I64 => SqlValue::I64(0),
        SqlType::F32 => SqlValue::F32(0.0),
        SqlType::F64 => SqlValue::F64(0.0),
        SqlType::Decimal => SqlValue::Decimal(Decimal::ZERO),
        SqlType::String => SqlValue::text_owned(String::new()),
        SqlType::Bytes => SqlValue::bytes_owned(Vec::new()),
        SqlType::Uuid => SqlValue::Uuid(Uuid::nil()),
        SqlType::DateTime => SqlValue::DateTime(epoch()),
        SqlType::DateTimeOffset => SqlValue::DateTimeOffset(
            DateTime::<FixedOffset>::from_naive_utc_and_offset(epoch(), Utc.fix()),
        ),
        SqlType::Date => SqlValue::Date(epoch().date()),
        SqlType::Time => SqlValue::Time(NaiveTime::MIN),
    }
}

/// Look up a physical type by name.
///
/// Names are matched ASCII case-insensitively; the catalog reports them in
/// lowercase. Fails with [`BulkError::UnsupportedType`] for unknown names.
pub fn lookup(type_name: &str) -> Result<&'static TypeEntry> {
    let key = type_name.to_ascii_lowercase();
    REGISTRY
        .get(key.as_str())
        .ok_or_else(|| BulkError::unsupported_type("", type_name))
}

/// Look up the type of a specific column, naming the column on failure.
pub fn lookup_column(column: &str, type_name: &str) -> Result<&'static TypeEntry> {
    lookup(type_name).map_err(|_| BulkError::unsupported_type(column, type_name))
}
