//! Buffer value to TDS wire value conversion.
//!
//! The bulk load request is typed by the server's column metadata, so every
//! cell is encoded for the physical column it lands in rather than for its
//! buffer representation.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, TokenRow};

use crate::core::schema::PhysicalColumn;
use crate::core::value::{SqlType, SqlValue};
use crate::error::{BulkError, Result};
use crate::transfer::plan::{base_type, definition_scale, load_definition};

const DEFAULT_TIME_SCALE: u8 = 7;

/// Wire type of a bulk load column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal(Option<u8>),
    String,
    Binary,
    Guid,
    DateTime,
    SmallDateTime,
    Date,
    Time(u8),
    DateTime2(u8),
    DateTimeOffset(u8),
    /// Type without a dedicated encoding; follows the value.
    Other,
}

impl WireType {
    fn from_definition(definition: &str) -> Self {
        let time_scale = || {
            definition_scale(definition)
                .unwrap_or(DEFAULT_TIME_SCALE)
                .min(DEFAULT_TIME_SCALE)
        };
        match base_type(definition).to_ascii_lowercase().as_str() {
            "bit" => WireType::Bit,
            "tinyint" => WireType::TinyInt,
            "smallint" => WireType::SmallInt,
            "int" => WireType::Int,
            "bigint" => WireType::BigInt,
            "real" => WireType::Real,
            "float" => WireType::Float,
            "decimal" | "numeric" => WireType::Decimal(definition_scale(definition)),
            "char" | "varchar" | "nchar" | "nvarchar" | "sysname" => WireType::String,
            "binary" | "varbinary" => WireType::Binary,
            "uniqueidentifier" => WireType::Guid,
            "datetime" => WireType::DateTime,
            "smalldatetime" => WireType::SmallDateTime,
            "date" => WireType::Date,
            "time" => WireType::Time(time_scale()),
            "datetime2" => WireType::DateTime2(time_scale()),
            "datetimeoffset" => WireType::DateTimeOffset(time_scale()),
            _ => WireType::Other,
        }
    }
}

/// Encoder for one bulk load column.
#[derive(Debug, Clone)]
pub struct ColumnEncoder {
    column: String,
    wire: WireType,
}

impl ColumnEncoder {
    pub fn new(column: &PhysicalColumn) -> Self {
        Self {
            column: column.name.clone(),
            wire: WireType::from_definition(&load_definition(column)),
        }
    }

    /// Encode one cell.
    ///
    /// Fails with [`BulkError::Conversion`] when the value does not fit the
    /// column (integer overflow, out-of-range date, mismatched kind).
    pub fn encode(&self, value: &SqlValue<'_>) -> Result<ColumnData<'static>> {
        if let SqlValue::Null(hint) = value {
            return Ok(self.null(*hint));
        }

        let data = match self.wire {
            WireType::Bit => match value {
                SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
                other => ColumnData::Bit(Some(self.integer(other)? != 0)),
            },
            WireType::TinyInt => ColumnData::U8(Some(self.narrow(value, "tinyint")?)),
            WireType::SmallInt => ColumnData::I16(Some(self.narrow(value, "smallint")?)),
            WireType::Int => ColumnData::I32(Some(self.narrow(value, "int")?)),
            WireType::BigInt => ColumnData::I64(Some(self.integer(value)?)),
            WireType::Real => ColumnData::F32(finite_f32(self.float(value)? as f32)),
            WireType::Float => ColumnData::F64(finite_f64(self.float(value)?)),
            WireType::Decimal(scale) => ColumnData::Numeric(Some(self.numeric(value, scale)?)),
            WireType::String => match value {
                SqlValue::Text(s) => ColumnData::String(Some(Cow::Owned(s.to_string()))),
                SqlValue::Uuid(u) => ColumnData::String(Some(Cow::Owned(u.to_string()))),
                other => return Err(self.mismatch(other, "text")),
            },
            WireType::Binary => match value {
                SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.to_vec()))),
                other => return Err(self.mismatch(other, "binary")),
            },
            WireType::Guid => match value {
                SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
                SqlValue::Text(s) => {
                    let uuid = uuid::Uuid::parse_str(s)
                        .map_err(|e| BulkError::conversion(&self.column, e.to_string()))?;
                    ColumnData::Guid(Some(uuid))
                }
                other => return Err(self.mismatch(other, "uniqueidentifier")),
            },
            WireType::DateTime => {
                let (days, fragments) = datetime_parts(self.datetime(value)?);
                let days = i32::try_from(days).map_err(|_| self.out_of_range("datetime"))?;
                ColumnData::DateTime(Some(tiberius::time::DateTime::new(days, fragments)))
            }
            WireType::SmallDateTime => {
                let (days, minutes) = smalldatetime_parts(self.datetime(value)?);
                let days =
                    u16::try_from(days).map_err(|_| self.out_of_range("smalldatetime"))?;
                ColumnData::SmallDateTime(Some(tiberius::time::SmallDateTime::new(days, minutes)))
            }
            WireType::Date => {
                let dt = self.datetime(value)?;
                ColumnData::Date(Some(self.date(dt.date())?))
            }
            WireType::Time(scale) => match value {
                SqlValue::Time(t) => ColumnData::Time(Some(time(*t, scale))),
                other => {
                    let dt = self.datetime(other)?;
                    ColumnData::Time(Some(time(dt.time(), scale)))
                }
            },
            WireType::DateTime2(scale) => {
                let dt = self.datetime(value)?;
                ColumnData::DateTime2(Some(self.datetime2(dt, scale)?))
            }
            WireType::DateTimeOffset(scale) => match value {
                SqlValue::DateTimeOffset(dto) => {
                    let utc = self.datetime2(dto.naive_utc(), scale)?;
                    let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
                    ColumnData::DateTimeOffset(Some(tiberius::time::DateTimeOffset::new(
                        utc,
                        offset_minutes,
                    )))
                }
                other => {
                    let dt = self.datetime(other)?;
                    ColumnData::DateTimeOffset(Some(tiberius::time::DateTimeOffset::new(
                        self.datetime2(dt, scale)?,
                        0,
                    )))
                }
            },
            WireType::Other => self.by_value(value)?,
        };

        Ok(data)
    }

    fn null(&self, hint: SqlType) -> ColumnData<'static> {
        match self.wire {
            WireType::Bit => ColumnData::Bit(None),
            WireType::TinyInt => ColumnData::U8(None),
            WireType::SmallInt => ColumnData::I16(None),
            WireType::Int => ColumnData::I32(None),
            WireType::BigInt => ColumnData::I64(None),
            WireType::Real => ColumnData::F32(None),
            WireType::Float => ColumnData::F64(None),
            WireType::Decimal(_) => ColumnData::Numeric(None),
            WireType::String => ColumnData::String(None),
            WireType::Binary => ColumnData::Binary(None),
            WireType::Guid => ColumnData::Guid(None),
            WireType::DateTime => ColumnData::DateTime(None),
            WireType::SmallDateTime => ColumnData::SmallDateTime(None),
            WireType::Date => ColumnData::Date(None),
            WireType::Time(_) => ColumnData::Time(None),
            WireType::DateTime2(_) => ColumnData::DateTime2(None),
            WireType::DateTimeOffset(_) => ColumnData::DateTimeOffset(None),
            WireType::Other => null_for_hint(hint),
        }
    }

    fn by_value(&self, value: &SqlValue<'_>) -> Result<ColumnData<'static>> {
        let data = match value {
            SqlValue::Null(hint) => null_for_hint(*hint),
            SqlValue::Bool(b) => ColumnData::Bit(Some(*b)),
            SqlValue::U8(v) => ColumnData::U8(Some(*v)),
            SqlValue::I16(v) => ColumnData::I16(Some(*v)),
            SqlValue::I32(v) => ColumnData::I32(Some(*v)),
            SqlValue::I64(v) => ColumnData::I64(Some(*v)),
            SqlValue::F32(v) => ColumnData::F32(finite_f32(*v)),
            SqlValue::F64(v) => ColumnData::F64(finite_f64(*v)),
            SqlValue::Text(s) => ColumnData::String(Some(Cow::Owned(s.to_string()))),
            SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b.to_vec()))),
            SqlValue::Uuid(u) => ColumnData::Guid(Some(*u)),
            SqlValue::Decimal(_) => ColumnData::Numeric(Some(self.numeric(value, None)?)),
            SqlValue::DateTime(dt) => {
                ColumnData::DateTime2(Some(self.datetime2(*dt, DEFAULT_TIME_SCALE)?))
            }
            SqlValue::DateTimeOffset(dto) => {
                let utc = self.datetime2(dto.naive_utc(), DEFAULT_TIME_SCALE)?;
                let offset_minutes = (dto.offset().local_minus_utc() / 60) as i16;
                ColumnData::DateTimeOffset(Some(tiberius::time::DateTimeOffset::new(
                    utc,
                    offset_minutes,
                )))
            }
            SqlValue::Date(d) => ColumnData::Date(Some(self.date(*d)?)),
            SqlValue::Time(t) => ColumnData::Time(Some(time(*t, DEFAULT_TIME_SCALE))),
        };
        Ok(data)
    }

    fn integer(&self, value: &SqlValue<'_>) -> Result<i64> {
        match value {
            SqlValue::Bool(b) => Ok(i64::from(*b)),
            SqlValue::U8(v) => Ok(i64::from(*v)),
            SqlValue::I16(v) => Ok(i64::from(*v)),
            SqlValue::I32(v) => Ok(i64::from(*v)),
            SqlValue::I64(v) => Ok(*v),
            other => Err(self.mismatch(other, "integer")),
        }
    }

    fn narrow<T: TryFrom<i64>>(&self, value: &SqlValue<'_>, type_name: &str) -> Result<T> {
        let wide = self.integer(value)?;
        T::try_from(wide).map_err(|_| {
            BulkError::conversion(
                &self.column,
                format!("value {} out of range for {}", wide, type_name),
            )
        })
    }

    fn float(&self, value: &SqlValue<'_>) -> Result<f64> {
        match value {
            SqlValue::F32(v) => Ok(f64::from(*v)),
            SqlValue::F64(v) => Ok(*v),
            SqlValue::Decimal(d) => d.to_f64().ok_or_else(|| self.mismatch(value, "float")),
            other => self.integer(other).map(|v| v as f64),
        }
    }

    fn numeric(&self, value: &SqlValue<'_>, scale: Option<u8>) -> Result<Numeric> {
        let decimal = match value {
            SqlValue::Decimal(d) => *d,
            SqlValue::F32(v) => Decimal::try_from(*v)
                .map_err(|e| BulkError::conversion(&self.column, e.to_string()))?,
            SqlValue::F64(v) => Decimal::try_from(*v)
                .map_err(|e| BulkError::conversion(&self.column, e.to_string()))?,
            other => Decimal::from(self.integer(other)?),
        };
        Ok(to_numeric(decimal, scale))
    }

    fn datetime(&self, value: &SqlValue<'_>) -> Result<NaiveDateTime> {
        match value {
            SqlValue::DateTime(dt) => Ok(*dt),
            SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
            SqlValue::DateTimeOffset(dto) => Ok(dto.naive_local()),
            other => Err(self.mismatch(other, "date/time")),
        }
    }

    fn date(&self, date: NaiveDate) -> Result<tiberius::time::Date> {
        let days = days_between(date, base_0001());
        let days = u32::try_from(days).map_err(|_| self.out_of_range("date"))?;
        Ok(tiberius::time::Date::new(days))
    }

    fn datetime2(&self, dt: NaiveDateTime, scale: u8) -> Result<tiberius::time::DateTime2> {
        Ok(tiberius::time::DateTime2::new(
            self.date(dt.date())?,
            time(dt.time(), scale),
        ))
    }

    fn mismatch(&self, value: &SqlValue<'_>, expected: &str) -> BulkError {
        BulkError::conversion(
            &self.column,
            format!("expected {} value, got {}", expected, value.sql_type()),
        )
    }

    fn out_of_range(&self, type_name: &str) -> BulkError {
        BulkError::conversion(&self.column, format!("value out of range for {}", type_name))
    }
}

/// Encode one buffer row.
pub fn encode_row(encoders: &[ColumnEncoder], row: &[SqlValue<'_>]) -> Result<TokenRow<'static>> {
    let mut token_row = TokenRow::new();
    for (encoder, value) in encoders.iter().zip(row) {
        token_row.push(encoder.encode(value)?);
    }
    Ok(token_row)
}

fn null_for_hint(hint: SqlType) -> ColumnData<'static> {
    match hint {
        SqlType::Bool => ColumnData::Bit(None),
        SqlType::U8 => ColumnData::U8(None),
        SqlType::I16 => ColumnData::I16(None),
        SqlType::I32 => ColumnData::I32(None),
        SqlType::I64 => ColumnData::I64(None),
        SqlType::F32 => ColumnData::F32(None),
        SqlType::F64 => ColumnData::F64(None),
        SqlType::Decimal => ColumnData::Numeric(None),
        SqlType::String => ColumnData::String(None),
        SqlType::Bytes => ColumnData::Binary(None),
        SqlType::Uuid => ColumnData::Guid(None),
        SqlType::DateTime => ColumnData::DateTime2(None),
        SqlType::DateTimeOffset => ColumnData::DateTimeOffset(None),
        SqlType::Date => ColumnData::Date(None),
        SqlType::Time => ColumnData::Time(None),
    }
}

fn finite_f32(v: f32) -> Option<f32> {
    if v.is_nan() || v.is_infinite() {
        None
    } else {
        Some(v)
    }
}

fn finite_f64(v: f64) -> Option<f64> {
    if v.is_nan() || v.is_infinite() {
        None
    } else {
        Some(v)
    }
}

/// Numeric at the column's scale, rounding away extra digits.
fn to_numeric(decimal: Decimal, scale: Option<u8>) -> Numeric {
    let scale = scale.map(u32::from).unwrap_or_else(|| decimal.scale());
    let mut value = decimal.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(scale);
    Numeric::new_with_scale(value.mantissa(), value.scale() as u8)
}

fn time(t: NaiveTime, scale: u8) -> tiberius::time::Time {
    let nanos = u64::from(t.num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(t.nanosecond().min(999_999_999));
    let increments = nanos / 10u64.pow(9 - u32::from(scale));
    tiberius::time::Time::new(increments, scale)
}

/// Days since 1900-01-01 and 1/300 s ticks, rounded to the nearest tick.
/// A value that rounds up to midnight moves to the next day.
fn datetime_parts(dt: NaiveDateTime) -> (i64, u32) {
    const TICKS_PER_DAY: u64 = 300 * 86_400;

    let t = dt.time();
    let nanos = u64::from(t.num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(t.nanosecond().min(999_999_999));
    let ticks = (nanos * 3 + 5_000_000) / 10_000_000;
    let days = days_between(dt.date(), base_1900());
    if ticks >= TICKS_PER_DAY {
        (days + 1, (ticks - TICKS_PER_DAY) as u32)
    } else {
        (days, ticks as u32)
    }
}

/// Days since 1900-01-01 and minutes since midnight.
///
/// Rounds like the server: 29.998 seconds goes down, 29.999 goes up.
fn smalldatetime_parts(dt: NaiveDateTime) -> (i64, u16) {
    const MINUTES_PER_DAY: u32 = 1_440;

    let t = dt.time();
    let millis = t.num_seconds_from_midnight() * 1_000 + t.nanosecond().min(999_999_999) / 1_000_000;
    let minutes = (millis + 30_001) / 60_000;
    let days = days_between(dt.date(), base_1900());
    if minutes >= MINUTES_PER_DAY {
        (days + 1, (minutes - MINUTES_PER_DAY) as u16)
    } else {
        (days, minutes as u16)
    }
}

fn days_between(date: NaiveDate, base: NaiveDate) -> i64 {
    (date - base).num_days()
}

fn base_0001() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn base_1900() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}
