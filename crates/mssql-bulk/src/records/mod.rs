//! JSON records as bulk insert entities.
//!
//! A [`Record`] holds one decoded input object, one value per mapped property
//! in declaration order. [`entity_mapping`] turns a configured
//! [`TableMapping`] into the [`EntityMapping`] the pipeline consumes.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::config::{PropertyMapping, PropertyType, TableMapping};
use crate::core::entity::{EntityMapping, HostType, PropertyDescriptor};
use crate::core::value::{HostValue, SqlType, SqlValue};
use crate::error::{BulkError, Result};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One decoded input object.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<HostValue>,
}

/// Representation type of a declared property type.
pub fn representation(property_type: PropertyType) -> SqlType {
    match property_type {
        PropertyType::Bool => SqlType::Bool,
        PropertyType::U8 => SqlType::U8,
        PropertyType::I16 => SqlType::I16,
        PropertyType::I32 | PropertyType::Enum => SqlType::I32,
        PropertyType::I64 => SqlType::I64,
        PropertyType::F32 => SqlType::F32,
        PropertyType::F64 => SqlType::F64,
        PropertyType::Decimal => SqlType::Decimal,
        PropertyType::String => SqlType::String,
        PropertyType::Bytes => SqlType::Bytes,
        PropertyType::Uuid => SqlType::Uuid,
        PropertyType::DateTime => SqlType::DateTime,
        PropertyType::DateTimeOffset => SqlType::DateTimeOffset,
        PropertyType::Date => SqlType::Date,
        PropertyType::Time => SqlType::Time,
    }
}

fn host_type(prop: &PropertyMapping) -> HostType {
    match (prop.property_type, prop.nullable) {
        (PropertyType::Enum, false) => HostType::Enum,
        (PropertyType::Enum, true) => HostType::NullableEnum,
        (t, false) => HostType::Scalar(representation(t)),
        (t, true) => HostType::Nullable(representation(t)),
    }
}

/// Entity mapping over [`Record`]s for a configured table.
pub fn entity_mapping(mapping: &TableMapping) -> EntityMapping<Record> {
    mapping
        .properties
        .iter()
        .enumerate()
        .fold(EntityMapping::new(mapping.table_name()), |acc, (i, prop)| {
            acc.property(PropertyDescriptor::new(
                prop.column.clone(),
                host_type(prop),
                move |r: &Record| r.values.get(i).cloned().unwrap_or_else(HostValue::missing),
            ))
        })
}

/// Read a JSON array or JSON Lines file.
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    parse_input(&content)
}

/// Parse a JSON array or JSON Lines document.
pub fn parse_input(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| BulkError::record(i, e.to_string()))
        })
        .collect()
}

/// Decode input objects against a table mapping.
pub fn decode_records(mapping: &TableMapping, inputs: &[Value]) -> Result<Vec<Record>> {
    inputs
        .iter()
        .enumerate()
        .map(|(index, input)| decode_record(mapping, index, input))
        .collect()
}

fn decode_record(mapping: &TableMapping, index: usize, input: &Value) -> Result<Record> {
    let object = input
        .as_object()
        .ok_or_else(|| BulkError::record(index, "expected a JSON object"))?;

    let mut values = Vec::with_capacity(mapping.properties.len());
    for prop in &mapping.properties {
        let field = prop.field_name();
        let raw = object.get(field).filter(|v| !v.is_null());
        let value = decode_property(prop, raw)
            .map_err(|message| BulkError::record(index, format!("field '{}': {}", field, message)))?;
        values.push(value);
    }
    Ok(Record { values })
}

fn decode_property(prop: &PropertyMapping, raw: Option<&Value>) -> std::result::Result<HostValue, String> {
    let raw = match raw {
        Some(raw) => raw,
        None if prop.nullable => {
            return Ok(match prop.property_type {
                PropertyType::Enum => HostValue::NullableEnum(None),
                _ => HostValue::missing(),
            })
        }
        None => return Err("value is required".to_string()),
    };

    if prop.property_type == PropertyType::Enum {
        let code = decode_enum(prop, raw)?;
        return Ok(if prop.nullable {
            HostValue::NullableEnum(Some(code))
        } else {
            HostValue::Enum(code)
        });
    }

    let value = decode_scalar(prop.property_type, raw)?;
    Ok(if prop.nullable {
        HostValue::Nullable(Some(value))
    } else {
        HostValue::Value(value)
    })
}

fn decode_enum(prop: &PropertyMapping, raw: &Value) -> std::result::Result<i32, String> {
    match raw {
        Value::String(name) => prop
            .values
            .get(name)
            .or_else(|| {
                prop.values
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .copied()
            .ok_or_else(|| format!("unknown enum value '{}'", name)),
        Value::Number(_) => integer(raw),
        other => Err(format!("expected enum name or code, got {}", other)),
    }
}

fn decode_scalar(property_type: PropertyType, raw: &Value) -> std::result::Result<SqlValue<'static>, String> {
    let value = match property_type {
        PropertyType::Bool => match raw {
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(_) => SqlValue::Bool(integer::<i64>(raw)? != 0),
            other => return Err(format!("expected boolean, got {}", other)),
        },
        PropertyType::U8 => SqlValue::U8(integer(raw)?),
        PropertyType::I16 => SqlValue::I16(integer(raw)?),
        PropertyType::I32 | PropertyType::Enum => SqlValue::I32(integer(raw)?),
        PropertyType::I64 => SqlValue::I64(integer(raw)?),
        PropertyType::F32 => SqlValue::F32(float(raw)? as f32),
        PropertyType::F64 => SqlValue::F64(float(raw)?),
        PropertyType::Decimal => SqlValue::Decimal(decimal(raw)?),
        PropertyType::String => SqlValue::text_owned(text(raw)?.to_string()),
        PropertyType::Bytes => {
            SqlValue::bytes_owned(hex::decode(text(raw)?).map_err(|e| e.to_string())?)
        }
        PropertyType::Uuid => {
            SqlValue::Uuid(Uuid::parse_str(text(raw)?).map_err(|e| e.to_string())?)
        }
        PropertyType::DateTime => SqlValue::DateTime(datetime(text(raw)?)?),
        PropertyType::DateTimeOffset => SqlValue::DateTimeOffset(
            DateTime::parse_from_rfc3339(text(raw)?).map_err(|e| e.to_string())?,
        ),
        PropertyType::Date => SqlValue::Date(
            NaiveDate::parse_from_str(text(raw)?, "%Y-%m-%d").map_err(|e| e.to_string())?,
        ),
        PropertyType::Time => SqlValue::Time(
            NaiveTime::parse_from_str(text(raw)?, "%H:%M:%S%.f").map_err(|e| e.to_string())?,
        ),
    };
    Ok(value)
}

fn text(raw: &Value) -> std::result::Result<&str, String> {
    raw.as_str()
        .ok_or_else(|| format!("expected string, got {}", raw))
}

fn integer<T: TryFrom<i64>>(raw: &Value) -> std::result::Result<T, String> {
    let wide = match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("expected integer, got {}", n))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected integer, got '{}'", s))?,
        other => return Err(format!("expected integer, got {}", other)),
    };
    T::try_from(wide).map_err(|_| format!("integer {} out of range", wide))
}

fn float(raw: &Value) -> std::result::Result<f64, String> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("expected number, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("expected number, got '{}'", s)),
        other => Err(format!("expected number, got {}", other)),
    }
}

fn decimal(raw: &Value) -> std::result::Result<Decimal, String> {
    let repr = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("expected decimal, got {}", other)),
    };
    Decimal::from_str(&repr)
        .or_else(|_| Decimal::from_scientific(&repr))
        .map_err(|e| format!("invalid decimal '{}': {}", repr, e))
}

fn datetime(s: &str) -> std::result::Result<NaiveDateTime, String> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("invalid datetime '{}'", s))
}
