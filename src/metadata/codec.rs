//! # Value Codec
//!
//! Maps domain-level filter values to their database representation before
//! they are placed into a column condition.

use crate::constants::UNSAVED_ENTITY_ID;
use crate::error::{FindError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Representation of a primary key value in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdKind {
    #[default]
    Int,
    Uuid,
}

impl IdKind {
    /// Database id that no saved row carries, used for unsaved entity references.
    pub fn unsaved_id(self) -> Value {
        match self {
            IdKind::Int => Value::from(UNSAVED_ENTITY_ID),
            IdKind::Uuid => Value::String(uuid::Uuid::nil().to_string()),
        }
    }
}

/// Domain-to-database value mapping for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnCodec {
    /// Values are stored as-is.
    Identity,
    /// Tagged identifiers such as `"a:1"`; bare ids are accepted too.
    TaggedId { tag: String, kind: IdKind },
    /// Enum names mapped to their stored codes.
    Enum { codes: HashMap<String, i64> },
    /// RFC 3339 timestamps normalized to UTC.
    Timestamp,
    /// `YYYY-MM-DD` dates.
    Date,
    /// Array column whose elements use the inner codec.
    Array(Box<ColumnCodec>),
}

impl ColumnCodec {
    pub fn tagged_id(tag: &str) -> Self {
        ColumnCodec::TaggedId {
            tag: tag.to_string(),
            kind: IdKind::Int,
        }
    }

    pub fn enum_codes<'a>(codes: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        ColumnCodec::Enum {
            codes: codes
                .into_iter()
                .map(|(name, code)| (name.to_string(), code))
                .collect(),
        }
    }

    pub fn array_of(inner: ColumnCodec) -> Self {
        ColumnCodec::Array(Box::new(inner))
    }

    /// Array columns switch `in` to `contains` and are the only columns that accept array operators.
    pub fn is_array(&self) -> bool {
        matches!(self, ColumnCodec::Array(_))
    }

    /// Convert one domain value to its database form. `null` passes through untouched.
    pub fn to_db(&self, column: &str, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ColumnCodec::Identity => Ok(value.clone()),
            ColumnCodec::TaggedId { tag, kind } => tagged_id_to_db(column, tag, *kind, value),
            ColumnCodec::Enum { codes } => match value {
                Value::String(name) => codes
                    .get(name)
                    .map(|code| Value::from(*code))
                    .ok_or_else(|| FindError::unsupported(column, format!("unknown enum value {name}"))),
                Value::Number(_) => Ok(value.clone()),
                other => Err(FindError::unsupported(
                    column,
                    format!("expected enum name, got {other}"),
                )),
            },
            ColumnCodec::Timestamp => match value {
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|ts| Value::String(ts.with_timezone(&Utc).to_rfc3339()))
                    .map_err(|e| FindError::unsupported(column, format!("invalid timestamp {s}: {e}"))),
                other => Err(FindError::unsupported(
                    column,
                    format!("expected timestamp string, got {other}"),
                )),
            },
            ColumnCodec::Date => match value {
                Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .map_err(|e| FindError::unsupported(column, format!("invalid date {s}: {e}"))),
                other => Err(FindError::unsupported(
                    column,
                    format!("expected date string, got {other}"),
                )),
            },
            ColumnCodec::Array(inner) => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| inner.to_db(column, item))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                scalar => inner.to_db(column, scalar),
            },
        }
    }
}

fn tagged_id_to_db(column: &str, tag: &str, kind: IdKind, value: &Value) -> Result<Value> {
    let raw = match value {
        Value::Number(n) if n.as_i64() == Some(UNSAVED_ENTITY_ID) => return Ok(kind.unsaved_id()),
        Value::Number(n) if kind == IdKind::Int && n.is_i64() => return Ok(value.clone()),
        Value::String(s) => match s.split_once(':') {
            Some((prefix, rest)) if prefix == tag => rest,
            Some(_) => {
                return Err(FindError::InvalidId {
                    entity: format!("tag '{tag}'"),
                    value: s.clone(),
                })
            }
            None => s.as_str(),
        },
        other => {
            return Err(FindError::InvalidId {
                entity: format!("tag '{tag}' ({column})"),
                value: other.to_string(),
            })
        }
    };
    match kind {
        IdKind::Int => raw.parse::<i64>().map(Value::from).map_err(|_| FindError::InvalidId {
            entity: format!("tag '{tag}'"),
            value: raw.to_string(),
        }),
        IdKind::Uuid => uuid::Uuid::parse_str(raw)
            .map(|id| Value::String(id.to_string()))
            .map_err(|_| FindError::InvalidId {
                entity: format!("tag '{tag}'"),
                value: raw.to_string(),
            }),
    }
}
