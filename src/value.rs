//! Field values
//!
//! The native value model stored in body instances and passed to and from
//! compiled expressions and library functions.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde_json::Value as Json;
use std::fmt;

use crate::vocabulary::{FieldKind, ScalarKind};

/// Serialized form of date/time values
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A single member value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    TimeSpan(Duration),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Short name of the value's kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "string",
            FieldValue::Integer(_) => "int",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Boolean(_) => "bool",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::TimeSpan(_) => "timespan",
            FieldValue::List(_) => "list",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn as_timespan(&self) -> Option<Duration> {
        match self {
            FieldValue::TimeSpan(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// JSON representation used by the body codec
    pub fn to_json(&self) -> Json {
        match self {
            FieldValue::Null => Json::Null,
            FieldValue::Text(s) => Json::String(s.clone()),
            FieldValue::Integer(i) => Json::from(*i),
            FieldValue::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            FieldValue::Boolean(b) => Json::Bool(*b),
            FieldValue::DateTime(dt) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
            FieldValue::TimeSpan(d) => Json::from(d.num_milliseconds()),
            FieldValue::List(items) => Json::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }

    /// Read a JSON value as a member of the given kind
    pub fn from_json(json: &Json, kind: FieldKind) -> Result<FieldValue, String> {
        match kind {
            FieldKind::Scalar(scalar) => scalar_from_json(json, scalar),
            FieldKind::List(element) => match json {
                Json::Null => Ok(FieldValue::List(Vec::new())),
                Json::Array(items) => items
                    .iter()
                    .map(|item| scalar_from_json(item, element))
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::List),
                other => Err(format!("expected array, found {}", other)),
            },
        }
    }
}

fn scalar_from_json(json: &Json, kind: ScalarKind) -> Result<FieldValue, String> {
    let mismatch = || format!("expected {}, found {}", kind.name(), json);

    match (kind, json) {
        (ScalarKind::Text, Json::Null) => Ok(FieldValue::Text(String::new())),
        (_, Json::Null) => Ok(FieldValue::Null),
        (ScalarKind::Text, Json::String(s)) => Ok(FieldValue::Text(s.clone())),
        (ScalarKind::Integer, Json::Number(n)) => n.as_i64().map(FieldValue::Integer).ok_or_else(mismatch),
        (ScalarKind::Decimal, Json::Number(n)) => n.as_f64().map(FieldValue::Decimal).ok_or_else(mismatch),
        (ScalarKind::Boolean, Json::Bool(b)) => Ok(FieldValue::Boolean(*b)),
        (ScalarKind::DateTime, Json::String(s)) => parse_datetime(s).map(FieldValue::DateTime).ok_or_else(mismatch),
        (ScalarKind::TimeSpan, Json::Number(n)) => n
            .as_i64()
            .and_then(Duration::try_milliseconds)
            .map(FieldValue::TimeSpan)
            .ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

/// Parse the accepted date/time spellings: the codec format, RFC 3339, or a bare date
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            FieldValue::TimeSpan(d) => write!(f, "{}ms", d.num_milliseconds()),
            FieldValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        FieldValue::DateTime(value)
    }
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        FieldValue::TimeSpan(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        FieldValue::List(value.into_iter().map(Into::into).collect())
    }
}
