//! Field type vocabulary
//!
//! The closed set of type names a schema field may declare. Lookup is
//! case-insensitive; list variants are written `list<T>` or `T[]`.

use std::fmt;

use crate::value::FieldValue;

/// Scalar member kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    TimeSpan,
}

impl ScalarKind {
    /// Look up a scalar type name
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Some(Self::Text),
            "int" | "integer" | "long" => Some(Self::Integer),
            "decimal" | "number" | "double" | "float" => Some(Self::Decimal),
            "bool" | "boolean" => Some(Self::Boolean),
            "datetime" | "date" => Some(Self::DateTime),
            "timespan" | "duration" => Some(Self::TimeSpan),
            _ => None,
        }
    }

    /// Canonical vocabulary name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "int",
            Self::Decimal => "decimal",
            Self::Boolean => "bool",
            Self::DateTime => "datetime",
            Self::TimeSpan => "timespan",
        }
    }

    /// Value of a freshly constructed member of this kind
    pub fn default_value(&self) -> FieldValue {
        match self {
            Self::Text => FieldValue::Text(String::new()),
            Self::Integer => FieldValue::Integer(0),
            Self::Decimal => FieldValue::Decimal(0.0),
            Self::Boolean => FieldValue::Boolean(false),
            Self::DateTime => FieldValue::Null,
            Self::TimeSpan => FieldValue::TimeSpan(chrono::Duration::zero()),
        }
    }

    /// Convert a value into this kind, or hand it back if it does not fit.
    ///
    /// Integers widen into decimals; null text becomes the empty string.
    pub fn coerce(&self, value: FieldValue) -> Result<FieldValue, FieldValue> {
        match (self, value) {
            (Self::Text, FieldValue::Null) => Ok(FieldValue::Text(String::new())),
            (_, FieldValue::Null) => Ok(FieldValue::Null),
            (Self::Text, v @ FieldValue::Text(_)) => Ok(v),
            (Self::Integer, v @ FieldValue::Integer(_)) => Ok(v),
            (Self::Decimal, v @ FieldValue::Decimal(_)) => Ok(v),
            (Self::Decimal, FieldValue::Integer(i)) => Ok(FieldValue::Decimal(i as f64)),
            (Self::Boolean, v @ FieldValue::Boolean(_)) => Ok(v),
            (Self::DateTime, v @ FieldValue::DateTime(_)) => Ok(v),
            (Self::TimeSpan, v @ FieldValue::TimeSpan(_)) => Ok(v),
            (_, other) => Err(other),
        }
    }
}

/// Member kind: a scalar or a list of scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar(ScalarKind),
    List(ScalarKind),
}

impl FieldKind {
    pub const TEXT: FieldKind = FieldKind::Scalar(ScalarKind::Text);
    pub const INTEGER: FieldKind = FieldKind::Scalar(ScalarKind::Integer);
    pub const DECIMAL: FieldKind = FieldKind::Scalar(ScalarKind::Decimal);
    pub const BOOLEAN: FieldKind = FieldKind::Scalar(ScalarKind::Boolean);
    pub const DATETIME: FieldKind = FieldKind::Scalar(ScalarKind::DateTime);
    pub const TIMESPAN: FieldKind = FieldKind::Scalar(ScalarKind::TimeSpan);

    /// Look up a vocabulary type name
    pub fn parse(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();

        if let Some(inner) = lowered
            .strip_prefix("list<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return ScalarKind::parse(inner).map(Self::List);
        }
        if let Some(inner) = lowered.strip_suffix("[]") {
            return ScalarKind::parse(inner).map(Self::List);
        }

        ScalarKind::parse(&lowered).map(Self::Scalar)
    }

    /// Value of a freshly constructed member of this kind
    pub fn default_value(&self) -> FieldValue {
        match self {
            Self::Scalar(scalar) => scalar.default_value(),
            Self::List(_) => FieldValue::List(Vec::new()),
        }
    }

    /// Whether a value can be stored as-is in a member of this kind
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => true,
            (Self::Scalar(ScalarKind::Text), FieldValue::Text(_))
            | (Self::Scalar(ScalarKind::Integer), FieldValue::Integer(_))
            | (Self::Scalar(ScalarKind::Decimal), FieldValue::Decimal(_))
            | (Self::Scalar(ScalarKind::Boolean), FieldValue::Boolean(_))
            | (Self::Scalar(ScalarKind::DateTime), FieldValue::DateTime(_))
            | (Self::Scalar(ScalarKind::TimeSpan), FieldValue::TimeSpan(_)) => true,
            (Self::List(element), FieldValue::List(items)) => items
                .iter()
                .all(|item| FieldKind::Scalar(*element).accepts(item)),
            _ => false,
        }
    }

    /// Convert a value into this kind, or hand it back if it does not fit
    pub fn coerce(&self, value: FieldValue) -> Result<FieldValue, FieldValue> {
        match (self, value) {
            (Self::Scalar(scalar), value) => scalar.coerce(value),
            (Self::List(_), FieldValue::Null) => Ok(FieldValue::List(Vec::new())),
            (Self::List(element), FieldValue::List(items)) => {
                let original = items.clone();
                items
                    .into_iter()
                    .map(|item| element.coerce(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::List)
                    .map_err(|_| FieldValue::List(original))
            }
            (Self::List(_), other) => Err(other),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{}", scalar.name()),
            Self::List(element) => write!(f, "list<{}>", element.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(FieldKind::parse("String"), Some(FieldKind::TEXT));
        assert_eq!(FieldKind::parse("DATETIME"), Some(FieldKind::DATETIME));
        assert_eq!(FieldKind::parse("  Bool "), Some(FieldKind::BOOLEAN));
    }

    #[test]
    fn test_list_variants() {
        assert_eq!(
            FieldKind::parse("List<Int>"),
            Some(FieldKind::List(ScalarKind::Integer))
        );
        assert_eq!(
            FieldKind::parse("string[]"),
            Some(FieldKind::List(ScalarKind::Text))
        );
        assert_eq!(FieldKind::parse("list<list<int>>"), None);
    }

    #[test]
    fn test_unknown_names() {
        assert_eq!(FieldKind::parse("uuid"), None);
        assert_eq!(FieldKind::parse(""), None);
    }

    #[test]
    fn test_text_defaults_to_empty_string() {
        assert_eq!(FieldKind::TEXT.default_value(), FieldValue::Text(String::new()));
        assert_eq!(
            FieldKind::TEXT.coerce(FieldValue::Null),
            Ok(FieldValue::Text(String::new()))
        );
    }

    #[test]
    fn test_integer_widens_to_decimal() {
        assert_eq!(
            FieldKind::DECIMAL.coerce(FieldValue::Integer(3)),
            Ok(FieldValue::Decimal(3.0))
        );
        assert!(FieldKind::INTEGER.coerce(FieldValue::Decimal(3.5)).is_err());
    }

    #[test]
    fn test_list_accepts_only_matching_elements() {
        let kind = FieldKind::List(ScalarKind::Integer);
        assert!(kind.accepts(&FieldValue::List(vec![FieldValue::Integer(1)])));
        assert!(!kind.accepts(&FieldValue::List(vec![FieldValue::Text("x".into())])));
    }
}
