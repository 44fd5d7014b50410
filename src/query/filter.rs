//! Column predicates. Filters on one descriptor are AND-ed together; the
//! operator set is closed so every backend can map it one-to-one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::result::QueryError;

/// A single comparable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(v: DateTime<Utc>) -> Self {
        Scalar::Timestamp(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

impl Scalar {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::Float(f) => serde_json::Value::from(*f),
            Scalar::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Scalar::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Timestamp(_) => "timestamp",
            Scalar::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl FilterOp {
    /// Unknown names fall back to `Eq`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "neq" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "like" => FilterOp::Like,
            "ilike" => FilterOp::Ilike,
            "in" => FilterOp::In,
            "is" => FilterOp::Is,
            _ => FilterOp::Eq,
        }
    }
}

impl<'de> Deserialize<'de> for FilterOp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(FilterOp::from_name).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Many(Vec<Scalar>),
    One(Scalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    #[serde(default)]
    pub op: FilterOp,
    pub value: FilterValue,
}

impl Filter {
    fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Scalar>) -> Self {
        Self {
            column: column.into(),
            op,
            value: FilterValue::One(value.into()),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    pub fn neq(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, FilterOp::Neq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, FilterOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, FilterOp::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, FilterOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::new(column, FilterOp::Lte, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOp::Like, pattern.into())
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, FilterOp::Ilike, pattern.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, FilterOp::Is, Scalar::Null)
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Self {
            column: column.into(),
            op: FilterOp::In,
            value: FilterValue::Many(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Checks the operator/value pairing before anything reaches a backend.
    pub fn validate(&self) -> Result<(), QueryError> {
        let invalid = |reason: String| QueryError::InvalidFilter {
            column: self.column.clone(),
            reason,
        };
        match (&self.op, &self.value) {
            (FilterOp::In, FilterValue::Many(_)) => Ok(()),
            (FilterOp::In, FilterValue::One(_)) => Err(invalid("`in` requires a list".into())),
            (op, FilterValue::Many(_)) => {
                Err(invalid(format!("`{:?}` does not accept a list", op).to_lowercase()))
            }
            (FilterOp::Is, FilterValue::One(Scalar::Null | Scalar::Bool(_))) => Ok(()),
            (FilterOp::Is, FilterValue::One(v)) => Err(invalid(format!(
                "`is` compares against null or a boolean, got {}",
                v.kind()
            ))),
            (FilterOp::Like | FilterOp::Ilike, FilterValue::One(Scalar::Text(_))) => Ok(()),
            (FilterOp::Like | FilterOp::Ilike, FilterValue::One(v)) => {
                Err(invalid(format!("pattern must be text, got {}", v.kind())))
            }
            (_, FilterValue::One(Scalar::Null)) => {
                Err(invalid("null only compares with `is`".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Escapes the LIKE wildcards (`%`, `_`) and the escape character itself so
/// user input only ever matches literally.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%input%` with the input escaped.
pub fn contains_pattern(input: &str) -> String {
    format!("%{}%", escape_like(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_wildcards() {
        assert_eq!(escape_like("50%off"), "50\\%off");
        assert_eq!(escape_like("snake_case"), "snake\\_case");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(contains_pattern("x%"), "%x\\%%");
    }

    #[test]
    fn unknown_operator_defaults_to_eq() {
        assert_eq!(FilterOp::from_name("between"), FilterOp::Eq);
        assert_eq!(FilterOp::from_name("ILIKE"), FilterOp::Ilike);

        let f: Filter = serde_json::from_value(serde_json::json!({
            "column": "author_id",
            "value": 7
        }))
        .unwrap();
        assert_eq!(f.op, FilterOp::Eq);
        assert_eq!(f.value, FilterValue::One(Scalar::Int(7)));
    }

    #[test]
    fn in_requires_a_list() {
        let bad = Filter {
            column: "id".into(),
            op: FilterOp::In,
            value: FilterValue::One(Scalar::Int(1)),
        };
        assert!(bad.validate().is_err());
        assert!(Filter::is_in("id", [1i64, 2]).validate().is_ok());
        assert!(Filter::is_in("id", Vec::<i64>::new()).validate().is_ok());
    }

    #[test]
    fn is_only_takes_null_or_bool() {
        assert!(Filter::is_null("deleted_at").validate().is_ok());
        let bad = Filter {
            column: "deleted_at".into(),
            op: FilterOp::Is,
            value: FilterValue::One(Scalar::Int(3)),
        };
        assert!(bad.validate().is_err());
        assert!(Filter::eq("deleted_at", Scalar::Null).validate().is_err());
    }
}
