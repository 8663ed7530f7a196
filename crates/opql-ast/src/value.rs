use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dynamically typed runtime value, the Rust realization of the dynamic
/// typing spec.md §9 calls for ("Dynamic typing of values in TS source
/// becomes a tagged `Value` variant").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, enum_as_inner::EnumAsInner)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_timestamp_like(s),
            _ => None,
        }
    }

    /// Total-order comparison per spec.md §4.9:
    /// (a) strict equal wins, (b) nulls sort less than non-null,
    /// (c) numbers compared numerically, (d) ISO-8601-looking strings
    /// compared as timestamps when both sides parse, (e) otherwise
    /// lowercase string compare.
    pub fn compare(&self, other: &Value) -> Ordering {
        if let Some(eq) = self.strict_eq(other) {
            if eq {
                return Ordering::Equal;
            }
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => {
                if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
                    return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                }
                if let (Some(a), Some(b)) = (self.as_timestamp(), other.as_timestamp()) {
                    return a.cmp(&b);
                }
                self.lowercase_text().cmp(&other.lowercase_text())
            }
        }
    }

    fn strict_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(true),
            (Value::Bool(a), Value::Bool(b)) => Some(a == b),
            (Value::Int(a), Value::Int(b)) => Some(a == b),
            (Value::Float(a), Value::Float(b)) => Some(a == b),
            (Value::Text(a), Value::Text(b)) => Some(a == b),
            (Value::Date(a), Value::Date(b)) => Some(a == b),
            _ => None,
        }
    }

    fn lowercase_text(&self) -> String {
        match self {
            Value::Text(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Parses `s` as a timestamp if it looks ISO-8601-ish; tries RFC 3339 first,
/// then a bare date, per spec.md §9's note on the `Date` variant.
pub fn parse_timestamp_like(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0)?,
            Utc,
        ));
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nulls_sort_less() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), Ordering::Less);
        assert_eq!(Value::Int(1).compare(&Value::Null), Ordering::Greater);
    }

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(Value::Int(2).compare(&Value::Float(10.0)), Ordering::Less);
    }

    #[test]
    fn timestamp_strings_compare_as_dates() {
        let a = Value::Text("2024-01-01T00:00:00Z".into());
        let b = Value::Text("2024-06-01T00:00:00Z".into());
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn non_date_strings_compare_lowercased() {
        let a = Value::Text("Banana".into());
        let b = Value::Text("apple".into());
        assert_eq!(a.compare(&b), Ordering::Greater);
    }
}
