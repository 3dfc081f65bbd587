//! Data types for SimplDB
//!
//! This module defines the SQL column types and how values are coerced into them.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::Value;

/// SQL Data Types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit integer
    Integer,
    /// Variable-length character string with max length
    Varchar(usize),
    /// Double-precision floating point
    Float,
    /// Boolean type
    Boolean,
    /// Calendar date, `YYYY-MM-DD`
    Date,
    /// Unlimited text
    Text,
}

impl DataType {
    /// Maximum length for VARCHAR columns
    pub fn max_length(&self) -> Option<usize> {
        match self {
            DataType::Varchar(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a value into this type.
    ///
    /// NULL passes through unchanged. Returns `None` when the value has no
    /// representation in this type.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }

        match self {
            DataType::Integer => match value {
                Value::Integer(i) => Some(Value::Integer(*i)),
                Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                    Some(Value::Integer(*f as i64))
                }
                Value::Text(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
                _ => None,
            },
            DataType::Float => match value {
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                Value::Float(f) => Some(Value::Float(*f)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Value::Float),
                _ => None,
            },
            DataType::Varchar(_) | DataType::Text => Some(Value::Text(value.to_string())),
            DataType::Boolean => match value {
                Value::Boolean(b) => Some(Value::Boolean(*b)),
                Value::Integer(i) => Some(Value::Boolean(*i != 0)),
                Value::Text(s) => parse_bool(s).map(Value::Boolean),
                _ => None,
            },
            DataType::Date => match value {
                Value::Date(d) => Some(Value::Date(*d)),
                Value::Text(s) => parse_date(s).map(Value::Date),
                _ => None,
            },
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "f" | "n" => Some(false),
        _ => None,
    }
}

/// Parse `YYYY-MM-DD`, or an ISO datetime whose date part is kept
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Date => write!(f, "DATE"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coercion() {
        let t = DataType::Integer;
        assert_eq!(t.coerce(&Value::from(" 42 ")), Some(Value::Integer(42)));
        assert_eq!(t.coerce(&Value::Float(3.0)), Some(Value::Integer(3)));
        assert_eq!(t.coerce(&Value::Float(3.5)), None);
        assert_eq!(t.coerce(&Value::Boolean(true)), None);
        assert_eq!(t.coerce(&Value::from("abc")), None);
        assert_eq!(t.coerce(&Value::Null), Some(Value::Null));
    }

    #[test]
    fn test_boolean_coercion() {
        let t = DataType::Boolean;
        assert_eq!(t.coerce(&Value::from("Yes")), Some(Value::Boolean(true)));
        assert_eq!(t.coerce(&Value::from("f")), Some(Value::Boolean(false)));
        assert_eq!(t.coerce(&Value::Integer(0)), Some(Value::Boolean(false)));
        assert_eq!(t.coerce(&Value::from("maybe")), None);
    }

    #[test]
    fn test_date_coercion() {
        let t = DataType::Date;
        let expected = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(t.coerce(&Value::from("2024-03-09")), Some(expected.clone()));
        assert_eq!(t.coerce(&Value::from("2024-03-09T10:30:00")), Some(expected));
        assert_eq!(t.coerce(&Value::from("2024-13-01")), None);
        assert_eq!(t.coerce(&Value::Integer(20240309)), None);
    }

    #[test]
    fn test_text_coercion() {
        assert_eq!(
            DataType::Varchar(10).coerce(&Value::Integer(7)),
            Some(Value::from("7"))
        );
        assert_eq!(
            DataType::Text.coerce(&Value::Boolean(true)),
            Some(Value::from("TRUE"))
        );
        assert_eq!(DataType::Float.coerce(&Value::from("nan")), None);
    }
}
