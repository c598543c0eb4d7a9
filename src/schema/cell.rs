//! # Cells, values and column types
//!
//! A cell is either a value or the null sentinel. Cells produced by conversion
//! functions are strings (`Cell<String>`), cells decoded back from an output
//! file are typed (`Cell<Value>`).
//!
//! ## Column types
//! -----------------
//! The set of column types is closed. Each variant of [`ColumnType`] has an
//! explicit decoder:
//!
//! | Type        | Rust value          | Encoding                            |
//! |-------------|---------------------|-------------------------------------|
//! | `Int`       | `i64`               | decimal                             |
//! | `Float`     | `f64`               | anything `f64::from_str` accepts    |
//! | `Str`       | `String`            | raw token                           |
//! | `Timestamp` | [`hifitime::Epoch`] | `2017-01-14T00:31:55 UTC`           |
//! | `FloatSeq`  | `Vec<f64>`          | floats separated by `;`             |
//!
//! The null sentinel `\N` is checked before any decoding, so a `Str` column
//! never decodes the sentinel as a two-character string.
use std::fmt;
use std::str::FromStr;

use hifitime::Epoch;
use itertools::Itertools;

use crate::constants::{NULL_SENTINEL, SEQUENCE_SEPARATOR};

/// A value or the null sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell<T> {
    Null,
    Value(T),
}

impl<T> Cell<T> {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Cell::Null => None,
            Cell::Value(v) => Some(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Cell::Null => None,
            Cell::Value(v) => Some(v),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Cell<U> {
        match self {
            Cell::Null => Cell::Null,
            Cell::Value(v) => Cell::Value(f(v)),
        }
    }
}

impl<T> From<Option<T>> for Cell<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Cell::Null, Cell::Value)
    }
}

impl From<String> for Cell<String> {
    fn from(value: String) -> Self {
        Cell::Value(value)
    }
}

impl From<&str> for Cell<String> {
    fn from(value: &str) -> Self {
        Cell::Value(value.to_string())
    }
}

impl<T: fmt::Display> fmt::Display for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str(NULL_SENTINEL),
            Cell::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Declared type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int,
    Float,
    Str,
    Timestamp,
    FloatSeq,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int => "integer",
            ColumnType::Float => "float",
            ColumnType::Str => "string",
            ColumnType::Timestamp => "timestamp",
            ColumnType::FloatSeq => "sequence-of-float",
        }
    }

    /// Cast a raw (non-null) token to this type.
    ///
    /// Return
    /// ----------
    /// * `None` when the token is not a valid representation of the type.
    pub fn decode(&self, raw: &str) -> Option<Value> {
        match self {
            ColumnType::Int => raw.trim().parse::<i64>().ok().map(Value::Int),
            ColumnType::Float => raw.trim().parse::<f64>().ok().map(Value::Float),
            ColumnType::Str => Some(Value::Str(raw.to_string())),
            ColumnType::Timestamp => Epoch::from_str(raw.trim()).ok().map(Value::Timestamp),
            ColumnType::FloatSeq => {
                if raw.trim().is_empty() {
                    return Some(Value::FloatSeq(Vec::new()));
                }
                raw.split(SEQUENCE_SEPARATOR)
                    .map(|item| item.trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .ok()
                    .map(Value::FloatSeq)
            }
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded, typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(Epoch),
    FloatSeq(Vec<f64>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::FloatSeq(v) => write!(f, "{}", v.iter().join(";")),
        }
    }
}
