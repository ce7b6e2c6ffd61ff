//! # Runtime Values
//!
//! `Value` is the scalar produced by expression evaluation and returned to
//! callers collecting query results. Text is kept inline in a `SmallVec`
//! since stored strings are bounded by `MAX_STRING_SIZE` and most are short.
//!
//! ## Comparison
//!
//! - `sql_cmp` follows SQL semantics: any NULL operand yields `None`, INT and
//!   DECIMAL compare numerically, text compares bytewise.
//! - `sort_cmp` is a total order used by Sort and Aggregate grouping: NULLs
//!   sort first and compare equal to each other.

use std::cmp::Ordering;

use smallvec::SmallVec;

use super::ValueKind;

pub type TextBuf = SmallVec<[u8; 24]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Decimal(f64),
    Text(TextBuf),
    Bool(bool),
}

impl Value {
    pub fn text(s: &str) -> Self {
        Value::Text(SmallVec::from_slice(s.as_bytes()))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Int(_) => ValueKind::Int,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::Text(_) => ValueKind::Text,
            Value::Bool(_) => ValueKind::Bool,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// `true` only for a non-null boolean true (three-valued filter semantics).
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_slice().cmp(b.as_slice())),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (a, b) => {
                let (a, b) = (a.as_decimal()?, b.as_decimal()?);
                a.partial_cmp(&b)
            }
        }
    }

    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.sql_cmp(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Text(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_cmp_null_is_unknown() {
        assert_eq!(Value::Null.sql_cmp(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).sql_cmp(&Value::Null), None);
    }

    #[test]
    fn test_sql_cmp_mixed_numeric() {
        assert_eq!(
            Value::Int(2).sql_cmp(&Value::Decimal(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Decimal(3.0).sql_cmp(&Value::Int(3)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_sort_cmp_nulls_first() {
        let mut values = vec![Value::Int(3), Value::Null, Value::Int(1)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::Null, Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_text_display_and_as_str() {
        let v = Value::from("abc");
        assert_eq!(v.as_str(), Some("abc"));
        assert_eq!(v.to_string(), "abc");
        assert_eq!(v.kind(), ValueKind::Text);
    }
}
