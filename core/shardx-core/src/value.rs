//! Scalar values flowing through conditions, parameters and result rows.

use std::cmp::Ordering;
use std::fmt;

/// One result row, columns in projection order.
pub type Row = Vec<ScalarValue>;

/// Represents a scalar value bound to a parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Integral view of the value; text is parsed, integral floats are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int64(v) => Some(*v),
            ScalarValue::Float64(v) if v.fract() == 0.0 => Some(*v as i64),
            ScalarValue::Utf8(s) => s.trim().parse().ok(),
            ScalarValue::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(*v),
            ScalarValue::Utf8(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Int64(_) | ScalarValue::Float64(_) => 2,
            ScalarValue::Utf8(_) => 3,
        }
    }

    /// Total order over values. NULL sorts below everything here; callers
    /// that care about NULL placement handle it before calling this.
    pub fn compare(&self, other: &ScalarValue) -> Ordering {
        match (self, other) {
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => a.cmp(b),
            (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => a.cmp(b),
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => a.cmp(b),
            (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
            (a, b) if a.type_rank() == 2 && b.type_rank() == 2 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    /// Render as a SQL literal for text rewriting.
    pub fn to_sql_literal(&self) -> String {
        match self {
            ScalarValue::Null => "NULL".to_string(),
            ScalarValue::Int64(v) => v.to_string(),
            ScalarValue::Float64(v) => v.to_string(),
            ScalarValue::Utf8(s) => format!("'{}'", s.replace('\'', "''")),
            ScalarValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    /// Append a self-delimiting encoding to a byte key used for hashing groups.
    pub fn append_to_key(&self, key: &mut Vec<u8>) {
        match self {
            ScalarValue::Null => key.push(0),
            ScalarValue::Int64(v) => {
                key.push(1);
                key.extend_from_slice(&v.to_le_bytes());
            }
            ScalarValue::Float64(v) => {
                // integral floats collide with the equal integer on purpose
                if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    key.push(1);
                    key.extend_from_slice(&(*v as i64).to_le_bytes());
                } else {
                    key.push(2);
                    key.extend_from_slice(&v.to_le_bytes());
                }
            }
            ScalarValue::Utf8(s) => {
                key.push(3);
                key.extend_from_slice(&(s.len() as u32).to_le_bytes());
                key.extend_from_slice(s.as_bytes());
            }
            ScalarValue::Boolean(b) => {
                key.push(4);
                key.push(u8::from(*b));
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => write!(f, "{v}"),
            ScalarValue::Utf8(s) => write!(f, "{s}"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int64(i64::from(v))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float64(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Utf8(v)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ScalarValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cross_type_compare() {
        assert_eq!(
            ScalarValue::Int64(2).compare(&ScalarValue::Float64(2.5)),
            Ordering::Less
        );
        assert_eq!(
            ScalarValue::Float64(3.0).compare(&ScalarValue::Int64(3)),
            Ordering::Equal
        );
    }

    #[test]
    fn text_and_mixed_compare() {
        assert_eq!(
            ScalarValue::from("a").compare(&ScalarValue::from("b")),
            Ordering::Less
        );
        assert_eq!(
            ScalarValue::Int64(100).compare(&ScalarValue::from("1")),
            Ordering::Less
        );
    }

    #[test]
    fn literal_rendering_escapes_quotes() {
        assert_eq!(ScalarValue::from("O'Neil").to_sql_literal(), "'O''Neil'");
        assert_eq!(ScalarValue::Int64(-7).to_sql_literal(), "-7");
        assert_eq!(ScalarValue::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn as_i64_parses_text() {
        assert_eq!(ScalarValue::from(" 42 ").as_i64(), Some(42));
        assert_eq!(ScalarValue::Float64(4.0).as_i64(), Some(4));
        assert_eq!(ScalarValue::Float64(4.5).as_i64(), None);
    }

    #[test]
    fn group_key_integral_float_matches_integer() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        ScalarValue::Int64(7).append_to_key(&mut a);
        ScalarValue::Float64(7.0).append_to_key(&mut b);
        assert_eq!(a, b);
    }
}
