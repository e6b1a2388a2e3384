//! The primary value model.
//!
//! [`Value`] is the tagged union of SQL scalar values flowing through the
//! engine. Comparison follows SQL three-valued logic: any NULL operand
//! yields [`Ternary::Unknown`]. Strings are parsed to numbers or datetimes
//! on demand when compared against them, since records loaded from
//! delimited files carry every field as a string.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Three-valued logic result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    True,
    False,
    Unknown,
}

impl Ternary {
    pub fn from_bool(b: bool) -> Self {
        if b { Ternary::True } else { Ternary::False }
    }

    /// True/False from a definite comparison, Unknown from `None`.
    pub fn from_option(b: Option<bool>) -> Self {
        match b {
            Some(true) => Ternary::True,
            Some(false) => Ternary::False,
            None => Ternary::Unknown,
        }
    }

    pub fn is_true(self) -> bool {
        self == Ternary::True
    }

    pub fn not(self) -> Self {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }

    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::True, Ternary::True) => Ternary::True,
            _ => Ternary::Unknown,
        }
    }

    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::False, Ternary::False) => Ternary::False,
            _ => Ternary::Unknown,
        }
    }
}

impl fmt::Display for Ternary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ternary::True => write!(f, "TRUE"),
            Ternary::False => write!(f, "FALSE"),
            Ternary::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value (true/false)
    Boolean(bool),
    /// Three-valued logic value
    Ternary(Ternary),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit IEEE-754 float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Absolute instant, nanosecond resolution
    Datetime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Ternary(_) => "TERNARY",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Datetime(_) => "DATETIME",
        }
    }

    /// The value as an integer, parsing strings and integral floats.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// The value as a float, parsing strings on demand.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// The value as an absolute instant, parsing strings on demand.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Datetime(dt) => Some(*dt),
            Value::String(s) => parse_datetime(s.trim()),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Conversion to three-valued logic for predicate contexts.
    pub fn as_ternary(&self) -> Ternary {
        match self {
            Value::Boolean(b) => Ternary::from_bool(*b),
            Value::Ternary(t) => *t,
            Value::Integer(i) => Ternary::from_bool(*i != 0),
            Value::Float(f) => Ternary::from_bool(*f != 0.0),
            Value::String(s) => match s.trim().to_uppercase().as_str() {
                "TRUE" | "1" => Ternary::True,
                "FALSE" | "0" => Ternary::False,
                _ => Ternary::Unknown,
            },
            _ => Ternary::Unknown,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Ternary(t) => write!(f, "{}", t),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Datetime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// Parse a datetime from its accepted textual forms: RFC 3339,
/// `YYYY-MM-DD HH:MM:SS[.fff]`, and `YYYY-MM-DD`. Naive forms are taken
/// as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Compare two values with on-demand coercion.
///
/// Returns `None` when either operand is NULL or the operands are not
/// comparable; predicate contexts map that to [`Ternary::Unknown`].
/// Coercion order: number, datetime, boolean, string.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }

    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        return Some(a.cmp(b));
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (left.as_datetime(), right.as_datetime()) {
        return Some(a.cmp(&b));
    }
    match (left, right) {
        (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
        (Value::Ternary(a), Value::Ternary(b)) => {
            if a == b {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

/// Three-valued equality.
pub fn equals(left: &Value, right: &Value) -> Ternary {
    Ternary::from_option(compare(left, right).map(|ord| ord == Ordering::Equal))
}

// Serialized comparison keys follow the same coercion order as compare():
// a string that parses as a number must land in the same partition as the
// number itself. NULL serializes to a sentinel equal only to itself.
const KEY_NULL: &str = "[N]";

/// Canonical textual encoding of one value for use in partition and
/// set-operation keys.
pub fn serialize_value(value: &Value) -> String {
    match value {
        Value::Null => KEY_NULL.to_string(),
        Value::Ternary(Ternary::Unknown) => "[U]".to_string(),
        Value::Boolean(b) => format!("[B]{}", b),
        Value::Ternary(t) => format!("[B]{}", t.is_true()),
        _ => {
            if let Some(i) = value.as_integer() {
                format!("[I]{}", i)
            } else if let Some(f) = value.as_float() {
                format!("[F]{}", f)
            } else if let Some(dt) = value.as_datetime() {
                format!("[D]{}", dt.timestamp_nanos_opt().unwrap_or_default())
            } else {
                format!("[S]{}", value)
            }
        }
    }
}

/// Serialized comparison key for a tuple of values.
pub fn serialize_key(values: &[Value]) -> String {
    let mut key = String::new();
    for value in values {
        key.push_str(&serialize_value(value));
        key.push(':');
    }
    key
}
