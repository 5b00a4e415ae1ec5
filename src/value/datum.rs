//! Datum type - a single cell value, as generated, stored, and returned

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Relative tolerance used when matching floating point keys.
const KEY_FLOAT_EPSILON: f64 = 1e-6;

/// A single value in a row
#[derive(Debug, Clone, Default)]
pub enum Datum {
    /// NULL value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Signed integer value (covers TinyInt through BigInt)
    Int(i64),
    /// Unsigned integer value (covers the unsigned integer family)
    UInt(u64),
    /// Floating point value (covers Float, Double)
    Float(f64),
    /// Text value (covers Binary, NChar)
    String(String),
    /// Timestamp as unix milliseconds
    Timestamp(i64),
}

impl Datum {
    /// Check if this datum is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    fn type_tag(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Int(_) => 2,
            Datum::UInt(_) => 3,
            Datum::Float(_) => 4,
            Datum::String(_) => 5,
            Datum::Timestamp(_) => 6,
        }
    }

    /// Convert to f64, returns None if NULL or not numeric
    ///
    /// Timestamps convert to their millisecond value, booleans to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int(i) => Some(*i as f64),
            Datum::UInt(u) => Some(*u as f64),
            Datum::Float(f) => Some(*f),
            Datum::Timestamp(t) => Some(*t as f64),
            Datum::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Datum::Null | Datum::String(_) => None,
        }
    }

    /// Convert to i64, returns None if NULL, not integral, or out of range
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int(i) | Datum::Timestamp(i) => Some(*i),
            Datum::UInt(u) => i64::try_from(*u).ok(),
            Datum::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Convert to string reference, returns None if NULL or not text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render this datum as a SQL literal suitable for an INSERT statement
    pub fn to_sql_literal(&self) -> String {
        match self {
            Datum::Null => "NULL".to_string(),
            Datum::Bool(b) => b.to_string(),
            Datum::Int(i) | Datum::Timestamp(i) => i.to_string(),
            Datum::UInt(u) => u.to_string(),
            Datum::Float(f) => format_float(*f),
            Datum::String(s) => quote_text(s),
        }
    }

    /// Text form of the value as produced by a cast to a character type
    ///
    /// Returns `None` for NULL, floating point values and timestamps, whose
    /// textual rendering is server-defined.
    pub fn cast_text(&self) -> Option<String> {
        match self {
            Datum::Bool(b) => Some(b.to_string()),
            Datum::Int(i) => Some(i.to_string()),
            Datum::UInt(u) => Some(u.to_string()),
            Datum::String(s) => Some(s.clone()),
            Datum::Null | Datum::Float(_) | Datum::Timestamp(_) => None,
        }
    }

    /// Compare two datums as lookup keys
    ///
    /// Drivers may hand back a timestamp as an integer, an unsigned value as
    /// signed, or a single-precision float widened differently, so numeric
    /// keys compare by value rather than by variant.
    pub fn key_matches(&self, other: &Datum) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Null, _) | (_, Datum::Null) => false,
            (Datum::String(a), Datum::String(b)) => a == b,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Float(_), _) | (_, Datum::Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => approx_eq(a, b, KEY_FLOAT_EPSILON),
                _ => false,
            },
            (Datum::UInt(a), Datum::UInt(b)) => a == b,
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Relative/absolute float comparison; equal infinities compare equal.
pub(crate) fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() || b.is_nan() || a.is_infinite() || b.is_infinite() {
        return false;
    }
    let diff = (a - b).abs();
    diff <= epsilon || diff <= epsilon * a.abs().max(b.abs())
}

fn format_float(f: f64) -> String {
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e15).contains(&magnitude) {
        format!("{:e}", f)
    } else {
        format!("{}", f)
    }
}

fn quote_text(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.to_sql_literal()),
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int(a), Datum::Int(b)) => a == b,
            (Datum::UInt(a), Datum::UInt(b)) => a == b,
            (Datum::Float(a), Datum::Float(b)) => a.to_bits() == b.to_bits(),
            (Datum::String(a), Datum::String(b)) => a == b,
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // NULLs sort first (smallest)
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Null, _) => Ordering::Less,
            (_, Datum::Null) => Ordering::Greater,

            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Int(a), Datum::Int(b)) => a.cmp(b),
            (Datum::UInt(a), Datum::UInt(b)) => a.cmp(b),
            (Datum::Float(a), Datum::Float(b)) => a.total_cmp(b),
            (Datum::String(a), Datum::String(b)) => a.cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.cmp(b),

            // Different types: use type tag for stable ordering
            _ => self.type_tag().cmp(&other.type_tag()),
        }
    }
}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Datum::Null => {}
            Datum::Bool(b) => b.hash(state),
            Datum::Int(i) => i.hash(state),
            Datum::UInt(u) => u.hash(state),
            Datum::Float(f) => f.to_bits().hash(state),
            Datum::String(s) => s.hash(state),
            Datum::Timestamp(t) => t.hash(state),
        }
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Int(i)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Self {
        Datum::Float(f)
    }
}
