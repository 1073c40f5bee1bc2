//! Typed metadata values carried by source records.
//!
//! Sources report release dates, durations, countries, flags and so on. The
//! values are kept typed so that conflict detection and linkage comparisons
//! do not have to re-parse strings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A typed metadata value.
///
/// # Examples
///
/// ```
/// use creditline::Value;
///
/// let duration = Value::Int(215_000);
/// let year = Value::from("1966");
///
/// assert_eq!(duration.as_float(), Some(215_000.0));
/// assert_eq!(year.as_string(), Some("1966"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    List(Vec<String>),
    Null,
}

impl Value {
    /// True for `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The number as a float; integers convert.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The date, if this is one.
    pub const fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Loose equality used when comparing the same field across sources.
    ///
    /// Numbers agree within `relative_tolerance` of the larger magnitude,
    /// strings compare trimmed and case-insensitively, lists compare as sets.
    /// `Null` never agrees with anything.
    #[must_use]
    pub fn agrees_with(&self, other: &Self, relative_tolerance: f64) -> bool {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::String(a), Self::String(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                let mut a: Vec<String> = a.iter().map(|s| s.trim().to_lowercase()).collect();
                let mut b: Vec<String> = b.iter().map(|s| s.trim().to_lowercase()).collect();
                a.sort();
                a.dedup();
                b.sort();
                b.dedup();
                a == b
            }
            _ => match (self.as_float(), other.as_float()) {
                (Some(a), Some(b)) => {
                    let scale = a.abs().max(b.abs());
                    scale == 0.0 || (a - b).abs() <= scale * relative_tolerance
                }
                _ => false,
            },
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::List(v) => write!(f, "[{}]", v.join(", ")),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}
