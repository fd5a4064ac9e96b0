//! Typed scalar values.
//!
//! Additional data attached to a geofence is a map of string keys to one of
//! five scalar kinds. The kind travels with the value wherever it is
//! persisted, so an `i64` written to a store always reads back as an `i64`
//! and never as a string or a narrower integer.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind tag of a [`DataValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Str,
    Long,
    Int,
    Float,
    Bool,
}

impl DataKind {
    /// Stable tag string, used as the persisted kind marker.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Str => "str",
            DataKind::Long => "long",
            DataKind::Int => "int",
            DataKind::Float => "float",
            DataKind::Bool => "bool",
        }
    }
}

impl Display for DataKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(DataKind::Str),
            "long" => Ok(DataKind::Long),
            "int" => Ok(DataKind::Int),
            "float" => Ok(DataKind::Float),
            "bool" => Ok(DataKind::Bool),
            _ => Err(format!("Unknown data kind: {s}")),
        }
    }
}

/// A scalar value carried as geofence additional data.
///
/// Exactly five kinds are supported. Anything else must be rejected at the
/// boundary where it enters the system, never silently coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    Str(String),
    Long(i64),
    Int(i32),
    Float(f32),
    Bool(bool),
}

impl DataValue {
    /// The kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> DataKind {
        match self {
            DataValue::Str(_) => DataKind::Str,
            DataValue::Long(_) => DataKind::Long,
            DataValue::Int(_) => DataKind::Int,
            DataValue::Float(_) => DataKind::Float,
            DataValue::Bool(_) => DataKind::Bool,
        }
    }

    /// Get as a string slice if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an `i64` if this is a long value. An [`DataValue::Int`] is a
    /// distinct kind and does not widen.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            DataValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as an `i32` if this is an int value.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            DataValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as an `f32` if this is a float value.
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            DataValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as a `bool` if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Str(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Str(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Long(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int(v)
    }
}

impl From<f32> for DataValue {
    fn from(v: f32) -> Self {
        DataValue::Float(v)
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl Display for DataValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Str(v) => write!(f, "{v}"),
            DataValue::Long(v) => write!(f, "{v}"),
            DataValue::Int(v) => write!(f, "{v}"),
            DataValue::Float(v) => write!(f, "{v}"),
            DataValue::Bool(v) => write!(f, "{v}"),
        }
    }
}
