use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// Maximum nesting depth accepted for argument and return values.
///
/// Values are owned trees, so true reference cycles cannot be built, but
/// untrusted envelopes can still carry pathological nesting. Anything past
/// this depth is rejected deterministically instead of recursing without
/// bound.
pub const MAX_VALUE_DEPTH: usize = 128;

/// Opaque structured value carried in job arguments and return values.
///
/// Covers the shapes a remote execution function may produce: null, bool,
/// integer, float, string, sequence, and key-ordered mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    /// Verify the value is encodable: nests no deeper than
    /// [`MAX_VALUE_DEPTH`] and carries no non-finite floats.
    ///
    /// JSON has no representation for infinity or NaN (serde_json writes
    /// them as `null`, which would silently break the round-trip law), so
    /// they are rejected here, at the same boundary as the depth check.
    pub fn validate(&self) -> Result<()> {
        self.validate_from(0)
    }

    fn validate_from(&self, depth: usize) -> Result<()> {
        if depth >= MAX_VALUE_DEPTH {
            return Err(FleetError::CyclicValue {
                max_depth: MAX_VALUE_DEPTH,
            });
        }
        match self {
            Value::Float(f) if !f.is_finite() => {
                return Err(FleetError::NonFiniteFloat(*f));
            }
            Value::Sequence(items) => {
                for item in items {
                    item.validate_from(depth + 1)?;
                }
            }
            Value::Mapping(entries) => {
                for value in entries.values() {
                    value.validate_from(depth + 1)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Mapping(entries)
    }
}
