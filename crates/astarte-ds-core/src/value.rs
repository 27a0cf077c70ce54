//! Datastream sample values and their coercion to numbers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One value of an individually aggregated datastream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatastreamValue {
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
}

/// Dynamically typed sample as returned by the API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum SampleValue {
    Float(f64),
    Integer(i64),
    /// Numeric string (e.g. `longinteger` values are sent as strings).
    Text(String),
    Unsupported(ValueKind),
}

/// JSON kinds that never carry a plottable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Null,
    Array,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Null => "null",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

impl From<Value> for SampleValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => SampleValue::Integer(i),
                // u64 above i64::MAX and all non-integers
                None => SampleValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SampleValue::Text(s),
            Value::Bool(_) => SampleValue::Unsupported(ValueKind::Boolean),
            Value::Null => SampleValue::Unsupported(ValueKind::Null),
            Value::Array(_) => SampleValue::Unsupported(ValueKind::Array),
            Value::Object(_) => SampleValue::Unsupported(ValueKind::Object),
        }
    }
}

/// Outcome of coercing one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Sample(f64),
    /// String that does not parse as a finite float; the sample is dropped.
    Malformed,
}

impl SampleValue {
    /// Coerces the sample to `f64`.
    ///
    /// Returns `Err` with the offending kind for values that can never be numeric;
    /// the caller fails the whole query on it.
    pub fn coerce(&self) -> Result<Coercion, ValueKind> {
        match self {
            SampleValue::Float(f) => Ok(Coercion::Sample(*f)),
            SampleValue::Integer(i) => Ok(Coercion::Sample(*i as f64)),
            SampleValue::Text(s) => Ok(match s.parse::<f64>() {
                Ok(v) if v.is_finite() => Coercion::Sample(v),
                _ => Coercion::Malformed,
            }),
            SampleValue::Unsupported(kind) => Err(*kind),
        }
    }
}
