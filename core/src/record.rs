//! Decoded metric record
//!
//! The agent writes one JSON value per record. The decoder only promises
//! "valid JSON text"; `name` and `value` are a convention the consumer
//! relies on, so they are accessors here rather than required fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One decoded unit of telemetry
///
/// Immutable once produced. Typical payload:
///
/// ```json
/// {"name": "working-set", "value": 123.4, "unit": "MB"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord(Value);

impl MetricRecord {
    /// Wrap an already parsed JSON value
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse one JSON value from text
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }

    /// Metric identifier, if the record carries a string `name`
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Numeric value, if the record carries a number `value`
    pub fn value(&self) -> Option<f64> {
        self.0.get("value").and_then(Value::as_f64)
    }

    /// Any other field of the record
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Fields other than `name` and `value`
    pub fn extra_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0
            .as_object()
            .into_iter()
            .flat_map(|map| map.iter())
            .filter(|(key, _)| key.as_str() != "name" && key.as_str() != "value")
    }

    /// Borrow the underlying JSON value
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Take the underlying JSON value
    pub fn into_json(self) -> Value {
        self.0
    }
}

impl From<Value> for MetricRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name(), self.value()) {
            (Some(name), Some(value)) => write!(f, "{name}={value}"),
            _ => write!(f, "{}", self.0),
        }
    }
}
