//! Scalar cell values and their text normalisation

use super::options::EncodeOptions;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single value about to be written into a CSV field
///
/// Rows are arbitrary JSON, so a value looked up in a row may be absent
/// ([`Cell::Undefined`]) as well as explicitly `null` ([`Cell::Null`]); the two
/// are substituted with different configurable strings.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// Explicit null
    Null,
    /// The path did not resolve to any value
    Undefined,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Integer(i64),
    /// Floating point number; NaN and infinities encode as an empty field
    Float(f64),
    /// Text
    Text(String),
    /// Timestamp, encoded as ISO-8601 with millisecond precision
    DateTime(DateTime<Utc>),
    /// Object or array, encoded as compact JSON
    Json(Value),
}

impl Cell {
    /// Convert a JSON value into a cell
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    // Above i64::MAX; keep every digit
                    Cell::Text(u.to_string())
                } else {
                    Cell::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Cell::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Cell::Json(value.clone()),
        }
    }

    /// True for [`Cell::Null`] and [`Cell::Undefined`]
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Null | Cell::Undefined)
    }

    /// Normalise the cell to the text that will be escaped into the field
    pub fn stringify(&self, options: &EncodeOptions) -> String {
        match self {
            Cell::Null => options.null_value.clone(),
            Cell::Undefined => options.undefined_value.clone(),
            Cell::Bool(b) => options.boolean_format.render(*b).to_string(),
            Cell::Integer(i) => i.to_string(),
            Cell::Float(f) if !f.is_finite() => String::new(),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            Cell::Json(v) => v.to_string(),
        }
    }

    /// Convert the cell back into JSON
    ///
    /// Undefined and non-finite floats become `null`; timestamps become ISO strings.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null | Cell::Undefined => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Integer(i) => Value::from(*i),
            Cell::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::DateTime(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Cell::Json(v) => v.clone(),
        }
    }
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        Cell::from_json(value)
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Cell::from_json(&value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Integer(value)
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::Integer(i64::from(value))
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(value: DateTime<Utc>) -> Self {
        Cell::DateTime(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

impl Serialize for Cell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(|v| Cell::from_json(&v))
    }
}
