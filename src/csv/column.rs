//! Column descriptors and dot-path value resolution

use super::cell::Cell;
use crate::error::CsvError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Transforms a resolved value before it is escaped
///
/// Receives the resolved cell, the whole row and the column. Returning `Err`
/// skips the row with a warning instead of aborting the table.
pub type Formatter =
    Arc<dyn Fn(&Cell, &Value, &ColumnDescriptor) -> Result<Cell, String> + Send + Sync>;

/// Describes how to extract and label one column from a row
///
/// Deserializes from either a bare field name (`"price"`) or a record where the
/// key may be spelled `key`, `field` or `dataIndex`:
///
/// ```
/// use tabula_export::csv::ColumnDescriptor;
///
/// let columns: Vec<ColumnDescriptor> = serde_json::from_str(
///     r#"["sku", {"field": "unit.price", "header": "Price", "defaultValue": 0}]"#,
/// ).unwrap();
/// assert_eq!(columns[0].label(), "sku");
/// assert_eq!(columns[1].key, "unit.price");
/// assert_eq!(columns[1].label(), "Price");
/// ```
#[derive(Clone)]
pub struct ColumnDescriptor {
    /// Dot path of the value inside each row
    pub key: String,
    /// Header label; the key is used when absent
    pub header: Option<String>,
    /// Optional value transformation
    pub formatter: Option<Formatter>,
    /// Substituted when the resolved (or formatted) value is null or undefined
    pub default_value: Option<Cell>,
}

impl ColumnDescriptor {
    /// Create a column for the given key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: None,
            formatter: None,
            default_value: None,
        }
    }

    /// Set the header label
    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Set the formatter
    #[must_use]
    pub fn with_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Cell, &Value, &ColumnDescriptor) -> Result<Cell, String> + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Set the default value
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Cell>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Header label, falling back to the key
    pub fn label(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.key)
    }

    /// Resolve this column's cell for one row
    ///
    /// Fails when the row is not an object or the formatter rejects the value.
    pub fn resolve(&self, row: &Value, row_index: usize) -> Result<Cell, CsvError> {
        if !row.is_object() {
            return Err(CsvError::RowShape { index: row_index });
        }

        let raw = lookup_path(row, &self.key)
            .map(Cell::from_json)
            .unwrap_or(Cell::Undefined);

        let formatted = match &self.formatter {
            Some(format) => format(&raw, row, self).map_err(|message| CsvError::Formatter {
                column: self.key.clone(),
                message,
            })?,
            None => raw,
        };

        match (&self.default_value, formatted.is_missing()) {
            (Some(default), true) => Ok(default.clone()),
            _ => Ok(formatted),
        }
    }
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("key", &self.key)
            .field("header", &self.header)
            .field("formatter", &self.formatter.as_ref().map(|_| "<fn>"))
            .field("default_value", &self.default_value)
            .finish()
    }
}

impl PartialEq for ColumnDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.header == other.header
            && self.default_value == other.default_value
            && self.formatter.is_some() == other.formatter.is_some()
    }
}

impl From<&str> for ColumnDescriptor {
    fn from(key: &str) -> Self {
        ColumnDescriptor::new(key)
    }
}

impl From<String> for ColumnDescriptor {
    fn from(key: String) -> Self {
        ColumnDescriptor::new(key)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Key(String),
    Record {
        #[serde(alias = "field", alias = "dataIndex")]
        key: String,
        #[serde(default, alias = "title", alias = "label")]
        header: Option<String>,
        #[serde(default, rename = "defaultValue", alias = "default_value")]
        default_value: Option<Cell>,
    },
}

impl<'de> Deserialize<'de> for ColumnDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawColumn::deserialize(deserializer)? {
            RawColumn::Key(key) => ColumnDescriptor::new(key),
            RawColumn::Record {
                key,
                header,
                default_value,
            } => ColumnDescriptor {
                key,
                header,
                formatter: None,
                default_value,
            },
        })
    }
}

#[derive(Serialize)]
struct ColumnRecord<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<&'a str>,
    #[serde(rename = "defaultValue", skip_serializing_if = "Option::is_none")]
    default_value: Option<&'a Cell>,
}

impl Serialize for ColumnDescriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ColumnRecord {
            key: &self.key,
            header: self.header.as_deref(),
            default_value: self.default_value.as_ref(),
        }
        .serialize(serializer)
    }
}

/// Look up a dot-separated path inside a JSON value
///
/// A key that literally contains dots wins over nested traversal. Numeric
/// segments index into arrays.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = value.as_object().and_then(|obj| obj.get(path)) {
        return Some(direct);
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Derive columns from the keys of the first object row
pub fn infer_columns(rows: &[Value]) -> Vec<ColumnDescriptor> {
    rows.iter()
        .find_map(Value::as_object)
        .map(|obj| obj.keys().map(|k| ColumnDescriptor::new(k.as_str())).collect())
        .unwrap_or_default()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_follows_nested_objects_and_arrays() {
        let row = json!({"customer": {"name": "Ada", "tags": ["vip", "net30"]}});
        assert_eq!(lookup_path(&row, "customer.name"), Some(&json!("Ada")));
        assert_eq!(lookup_path(&row, "customer.tags.1"), Some(&json!("net30")));
        assert_eq!(lookup_path(&row, "customer.email"), None);
    }

    #[test]
    fn literal_dotted_key_wins() {
        let row = json!({"a.b": 1, "a": {"b": 2}});
        assert_eq!(lookup_path(&row, "a.b"), Some(&json!(1)));
    }

    #[test]
    fn default_applies_to_missing_and_null() {
        let col = ColumnDescriptor::new("qty").with_default(0);
        assert_eq!(col.resolve(&json!({}), 0).unwrap(), Cell::Integer(0));
        assert_eq!(col.resolve(&json!({"qty": null}), 0).unwrap(), Cell::Integer(0));
        assert_eq!(col.resolve(&json!({"qty": 4}), 0).unwrap(), Cell::Integer(4));
    }

    #[test]
    fn formatter_sees_value_and_row() {
        let col = ColumnDescriptor::new("price").with_formatter(|value, row, _col| {
            let currency = row["currency"].as_str().unwrap_or("?");
            match value {
                Cell::Integer(cents) => Ok(Cell::Text(format!("{currency} {}", cents / 100))),
                other => Ok(other.clone()),
            }
        });

        let cell = col
            .resolve(&json!({"price": 1250, "currency": "EUR"}), 0)
            .unwrap();
        assert_eq!(cell, Cell::Text("EUR 12".into()));
    }

    #[test]
    fn formatter_error_is_reported_with_column() {
        let col = ColumnDescriptor::new("x").with_formatter(|_, _, _| Err("bad value".into()));
        let err = col.resolve(&json!({"x": 1}), 3).unwrap_err();
        assert!(matches!(err, CsvError::Formatter { ref column, .. } if column == "x"));
    }

    #[test]
    fn non_object_row_is_rejected() {
        let col = ColumnDescriptor::new("x");
        assert!(matches!(
            col.resolve(&json!(42), 7),
            Err(CsvError::RowShape { index: 7 })
        ));
    }

    #[test]
    fn deserializes_every_key_alias() {
        let cols: Vec<ColumnDescriptor> = serde_json::from_value(json!([
            "plain",
            {"key": "a"},
            {"field": "b", "header": "B"},
            {"dataIndex": "c", "defaultValue": "-"}
        ]))
        .unwrap();

        let keys: Vec<_> = cols.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, ["plain", "a", "b", "c"]);
        assert_eq!(cols[2].label(), "B");
        assert_eq!(cols[3].default_value, Some(Cell::Text("-".into())));
    }

    #[test]
    fn infer_columns_uses_first_object_row() {
        let rows = vec![json!(null), json!({"a": 2, "b": 1})];
        let keys: Vec<_> = infer_columns(&rows).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn infer_columns_keeps_row_key_order() {
        let rows = vec![json!({"name": "Ada", "age": 36, "sku": "A1"})];
        let keys: Vec<_> = infer_columns(&rows).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, ["name", "age", "sku"]);
    }
}
