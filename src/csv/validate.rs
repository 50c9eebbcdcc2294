//! Structural validation of export input

use super::column::{ColumnDescriptor, lookup_path};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Row count above which a dataset is reported as oversized
pub const DEFAULT_OVERSIZE_THRESHOLD: usize = 100_000;

/// Number of leading rows inspected for missing columns
const SAMPLE_ROWS: usize = 10;

/// Outcome of [`validate`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// True when there are no errors; warnings do not affect validity
    pub is_valid: bool,
    /// Problems that make the input unusable
    pub errors: Vec<String>,
    /// Suspicious but encodable input
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Convert into a [`Error::Validation`] when invalid, logging any warnings
    pub fn into_result(self) -> Result<Self> {
        for warning in &self.warnings {
            tracing::warn!(warning = %warning, "export input warning");
        }
        if self.is_valid {
            Ok(self)
        } else {
            Err(Error::Validation {
                errors: self.errors,
            })
        }
    }
}

/// Validate export input using the default oversize threshold
///
/// Structural checks only: `data` must be an array of objects and every column
/// needs a non-empty key. Columns absent from the first rows and oversized
/// datasets are warnings.
pub fn validate(data: &Value, columns: &[ColumnDescriptor]) -> ValidationReport {
    validate_with_threshold(data, columns, DEFAULT_OVERSIZE_THRESHOLD)
}

/// Validate export input with an explicit oversize threshold
pub fn validate_with_threshold(
    data: &Value,
    columns: &[ColumnDescriptor],
    oversize_threshold: usize,
) -> ValidationReport {
    match data.as_array() {
        Some(rows) => validate_rows(rows, columns, oversize_threshold),
        None => {
            let mut errors = Vec::new();
            let mut warnings = Vec::new();
            check_columns(columns, &mut errors, &mut warnings);
            errors.push(format!("data must be an array, got {}", json_type(data)));
            ValidationReport {
                is_valid: false,
                errors,
                warnings,
            }
        }
    }
}

/// Validate rows that are already known to form an array
pub fn validate_rows(
    rows: &[Value],
    columns: &[ColumnDescriptor],
    oversize_threshold: usize,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    check_columns(columns, &mut errors, &mut warnings);

    for (i, row) in rows.iter().enumerate() {
        if !row.is_object() {
            errors.push(format!("row {i} must be an object, got {}", json_type(row)));
        }
    }

    if rows.is_empty() {
        warnings.push("dataset is empty".to_string());
    } else {
        let sample: Vec<&Value> = rows.iter().filter(|r| r.is_object()).take(SAMPLE_ROWS).collect();
        for column in columns.iter().filter(|c| !c.key.trim().is_empty()) {
            if !sample.is_empty() && sample.iter().all(|row| lookup_path(row, &column.key).is_none()) {
                warnings.push(format!("column '{}' not found in sample data", column.key));
            }
        }
    }

    if rows.len() > oversize_threshold {
        warnings.push(format!(
            "dataset has {} rows (over {oversize_threshold}); export may be slow",
            rows.len()
        ));
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_columns(columns: &[ColumnDescriptor], errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for (i, column) in columns.iter().enumerate() {
        if column.key.trim().is_empty() {
            errors.push(format!("column {i} has an empty key"));
        } else if !seen.insert(column.key.as_str()) {
            warnings.push(format!("column '{}' is listed more than once", column.key));
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(keys: &[&str]) -> Vec<ColumnDescriptor> {
        keys.iter().map(|k| ColumnDescriptor::new(*k)).collect()
    }

    #[test]
    fn well_formed_input_is_valid() {
        let report = validate(&json!([{"a": 1}, {"a": 2}]), &cols(&["a"]));
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn non_array_data_is_an_error() {
        let report = validate(&json!({"a": 1}), &cols(&["a"]));
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("array"));
    }

    #[test]
    fn non_object_rows_are_errors() {
        let report = validate(&json!([{"a": 1}, 5, null]), &cols(&["a"]));
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn empty_column_key_is_an_error() {
        let report = validate(&json!([{"a": 1}]), &cols(&["a", " "]));
        assert!(!report.is_valid);
    }

    #[test]
    fn missing_columns_are_only_warnings() {
        let report = validate(&json!([{"a": 1}]), &cols(&["a", "ghost"]));
        assert!(report.is_valid);
        assert_eq!(report.warnings, ["column 'ghost' not found in sample data"]);
    }

    #[test]
    fn oversized_dataset_is_only_a_warning() {
        let rows: Vec<_> = (0..5).map(|i| json!({"a": i})).collect();
        let report = validate_with_threshold(&Value::Array(rows), &cols(&["a"]), 3);
        assert!(report.is_valid);
        assert!(report.warnings[0].contains("5 rows"));
    }

    #[test]
    fn duplicate_columns_warn() {
        let report = validate(&json!([{"a": 1}]), &cols(&["a", "a"]));
        assert!(report.is_valid);
        assert_eq!(report.warnings, ["column 'a' is listed more than once"]);
    }

    #[test]
    fn empty_dataset_warns() {
        let report = validate_rows(&[], &cols(&["a"]), DEFAULT_OVERSIZE_THRESHOLD);
        assert!(report.is_valid);
        assert_eq!(report.warnings, ["dataset is empty"]);
    }

    #[test]
    fn into_result_raises_validation_error() {
        let err = validate(&json!("nope"), &[]).into_result().unwrap_err();
        assert_eq!(err.error_code(), "validation_error");
    }
}
