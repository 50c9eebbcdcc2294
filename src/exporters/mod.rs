//! Built-in exporters
//!
//! - [`CsvExporter`]: `csv`, `text/csv`
//! - [`JsonExporter`]: `json`, `application/json`
//! - [`CsvBundleExporter`] (builder mode): `csv-bundle`, `multi-csv`

mod csv;
mod csv_bundle;
mod json;

pub use csv::CsvExporter;
pub use csv_bundle::{CsvBundleBuilder, CsvBundleExporter};
pub use json::JsonExporter;

use crate::artifact::{DEFAULT_MAX_FILENAME_LEN, default_filename, sanitize_filename};
use crate::csv::{DEFAULT_OVERSIZE_THRESHOLD, Dataset, validate_rows};
use crate::error::{Error, Result};
use crate::registry::{ExportOptions, ExporterDefinition, ExporterModule};
use std::sync::Arc;

/// Definitions for every built-in exporter
pub fn builtin_definitions() -> Vec<ExporterDefinition> {
    vec![
        ExporterDefinition::new("csv", "CSV", || async {
            Ok(ExporterModule::Direct(Arc::new(CsvExporter)))
        })
        .with_formats(["text/csv"]),
        ExporterDefinition::new("json", "JSON", || async {
            Ok(ExporterModule::Direct(Arc::new(JsonExporter)))
        })
        .with_formats(["application/json"]),
        ExporterDefinition::new("csv-bundle", "Multi-dataset CSV", || async {
            Ok(ExporterModule::Builder(Arc::new(CsvBundleExporter)))
        })
        .with_formats(["multi-csv"])
        .builder(),
    ]
}

/// Validate every dataset, failing on the first structurally invalid one
///
/// Errors are prefixed with the dataset name when there is more than one.
fn validate_datasets(datasets: &[Dataset], options: &ExportOptions) -> Result<()> {
    if datasets.is_empty() {
        return Err(Error::Validation {
            errors: vec!["no datasets to export".to_string()],
        });
    }

    let threshold = options
        .oversize_row_threshold
        .unwrap_or(DEFAULT_OVERSIZE_THRESHOLD);
    let mut errors = Vec::new();

    for (i, dataset) in datasets.iter().enumerate() {
        let report = validate_rows(&dataset.rows, &dataset.columns, threshold);
        for warning in &report.warnings {
            tracing::warn!(dataset = %dataset.name, warning = %warning, "export input warning");
        }
        if datasets.len() == 1 {
            errors.extend(report.errors);
        } else {
            let label = dataset_label(dataset, i);
            errors.extend(report.errors.into_iter().map(|e| format!("{label}: {e}")));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { errors })
    }
}

fn dataset_label(dataset: &Dataset, index: usize) -> String {
    if dataset.name.is_empty() {
        format!("dataset_{}", index + 1)
    } else {
        dataset.name.clone()
    }
}

/// Suggested filename: the requested one sanitised, else a timestamped default
fn suggested_filename(options: &ExportOptions, prefix: &str, extension: &str) -> String {
    let max_len = options.max_filename_len.unwrap_or(DEFAULT_MAX_FILENAME_LEN);
    match options.filename.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(name) => sanitize_filename(name, Some(extension), max_len),
        None => sanitize_filename(&default_filename(prefix, extension), Some(extension), max_len),
    }
}
