//! Builder-mode exporter combining datasets into one sectioned CSV

use super::{suggested_filename, validate_datasets};
use crate::artifact::{ArtifactStats, ExportArtifact, MIME_CSV};
use crate::csv::{DEFAULT_OVERSIZE_THRESHOLD, Dataset, EncodeOptions, encode_multi_dataset_with_report, validate_rows};
use crate::error::Result;
use crate::lifecycle::checkpoint;
use crate::registry::{BuilderExporter, ExportBuilder, ExportOptions};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Hands out [`CsvBundleBuilder`]s
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvBundleExporter;

impl BuilderExporter for CsvBundleExporter {
    fn create_builder(&self, options: &ExportOptions) -> Result<Box<dyn ExportBuilder>> {
        let encode = options.encode.clone().unwrap_or_default();
        encode.check()?;
        Ok(Box::new(CsvBundleBuilder {
            options: options.clone(),
            encode,
            datasets: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "csv-bundle"
    }
}

/// Accumulates datasets; each one is validated as it is added
#[derive(Debug)]
pub struct CsvBundleBuilder {
    options: ExportOptions,
    encode: EncodeOptions,
    datasets: Vec<Dataset>,
}

#[async_trait]
impl ExportBuilder for CsvBundleBuilder {
    fn add_dataset(&mut self, dataset: Dataset) -> Result<()> {
        let threshold = self
            .options
            .oversize_row_threshold
            .unwrap_or(DEFAULT_OVERSIZE_THRESHOLD);
        validate_rows(&dataset.rows, &dataset.columns, threshold).into_result()?;
        if let Some(options) = &dataset.options {
            options.check()?;
        }

        tracing::debug!(dataset = %dataset.name, rows = dataset.rows.len(), "dataset added to bundle");
        self.datasets.push(dataset);
        Ok(())
    }

    fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    async fn finish(self: Box<Self>, token: &CancellationToken) -> Result<ExportArtifact> {
        checkpoint(token)?;
        validate_datasets(&self.datasets, &self.options)?;

        let (text, report) =
            encode_multi_dataset_with_report(&self.datasets, &self.encode, &self.options.multi);
        checkpoint(token)?;

        let stats = ArtifactStats::from_report(&report, self.datasets.len(), &text);
        let names: Vec<&str> = self.datasets.iter().map(|d| d.name.as_str()).collect();

        let mut artifact = ExportArtifact::new(text.into_bytes(), MIME_CSV, "csv-bundle")
            .with_stats(stats)
            .with_metadata("datasets", names);
        artifact.suggested_filename = suggested_filename(&self.options, "bundle", "csv");
        Ok(artifact)
    }
}
