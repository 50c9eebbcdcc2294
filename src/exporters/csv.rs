//! Direct CSV exporter

use super::{suggested_filename, validate_datasets};
use crate::artifact::{ArtifactStats, ExportArtifact, MIME_CSV};
use crate::csv::{encode_multi_dataset_with_report, encode_table_with_report};
use crate::error::Result;
use crate::lifecycle::checkpoint;
use crate::registry::{DirectExporter, ExportData, ExportOptions};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Encodes one dataset as a table, several as a sectioned document
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvExporter;

#[async_trait]
impl DirectExporter for CsvExporter {
    async fn export(
        &self,
        data: &ExportData,
        options: &ExportOptions,
        token: &CancellationToken,
    ) -> Result<ExportArtifact> {
        checkpoint(token)?;

        let encode = options.encode.clone().unwrap_or_default();
        encode.check()?;
        for dataset in &data.datasets {
            if let Some(dataset_options) = &dataset.options {
                dataset_options.check()?;
            }
        }
        validate_datasets(&data.datasets, options)?;
        checkpoint(token)?;

        // Give cancellation a chance to land before the CPU-bound part
        tokio::task::yield_now().await;
        checkpoint(token)?;

        let (text, report) = match data.datasets.as_slice() {
            [single] => encode_table_with_report(
                &single.rows,
                &single.columns,
                single.options.as_ref().unwrap_or(&encode),
            ),
            many => encode_multi_dataset_with_report(many, &encode, &options.multi),
        };
        checkpoint(token)?;

        let stats = ArtifactStats::from_report(&report, data.datasets.len(), &text);
        let names: Vec<&str> = data.datasets.iter().map(|d| d.name.as_str()).collect();

        let mut artifact = ExportArtifact::new(text.into_bytes(), MIME_CSV, "csv")
            .with_stats(stats)
            .with_metadata("datasets", names);
        artifact.suggested_filename = suggested_filename(options, "export", "csv");
        if !report.warnings.is_empty() {
            artifact = artifact.with_metadata("warnings", report.warnings);
        }
        Ok(artifact)
    }

    fn name(&self) -> &'static str {
        "csv"
    }
}
