//! Direct JSON exporter

use super::{dataset_label, suggested_filename, validate_datasets};
use crate::artifact::{ArtifactStats, ExportArtifact, MIME_JSON};
use crate::csv::Dataset;
use crate::error::Result;
use crate::lifecycle::checkpoint;
use crate::registry::{DirectExporter, ExportData, ExportOptions};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Projects rows through their columns and serialises them as JSON
///
/// A single dataset becomes an array of objects; several datasets become an
/// object keyed by dataset name. Values are the formatted cells, keyed by
/// column key.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonExporter;

struct Projection {
    value: Value,
    rows: usize,
    skipped: usize,
    columns: usize,
}

fn project(dataset: &Dataset) -> Projection {
    let columns = dataset.effective_columns();
    let mut rows = Vec::with_capacity(dataset.rows.len());
    let mut skipped = 0;

    'rows: for (index, row) in dataset.rows.iter().enumerate() {
        let mut object = Map::with_capacity(columns.len());
        for column in &columns {
            match column.resolve(row, index) {
                Ok(cell) => {
                    object.insert(column.key.clone(), cell.to_json());
                }
                Err(e) => {
                    tracing::warn!(row = index, error = %e, "skipping row that failed to resolve");
                    skipped += 1;
                    continue 'rows;
                }
            }
        }
        rows.push(Value::Object(object));
    }

    Projection {
        rows: rows.len(),
        value: Value::Array(rows),
        skipped,
        columns: columns.len(),
    }
}

#[async_trait]
impl DirectExporter for JsonExporter {
    async fn export(
        &self,
        data: &ExportData,
        options: &ExportOptions,
        token: &CancellationToken,
    ) -> Result<ExportArtifact> {
        checkpoint(token)?;
        validate_datasets(&data.datasets, options)?;
        checkpoint(token)?;

        let mut stats = ArtifactStats {
            datasets: data.datasets.len(),
            ..Default::default()
        };

        let document = match data.datasets.as_slice() {
            [single] => {
                let projection = project(single);
                stats.rows = projection.rows;
                stats.skipped_rows = projection.skipped;
                stats.columns = projection.columns;
                projection.value
            }
            many => {
                let mut sections = Map::with_capacity(many.len());
                for (i, dataset) in many.iter().enumerate() {
                    checkpoint(token)?;
                    let projection = project(dataset);
                    stats.rows += projection.rows;
                    stats.skipped_rows += projection.skipped;
                    stats.columns = stats.columns.max(projection.columns);
                    sections.insert(dataset_label(dataset, i), projection.value);
                }
                Value::Object(sections)
            }
        };
        checkpoint(token)?;

        let content = if options.pretty {
            serde_json::to_vec_pretty(&document)?
        } else {
            serde_json::to_vec(&document)?
        };
        stats.lines = content.iter().filter(|&&b| b == b'\n').count() + 1;

        let mut artifact = ExportArtifact::new(content, MIME_JSON, "json").with_stats(stats);
        artifact.suggested_filename = suggested_filename(options, "export", "json");
        Ok(artifact)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
