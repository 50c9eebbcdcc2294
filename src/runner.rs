//! Export runner
//!
//! Ties an [`ExporterRegistry`] to an [`Operation`]: configured defaults are
//! applied to the request, the export runs inside the lifecycle with the
//! configured timeout, and the artifact is optionally handed to a sink.

use crate::artifact::ExportArtifact;
use crate::config::ExportConfig;
use crate::csv::Dataset;
use crate::error::Result;
use crate::lifecycle::{ExecuteOptions, Operation, Outcome, checkpoint};
use crate::registry::{ExportData, ExportOptions, ExporterRegistry};
use crate::sink::ArtifactSink;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs exports through the lifecycle
pub struct ExportRunner {
    registry: Arc<ExporterRegistry>,
    config: ExportConfig,
    sink: Option<Arc<dyn ArtifactSink>>,
}

impl ExportRunner {
    /// Runner without a sink; `save` requests are ignored with a warning
    pub fn new(registry: Arc<ExporterRegistry>, config: ExportConfig) -> Self {
        Self {
            registry,
            config,
            sink: None,
        }
    }

    /// Attach a sink used when [`ExportOptions::save`] is set
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The registry exports are dispatched through
    pub fn registry(&self) -> &Arc<ExporterRegistry> {
        &self.registry
    }

    /// The active configuration
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Fill unset request options from the configuration
    pub fn resolve_options(&self, mut options: ExportOptions) -> ExportOptions {
        if options.encode.is_none() {
            options.encode = Some(self.config.encode.clone());
        }
        options
            .oversize_row_threshold
            .get_or_insert(self.config.oversize_row_threshold);
        options
            .max_filename_len
            .get_or_insert(self.config.max_filename_len);
        options
    }

    /// Export `data` as `format` using the configured timeout
    pub async fn export(
        &self,
        operation: &Operation<ExportArtifact>,
        format: &str,
        data: &ExportData,
        options: ExportOptions,
    ) -> Outcome<ExportArtifact> {
        self.export_with(operation, format, data, options, ExecuteOptions::default())
            .await
    }

    /// Like [`export`](Self::export) with explicit execution options
    ///
    /// The configured timeout applies when `execute.timeout` is unset.
    pub async fn export_with(
        &self,
        operation: &Operation<ExportArtifact>,
        format: &str,
        data: &ExportData,
        options: ExportOptions,
        execute: ExecuteOptions,
    ) -> Outcome<ExportArtifact> {
        let options = self.resolve_options(options);
        let execute = self.execute_options(execute);

        operation
            .execute(
                move |token| async move {
                    let artifact = self
                        .registry
                        .export_data(format, data, &options, &token)
                        .await?;
                    self.persist(artifact, options.save, &token).await
                },
                execute,
            )
            .await
    }

    /// Export through a builder-mode exporter, adding `datasets` in order
    pub async fn export_builder(
        &self,
        operation: &Operation<ExportArtifact>,
        format: &str,
        datasets: Vec<Dataset>,
        options: ExportOptions,
        execute: ExecuteOptions,
    ) -> Outcome<ExportArtifact> {
        let options = self.resolve_options(options);
        let execute = self.execute_options(execute);

        operation
            .execute(
                move |token| async move {
                    let mut builder = self.registry.create_builder(format, &options).await?;
                    for dataset in datasets {
                        checkpoint(&token)?;
                        builder.add_dataset(dataset)?;
                    }
                    let artifact = builder.finish(&token).await?;
                    self.persist(artifact, options.save, &token).await
                },
                execute,
            )
            .await
    }

    fn execute_options(&self, mut execute: ExecuteOptions) -> ExecuteOptions {
        if execute.timeout.is_none() {
            execute.timeout = self.config.timeout;
        }
        execute
    }

    async fn persist(
        &self,
        artifact: ExportArtifact,
        save: bool,
        token: &CancellationToken,
    ) -> Result<ExportArtifact> {
        if !save {
            return Ok(artifact);
        }
        let Some(sink) = &self.sink else {
            tracing::warn!(format = %artifact.format, "save requested but no sink is configured");
            return Ok(artifact);
        };

        checkpoint(token)?;
        let path = sink.save(&artifact).await?;
        Ok(artifact.with_metadata("saved_path", path.display().to_string()))
    }
}

impl fmt::Debug for ExportRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRunner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("sink", &self.sink.as_ref().map(|s| s.name()))
            .finish()
    }
}
