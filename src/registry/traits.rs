//! Traits and types implemented by exporter modules

use crate::artifact::ExportArtifact;
use crate::csv::{ColumnDescriptor, Dataset, EncodeOptions, MultiDatasetOptions};
use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Input to an export: one or more named datasets
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    /// Datasets in output order
    pub datasets: Vec<Dataset>,
}

impl ExportData {
    /// A single unnamed table
    pub fn table(rows: Vec<Value>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            datasets: vec![Dataset::new("", rows, columns)],
        }
    }

    /// Several named tables
    pub fn datasets(datasets: Vec<Dataset>) -> Self {
        Self { datasets }
    }

    /// Total number of rows across datasets
    pub fn row_count(&self) -> usize {
        self.datasets.iter().map(|d| d.rows.len()).sum()
    }
}

/// Per-request export settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Suggested filename; a timestamped name is generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Encoding settings; exporter defaults apply when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encode: Option<EncodeOptions>,

    /// How multiple datasets are combined
    pub multi: MultiDatasetOptions,

    /// Pretty-print structured formats
    pub pretty: bool,

    /// Row count above which validation warns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oversize_row_threshold: Option<usize>,

    /// Maximum length of the suggested filename
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_filename_len: Option<usize>,

    /// Hand the artifact to the configured sink after a successful export
    pub save: bool,
}

/// An exporter that turns [`ExportData`] into an artifact in one call
///
/// Implementations should check `token` between expensive steps.
#[async_trait]
pub trait DirectExporter: Send + Sync {
    /// Produce an artifact
    async fn export(
        &self,
        data: &ExportData,
        options: &ExportOptions,
        token: &CancellationToken,
    ) -> Result<ExportArtifact>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}

/// An exporter that hands out stateful builders
pub trait BuilderExporter: Send + Sync {
    /// Start a new builder
    fn create_builder(&self, options: &ExportOptions) -> Result<Box<dyn ExportBuilder>>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}

/// Incrementally assembled export
#[async_trait]
pub trait ExportBuilder: Send {
    /// Append a dataset
    fn add_dataset(&mut self, dataset: Dataset) -> Result<()>;

    /// Datasets added so far
    fn dataset_count(&self) -> usize;

    /// Encode everything added so far
    async fn finish(self: Box<Self>, token: &CancellationToken) -> Result<ExportArtifact>;
}

/// The capability a loaded exporter module provides
#[derive(Clone)]
pub enum ExporterModule {
    /// One-shot export
    Direct(Arc<dyn DirectExporter>),
    /// Stateful builder
    Builder(Arc<dyn BuilderExporter>),
}

impl ExporterModule {
    /// True for builder modules
    pub fn is_builder(&self) -> bool {
        matches!(self, ExporterModule::Builder(_))
    }

    /// Name of the underlying implementation
    pub fn name(&self) -> &'static str {
        match self {
            ExporterModule::Direct(e) => e.name(),
            ExporterModule::Builder(b) => b.name(),
        }
    }
}

impl fmt::Debug for ExporterModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterModule::Direct(e) => f.debug_tuple("Direct").field(&e.name()).finish(),
            ExporterModule::Builder(b) => f.debug_tuple("Builder").field(&b.name()).finish(),
        }
    }
}

/// Deferred constructor of an exporter module, invoked at most once per cache lifetime
pub type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<ExporterModule>> + Send + Sync>;
