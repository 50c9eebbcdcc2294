//! # tabula-export
//!
//! Export toolkit for tabular data: a CSV codec, a pluggable registry of
//! lazily loaded exporters, a cancellable operation lifecycle, and a retrying
//! downloader for remote artifacts.
//!
//! ## Design Philosophy
//!
//! tabula-export is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Explicit** - Registries, tokens and sinks are passed in, never global
//! - **Cancellable** - Every long-running step observes a `CancellationToken`
//! - **Observable** - Operation state is streamed through a `watch` channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabula_export::{
//!     Config, ExportData, ExportOptions, ExportRunner, ExporterRegistry, FileSink, Operation,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let registry = Arc::new(ExporterRegistry::with_builtin_exporters());
//!     let runner = ExportRunner::new(registry, config.export.clone())
//!         .with_sink(Arc::new(FileSink::from_config(&config.export)));
//!
//!     let operation = Operation::new("orders-export");
//!     let mut states = operation.subscribe();
//!     tokio::spawn(async move {
//!         while states.changed().await.is_ok() {
//!             println!("State: {:?}", states.borrow().phase());
//!         }
//!     });
//!
//!     let data = ExportData::table(vec![json!({"id": 1, "total": 9.5})], vec![]);
//!     let options = ExportOptions { save: true, ..Default::default() };
//!     let artifact = runner
//!         .export(&operation, "csv", &data, options)
//!         .await
//!         .into_result()?;
//!     println!("{} bytes", artifact.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Export artifacts, filenames and MIME types
pub mod artifact;
/// Configuration types
pub mod config;
/// CSV encoding, decoding and validation
pub mod csv;
/// Retrying remote download
pub mod download;
/// Error types
pub mod error;
/// Built-in exporters
pub mod exporters;
/// Cancellable operation lifecycle
pub mod lifecycle;
/// Lazily loaded exporter registry
pub mod registry;
/// Retry logic with linear backoff
pub mod retry;
/// Runs exports through the lifecycle
pub mod runner;
/// Artifact persistence
pub mod sink;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use artifact::{ArtifactStats, ExportArtifact};
pub use config::{Config, DownloadConfig, ExportConfig, FileCollisionAction};
pub use csv::{ColumnDescriptor, Dataset, DecodeOptions, EncodeOptions};
pub use download::{DownloadRequest, Fetcher, HttpFetcher, RetryingDownloader};
pub use error::{CsvError, Error, ErrorDetail, Result, SinkError};
pub use lifecycle::{
    CancelReason, ExecuteOptions, Operation, OperationObserver, OperationState, Outcome, Phase,
    StateSnapshot, checkpoint,
};
pub use registry::{
    BuilderExporter, DirectExporter, ExportBuilder, ExportData, ExportOptions, ExporterDefinition,
    ExporterModule, ExporterRegistry,
};
pub use runner::ExportRunner;
pub use sink::{ArtifactSink, FileSink};
