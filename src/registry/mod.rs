//! Exporter registry
//!
//! Maps format keys to lazily loaded exporter modules. Definitions are
//! registered up front; a module is only constructed the first time one of its
//! formats is requested, and is cached for the lifetime of the registry.
//!
//! Dispatch is by capability: a definition declares `builder_mode`, and the
//! module its loader returns must be the matching [`ExporterModule`] variant.
//!
//! ```
//! use tabula_export::registry::{ExportData, ExportOptions, ExporterRegistry};
//! use tokio_util::sync::CancellationToken;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> tabula_export::Result<()> {
//! let registry = ExporterRegistry::with_builtin_exporters();
//! let data = ExportData::table(vec![json!({"a": 1})], vec![]);
//! let artifact = registry
//!     .export_data("csv", &data, &ExportOptions::default(), &CancellationToken::new())
//!     .await?;
//! assert_eq!(artifact.as_text(), Some("a\r\n1\r\n"));
//! # Ok(())
//! # }
//! ```

mod traits;

pub use traits::{
    BuilderExporter, DirectExporter, ExportBuilder, ExportData, ExportOptions, ExporterModule,
    Loader,
};

use crate::artifact::ExportArtifact;
use crate::error::{Error, Result};
use crate::lifecycle::checkpoint;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Registration record for one exporter
#[derive(Clone)]
pub struct ExporterDefinition {
    /// Unique key; re-registering the same key replaces the definition
    pub key: String,
    /// Human-readable name
    pub display_name: String,
    /// Constructs the module on first use
    pub loader: Loader,
    /// Names that must be provided to the registry before loading
    pub dependencies: BTreeSet<String>,
    /// Lower-cased format keys this definition answers to
    pub formats: BTreeSet<String>,
    /// The module is a [`BuilderExporter`] rather than a [`DirectExporter`]
    pub builder_mode: bool,
}

impl ExporterDefinition {
    /// Create a direct-mode definition answering to its own key
    pub fn new<F, Fut>(key: impl Into<String>, display_name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ExporterModule>> + Send + 'static,
    {
        let key = key.into().trim().to_string();
        Self {
            formats: BTreeSet::from([key.to_lowercase()]),
            key,
            display_name: display_name.into(),
            loader: Arc::new(move || loader().boxed()),
            dependencies: BTreeSet::new(),
            builder_mode: false,
        }
    }

    /// Add format aliases
    #[must_use]
    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.formats
            .extend(formats.into_iter().map(|f| f.as_ref().trim().to_lowercase()));
        self
    }

    /// Declare required dependencies
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Mark the definition as builder-mode
    #[must_use]
    pub fn builder(mut self) -> Self {
        self.builder_mode = true;
        self
    }

    /// True if `format` (already lower-cased) is one of this definition's formats
    pub fn handles(&self, format: &str) -> bool {
        self.formats.contains(format)
    }
}

impl fmt::Debug for ExporterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterDefinition")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("dependencies", &self.dependencies)
            .field("formats", &self.formats)
            .field("builder_mode", &self.builder_mode)
            .finish_non_exhaustive()
    }
}

/// A module that has been loaded and cached
#[derive(Clone, Debug)]
pub struct LoadedExporter {
    /// The constructed module
    pub module: ExporterModule,
    /// The definition it was loaded from
    pub definition: ExporterDefinition,
    /// When the loader finished
    pub loaded_at: DateTime<Utc>,
}

/// Registry of exporter definitions with a loaded-module cache
///
/// Construct one at startup and share it (`Arc<ExporterRegistry>`) with every
/// consumer; there is no global instance.
pub struct ExporterRegistry {
    definitions: StdRwLock<BTreeMap<String, ExporterDefinition>>,
    provided: StdRwLock<HashSet<String>>,
    // Keyed by definition key so aliases share one module.
    // Never held across a loader await.
    cache: RwLock<HashMap<String, LoadedExporter>>,
}

impl ExporterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            definitions: StdRwLock::new(BTreeMap::new()),
            provided: StdRwLock::new(HashSet::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in `csv`, `json` and `csv-bundle` exporters
    pub fn with_builtin_exporters() -> Self {
        let registry = Self::new();
        for definition in crate::exporters::builtin_definitions() {
            registry.register_exporter(definition);
        }
        registry
    }

    /// Add or replace a definition
    ///
    /// Replacing a definition drops any module cached for its key.
    pub fn register_exporter(&self, definition: ExporterDefinition) {
        let key = definition.key.clone();
        let replaced = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), definition)
            .is_some();

        if replaced {
            // try_write only fails while a load is publishing; the stale entry
            // is then evicted on the next load of this key
            if let Ok(mut cache) = self.cache.try_write() {
                cache.remove(&key);
            }
            tracing::debug!(exporter = %key, "exporter definition replaced");
        } else {
            tracing::debug!(exporter = %key, "exporter registered");
        }
    }

    /// Mark a dependency as available
    pub fn provide_dependency(&self, name: impl Into<String>) {
        self.provided
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    /// Every registered format key, sorted
    pub fn formats(&self) -> Vec<String> {
        let definitions = self.definitions.read().unwrap_or_else(PoisonError::into_inner);
        let formats: BTreeSet<String> = definitions
            .values()
            .flat_map(|d| d.formats.iter().cloned())
            .collect();
        formats.into_iter().collect()
    }

    /// True if some definition answers to `format`
    pub fn is_supported(&self, format: &str) -> bool {
        self.find_definition(&normalize(format)).is_some()
    }

    /// True if the module serving `format` has been loaded
    pub async fn is_loaded(&self, format: &str) -> bool {
        match self.find_definition(&normalize(format)) {
            Some(definition) => self.cache.read().await.contains_key(&definition.key),
            None => false,
        }
    }

    /// Drop every cached module
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Resolve `format` to its module, loading it on first use
    ///
    /// Fails with [`Error::ExporterNotFound`] before any loading when no
    /// definition claims the format, and with [`Error::DependencyMissing`] when
    /// a declared dependency has not been provided.
    pub async fn load_exporter(&self, format: &str) -> Result<LoadedExporter> {
        let definition = self.resolve(format)?;
        self.load_definition(definition).await
    }

    /// Export `data` with the direct exporter serving `format`
    pub async fn export_data(
        &self,
        format: &str,
        data: &ExportData,
        options: &ExportOptions,
        token: &CancellationToken,
    ) -> Result<ExportArtifact> {
        let definition = self.resolve(format)?;
        if definition.builder_mode {
            return Err(Error::BuilderRequired {
                format: format.to_string(),
            });
        }

        let loaded = self.load_definition(definition).await?;
        checkpoint(token)?;

        match &loaded.module {
            ExporterModule::Direct(exporter) => {
                let artifact = exporter.export(data, options, token).await?;
                tracing::info!(
                    format = %format,
                    exporter = exporter.name(),
                    bytes = artifact.len(),
                    rows = artifact.stats.rows,
                    "export finished"
                );
                Ok(artifact)
            }
            ExporterModule::Builder(_) => Err(Error::BuilderRequired {
                format: format.to_string(),
            }),
        }
    }

    /// Start a builder for the builder-mode exporter serving `format`
    pub async fn create_builder(
        &self,
        format: &str,
        options: &ExportOptions,
    ) -> Result<Box<dyn ExportBuilder>> {
        let definition = self.resolve(format)?;
        if !definition.builder_mode {
            return Err(Error::BuilderUnsupported {
                format: format.to_string(),
            });
        }

        let loaded = self.load_definition(definition).await?;
        match &loaded.module {
            ExporterModule::Builder(exporter) => exporter.create_builder(options),
            ExporterModule::Direct(_) => Err(Error::BuilderUnsupported {
                format: format.to_string(),
            }),
        }
    }

    fn find_definition(&self, format: &str) -> Option<ExporterDefinition> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|d| d.handles(format))
            .cloned()
    }

    fn resolve(&self, format: &str) -> Result<ExporterDefinition> {
        let definition =
            self.find_definition(&normalize(format))
                .ok_or_else(|| Error::ExporterNotFound {
                    format: format.to_string(),
                })?;

        let missing: Vec<String> = {
            let provided = self.provided.read().unwrap_or_else(PoisonError::into_inner);
            definition
                .dependencies
                .iter()
                .filter(|d| !provided.contains(*d))
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            return Err(Error::DependencyMissing {
                format: format.to_string(),
                missing,
            });
        }

        Ok(definition)
    }

    async fn load_definition(&self, definition: ExporterDefinition) -> Result<LoadedExporter> {
        if let Some(loaded) = self.cache.read().await.get(&definition.key)
            && Arc::ptr_eq(&loaded.definition.loader, &definition.loader)
        {
            tracing::debug!(exporter = %definition.key, "exporter cache hit");
            return Ok(loaded.clone());
        }

        tracing::debug!(exporter = %definition.key, "loading exporter");
        let module = (definition.loader)().await?;

        if module.is_builder() != definition.builder_mode {
            tracing::error!(
                exporter = %definition.key,
                builder_mode = definition.builder_mode,
                module = module.name(),
                "exporter module does not match its definition"
            );
            return Err(Error::CapabilityMismatch {
                key: definition.key.clone(),
            });
        }

        let loaded = LoadedExporter {
            module,
            definition,
            loaded_at: Utc::now(),
        };
        self.cache
            .write()
            .await
            .insert(loaded.definition.key.clone(), loaded.clone());
        tracing::info!(
            exporter = %loaded.definition.key,
            module = loaded.module.name(),
            "exporter loaded"
        );
        Ok(loaded)
    }
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("formats", &self.formats())
            .finish_non_exhaustive()
    }
}

fn normalize(format: &str) -> String {
    format.trim().to_lowercase()
}
