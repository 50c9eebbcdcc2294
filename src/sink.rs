//! Artifact persistence
//!
//! Exporters produce in-memory [`ExportArtifact`]s; a sink decides where
//! they end up. [`FileSink`] writes them under a directory, resolving name
//! collisions with [`FileCollisionAction`].

use crate::artifact::ExportArtifact;
use crate::config::{ExportConfig, FileCollisionAction};
use crate::error::{Result, SinkError};
use crate::utils::get_unique_path;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Destination for finished artifacts
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `artifact`, returning where it was stored
    async fn save(&self, artifact: &ExportArtifact) -> Result<PathBuf>;

    /// Get the name of this sink
    fn name(&self) -> &'static str;
}

/// Writes artifacts into a directory using their suggested filename
#[derive(Clone, Debug)]
pub struct FileSink {
    output_dir: PathBuf,
    collision: FileCollisionAction,
}

impl FileSink {
    /// Sink writing into `output_dir`
    pub fn new(output_dir: impl Into<PathBuf>, collision: FileCollisionAction) -> Self {
        Self {
            output_dir: output_dir.into(),
            collision,
        }
    }

    /// Sink configured from [`ExportConfig`]
    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.output_dir.clone(), config.file_collision)
    }

    /// Target directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn target_path(&self, artifact: &ExportArtifact) -> Result<PathBuf> {
        // Only the final component is used so a filename cannot escape the directory
        let name = Path::new(&artifact.suggested_filename)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SinkError::InvalidPath {
                path: PathBuf::from(&artifact.suggested_filename),
                reason: "artifact has no usable filename".to_string(),
            })?;
        Ok(self.output_dir.join(name))
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn save(&self, artifact: &ExportArtifact) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let desired = self.target_path(artifact)?;
        let path = get_unique_path(&desired, self.collision)?;
        tokio::fs::write(&path, &artifact.content).await?;

        tracing::info!(
            path = %path.display(),
            bytes = artifact.len(),
            format = %artifact.format,
            "artifact saved"
        );
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
