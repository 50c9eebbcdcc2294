//! Configuration types for tabula-export

use crate::csv::{DEFAULT_OVERSIZE_THRESHOLD, EncodeOptions};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote download behaviour (retries, per-attempt timeout, HTTP identity)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Retries after the first attempt (default: 3, so up to 4 attempts)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base backoff; attempt `n` waits `retry_delay * (n + 1)` (default: 1000 ms)
    #[serde(default = "default_retry_delay", with = "duration_ms_serde")]
    pub retry_delay: Duration,

    /// Per-attempt timeout (default: 30000 ms)
    #[serde(default = "default_download_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// User-Agent header sent by the HTTP fetcher
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Add random jitter to backoff delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            timeout: default_download_timeout(),
            user_agent: default_user_agent(),
            jitter: false,
        }
    }
}

/// Export behaviour (timeouts, output location, encoding defaults)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Timeout for a whole export execution (None = no timeout)
    #[serde(default, with = "optional_duration_ms_serde")]
    pub timeout: Option<Duration>,

    /// Directory used by [`crate::sink::FileSink`] (default: "./exports")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// What to do when the target file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Maximum length of a suggested filename in characters (default: 200)
    #[serde(default = "default_max_filename_len")]
    pub max_filename_len: usize,

    /// Row count above which validation warns (default: 100000)
    #[serde(default = "default_oversize_threshold")]
    pub oversize_row_threshold: usize,

    /// Encoding defaults applied when a request does not override them
    #[serde(default)]
    pub encode: EncodeOptions,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            output_dir: default_output_dir(),
            file_collision: FileCollisionAction::default(),
            max_filename_len: default_max_filename_len(),
            oversize_row_threshold: default_oversize_threshold(),
            encode: EncodeOptions::default(),
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Skip the file, keep existing
    Skip,
}

/// Main configuration
///
/// - [`download`](DownloadConfig): retry and timeout policy for remote artifacts
/// - [`export`](ExportConfig): export timeouts, output directory and encoding defaults
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Remote download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.download.timeout.is_zero() {
            return Err(Error::config("download.timeout", "timeout must be greater than zero"));
        }
        if self.export.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config(
                "export.timeout",
                "timeout must be greater than zero (omit it to disable)",
            ));
        }
        if self.export.max_filename_len == 0 {
            return Err(Error::config(
                "export.max_filename_len",
                "filename length limit must be at least 1",
            ));
        }
        self.export
            .encode
            .check()
            .map_err(|e| Error::config("export.encode", e.to_string()))?;
        Ok(())
    }
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_download_timeout() -> Duration {
    Duration::from_millis(30_000)
}

fn default_user_agent() -> String {
    concat!("tabula-export/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_max_filename_len() -> usize {
    200
}

fn default_oversize_threshold() -> usize {
    DEFAULT_OVERSIZE_THRESHOLD
}

// Duration serialization helper (integer milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper (integer milliseconds)
mod optional_duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
