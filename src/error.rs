//! Error types for tabula-export
//!
//! This module provides the error taxonomy shared by the codec, the lifecycle,
//! the downloader and the exporter registry:
//! - Fail-fast validation errors (never retried)
//! - Cancellation, which the lifecycle deliberately keeps out of the failure channel
//! - Transient and terminal I/O errors for the retrying downloader
//! - Registry lookup and capability errors
//! - Machine-readable error codes and a cloneable [`ErrorDetail`] snapshot

use crate::lifecycle::CancelReason;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tabula-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tabula-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.timeout")
        key: Option<String>,
    },

    /// Malformed export input, raised before any encoding work begins
    #[error("validation failed: {}", .errors.join("; "))]
    Validation {
        /// Every structural problem that was found
        errors: Vec<String>,
    },

    /// The operation was cancelled through its cancellation token
    #[error("operation cancelled: {0}")]
    Cancelled(CancelReason),

    /// Network or timeout failure that may succeed on a later attempt
    #[error("transient I/O error: {message}")]
    TransientIo {
        /// What went wrong on this attempt
        message: String,
    },

    /// The last error after every retry attempt was used up
    #[error("I/O failed after {attempts} attempt(s): {source}")]
    TerminalIo {
        /// Number of attempts that were made
        attempts: u32,
        /// The error from the final attempt
        source: Box<Error>,
    },

    /// No exporter definition claims the requested format
    #[error("no exporter registered for format '{format}'")]
    ExporterNotFound {
        /// The requested format key
        format: String,
    },

    /// The matched exporter declares dependencies that are not available
    #[error("exporter for '{format}' is missing dependencies: {}", .missing.join(", "))]
    DependencyMissing {
        /// The requested format key
        format: String,
        /// Dependency names that were not provided to the registry
        missing: Vec<String>,
    },

    /// The format is builder-mode and must go through `create_builder`
    #[error("format '{format}' is builder-based; use create_builder instead")]
    BuilderRequired {
        /// The requested format key
        format: String,
    },

    /// The format exports directly and cannot produce a builder
    #[error("format '{format}' does not support builders")]
    BuilderUnsupported {
        /// The requested format key
        format: String,
    },

    /// A loader returned a module whose capability contradicts its definition
    #[error("exporter '{key}' returned a module that does not match its builder_mode")]
    CapabilityMismatch {
        /// The exporter definition key
        key: String,
    },

    /// CSV codec error
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Saving an artifact failed
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// CSV codec errors
#[derive(Debug, Error)]
pub enum CsvError {
    /// The delimiter cannot be used as a field separator
    #[error("invalid delimiter {delimiter:?}: {reason}")]
    InvalidDelimiter {
        /// The rejected delimiter
        delimiter: char,
        /// Why it was rejected
        reason: String,
    },

    /// A column formatter rejected a value
    #[error("formatter for column '{column}' failed: {message}")]
    Formatter {
        /// The column key whose formatter failed
        column: String,
        /// The formatter's message
        message: String,
    },

    /// A row could not be resolved into cells
    #[error("row {index} is not an object")]
    RowShape {
        /// Zero-based row index
        index: usize,
    },
}

/// Errors raised while writing artifacts to their destination
#[derive(Debug, Error)]
pub enum SinkError {
    /// The target exists and the collision action forbids replacing it
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The conflicting path
        path: PathBuf,
        /// Why no usable path was found
        reason: String,
    },

    /// The target path cannot be used
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The rejected path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Returns true if this error represents a cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation { .. } => "validation_error",
            Error::Cancelled(_) => "cancelled",
            Error::TransientIo { .. } => "transient_io_error",
            Error::TerminalIo { .. } => "terminal_io_error",
            Error::ExporterNotFound { .. } => "exporter_not_found",
            Error::DependencyMissing { .. } => "dependency_missing",
            Error::BuilderRequired { .. } => "builder_required",
            Error::BuilderUnsupported { .. } => "builder_unsupported",
            Error::CapabilityMismatch { .. } => "capability_mismatch",
            Error::Csv(e) => match e {
                CsvError::InvalidDelimiter { .. } => "invalid_delimiter",
                CsvError::Formatter { .. } => "formatter_error",
                CsvError::RowShape { .. } => "row_shape_error",
            },
            Error::Sink(e) => match e {
                SinkError::FileCollision { .. } => "file_collision",
                SinkError::InvalidPath { .. } => "invalid_path",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Cloneable, serializable view of an [`Error`]
///
/// [`Error`] wraps foreign errors that are neither `Clone` nor `Serialize`, so
/// observable state (see [`crate::lifecycle::OperationState`]) stores this
/// detail instead of the error itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "exporter_not_found")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for ErrorDetail {
    fn from(error: &Error) -> Self {
        let details = match error {
            Error::ExporterNotFound { format }
            | Error::BuilderRequired { format }
            | Error::BuilderUnsupported { format } => Some(serde_json::json!({
                "format": format,
            })),
            Error::DependencyMissing { format, missing } => Some(serde_json::json!({
                "format": format,
                "missing": missing,
            })),
            Error::Validation { errors } => Some(serde_json::json!({
                "errors": errors,
            })),
            Error::TerminalIo { attempts, .. } => Some(serde_json::json!({
                "attempts": attempts,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

impl From<Error> for ErrorDetail {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}
