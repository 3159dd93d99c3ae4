//! Error types for Keywatch.
//!
//! Library crates use [`KeywatchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Keywatch operations.
#[derive(Debug, thiserror::Error)]
pub enum KeywatchError {
    /// Configuration loading or validation error. The only fatal class:
    /// raised at pipeline construction, before any keyword is processed.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to an evidence provider.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed provider payload or input document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Evidence provider error (credentials, unexpected response shape).
    #[error("provider error: {0}")]
    Provider(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input batch, invalid date, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The pipeline run was cancelled by its owner.
    #[error("pipeline run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KeywatchError>;

impl KeywatchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
