//! Error types for sentry-state

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the state persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem error
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File exists but does not parse; left untouched
    #[error("Malformed file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Atomic rename of a temp file failed
    #[error("Failed to persist {path}: {message}")]
    Persist { path: PathBuf, message: String },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}
