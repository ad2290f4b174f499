//! Error types for the save coordination runtime

use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for distributed model-save coordination
#[derive(Error, Debug)]
pub enum Error {
    // Cluster configuration errors
    #[error("Cluster configuration missing: environment variable {variable} is unset")]
    ClusterConfigMissing { variable: String },

    #[error("Invalid cluster configuration: {message}")]
    InvalidClusterConfig { message: String },

    #[error("Cluster must designate exactly one chief, found {count}")]
    InvalidChiefCount { count: usize },

    #[error("Task of type {task_type} has no task index")]
    MissingTaskIndex { task_type: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Artifact errors
    #[error("Artifact corrupted at {path}: {reason}")]
    ArtifactCorrupted { path: String, reason: String },

    // Coordination errors
    #[error(
        "Timed out after {timeout_ms}ms waiting for worker cleanup under {path} (pending: {pending:?})"
    )]
    CleanupTimeout {
        path: String,
        timeout_ms: u64,
        pending: Vec<String>,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::CleanupTimeout { .. })
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ClusterConfigMissing { .. }
                | Error::InvalidClusterConfig { .. }
                | Error::InvalidChiefCount { .. }
                | Error::MissingTaskIndex { .. }
                | Error::ArtifactCorrupted { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
