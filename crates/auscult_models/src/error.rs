//! Error types for model construction and loading.

use thiserror::Error;

use crate::checkpoint::CheckpointError;

/// Errors raised while building or loading a classifier.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Config values that cannot produce a working model.
    #[error("Invalid model config: {0}")]
    InvalidConfig(String),

    /// Weights record could not be read or written.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Config JSON was malformed.
    #[error("Config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
