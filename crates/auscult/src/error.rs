//! Engine-level errors.

use std::path::PathBuf;

use auscult_audio::{AudioError, DecodeAttempt};
use auscult_core::CoreError;
use auscult_models::{CheckpointError, ModelError};
use thiserror::Error;

/// Errors callers of the engine can branch on.
///
/// Explainer failures never appear here: they are recovered internally
/// and reported through [`ExplainerPath`](auscult_explain::ExplainerPath).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input file does not exist.
    #[error("Audio file not found: {}", path.display())]
    NotFound {
        /// Absolute path that was checked.
        path: PathBuf,
    },

    /// Every decoder in the chain rejected the file.
    #[error("Could not decode {}: {}", path.display(), join_attempts(attempts))]
    DecodeFailed {
        /// The file.
        path: PathBuf,
        /// Each decoder's failure, in chain order.
        attempts: Vec<DecodeAttempt>,
    },

    /// Audio could be read but not brought to the fixed input contract.
    #[error("Preprocessing failed: {0}")]
    Preprocess(AudioError),

    /// The model cache could not produce a handle.
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),

    /// Feature extraction or the forward pass produced unusable output.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The explanation could not be persisted.
    #[error("Export failed: {0}")]
    Export(String),

    /// Engine configuration could not be read or written.
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

fn join_attempts(attempts: &[DecodeAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<AudioError> for EngineError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::NotFound { path } => EngineError::NotFound { path },
            AudioError::DecodeFailed { path, attempts } => {
                EngineError::DecodeFailed { path, attempts }
            }
            AudioError::FeatureExtraction(msg) => EngineError::Inference(msg),
            other => EngineError::Preprocess(other),
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        EngineError::ModelLoadFailed(err.to_string())
    }
}

impl From<CheckpointError> for EngineError {
    fn from(err: CheckpointError) -> Self {
        EngineError::ModelLoadFailed(err.to_string())
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        EngineError::Inference(err.to_string())
    }
}

impl EngineError {
    /// Short machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::DecodeFailed { .. } => "decode_failed",
            EngineError::Preprocess(_) => "preprocess_failed",
            EngineError::ModelLoadFailed(_) => "model_load_failed",
            EngineError::Inference(_) => "inference_failed",
            EngineError::Export(_) => "export_failed",
            EngineError::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_errors_keep_their_kind() {
        let err: EngineError = AudioError::NotFound {
            path: PathBuf::from("/x.wav"),
        }
        .into();
        assert_eq!(err.kind(), "not_found");

        let err: EngineError = AudioError::DecodeFailed {
            path: PathBuf::from("/x.wav"),
            attempts: vec![],
        }
        .into();
        assert_eq!(err.kind(), "decode_failed");

        let err: EngineError = AudioError::Resample("bad".into()).into();
        assert_eq!(err.kind(), "preprocess_failed");
    }

    #[test]
    fn test_model_errors_are_load_failures() {
        let err: EngineError = ModelError::InvalidConfig("heads".into()).into();
        assert!(matches!(err, EngineError::ModelLoadFailed(_)));
        let err: EngineError = CheckpointError::Missing("model.mpk".into()).into();
        assert_eq!(err.kind(), "model_load_failed");
    }
}
