//! Error types for auscult_audio.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`AudioError`].
pub type Result<T> = std::result::Result<T, AudioError>;

/// One decoder's failure inside the fallback chain.
#[derive(Debug, Clone)]
pub struct DecodeAttempt {
    /// Decoder name.
    pub decoder: &'static str,
    /// Failure message.
    pub message: String,
}

impl std::fmt::Display for DecodeAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.decoder, self.message)
    }
}

/// Errors that can occur while loading and preparing audio.
#[derive(Error, Debug)]
pub enum AudioError {
    /// The input file does not exist.
    #[error("Audio file not found: {}", path.display())]
    NotFound {
        /// Absolute path that was checked.
        path: PathBuf,
    },

    /// Every decoder in the chain failed.
    #[error("Failed to decode {}: {}", path.display(), format_attempts(attempts))]
    DecodeFailed {
        /// Absolute path of the input.
        path: PathBuf,
        /// Failures in the order the decoders were tried.
        attempts: Vec<DecodeAttempt>,
    },

    /// A single decoder failed (collected into [`AudioError::DecodeFailed`]).
    #[error("{decoder} decoder failed: {message}")]
    Decoder {
        /// Decoder name.
        decoder: &'static str,
        /// Failure message.
        message: String,
    },

    /// Sample rate conversion failed.
    #[error("Resampling error: {0}")]
    Resample(String),

    /// Feature extractor configuration is invalid.
    #[error("Invalid feature extractor config: {0}")]
    InvalidConfig(String),

    /// Feature extraction failed.
    #[error("Feature extraction error: {0}")]
    FeatureExtraction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_attempts(attempts: &[DecodeAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
