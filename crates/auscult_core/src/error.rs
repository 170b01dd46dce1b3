//! Error types for auscult_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur in auscult_core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A map or spectrogram with no elements.
    #[error("Empty map: {0}")]
    EmptyMap(String),

    /// NaN or infinite values where a finite map was required.
    #[error("Non-finite values in {0}")]
    NonFinite(String),

    /// Shape mismatch between arrays.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Class index outside the fixed label set.
    #[error("Invalid class index {0}: expected 0 (Normal) or 1 (Abnormal)")]
    InvalidLabel(usize),
}
