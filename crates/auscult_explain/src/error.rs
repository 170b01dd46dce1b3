//! Errors raised inside the explainers.
//!
//! These never reach engine callers: a failing primary algorithm is
//! replaced by its proxy map and the error is only logged.

use auscult_core::CoreError;
use thiserror::Error;

/// Reasons a primary explainer could not produce a map.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// The input leaf received no gradient from the predicted logit.
    #[error("no gradient reached the input features")]
    NoGradient,

    /// The model reported no attention weights.
    #[error("model returned no attention weights")]
    NoAttentions,

    /// Tensor or map dimensions did not line up.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// NaN or infinite values in an intermediate result.
    #[error("non-finite values in {0}")]
    NonFinite(String),

    /// Map construction failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for explainer internals.
pub type Result<T> = std::result::Result<T, ExplainError>;
