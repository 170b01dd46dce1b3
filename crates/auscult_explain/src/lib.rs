//! # auscult_explain
//!
//! Explainability for the auscult classifier.
//!
//! Two primary algorithms, each paired with a proxy map used when the
//! primary path cannot run:
//!
//! | Method | Primary | Proxy |
//! |--------|---------|-------|
//! | Gradient saliency | `abs(d logit / d features)` | per-bin variance over time |
//! | Attention rollout | CLS row of the rolled-out attention | per-frame mean energy |
//!
//! [`explain_with_fallback`] runs a primary/proxy pair and never fails.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub mod grid;
pub mod rollout;
pub mod saliency;
pub mod upsample;

use std::fmt;

use auscult_core::ImportanceMap;
use serde::{Deserialize, Serialize};

pub use error::{ExplainError, Result};
pub use grid::patch_grid;
pub use rollout::{attention_rollout, energy_proxy, rollout_map};
pub use saliency::{
    collapse_gradient, gradient_saliency, input_gradient, variance_proxy, InputGradient,
};
pub use upsample::bilinear_resize;

/// Which algorithm produced an importance map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainerPath {
    /// The gradient or rollout computation itself.
    Primary,
    /// A spectrogram statistic standing in for the primary map.
    Fallback,
}

impl fmt::Display for ExplainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainerPath::Primary => f.write_str("primary"),
            ExplainerPath::Fallback => f.write_str("fallback"),
        }
    }
}

/// Run `primary`, falling back to `fallback` on any error or when the
/// primary map is not `shape`.
///
/// A failing fallback yields an all-zero map of `shape`, so the result
/// always matches the background spectrogram.
pub fn explain_with_fallback<P, F>(
    method: &str,
    shape: (usize, usize),
    primary: P,
    fallback: F,
) -> (ImportanceMap, ExplainerPath)
where
    P: FnOnce() -> Result<ImportanceMap>,
    F: FnOnce() -> Result<ImportanceMap>,
{
    let reason = match primary() {
        Ok(map) if map.shape() == shape => return (map, ExplainerPath::Primary),
        Ok(map) => ExplainError::ShapeMismatch(format!(
            "map {:?} vs spectrogram {shape:?}",
            map.shape()
        )),
        Err(e) => e,
    };
    tracing::warn!("{method} failed, using fallback: {reason}");

    match fallback() {
        Ok(map) if map.shape() == shape => (map, ExplainerPath::Fallback),
        Ok(map) => {
            tracing::warn!(
                "{method} fallback produced {:?}, expected {shape:?}; returning an empty map",
                map.shape()
            );
            (ImportanceMap::zeros(shape.0, shape.1), ExplainerPath::Fallback)
        }
        Err(e) => {
            tracing::warn!("{method} fallback failed: {e}; returning an empty map");
            (ImportanceMap::zeros(shape.0, shape.1), ExplainerPath::Fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn map() -> ImportanceMap {
        ImportanceMap::normalize(array![[0.0, 1.0], [2.0, 3.0]]).unwrap()
    }

    #[test]
    fn test_primary_wins() {
        let (m, path) = explain_with_fallback("test", (2, 2), || Ok(map()), || unreachable!());
        assert_eq!(path, ExplainerPath::Primary);
        assert_eq!(m, map());
    }

    #[test]
    fn test_error_uses_fallback() {
        let (m, path) = explain_with_fallback(
            "test",
            (2, 2),
            || Err(ExplainError::NoGradient),
            || Ok(ImportanceMap::zeros(2, 2)),
        );
        assert_eq!(path, ExplainerPath::Fallback);
        assert_eq!(m.shape(), (2, 2));
    }

    #[test]
    fn test_wrong_shape_uses_fallback() {
        let (m, path) = explain_with_fallback(
            "test",
            (3, 2),
            || Ok(map()),
            || Ok(ImportanceMap::zeros(3, 2)),
        );
        assert_eq!(path, ExplainerPath::Fallback);
        assert_eq!(m.shape(), (3, 2));
    }

    #[test]
    fn test_failing_fallback_is_zero_map() {
        let (m, path) = explain_with_fallback(
            "test",
            (4, 5),
            || Err(ExplainError::NoAttentions),
            || Err(ExplainError::NonFinite("spectrogram".into())),
        );
        assert_eq!(path, ExplainerPath::Fallback);
        assert_eq!(m, ImportanceMap::zeros(4, 5));
    }

    #[test]
    fn test_path_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ExplainerPath::Fallback).unwrap(),
            "\"fallback\""
        );
        assert_eq!(ExplainerPath::Primary.to_string(), "primary");
    }
}
