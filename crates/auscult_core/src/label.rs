//! Class labels and classification results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of output classes the classifier head must produce.
pub const NUM_CLASSES: usize = 2;

/// Lung sound class.
///
/// The ordering is part of the model contract: logit 0 is `Normal`,
/// logit 1 is `Abnormal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// No adventitious sounds detected.
    Normal,
    /// Adventitious sounds (crackles, wheezes, ...) detected.
    Abnormal,
}

impl Label {
    /// All labels in logit order.
    pub const ALL: [Label; NUM_CLASSES] = [Label::Normal, Label::Abnormal];

    /// Map a logit index to its label.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(CoreError::InvalidLabel(index))
    }

    /// Logit index of this label.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Label::Normal => 0,
            Label::Abnormal => 1,
        }
    }

    /// Label name as used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Abnormal => "Abnormal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicted label with its confidence in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Argmax label.
    pub label: Label,
    /// Softmax probability of `label`, times 100, rounded to 2 decimals.
    pub confidence: f32,
}

impl ClassificationResult {
    /// Build a result from class probabilities (must sum to one).
    ///
    /// Ties resolve to the lower index, matching an argmax.
    pub fn from_probabilities(probs: &[f32]) -> Result<Self> {
        if probs.len() != NUM_CLASSES {
            return Err(CoreError::ShapeMismatch(format!(
                "expected {NUM_CLASSES} class probabilities, got {}",
                probs.len()
            )));
        }
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(CoreError::NonFinite("class probabilities".to_string()));
        }

        let (index, prob) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 {
                    (i, p)
                } else {
                    best
                }
            });

        Ok(Self {
            label: Label::from_index(index)?,
            confidence: round_percent(prob),
        })
    }

    /// Build a result from raw class logits.
    pub fn from_logits(logits: &[f32]) -> Result<Self> {
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(CoreError::NonFinite("logits".to_string()));
        }
        Self::from_probabilities(&softmax(logits))
    }
}

/// Numerically stable softmax, accumulated in `f64`.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = logits
        .iter()
        .map(|&l| (f64::from(l) - f64::from(max)).exp())
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| (e / sum) as f32).collect()
}

/// Probability to percent with two decimals.
fn round_percent(prob: f32) -> f32 {
    ((f64::from(prob) * 100.0 * 100.0).round() / 100.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order() {
        assert_eq!(Label::from_index(0).unwrap(), Label::Normal);
        assert_eq!(Label::from_index(1).unwrap(), Label::Abnormal);
        assert!(Label::from_index(2).is_err());
        assert_eq!(Label::Abnormal.index(), 1);
    }

    #[test]
    fn test_label_serde() {
        let json = serde_json::to_string(&Label::Abnormal).unwrap();
        assert_eq!(json, "\"Abnormal\"");
    }

    #[test]
    fn test_from_probabilities() {
        let result = ClassificationResult::from_probabilities(&[0.12345, 0.87655]).unwrap();
        assert_eq!(result.label, Label::Abnormal);
        assert!((result.confidence - 87.66).abs() < 1e-4);
    }

    #[test]
    fn test_from_probabilities_tie_picks_normal() {
        let result = ClassificationResult::from_probabilities(&[0.5, 0.5]).unwrap();
        assert_eq!(result.label, Label::Normal);
        assert!((result.confidence - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_logits() {
        let result = ClassificationResult::from_logits(&[0.0, 2.0]).unwrap();
        assert_eq!(result.label, Label::Abnormal);
        // 1 / (1 + e^-2) = 0.880797
        assert!((result.confidence - 88.08).abs() < 1e-4);

        let result = ClassificationResult::from_logits(&[1000.0, -1000.0]).unwrap();
        assert_eq!(result.label, Label::Normal);
        assert!((result.confidence - 100.0).abs() < 1e-6);
        assert!(result.confidence > 0.0 && result.confidence <= 100.0);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[0.3, -1.2]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[0] > p[1]);
    }

    #[test]
    fn test_from_probabilities_rejects_bad_input() {
        assert!(ClassificationResult::from_probabilities(&[1.0]).is_err());
        assert!(ClassificationResult::from_probabilities(&[f32::NAN, 0.5]).is_err());
    }
}
