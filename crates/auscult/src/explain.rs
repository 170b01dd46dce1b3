//! Gradient saliency and attention rollout over a cached model.
//!
//! Both explainers classify the input with the same forward pass they
//! explain, so the reported label always matches the map. Neither one
//! fails because of the explanation itself: when the primary algorithm
//! cannot run, a spectrogram statistic is returned instead and
//! [`ExplanationResult::explainer_path`] is set to
//! [`ExplainerPath::Fallback`].

use std::fmt;
use std::path::{Path, PathBuf};

use auscult_core::{ClassificationResult, ImportanceMap};
use auscult_explain::{
    energy_proxy, explain_with_fallback, gradient_saliency, input_gradient, rollout_map,
    variance_proxy, ExplainerPath,
};
use auscult_models::AudioClassifier;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::cache::ModelHandle;
use crate::classify::Classifier;
use crate::error::Result;

/// Value of `classification_type` in every report.
pub const CLASSIFICATION_TYPE: &str = "lung_audio";

/// Explanation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XaiType {
    /// Input-gradient magnitude.
    GradientSaliency,
    /// Attention rollout through every encoder layer.
    AttentionRollout,
}

impl XaiType {
    /// Name used in reports and export file names.
    pub const fn as_str(self) -> &'static str {
        match self {
            XaiType::GradientSaliency => "gradient_saliency",
            XaiType::AttentionRollout => "attention_rollout",
        }
    }

    const fn title(self) -> &'static str {
        match self {
            XaiType::GradientSaliency => "Gradient saliency",
            XaiType::AttentionRollout => "Attention rollout",
        }
    }
}

impl fmt::Display for XaiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification plus an importance map over the spectrogram.
///
/// `importance_map` and `background_spectrogram` always have the same
/// `(time, freq)` shape and values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplanationResult {
    /// Always [`CLASSIFICATION_TYPE`].
    pub classification_type: &'static str,
    /// Predicted label and confidence.
    #[serde(flatten)]
    pub classification: ClassificationResult,
    /// Algorithm that was requested.
    pub xai_type: XaiType,
    /// Whether the map came from that algorithm or its proxy.
    pub explainer_path: ExplainerPath,
    /// Normalized importance per `(time, freq)` cell.
    pub importance_map: ImportanceMap,
    /// Normalized log-mel spectrogram.
    pub background_spectrogram: ImportanceMap,
    /// One-paragraph summary.
    pub explanation: String,
    /// Where the visualization was exported, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_saved: Option<PathBuf>,
}

impl ExplanationResult {
    fn new(
        classification: ClassificationResult,
        xai_type: XaiType,
        explainer_path: ExplainerPath,
        importance_map: ImportanceMap,
        background_spectrogram: ImportanceMap,
    ) -> Self {
        let mut result = Self {
            classification_type: CLASSIFICATION_TYPE,
            classification,
            xai_type,
            explainer_path,
            importance_map,
            background_spectrogram,
            explanation: String::new(),
            visualization_saved: None,
        };
        result.explanation = result.describe();
        result
    }

    /// Record an export location and mention it in the summary.
    pub fn attach_visualization(&mut self, path: impl Into<PathBuf>) {
        self.visualization_saved = Some(path.into());
        self.explanation = self.describe();
    }

    fn describe(&self) -> String {
        let label = self.classification.label;
        let confidence = self.classification.confidence;
        let heatmap = match &self.visualization_saved {
            Some(path) => format!("Spectrogram heatmap saved to {}", path.display()),
            None => "Spectrogram heatmap".to_string(),
        };

        let mut text = match self.xai_type {
            XaiType::GradientSaliency => format!(
                "{} analysis completed for {label} prediction. {heatmap} shows which \
                 time-frequency regions most influenced the {label} classification \
                 with {confidence}% confidence.",
                self.xai_type.title()
            ),
            XaiType::AttentionRollout => format!(
                "{} analysis completed for {label} prediction. {heatmap} shows which \
                 time-frequency regions the model focused on, leading to {label} \
                 classification with {confidence}% confidence.",
                self.xai_type.title()
            ),
        };

        if self.explainer_path == ExplainerPath::Fallback {
            text.push_str(match self.xai_type {
                XaiType::GradientSaliency => {
                    " Gradients were unavailable; the map shows per-frequency variance instead."
                }
                XaiType::AttentionRollout => {
                    " Attention weights were unavailable; the map shows per-frame energy instead."
                }
            });
        }
        text
    }

    /// Exported file path, if any.
    pub fn visualization_path(&self) -> Option<&Path> {
        self.visualization_saved.as_deref()
    }
}

/// Importance from `|d logit / d features|` of the predicted class.
///
/// Falls back to the variance of each frequency bin across time when the
/// model provides no gradient to its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientSaliencyExplainer;

impl GradientSaliencyExplainer {
    /// Classify and explain a fixed-length waveform.
    pub fn explain<B, M>(
        &self,
        handle: &ModelHandle<B, M>,
        waveform: &[f32],
    ) -> Result<ExplanationResult>
    where
        B: AutodiffBackend,
        M: AudioClassifier<B>,
    {
        let features = handle.features(waveform)?;
        let background = features.background()?;
        let shape = features.shape();
        let model = handle.model();

        let mut classification = None;
        let (map, path) = explain_with_fallback(
            "gradient saliency",
            shape,
            || {
                let grad = input_gradient(&model, features.tensor.clone())?;
                classification = ClassificationResult::from_logits(&grad.logits).ok();
                gradient_saliency(&grad.gradient, shape)
            },
            || variance_proxy(&features.spectrogram),
        );

        let classification = match classification {
            Some(c) => c,
            None => Classifier.from_logits(model.logits(features.tensor.detach()))?,
        };

        tracing::debug!(
            "Gradient saliency: {} ({}%), {} path",
            classification.label,
            classification.confidence,
            path
        );

        Ok(ExplanationResult::new(
            classification,
            XaiType::GradientSaliency,
            path,
            map,
            background,
        ))
    }
}

/// Importance from attention rollout of the CLS token, upsampled from the
/// patch grid to the spectrogram.
///
/// Falls back to per-frame mean energy when the model reports no
/// attention weights or they cannot be rolled out.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttentionRolloutExplainer;

impl AttentionRolloutExplainer {
    /// Classify and explain a fixed-length waveform.
    pub fn explain<B, M>(
        &self,
        handle: &ModelHandle<B, M>,
        waveform: &[f32],
    ) -> Result<ExplanationResult>
    where
        B: AutodiffBackend,
        M: AudioClassifier<B>,
    {
        let features = handle.features(waveform)?;
        let background = features.background()?;
        let shape = features.shape();

        let (logits, attentions) = handle
            .model()
            .logits_with_attentions(features.tensor.clone().detach());
        let classification = Classifier.from_logits(logits)?;

        let (map, path) = explain_with_fallback(
            "attention rollout",
            shape,
            || rollout_map(&attentions, shape),
            || energy_proxy(&features.spectrogram),
        );

        tracing::debug!(
            "Attention rollout over {} layers: {} ({}%), {} path",
            attentions.len(),
            classification.label,
            classification.confidence,
            path
        );

        Ok(ExplanationResult::new(
            classification,
            XaiType::AttentionRollout,
            path,
            map,
            background,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auscult_core::Label;
    use ndarray::array;

    fn result(xai_type: XaiType, path: ExplainerPath) -> ExplanationResult {
        let map = ImportanceMap::normalize(array![[0.0, 1.0], [2.0, 3.0]]).unwrap();
        ExplanationResult::new(
            ClassificationResult {
                label: Label::Abnormal,
                confidence: 87.5,
            },
            xai_type,
            path,
            map.clone(),
            map,
        )
    }

    #[test]
    fn test_gradient_text() {
        let mut r = result(XaiType::GradientSaliency, ExplainerPath::Primary);
        assert_eq!(
            r.explanation,
            "Gradient saliency analysis completed for Abnormal prediction. Spectrogram heatmap \
             shows which time-frequency regions most influenced the Abnormal classification \
             with 87.5% confidence."
        );

        r.attach_visualization("outputs/rec_gradient_saliency.json");
        assert!(r
            .explanation
            .contains("saved to outputs/rec_gradient_saliency.json shows"));
        assert_eq!(
            r.visualization_path(),
            Some(Path::new("outputs/rec_gradient_saliency.json"))
        );
    }

    #[test]
    fn test_attention_fallback_text() {
        let r = result(XaiType::AttentionRollout, ExplainerPath::Fallback);
        assert!(r.explanation.starts_with("Attention rollout analysis completed"));
        assert!(r.explanation.contains("the model focused on"));
        assert!(r.explanation.ends_with("per-frame energy instead."));
    }

    #[test]
    fn test_report_json() {
        let r = result(XaiType::AttentionRollout, ExplainerPath::Primary);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["classification_type"], "lung_audio");
        assert_eq!(json["label"], "Abnormal");
        assert_eq!(json["confidence"], 87.5);
        assert_eq!(json["xai_type"], "attention_rollout");
        assert_eq!(json["explainer_path"], "primary");
        assert_eq!(json["importance_map"].as_array().unwrap().len(), 2);
        assert!(json.get("visualization_saved").is_none());
    }
}
