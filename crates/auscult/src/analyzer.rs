//! Named, path-in/report-out entry points.
//!
//! Each analyzer wraps the same [`Engine`], so all of them share one
//! preprocessor and one model cache.

use std::path::Path;
use std::sync::Arc;

use auscult_core::ClassificationResult;
use burn::tensor::backend::AutodiffBackend;
use serde::Serialize;

use crate::cache::ModelLoader;
use crate::engine::Engine;
use crate::error::Result;
use crate::explain::{ExplanationResult, XaiType, CLASSIFICATION_TYPE};

/// A named analysis over one audio file.
pub trait Analyzer: Send + Sync {
    /// Stable tool name.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// Analyze the audio file at `path`.
    fn run(&self, path: &Path) -> Result<AnalysisReport>;
}

/// Classification without an explanation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    /// Always `"lung_audio"`.
    pub classification_type: &'static str,
    /// Predicted label and confidence.
    #[serde(flatten)]
    pub classification: ClassificationResult,
}

/// What an [`Analyzer`] returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    /// From [`AudioClassificationAnalyzer`].
    Classification(ClassificationReport),
    /// From an explaining analyzer.
    Explanation(Box<ExplanationResult>),
}

impl AnalysisReport {
    /// The classification carried by either variant.
    pub fn classification(&self) -> &ClassificationResult {
        match self {
            AnalysisReport::Classification(report) => &report.classification,
            AnalysisReport::Explanation(result) => &result.classification,
        }
    }

    /// The explanation, if this report has one.
    pub fn explanation(&self) -> Option<&ExplanationResult> {
        match self {
            AnalysisReport::Classification(_) => None,
            AnalysisReport::Explanation(result) => Some(result),
        }
    }
}

/// `audio_classification`: label and confidence.
pub struct AudioClassificationAnalyzer<B: AutodiffBackend, L: ModelLoader<B>> {
    engine: Arc<Engine<B, L>>,
}

impl<B: AutodiffBackend, L: ModelLoader<B>> AudioClassificationAnalyzer<B, L> {
    /// Analyzer over a shared engine.
    pub fn new(engine: Arc<Engine<B, L>>) -> Self {
        Self { engine }
    }
}

impl<B: AutodiffBackend, L: ModelLoader<B>> Analyzer for AudioClassificationAnalyzer<B, L> {
    fn name(&self) -> &'static str {
        "audio_classification"
    }

    fn description(&self) -> &'static str {
        "Classify a lung sound recording as Normal or Abnormal"
    }

    fn run(&self, path: &Path) -> Result<AnalysisReport> {
        let classification = self.engine.classify(path)?;
        Ok(AnalysisReport::Classification(ClassificationReport {
            classification_type: CLASSIFICATION_TYPE,
            classification,
        }))
    }
}

/// `audio_gradient_xai`: classification plus gradient saliency.
pub struct GradientSaliencyAnalyzer<B: AutodiffBackend, L: ModelLoader<B>> {
    engine: Arc<Engine<B, L>>,
}

impl<B: AutodiffBackend, L: ModelLoader<B>> GradientSaliencyAnalyzer<B, L> {
    /// Analyzer over a shared engine.
    pub fn new(engine: Arc<Engine<B, L>>) -> Self {
        Self { engine }
    }
}

impl<B: AutodiffBackend, L: ModelLoader<B>> Analyzer for GradientSaliencyAnalyzer<B, L> {
    fn name(&self) -> &'static str {
        "audio_gradient_xai"
    }

    fn description(&self) -> &'static str {
        "Classify a lung sound recording and map which time-frequency regions drove the prediction"
    }

    fn run(&self, path: &Path) -> Result<AnalysisReport> {
        let result = self.engine.explain(path, XaiType::GradientSaliency)?;
        Ok(AnalysisReport::Explanation(Box::new(result)))
    }
}

/// `audio_attention_xai`: classification plus attention rollout.
pub struct AttentionRolloutAnalyzer<B: AutodiffBackend, L: ModelLoader<B>> {
    engine: Arc<Engine<B, L>>,
}

impl<B: AutodiffBackend, L: ModelLoader<B>> AttentionRolloutAnalyzer<B, L> {
    /// Analyzer over a shared engine.
    pub fn new(engine: Arc<Engine<B, L>>) -> Self {
        Self { engine }
    }
}

impl<B: AutodiffBackend, L: ModelLoader<B>> Analyzer for AttentionRolloutAnalyzer<B, L> {
    fn name(&self) -> &'static str {
        "audio_attention_xai"
    }

    fn description(&self) -> &'static str {
        "Classify a lung sound recording and map where the transformer's attention went"
    }

    fn run(&self, path: &Path) -> Result<AnalysisReport> {
        let result = self.engine.explain(path, XaiType::AttentionRollout)?;
        Ok(AnalysisReport::Explanation(Box::new(result)))
    }
}

/// All three analyzers over one engine.
pub fn analyzers<B, L>(engine: Arc<Engine<B, L>>) -> Vec<Box<dyn Analyzer>>
where
    B: AutodiffBackend,
    L: ModelLoader<B> + 'static,
{
    vec![
        Box::new(AudioClassificationAnalyzer::new(engine.clone())),
        Box::new(GradientSaliencyAnalyzer::new(engine.clone())),
        Box::new(AttentionRolloutAnalyzer::new(engine)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CheckpointLoader;
    use crate::config::EngineConfig;
    use auscult_core::backend::{Autodiff, NdArray};
    use auscult_core::Label;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_names() {
        let engine = Arc::new(Engine::<TestBackend, CheckpointLoader>::from_config(
            EngineConfig::default(),
            Default::default(),
        ));
        let names: Vec<_> = analyzers(engine).iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            ["audio_classification", "audio_gradient_xai", "audio_attention_xai"]
        );
    }

    #[test]
    fn test_classification_report_json() {
        let report = AnalysisReport::Classification(ClassificationReport {
            classification_type: CLASSIFICATION_TYPE,
            classification: ClassificationResult {
                label: Label::Normal,
                confidence: 73.12,
            },
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["classification_type"], "lung_audio");
        assert_eq!(json["label"], "Normal");
        assert!(json.get("importance_map").is_none());
        assert!(report.explanation().is_none());
    }
}
