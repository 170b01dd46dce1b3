//! # auscult
//!
//! Explainable lung sound classification.
//!
//! An audio file is decoded, mixed to mono, resampled to 16 kHz and fixed
//! to ten seconds, turned into log-mel features and classified as
//! `Normal` or `Abnormal` by an Audio Spectrogram Transformer. Two
//! explainers map the prediction back onto the spectrogram:
//!
//! - [`GradientSaliencyExplainer`]: input-gradient magnitude
//! - [`AttentionRolloutExplainer`]: CLS attention rolled out through all layers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use auscult::prelude::*;
//!
//! let engine = Arc::new(DefaultEngine::from_config(
//!     EngineConfig::default().with_model_dir("model"),
//!     default_device(),
//! ));
//! let analyzer = AttentionRolloutAnalyzer::new(engine);
//! let report = analyzer.run("recording.wav".as_ref())?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! ```
//!
//! The model is loaded on the first request and shared afterwards; see
//! [`ModelCache`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyzer;
pub mod cache;
pub mod classify;
pub mod config;
pub mod engine;
mod error;
pub mod explain;
pub mod export;

pub use analyzer::{
    analyzers, AnalysisReport, Analyzer, AttentionRolloutAnalyzer, AudioClassificationAnalyzer,
    ClassificationReport, GradientSaliencyAnalyzer,
};
pub use cache::{CheckpointLoader, Features, ModelCache, ModelHandle, ModelLoader};
pub use classify::Classifier;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use explain::{
    AttentionRolloutExplainer, ExplanationResult, GradientSaliencyExplainer, XaiType,
    CLASSIFICATION_TYPE,
};
pub use export::{ExplanationExporter, JsonExporter};

pub use auscult_audio::{AudioPreprocessor, FeatureExtractor, FeatureExtractorConfig};
pub use auscult_core::backend::{default_device, default_device_kind, DefaultBackend, DeviceKind};
pub use auscult_core::{ClassificationResult, ImportanceMap, Label};
pub use auscult_explain::ExplainerPath;
pub use auscult_models::{AstConfig, AudioClassifier, AudioSpectrogramTransformer};

/// Engine over an on-disk checkpoint on the default backend.
pub type DefaultEngine = Engine<DefaultBackend, CheckpointLoader>;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        default_device, AnalysisReport, Analyzer, AttentionRolloutAnalyzer,
        AudioClassificationAnalyzer, ClassificationResult, DefaultBackend, DefaultEngine,
        EngineConfig, EngineError, ExplainerPath, ExplanationResult, GradientSaliencyAnalyzer,
        ImportanceMap, Label, XaiType,
    };
}
