//! The engine: one preprocessor, one model cache and an optional exporter,
//! shared by every analyzer.

use std::path::{Path, PathBuf};
use std::time::Instant;

use auscult_audio::AudioPreprocessor;
use auscult_core::ClassificationResult;
use burn::tensor::backend::AutodiffBackend;

use crate::cache::{CheckpointLoader, ModelCache, ModelLoader};
use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::explain::{
    AttentionRolloutExplainer, ExplanationResult, GradientSaliencyExplainer, XaiType,
};
use crate::export::{ExplanationExporter, JsonExporter};

/// Shared state behind the analyzers.
///
/// Every request preprocesses first, so a missing or undecodable file is
/// reported without touching the model.
pub struct Engine<B: AutodiffBackend, L: ModelLoader<B>> {
    cache: ModelCache<B, L>,
    preprocessor: AudioPreprocessor,
    exporter: Option<Box<dyn ExplanationExporter>>,
    output_dir: PathBuf,
}

impl<B: AutodiffBackend> Engine<B, CheckpointLoader> {
    /// Engine over the checkpoint described by `config`.
    ///
    /// Nothing is loaded until the first request.
    pub fn from_config(config: EngineConfig, device: B::Device) -> Self {
        let export = config.export;
        let output_dir = config.output_dir.clone();
        let engine = Self::new(CheckpointLoader::new(config), device);
        if export {
            engine.with_exporter(JsonExporter { pretty: false }, output_dir)
        } else {
            engine
        }
    }
}

impl<B: AutodiffBackend, L: ModelLoader<B>> Engine<B, L> {
    /// Engine with the standard decoder chain and no exporter.
    pub fn new(loader: L, device: B::Device) -> Self {
        Self {
            cache: ModelCache::new(loader, device),
            preprocessor: AudioPreprocessor::new(),
            exporter: None,
            output_dir: PathBuf::from("outputs"),
        }
    }

    /// Replace the preprocessor.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: AudioPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Export every explanation into `output_dir`.
    #[must_use]
    pub fn with_exporter(
        mut self,
        exporter: impl ExplanationExporter + 'static,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        self.exporter = Some(Box::new(exporter));
        self.output_dir = output_dir.into();
        self
    }

    /// The model cache.
    pub fn cache(&self) -> &ModelCache<B, L> {
        &self.cache
    }

    /// The shared preprocessor.
    pub fn preprocessor(&self) -> &AudioPreprocessor {
        &self.preprocessor
    }

    /// Classify an audio file.
    pub fn classify(&self, path: &Path) -> Result<ClassificationResult> {
        let start = Instant::now();
        let waveform = self.preprocessor.preprocess(path)?;
        let handle = self.cache.get_model()?;
        let result = Classifier.classify(&handle, &waveform)?;
        tracing::info!(
            "Classified {} as {} ({}%) in {:.2?}",
            path.display(),
            result.label,
            result.confidence,
            start.elapsed()
        );
        Ok(result)
    }

    /// Classify and explain an audio file, exporting the maps if an
    /// exporter is set.
    pub fn explain(&self, path: &Path, xai_type: XaiType) -> Result<ExplanationResult> {
        let start = Instant::now();
        let waveform = self.preprocessor.preprocess(path)?;
        let handle = self.cache.get_model()?;

        let mut result = match xai_type {
            XaiType::GradientSaliency => GradientSaliencyExplainer.explain(&handle, &waveform)?,
            XaiType::AttentionRollout => AttentionRolloutExplainer.explain(&handle, &waveform)?,
        };

        if let Some(exporter) = &self.exporter {
            let target = self.export_path(path, xai_type, exporter.extension());
            exporter.export(
                &result.background_spectrogram,
                &result.importance_map,
                &target,
            )?;
            result.attach_visualization(target);
        }

        tracing::info!(
            "{} for {}: {} ({}%, {} path) in {:.2?}",
            xai_type,
            path.display(),
            result.classification.label,
            result.classification.confidence,
            result.explainer_path,
            start.elapsed()
        );
        Ok(result)
    }

    /// `<output_dir>/<stem>_<xai_type>.<extension>`
    pub fn export_path(&self, audio: &Path, xai_type: XaiType, extension: &str) -> PathBuf {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        self.output_dir
            .join(format!("{stem}_{}.{extension}", xai_type.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auscult_core::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_export_path() {
        let engine = Engine::<TestBackend, _>::from_config(
            EngineConfig::default()
                .with_export(true)
                .with_output_dir("/tmp/xai"),
            Default::default(),
        );
        assert_eq!(
            engine.export_path(
                Path::new("/data/patient_03.wav"),
                XaiType::AttentionRollout,
                "json"
            ),
            PathBuf::from("/tmp/xai/patient_03_attention_rollout.json")
        );
    }

    #[test]
    fn test_missing_file_reported_before_model_load() {
        let engine =
            Engine::<TestBackend, _>::from_config(EngineConfig::default(), Default::default());
        let err = engine.classify(Path::new("/no/such/file.wav")).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(engine.cache().load_count(), 0);
    }
}
