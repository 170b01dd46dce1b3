//! Single-flight model cache.
//!
//! [`ModelCache::get_model`] loads the feature extractor and model at most
//! once, even when several threads race on first use. A failed load leaves
//! the cache empty so the next call retries.
//!
//! # Performance
//!
//! - First call: full weight deserialization and device transfer
//! - Subsequent calls: one atomic load plus an `Arc` clone

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use auscult_audio::{FeatureExtractor, FeatureExtractorConfig};
use auscult_core::backend::{default_device_kind, DeviceKind};
use auscult_core::ImportanceMap;
use auscult_models::{
    AstConfig, AudioClassifier, AudioSpectrogramTransformer, CheckpointMetadata, ModelCheckpoint,
};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use ndarray::Array2;
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Feature extractor, frozen model and the device both run on.
///
/// Immutable after construction. Each request takes its own clone of the
/// model (weights are shared, not copied), so inference needs no lock.
pub struct ModelHandle<B: AutodiffBackend, M> {
    extractor: FeatureExtractor,
    model: Mutex<M>,
    device: B::Device,
}

/// Features for one request: host spectrogram plus the same values as a
/// `[1, time, freq]` tensor on the handle's device.
#[derive(Debug, Clone)]
pub struct Features<B: Backend> {
    /// `(time, freq)` normalized log-mel features.
    pub spectrogram: Array2<f32>,
    /// Model input.
    pub tensor: Tensor<B, 3>,
}

impl<B: Backend> Features<B> {
    /// `(time, freq)` shape.
    pub fn shape(&self) -> (usize, usize) {
        self.spectrogram.dim()
    }

    /// Spectrogram min-max scaled to `[0, 1]` for overlays.
    pub fn background(&self) -> Result<ImportanceMap> {
        Ok(ImportanceMap::normalize(self.spectrogram.clone())?)
    }
}

impl<B: AutodiffBackend, M: AudioClassifier<B>> ModelHandle<B, M> {
    /// Bind `model` to `device`. Parameters are frozen so gradients only
    /// ever flow to request inputs.
    pub fn new(extractor: FeatureExtractor, model: M, device: B::Device) -> Self {
        Self {
            extractor,
            model: Mutex::new(model.no_grad()),
            device,
        }
    }

    /// The feature extractor.
    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Device every request tensor is placed on.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// A request-local copy of the model.
    pub fn model(&self) -> M {
        self.model.lock().clone()
    }

    /// Extract features from a fixed-length waveform and move them to the device.
    pub fn features(&self, waveform: &[f32]) -> Result<Features<B>> {
        let spectrogram = self.extractor.extract(waveform)?;
        let (frames, bins) = spectrogram.dim();
        let data: Vec<f32> = spectrogram.iter().copied().collect();
        let tensor =
            Tensor::<B, 3>::from_data(TensorData::new(data, [1, frames, bins]), &self.device);
        Ok(Features {
            spectrogram,
            tensor,
        })
    }
}

impl<B: AutodiffBackend, M> std::fmt::Debug for ModelHandle<B, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("extractor", &self.extractor)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Produces a [`ModelHandle`]; called at most once per successful cache fill.
pub trait ModelLoader<B: AutodiffBackend>: Send + Sync {
    /// Model type this loader builds.
    type Model: AudioClassifier<B>;

    /// Load the extractor and model onto `device`.
    fn load(&self, device: &B::Device) -> Result<ModelHandle<B, Self::Model>>;

    /// Human-readable source, for logs.
    fn source(&self) -> String;
}

/// Lazily loaded, process-wide model handle.
///
/// # Example
///
/// ```rust,ignore
/// use auscult::{CheckpointLoader, EngineConfig, ModelCache};
///
/// let cache = ModelCache::<B, _>::new(CheckpointLoader::new(EngineConfig::default()), device);
/// let handle = cache.get_model()?;   // loads
/// let again = cache.get_model()?;    // cached
/// assert!(std::sync::Arc::ptr_eq(&handle, &again));
/// ```
pub struct ModelCache<B: AutodiffBackend, L: ModelLoader<B>> {
    loader: L,
    device: B::Device,
    handle: OnceLock<Arc<ModelHandle<B, L::Model>>>,
    load_gate: Mutex<()>,
    loads: AtomicUsize,
}

impl<B: AutodiffBackend, L: ModelLoader<B>> ModelCache<B, L> {
    /// Empty cache that will load through `loader` onto `device`.
    pub fn new(loader: L, device: B::Device) -> Self {
        Self {
            loader,
            device,
            handle: OnceLock::new(),
            load_gate: Mutex::new(()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Return the shared handle, loading it on first use.
    ///
    /// Concurrent first callers block on a single load and all receive the
    /// same `Arc`. A load error is returned to the caller that ran it and
    /// the cache stays empty.
    pub fn get_model(&self) -> Result<Arc<ModelHandle<B, L::Model>>> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        let _gate = self.load_gate.lock();

        // Another caller may have finished while we waited.
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let source = self.loader.source();
        tracing::info!(
            "Loading model from {} on {:?} ({})",
            source,
            self.device,
            self.device_kind()
        );
        let start = Instant::now();

        let handle = self.loader.load(&self.device).map_err(|e| {
            tracing::warn!("Model load from {} failed: {}", source, e);
            match e {
                EngineError::ModelLoadFailed(_) => e,
                other => EngineError::ModelLoadFailed(other.to_string()),
            }
        })?;

        let handle = self.handle.get_or_init(|| Arc::new(handle)).clone();
        tracing::info!("Model loaded in {:.2?}", start.elapsed());
        Ok(handle)
    }

    /// Whether a handle is cached.
    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Number of load attempts made so far, failed ones included.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Device the model is (or will be) bound to.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Kind of that device.
    pub fn device_kind(&self) -> DeviceKind {
        default_device_kind()
    }

    /// The loader.
    pub fn loader(&self) -> &L {
        &self.loader
    }
}

/// Loads an Audio Spectrogram Transformer checkpoint from disk as laid out
/// by [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct CheckpointLoader {
    config: EngineConfig,
}

impl CheckpointLoader {
    /// Loader for the files named in `config`.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The engine config paths are resolved from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<B: AutodiffBackend> ModelLoader<B> for CheckpointLoader {
    type Model = AudioSpectrogramTransformer<B>;

    fn load(&self, device: &B::Device) -> Result<ModelHandle<B, Self::Model>> {
        let load_failed = |what: &str, e: &dyn std::fmt::Display| {
            EngineError::ModelLoadFailed(format!("{what}: {e}"))
        };

        let extractor_path = self.config.extractor_config_path();
        let extractor_config = FeatureExtractorConfig::from_file(&extractor_path)
            .map_err(|e| load_failed(&extractor_path.display().to_string(), &e))?;
        let extractor = FeatureExtractor::new(extractor_config)
            .map_err(|e| load_failed("feature extractor", &e))?;

        let model_path = self.config.model_config_path();
        let model_config = AstConfig::from_file(&model_path)
            .map_err(|e| load_failed(&model_path.display().to_string(), &e))?;

        let (frames, bins) = extractor.output_shape();
        if (frames, bins) != (model_config.max_length, model_config.num_mel_bins) {
            return Err(EngineError::ModelLoadFailed(format!(
                "extractor produces {frames}x{bins} features, model expects {}x{}",
                model_config.max_length, model_config.num_mel_bins
            )));
        }

        let metadata_path = self.config.metadata_path();
        if metadata_path.exists() {
            let metadata = CheckpointMetadata::load(&metadata_path)?;
            if metadata.arch != "ast" {
                return Err(EngineError::ModelLoadFailed(format!(
                    "unsupported architecture {:?} in {}",
                    metadata.arch,
                    metadata_path.display()
                )));
            }
            metadata.check_labels()?;
        }

        let model = model_config
            .init::<B>(device)?
            .load_checkpoint(self.config.weights_path(), device)?;

        tracing::debug!(
            "AST with {} layers, {} patches",
            model.num_layers(),
            model_config.num_patches()
        );

        Ok(ModelHandle::new(extractor, model, device.clone()))
    }

    fn source(&self) -> String {
        self.config.model_dir.display().to_string()
    }
}
