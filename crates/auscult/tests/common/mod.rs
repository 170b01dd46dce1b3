//! Shared fixtures: synthetic recordings, a tiny checkpoint and probe models.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use auscult::{
    AstConfig, AudioClassifier, EngineConfig, FeatureExtractor, FeatureExtractorConfig,
    ModelHandle, ModelLoader, Result,
};
use auscult_core::backend::{Autodiff, NdArray};
use auscult_models::{CheckpointMetadata, ModelCheckpoint};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub type TestBackend = Autodiff<NdArray>;

pub const MEL_BINS: usize = 32;
pub const FRAMES: usize = 64;

pub fn extractor_config() -> FeatureExtractorConfig {
    FeatureExtractorConfig::default()
        .with_feature_size(MEL_BINS)
        .with_max_length(FRAMES)
}

/// 2 frequency x 4 time patches, 10 tokens.
pub fn ast_config() -> AstConfig {
    AstConfig::new(MEL_BINS, FRAMES)
        .with_patch(16, 16)
        .with_hidden_size(16)
        .with_num_heads(2)
        .with_num_layers(2)
}

/// Write a 16-bit wav: a tone plus seeded noise, same signal on every channel
/// unless `invert_right` flips channel 1.
pub fn write_wav(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    seconds: f32,
    invert_right: bool,
) -> PathBuf {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = 0.4 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
            + 0.05 * rng.gen_range(-1.0..1.0);
        for c in 0..channels {
            let s = if invert_right && c == 1 { -v } else { v };
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
    path.to_path_buf()
}

/// Write a 16-bit wav of `frames` frames, the same `signal` on every channel.
pub fn write_wav_with(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    signal: impl Fn(usize) -> f32,
) -> PathBuf {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let s = (signal(i) * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(s).unwrap();
        }
    }
    writer.finalize().unwrap();
    path.to_path_buf()
}

/// Lay out a randomly initialized checkpoint in `dir`.
pub fn write_model_dir(dir: &Path) -> EngineConfig {
    let device = Default::default();
    let config = EngineConfig::default().with_model_dir(dir);

    extractor_config()
        .save(config.extractor_config_path())
        .unwrap();
    let ast = ast_config();
    ast.save(config.model_config_path()).unwrap();
    ast.init::<TestBackend>(&device)
        .unwrap()
        .save_checkpoint(config.weights_path())
        .unwrap();
    CheckpointMetadata::new("ast")
        .with_config(&ast)
        .unwrap()
        .save(config.metadata_path())
        .unwrap();

    config
}

/// Mean over time then a linear head. Reports no attention weights.
#[derive(Module, Debug)]
pub struct Probe<B: Backend> {
    head: Linear<B>,
    detach_input: bool,
}

impl<B: Backend> AudioClassifier<B> for Probe<B> {
    fn logits(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        let features = if self.detach_input {
            features.detach()
        } else {
            features
        };
        let [batch, _, bins] = features.dims();
        self.head.forward(features.mean_dim(1).reshape([batch, bins]))
    }
}

/// Builds [`Probe`] models and counts how often it is asked to.
pub struct ProbeLoader {
    pub detach_input: bool,
    pub delay: Duration,
    pub fail_first: usize,
    pub calls: AtomicUsize,
}

impl ProbeLoader {
    pub fn new() -> Self {
        Self {
            detach_input: false,
            delay: Duration::ZERO,
            fail_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn detaching() -> Self {
        Self {
            detach_input: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelLoader<TestBackend> for ProbeLoader {
    type Model = Probe<TestBackend>;

    fn load(
        &self,
        device: &<TestBackend as Backend>::Device,
    ) -> Result<ModelHandle<TestBackend, Self::Model>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if call < self.fail_first {
            return Err(auscult::EngineError::ModelLoadFailed("weights unavailable".into()));
        }
        let extractor = FeatureExtractor::new(extractor_config()).unwrap();
        let model = Probe {
            head: LinearConfig::new(MEL_BINS, 2).init(device),
            detach_input: self.detach_input,
        };
        Ok(ModelHandle::new(extractor, model, device.clone()))
    }

    fn source(&self) -> String {
        "probe".to_string()
    }
}
