//! Audio Spectrogram Transformer (AST).
//!
//! A ViT-style encoder over log-mel spectrograms:
//! - Conv2d patch embedding over the (frequency, time) plane
//! - CLS and distillation tokens plus learned position embeddings
//! - Pre-LayerNorm encoder blocks with GELU MLPs
//! - Mean of the two summary tokens, then a LayerNorm + Linear head
//!
//! Every block reports its softmax attention weights so callers can run
//! attention rollout on a single forward pass.

use std::path::Path;

use burn::module::Param;
use burn::nn::{
    attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
    conv::{Conv2d, Conv2dConfig},
    Gelu, Initializer, LayerNorm, LayerNormConfig, Linear, LinearConfig,
};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use auscult_core::NUM_CLASSES;

use crate::error::{ModelError, Result};
use crate::traits::AudioClassifier;

/// Number of summary tokens prepended to the patch sequence (CLS, distillation).
pub const NUM_SUMMARY_TOKENS: usize = 2;

/// Configuration for [`AudioSpectrogramTransformer`].
///
/// Field names follow the JSON layout of published AST checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AstConfig {
    /// Mel bins per frame (input frequency axis).
    pub num_mel_bins: usize,
    /// Frames per input (input time axis).
    pub max_length: usize,
    /// Square patch side.
    pub patch_size: usize,
    /// Patch stride along frequency.
    pub frequency_stride: usize,
    /// Patch stride along time.
    pub time_stride: usize,
    /// Model dimension.
    pub hidden_size: usize,
    /// Number of encoder blocks.
    pub num_hidden_layers: usize,
    /// Attention heads per block.
    pub num_attention_heads: usize,
    /// MLP hidden dimension.
    pub intermediate_size: usize,
    /// LayerNorm epsilon.
    pub layer_norm_eps: f64,
    /// Output classes.
    pub num_labels: usize,
}

impl Default for AstConfig {
    fn default() -> Self {
        Self {
            num_mel_bins: 128,
            max_length: 1024,
            patch_size: 16,
            frequency_stride: 10,
            time_stride: 10,
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            layer_norm_eps: 1e-12,
            num_labels: NUM_CLASSES,
        }
    }
}

impl AstConfig {
    /// Create a config for the given input geometry.
    pub fn new(num_mel_bins: usize, max_length: usize) -> Self {
        Self {
            num_mel_bins,
            max_length,
            ..Default::default()
        }
    }

    /// Set patch size and both strides.
    #[must_use]
    pub fn with_patch(mut self, patch_size: usize, stride: usize) -> Self {
        self.patch_size = patch_size;
        self.frequency_stride = stride;
        self.time_stride = stride;
        self
    }

    /// Set model dimension; the MLP keeps a 4x expansion.
    #[must_use]
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self.intermediate_size = hidden_size * 4;
        self
    }

    /// Set number of encoder blocks.
    #[must_use]
    pub fn with_num_layers(mut self, n_layers: usize) -> Self {
        self.num_hidden_layers = n_layers;
        self
    }

    /// Set number of attention heads.
    #[must_use]
    pub fn with_num_heads(mut self, n_heads: usize) -> Self {
        self.num_attention_heads = n_heads;
        self
    }

    /// Patches along the frequency axis.
    pub fn frequency_patches(&self) -> usize {
        (self.num_mel_bins.saturating_sub(self.patch_size)) / self.frequency_stride.max(1) + 1
    }

    /// Patches along the time axis.
    pub fn time_patches(&self) -> usize {
        (self.max_length.saturating_sub(self.patch_size)) / self.time_stride.max(1) + 1
    }

    /// Total patch tokens.
    pub fn num_patches(&self) -> usize {
        self.frequency_patches() * self.time_patches()
    }

    /// Sequence length seen by the encoder (patches + summary tokens).
    pub fn seq_len(&self) -> usize {
        self.num_patches() + NUM_SUMMARY_TOKENS
    }

    /// Check the config describes a buildable two-class model.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ModelError::InvalidConfig(msg));

        if self.num_labels != NUM_CLASSES {
            return fail(format!(
                "num_labels must be {NUM_CLASSES}, got {}",
                self.num_labels
            ));
        }
        if self.patch_size == 0 || self.frequency_stride == 0 || self.time_stride == 0 {
            return fail("patch size and strides must be positive".into());
        }
        if self.patch_size > self.num_mel_bins || self.patch_size > self.max_length {
            return fail(format!(
                "patch size {} exceeds input {}x{}",
                self.patch_size, self.max_length, self.num_mel_bins
            ));
        }
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return fail(format!(
                "hidden size {} is not divisible by {} heads",
                self.hidden_size, self.num_attention_heads
            ));
        }
        if self.num_hidden_layers == 0 || self.intermediate_size == 0 {
            return fail("model needs at least one layer and a non-empty MLP".into());
        }
        Ok(())
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Initialize the model with random weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AudioSpectrogramTransformer<B>> {
        self.validate()?;
        Ok(AudioSpectrogramTransformer::new(self, device))
    }
}

/// Pre-LayerNorm encoder block returning its attention weights.
#[derive(Module, Debug)]
struct AstEncoderLayer<B: Backend> {
    attention: MultiHeadAttention<B>,
    norm1: LayerNorm<B>,
    mlp_in: Linear<B>,
    mlp_out: Linear<B>,
    norm2: LayerNorm<B>,
}

impl<B: Backend> AstEncoderLayer<B> {
    fn new(config: &AstConfig, device: &B::Device) -> Self {
        let d = config.hidden_size;
        Self {
            attention: MultiHeadAttentionConfig::new(d, config.num_attention_heads)
                .with_dropout(0.0)
                .init(device),
            norm1: LayerNormConfig::new(d)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            mlp_in: LinearConfig::new(d, config.intermediate_size).init(device),
            mlp_out: LinearConfig::new(config.intermediate_size, d).init(device),
            norm2: LayerNormConfig::new(d)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let attn = self
            .attention
            .forward(MhaInput::self_attn(self.norm1.forward(x.clone())));
        let x = x + attn.context;

        let h = self.mlp_in.forward(self.norm2.forward(x.clone()));
        let h = self.mlp_out.forward(Gelu::new().forward(h));

        (x + h, attn.weights)
    }
}

/// Audio Spectrogram Transformer classifier.
///
/// Input: `[batch, time, freq]` normalized log-mel features.
/// Output: `[batch, num_labels]` logits.
#[derive(Module, Debug)]
pub struct AudioSpectrogramTransformer<B: Backend> {
    patch_embed: Conv2d<B>,
    cls_token: Param<Tensor<B, 3>>,
    distillation_token: Param<Tensor<B, 3>>,
    position_embeddings: Param<Tensor<B, 3>>,
    layers: Vec<AstEncoderLayer<B>>,
    final_norm: LayerNorm<B>,
    head_norm: LayerNorm<B>,
    head: Linear<B>,
    num_mel_bins: usize,
    max_length: usize,
}

impl<B: Backend> AudioSpectrogramTransformer<B> {
    /// Build a randomly initialized model. Call [`AstConfig::init`] to validate first.
    pub fn new(config: &AstConfig, device: &B::Device) -> Self {
        let d = config.hidden_size;
        let token_init = Initializer::Normal {
            mean: 0.0,
            std: 0.02,
        };

        let patch_embed = Conv2dConfig::new([1, d], [config.patch_size, config.patch_size])
            .with_stride([config.frequency_stride, config.time_stride])
            .init(device);

        let layers = (0..config.num_hidden_layers)
            .map(|_| AstEncoderLayer::new(config, device))
            .collect();

        Self {
            patch_embed,
            cls_token: token_init.init([1, 1, d], device),
            distillation_token: token_init.init([1, 1, d], device),
            position_embeddings: token_init.init([1, config.seq_len(), d], device),
            layers,
            final_norm: LayerNormConfig::new(d)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            head_norm: LayerNormConfig::new(d)
                .with_epsilon(config.layer_norm_eps)
                .init(device),
            head: LinearConfig::new(d, config.num_labels).init(device),
            num_mel_bins: config.num_mel_bins,
            max_length: config.max_length,
        }
    }

    /// Expected `(time, freq)` input shape.
    pub fn input_shape(&self) -> (usize, usize) {
        (self.max_length, self.num_mel_bins)
    }

    /// Number of encoder blocks.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Patch tokens plus summary tokens with position embeddings added.
    fn embed(&self, features: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, _, _] = features.dims();

        // [B, T, F] -> [B, 1, F, T]
        let x = features.swap_dims(1, 2).unsqueeze_dim::<4>(1);
        let patches = self
            .patch_embed
            .forward(x)
            .flatten::<3>(2, 3)
            .swap_dims(1, 2);

        let cls = self.cls_token.val().repeat_dim(0, batch);
        let dist = self.distillation_token.val().repeat_dim(0, batch);

        Tensor::cat(vec![cls, dist, patches], 1) + self.position_embeddings.val()
    }

    fn classify_tokens(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, d] = x.dims();
        let x = self.final_norm.forward(x);

        let cls = x.clone().slice([0..batch, 0..1, 0..d]).reshape([batch, d]);
        let dist = x.slice([0..batch, 1..2, 0..d]).reshape([batch, d]);
        let pooled = (cls + dist) / 2.0;

        self.head.forward(self.head_norm.forward(pooled))
    }

    /// Forward pass returning logits.
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        let mut x = self.embed(features);
        for layer in &self.layers {
            x = layer.forward(x).0;
        }
        self.classify_tokens(x)
    }

    /// Forward pass returning logits and per-layer attention weights
    /// (`[batch, heads, tokens, tokens]`, input layer first).
    pub fn forward_with_attentions(
        &self,
        features: Tensor<B, 3>,
    ) -> (Tensor<B, 2>, Vec<Tensor<B, 4>>) {
        let mut x = self.embed(features);
        let mut attentions = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (out, weights) = layer.forward(x);
            attentions.push(weights);
            x = out;
        }
        (self.classify_tokens(x), attentions)
    }
}

impl<B: Backend> AudioClassifier<B> for AudioSpectrogramTransformer<B> {
    fn logits(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward(features)
    }

    fn logits_with_attentions(&self, features: Tensor<B, 3>) -> (Tensor<B, 2>, Vec<Tensor<B, 4>>) {
        self.forward_with_attentions(features)
    }
}
