//! Model checkpoints.
//!
//! Weights are burn records in named MessagePack (`*.mpk`) at full
//! precision. A JSON sidecar ([`CheckpointMetadata`]) records the
//! architecture, its config and the label order the head was trained with.
//!
//! # Example
//!
//! ```rust,ignore
//! use auscult_models::{AstConfig, CheckpointMetadata, ModelCheckpoint};
//!
//! let config = AstConfig::default();
//! let model = config.init::<B>(&device)?;
//! model.save_checkpoint("model/model.mpk")?;
//! CheckpointMetadata::new("ast").with_config(&config)?.save("model/checkpoint.json")?;
//!
//! let loaded = config.init::<B>(&device)?.load_checkpoint("model/model.mpk", &device)?;
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};

use auscult_core::Label;

/// Save a model's weights to `path`.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::record(&recorder, model.clone().into_record(), path.to_path_buf())
        .map_err(|e| CheckpointError::Save(format!("{}: {e}", path.display())))?;

    tracing::debug!("Saved weights to {}", path.display());
    Ok(())
}

/// Load a weights record for `M` from `path`.
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(CheckpointError::Missing(path.display().to_string()));
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::load(&recorder, path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(format!("{}: {e}", path.display())))
}

/// JSON sidecar stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Architecture name.
    pub arch: String,
    /// Model configuration as JSON.
    pub config_json: String,
    /// Class names in logit order.
    pub labels: Vec<String>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Metadata for `arch` with the engine's label order.
    pub fn new(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            config_json: String::new(),
            labels: Label::ALL.iter().map(|l| l.as_str().to_string()).collect(),
            extra: BTreeMap::new(),
        }
    }

    /// Embed the model config.
    pub fn with_config<C: Serialize>(mut self, config: &C) -> Result<Self> {
        self.config_json =
            serde_json::to_string(config).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(self)
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Check that the stored label order matches [`Label::ALL`].
    pub fn check_labels(&self) -> Result<()> {
        let expected: Vec<&str> = Label::ALL.iter().map(|l| l.as_str()).collect();
        if self.labels.iter().map(String::as_str).eq(expected.iter().copied()) {
            Ok(())
        } else {
            Err(CheckpointError::InvalidFormat(format!(
                "label order {:?} does not match {:?}",
                self.labels, expected
            )))
        }
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::Load(e.to_string()))
    }
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Weights file does not exist.
    #[error("Checkpoint not found: {0}")]
    Missing(String),

    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Checkpoint content does not fit this engine.
    #[error("Invalid checkpoint: {0}")]
    InvalidFormat(String),
}

/// Extension trait adding checkpoint methods to every module.
pub trait ModelCheckpoint<B: Backend>: Module<B> {
    /// Save the model to a checkpoint file.
    fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        save_model::<B, Self>(self, path)
    }

    /// Load weights from `path` into this (already shaped) model.
    fn load_checkpoint(self, path: impl AsRef<Path>, device: &B::Device) -> Result<Self>
    where
        Self: Sized,
    {
        let record = load_record::<B, Self>(path, device)?;
        Ok(self.load_record(record))
    }
}

impl<B: Backend, M: Module<B>> ModelCheckpoint<B> for M {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstConfig;
    use auscult_core::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> AstConfig {
        AstConfig::new(32, 48)
            .with_patch(16, 16)
            .with_hidden_size(8)
            .with_num_heads(2)
            .with_num_layers(1)
    }

    #[test]
    fn test_checkpoint_metadata() {
        let meta = CheckpointMetadata::new("ast")
            .with_config(&tiny_config())
            .unwrap()
            .with_extra("source", "init");

        assert_eq!(meta.arch, "ast");
        assert_eq!(meta.labels, vec!["Normal", "Abnormal"]);
        assert!(meta.config_json.contains("\"hidden_size\":8"));
        assert_eq!(meta.extra.get("source").map(String::as_str), Some("init"));
        assert!(meta.check_labels().is_ok());
    }

    #[test]
    fn test_swapped_labels_are_rejected() {
        let mut meta = CheckpointMetadata::new("ast");
        meta.labels.reverse();
        assert!(matches!(
            meta.check_labels(),
            Err(CheckpointError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_metadata_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let meta = CheckpointMetadata::new("ast").with_extra("k", "v");
        meta.save(&path).unwrap();
        assert_eq!(CheckpointMetadata::load(&path).unwrap(), meta);
    }

    #[test]
    fn test_weights_reload_reproduces_logits() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.mpk");

        let model = tiny_config().init::<TestBackend>(&device).unwrap();
        model.save_checkpoint(&path).unwrap();

        let reloaded = tiny_config()
            .init::<TestBackend>(&device)
            .unwrap()
            .load_checkpoint(&path, &device)
            .unwrap();

        let x = Tensor::<TestBackend, 3>::ones([1, 48, 32], &device);
        let a = model.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        let b = reloaded.forward(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_weights() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();
        let err = model
            .load_checkpoint("/no/such/model.mpk", &device)
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Missing(_)));
    }
}
