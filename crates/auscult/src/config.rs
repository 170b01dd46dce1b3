//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Where the model lives and where explanations go.
///
/// All file names are relative to `model_dir`.
///
/// ```json
/// {
///   "model_dir": "model",
///   "extractor_config": "preprocessor_config.json",
///   "model_config": "config.json",
///   "weights": "model.mpk",
///   "metadata": "checkpoint.json",
///   "output_dir": "outputs",
///   "export": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding configs and weights.
    pub model_dir: PathBuf,
    /// Feature extractor JSON.
    pub extractor_config: String,
    /// Model architecture JSON.
    pub model_config: String,
    /// Weights record.
    pub weights: String,
    /// Checkpoint metadata sidecar; optional on disk.
    pub metadata: String,
    /// Directory exported explanations are written to.
    pub output_dir: PathBuf,
    /// Whether explanations are exported.
    pub export: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("model"),
            extractor_config: "preprocessor_config.json".to_string(),
            model_config: "config.json".to_string(),
            weights: "model.mpk".to_string(),
            metadata: "checkpoint.json".to_string(),
            output_dir: PathBuf::from("outputs"),
            export: false,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Set the model directory.
    #[must_use]
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Set the export directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Enable or disable export.
    #[must_use]
    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Path of the feature extractor config.
    pub fn extractor_config_path(&self) -> PathBuf {
        self.model_dir.join(&self.extractor_config)
    }

    /// Path of the model config.
    pub fn model_config_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_config)
    }

    /// Path of the weights record.
    pub fn weights_path(&self) -> PathBuf {
        self.model_dir.join(&self.weights)
    }

    /// Path of the metadata sidecar.
    pub fn metadata_path(&self) -> PathBuf {
        self.model_dir.join(&self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_paths() {
        let config = EngineConfig::default().with_model_dir("/opt/ast");
        assert_eq!(config.weights_path(), PathBuf::from("/opt/ast/model.mpk"));
        assert_eq!(
            config.extractor_config_path(),
            PathBuf::from("/opt/ast/preprocessor_config.json")
        );
        assert!(!config.export);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"model_dir": "weights", "export": true}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("weights"));
        assert!(config.export);
        assert_eq!(config.weights, "model.mpk");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig::default()
            .with_output_dir("/tmp/out")
            .with_export(true);
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = EngineConfig::from_file("/no/such/engine.json").unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }
}
