//! Persisting explanations for later rendering.

use std::path::Path;

use auscult_core::ImportanceMap;
use serde::Serialize;

use crate::error::{EngineError, Result};

/// Writes a background spectrogram and importance map to a file.
///
/// Rendering to an image is left to the consumer of the exported file.
pub trait ExplanationExporter: Send + Sync {
    /// File extension, without the dot.
    fn extension(&self) -> &'static str;

    /// Write both maps to `path`, creating parent directories.
    fn export(
        &self,
        background: &ImportanceMap,
        importance: &ImportanceMap,
        path: &Path,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct OverlayFile<'a> {
    rows: usize,
    cols: usize,
    background_spectrogram: &'a ImportanceMap,
    importance_map: &'a ImportanceMap,
}

/// Exports both maps as one JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter {
    /// Indent the output.
    pub pretty: bool,
}

impl ExplanationExporter for JsonExporter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn export(
        &self,
        background: &ImportanceMap,
        importance: &ImportanceMap,
        path: &Path,
    ) -> Result<()> {
        if background.shape() != importance.shape() {
            return Err(EngineError::Export(format!(
                "background {:?} and importance {:?} differ in shape",
                background.shape(),
                importance.shape()
            )));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Export(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let (rows, cols) = importance.shape();
        let file = OverlayFile {
            rows,
            cols,
            background_spectrogram: background,
            importance_map: importance,
        };
        let json = if self.pretty {
            serde_json::to_string_pretty(&file)
        } else {
            serde_json::to_string(&file)
        }
        .map_err(|e| EngineError::Export(e.to_string()))?;

        std::fs::write(path, json)
            .map_err(|e| EngineError::Export(format!("Failed to write {}: {e}", path.display())))?;
        tracing::debug!("Exported {rows}x{cols} overlay to {}", path.display());
        Ok(())
    }
}
