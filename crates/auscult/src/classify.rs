//! Forward-only classification.

use auscult_core::ClassificationResult;
use auscult_models::AudioClassifier;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::cache::ModelHandle;
use crate::error::{EngineError, Result};

/// Turns logits into a [`ClassificationResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier;

impl Classifier {
    /// Classify a fixed-length waveform.
    pub fn classify<B, M>(
        &self,
        handle: &ModelHandle<B, M>,
        waveform: &[f32],
    ) -> Result<ClassificationResult>
    where
        B: AutodiffBackend,
        M: AudioClassifier<B>,
    {
        let features = handle.features(waveform)?;
        let logits = handle.model().logits(features.tensor.detach());
        self.from_logits(logits)
    }

    /// Result for the first item of a `[batch, classes]` logits tensor.
    pub fn from_logits<B: Backend>(&self, logits: Tensor<B, 2>) -> Result<ClassificationResult> {
        let [batch, classes] = logits.dims();
        if batch == 0 {
            return Err(EngineError::Inference("empty logits batch".into()));
        }
        let values = logits
            .slice([0..1, 0..classes])
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| EngineError::Inference(format!("logits: {e:?}")))?;
        Ok(ClassificationResult::from_logits(&values)?)
    }
}
