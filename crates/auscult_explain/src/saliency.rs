//! Gradient saliency and its variance proxy.

use auscult_core::ImportanceMap;
use auscult_models::AudioClassifier;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use ndarray::{Array2, ArrayD, Axis, Ix2, IxDyn};

use crate::error::{ExplainError, Result};

/// Logits and input gradient from a single forward/backward pass.
#[derive(Debug, Clone)]
pub struct InputGradient {
    /// Class logits of the forward pass, `[batch * classes]` row-major.
    pub logits: Vec<f32>,
    /// Class the gradient was taken for.
    pub target: usize,
    /// d(logit[target]) / d(features), shaped like the features.
    pub gradient: ArrayD<f32>,
}

/// Forward `features` through `model` and differentiate the logit of the
/// top-scoring class with respect to the features.
///
/// The features are detached and re-marked as a gradient leaf, so nothing
/// upstream accumulates gradients. Fails with [`ExplainError::NoGradient`]
/// when the model severs the path from logit to input.
pub fn input_gradient<B, M>(model: &M, features: Tensor<B, 3>) -> Result<InputGradient>
where
    B: AutodiffBackend,
    M: AudioClassifier<B>,
{
    let leaf = features.detach().require_grad();
    let logits = model.logits(leaf.clone());

    let [batch, classes] = logits.dims();
    if batch == 0 || classes == 0 {
        return Err(ExplainError::ShapeMismatch(format!(
            "logits shaped [{batch}, {classes}]"
        )));
    }

    let values = tensor_values(logits.clone().detach(), "logits")?;
    let target = argmax(&values[..classes]);

    let score = logits.slice([0..1, target..target + 1]).sum();
    if !score.is_require_grad() {
        return Err(ExplainError::NoGradient);
    }

    let grads = score.backward();
    let grad = leaf.grad(&grads).ok_or(ExplainError::NoGradient)?;
    let dims = grad.dims();
    let data = grad
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::ShapeMismatch(format!("gradient data: {e:?}")))?;
    let gradient = ArrayD::from_shape_vec(IxDyn(&dims), data)
        .map_err(|e| ExplainError::ShapeMismatch(e.to_string()))?;

    Ok(InputGradient {
        logits: values,
        target,
        gradient,
    })
}

/// Reduce a feature gradient to a `(time, freq)` magnitude map.
///
/// `[batch, time, freq]` takes `|g|` of the first item;
/// `[batch, channel, time, freq]` averages `|g|` over channels.
pub fn collapse_gradient(gradient: &ArrayD<f32>) -> Result<Array2<f32>> {
    let shape = gradient.shape().to_vec();
    if shape.iter().any(|&d| d == 0) {
        return Err(ExplainError::ShapeMismatch(format!(
            "empty gradient {shape:?}"
        )));
    }

    let first = gradient.index_axis(Axis(0), 0).mapv(f32::abs);
    let collapsed = match shape.len() {
        3 => first,
        4 => first
            .mean_axis(Axis(0))
            .ok_or_else(|| ExplainError::ShapeMismatch("no channels".into()))?,
        n => {
            return Err(ExplainError::ShapeMismatch(format!(
                "expected a rank 3 or 4 gradient, got rank {n}"
            )))
        }
    };

    collapsed
        .into_dimensionality::<Ix2>()
        .map_err(|e| ExplainError::ShapeMismatch(e.to_string()))
}

/// Normalized saliency map from a raw gradient, checked against `shape`.
pub fn gradient_saliency(gradient: &ArrayD<f32>, shape: (usize, usize)) -> Result<ImportanceMap> {
    let magnitude = collapse_gradient(gradient)?;
    if magnitude.dim() != shape {
        return Err(ExplainError::ShapeMismatch(format!(
            "saliency {:?} vs spectrogram {shape:?}",
            magnitude.dim()
        )));
    }
    if magnitude.iter().any(|v| !v.is_finite()) {
        return Err(ExplainError::NonFinite("gradient".into()));
    }
    Ok(ImportanceMap::normalize(magnitude)?)
}

/// Proxy saliency: variance of each frequency bin across time, repeated
/// over every time frame.
pub fn variance_proxy(spectrogram: &Array2<f32>) -> Result<ImportanceMap> {
    let (frames, bins) = spectrogram.dim();
    if frames == 0 || bins == 0 {
        return Err(ExplainError::ShapeMismatch(format!(
            "empty spectrogram {frames}x{bins}"
        )));
    }

    let variance = spectrogram.var_axis(Axis(0), 0.0);
    let broadcast = Array2::from_shape_fn((frames, bins), |(_, f)| variance[f]);
    Ok(ImportanceMap::normalize(broadcast)?)
}

pub(crate) fn tensor_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    what: &str,
) -> Result<Vec<f32>> {
    let values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ExplainError::ShapeMismatch(format!("{what}: {e:?}")))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ExplainError::NonFinite(what.to_string()));
    }
    Ok(values)
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}
