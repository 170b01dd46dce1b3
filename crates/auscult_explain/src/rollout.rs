//! Attention rollout and its energy proxy.

use auscult_core::{normalize01, ImportanceMap};
use burn::prelude::*;
use ndarray::{Array2, Axis};

use crate::error::{ExplainError, Result};
use crate::grid::patch_grid;
use crate::saliency::tensor_values;
use crate::upsample::bilinear_resize;

/// Roll attention out through every layer and return how much the CLS
/// token (index 0) draws from each other token.
///
/// Per layer: average heads, add the identity for the residual path and
/// renormalize rows. Layers compose input-first by matrix product. Only
/// the first batch item is used.
///
/// Reference: Abnar & Zuidema, "Quantifying Attention Flow in Transformers", ACL 2020.
pub fn attention_rollout<B: Backend>(attentions: &[Tensor<B, 4>]) -> Result<Vec<f32>> {
    let first = attentions.first().ok_or(ExplainError::NoAttentions)?;
    let [_, _, tokens, _] = first.dims();
    if tokens < 2 {
        return Err(ExplainError::ShapeMismatch(format!(
            "rollout needs at least 2 tokens, got {tokens}"
        )));
    }

    let device = first.device();
    let eye = Tensor::<B, 2>::eye(tokens, &device);
    let mut rollout: Option<Tensor<B, 2>> = None;

    for (layer, attn) in attentions.iter().enumerate() {
        let [batch, heads, rows, cols] = attn.dims();
        if batch == 0 || heads == 0 || rows != tokens || cols != tokens {
            return Err(ExplainError::ShapeMismatch(format!(
                "layer {layer} attention [{batch}, {heads}, {rows}, {cols}] != {tokens}x{tokens}"
            )));
        }

        let mixed = attn
            .clone()
            .detach()
            .slice([0..1, 0..heads, 0..tokens, 0..tokens])
            .mean_dim(1)
            .reshape([tokens, tokens])
            + eye.clone();
        let mixed = mixed.clone() / mixed.sum_dim(1);

        rollout = Some(match rollout {
            None => mixed,
            Some(acc) => acc.matmul(mixed),
        });
    }

    let rollout = rollout.ok_or(ExplainError::NoAttentions)?;
    tensor_values(rollout.slice([0..1, 1..tokens]), "attention rollout")
}

/// Rollout importance over a `(time, freq)` spectrogram of `shape`.
///
/// The CLS scores are laid out on the [`patch_grid`] of their count,
/// normalized, bilinearly resized to `shape` and normalized again.
pub fn rollout_map<B: Backend>(
    attentions: &[Tensor<B, 4>],
    shape: (usize, usize),
) -> Result<ImportanceMap> {
    let scores = attention_rollout(attentions)?;
    let n = scores.len();
    let (rows, cols) = patch_grid(n)
        .ok_or_else(|| ExplainError::ShapeMismatch("no patch tokens".into()))?;

    let mut grid = Array2::from_shape_vec((rows, cols), scores)
        .map_err(|e| ExplainError::ShapeMismatch(e.to_string()))?;
    normalize01(&mut grid);

    tracing::debug!(
        "Attention rollout over {n} patches on a {rows}x{cols} grid, resized to {}x{}",
        shape.0,
        shape.1
    );

    let upsampled = bilinear_resize(grid.view(), shape)?;
    Ok(ImportanceMap::normalize(upsampled)?)
}

/// Proxy attention: mean energy of each time frame, repeated over every
/// frequency bin.
pub fn energy_proxy(spectrogram: &Array2<f32>) -> Result<ImportanceMap> {
    let (frames, bins) = spectrogram.dim();
    let energy = spectrogram
        .mean_axis(Axis(1))
        .filter(|_| frames > 0 && bins > 0)
        .ok_or_else(|| {
            ExplainError::ShapeMismatch(format!("empty spectrogram {frames}x{bins}"))
        })?;

    let mut energy = energy.insert_axis(Axis(1));
    normalize01(&mut energy);

    let broadcast = Array2::from_shape_fn((frames, bins), |(t, _)| energy[[t, 0]]);
    Ok(ImportanceMap::normalize(broadcast)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auscult_core::backend::NdArray;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    fn attention(data: Vec<f32>, heads: usize, tokens: usize) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device)
            .reshape([1, heads, tokens, tokens])
    }

    /// Row-stochastic random attention, `heads` heads.
    fn random_attention(rng: &mut ChaCha8Rng, heads: usize, tokens: usize) -> Vec<f32> {
        let mut data = Vec::with_capacity(heads * tokens * tokens);
        for _ in 0..heads * tokens {
            let row: Vec<f32> = (0..tokens).map(|_| rng.gen_range(0.01..1.0)).collect();
            let sum: f32 = row.iter().sum();
            data.extend(row.iter().map(|v| v / sum));
        }
        data
    }

    /// Host-side reference: mean heads, add I, row-normalize, compose.
    fn reference_rollout(layers: &[Vec<f32>], heads: usize, tokens: usize) -> Array2<f32> {
        let mut acc: Option<Array2<f32>> = None;
        for data in layers {
            let mut a = Array2::<f32>::eye(tokens);
            for h in 0..heads {
                let block = &data[h * tokens * tokens..(h + 1) * tokens * tokens];
                let block = Array2::from_shape_vec((tokens, tokens), block.to_vec()).unwrap();
                a = a + block / heads as f32;
            }
            let sums = a.sum_axis(Axis(1)).insert_axis(Axis(1));
            let a = a / sums;
            acc = Some(match acc {
                None => a,
                Some(r) => r.dot(&a),
            });
        }
        acc.unwrap()
    }

    #[test]
    fn test_empty_attentions() {
        let err = attention_rollout::<TestBackend>(&[]).unwrap_err();
        assert!(matches!(err, ExplainError::NoAttentions));
    }

    #[test]
    fn test_single_layer_focus() {
        // Every query attends only to token 3.
        let tokens = 5;
        let mut data = vec![0.0; tokens * tokens];
        for q in 0..tokens {
            data[q * tokens + 3] = 1.0;
        }
        let scores = attention_rollout(&[attention(data, 1, tokens)]).unwrap();
        assert_eq!(scores.len(), tokens - 1);
        let expected = [0.0, 0.0, 0.5, 0.0];
        for (s, e) in scores.iter().zip(expected) {
            assert!((s - e).abs() < 1e-6, "{scores:?}");
        }
    }

    #[test]
    fn test_multi_layer_matches_reference() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (heads, tokens) = (3, 6);
        let layers: Vec<Vec<f32>> = (0..3)
            .map(|_| random_attention(&mut rng, heads, tokens))
            .collect();

        let tensors: Vec<_> = layers
            .iter()
            .map(|d| attention(d.clone(), heads, tokens))
            .collect();
        let scores = attention_rollout(&tensors).unwrap();

        let reference = reference_rollout(&layers, heads, tokens);
        for (j, s) in scores.iter().enumerate() {
            assert!((s - reference[[0, j + 1]]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_layer_token_mismatch() {
        let a = attention(vec![0.25; 4], 1, 2);
        let b = attention(vec![1.0 / 3.0; 9], 1, 3);
        let err = attention_rollout(&[a, b]).unwrap_err();
        assert!(matches!(err, ExplainError::ShapeMismatch(_)));
    }

    #[test]
    fn test_rollout_map_shape_and_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let tokens = 11; // 10 scores on a (2, 5) grid
        let tensors = vec![
            attention(random_attention(&mut rng, 2, tokens), 2, tokens),
            attention(random_attention(&mut rng, 2, tokens), 2, tokens),
        ];
        let map = rollout_map(&tensors, (40, 16)).unwrap();
        assert_eq!(map.shape(), (40, 16));
        assert!(map.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_rollout_map_prime_patch_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tokens = 14; // 13 scores, prime
        let tensors = vec![attention(random_attention(&mut rng, 1, tokens), 1, tokens)];
        let map = rollout_map(&tensors, (20, 8)).unwrap();
        assert_eq!(map.shape(), (20, 8));
    }

    #[test]
    fn test_energy_proxy_is_constant_over_frequency() {
        let spec = array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [0.5, 0.5, 0.5]];
        let map = energy_proxy(&spec).unwrap();
        assert_eq!(map.shape(), (3, 3));
        let v = map.values();
        for t in 0..3 {
            assert!(v.row(t).iter().all(|&x| (x - v[[t, 0]]).abs() < 1e-7));
        }
        assert!(v[[0, 0]].abs() < 1e-6);
        assert!((v[[1, 0]] - 1.0).abs() < 1e-5);
        assert!((v[[2, 0]] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_energy_proxy_rejects_empty() {
        assert!(energy_proxy(&Array2::zeros((0, 4))).is_err());
        assert!(energy_proxy(&Array2::zeros((4, 0))).is_err());
    }
}
