//! The seam between the engine and a concrete network.

use burn::prelude::*;

/// A two-class audio classifier over `[batch, time, freq]` features.
///
/// Implementors that cannot expose attention weights keep the default
/// [`logits_with_attentions`](AudioClassifier::logits_with_attentions),
/// which reports none; attention rollout then uses its energy proxy.
pub trait AudioClassifier<B: Backend>: Module<B> {
    /// Raw class logits, `[batch, 2]`.
    fn logits(&self, features: Tensor<B, 3>) -> Tensor<B, 2>;

    /// Logits plus per-layer attention weights `[batch, heads, tokens, tokens]`.
    fn logits_with_attentions(
        &self,
        features: Tensor<B, 3>,
    ) -> (Tensor<B, 2>, Vec<Tensor<B, 4>>) {
        (self.logits(features), Vec::new())
    }
}
