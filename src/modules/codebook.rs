//! Learned codebook of embedding vectors.

use crate::modules::conv::uniform;
use burn::module::{Module, Param};
use burn::tensor::{backend::Backend, Tensor};
use rand::Rng;

/// Dense `(K, D)` table of trainable code vectors; row `i` is code `i`.
#[derive(Module, Debug)]
pub struct Codebook<B: Backend> {
    /// Embedding matrix with shape `[num_embeddings, embedding_dim]`.
    pub embeddings: Param<Tensor<B, 2>>,
}

impl<B: Backend> Codebook<B> {
    /// Initialize `K` codes uniformly in `[-1/K, 1/K]`.
    pub fn new<R: Rng>(
        num_embeddings: usize,
        embedding_dim: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let limit = 1.0 / num_embeddings.max(1) as f32;
        let weights = uniform(rng, [num_embeddings, embedding_dim], limit, device);
        Self::from_tensor(weights)
    }

    /// Wrap an existing `[K, D]` matrix.
    pub fn from_tensor(weights: Tensor<B, 2>) -> Self {
        Self {
            embeddings: Param::from_tensor(weights),
        }
    }

    /// Codebook size K.
    pub fn num_embeddings(&self) -> usize {
        self.embeddings.val().dims()[0]
    }

    /// Vector dimensionality D.
    pub fn embedding_dim(&self) -> usize {
        self.embeddings.val().dims()[1]
    }

    /// Current embedding matrix.
    pub fn weights(&self) -> Tensor<B, 2> {
        self.embeddings.val()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn init_is_bounded_by_inverse_size() {
        let device = NdArrayDevice::default();
        let mut rng = StdRng::seed_from_u64(3);
        let codebook = Codebook::<TestBackend>::new(16, 4, &mut rng, &device);
        assert_eq!(codebook.num_embeddings(), 16);
        assert_eq!(codebook.embedding_dim(), 4);
        let max = codebook.weights().abs().max().into_scalar();
        assert!(max <= 1.0 / 16.0);
    }
}
