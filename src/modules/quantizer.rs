//! Vector-quantization bottleneck.
//!
//! Each latent vector is replaced by its nearest codebook row. The discrete
//! selection has no useful gradient, so the value handed to the decoder is
//! `latent + detach(quantized - latent)`: numerically the quantized vector,
//! but with an identity gradient back into the latent (straight-through
//! estimator). Codebook rows receive gradients only through the separately
//! returned `quantized` tensor, which the criterion uses for the codebook
//! loss.

use crate::modules::codebook::Codebook;
use crate::perf::{self, Metric};
use anyhow::Result;
use burn::module::Module;
use burn::tensor::{backend::Backend, Int, Tensor};
use rand::Rng;

/// Output of [`VectorQuantizer::quantize`].
#[derive(Debug, Clone)]
pub struct Quantized<B: Backend> {
    /// Quantized grid `[N, H, W, D]` with straight-through gradient routing.
    pub straight_through: Tensor<B, 4>,
    /// Selected codebook vectors `[N, H, W, D]`; gradients flow to the codebook.
    pub quantized: Tensor<B, 4>,
    /// Selected code indices `[N, H, W]`.
    pub indices: Tensor<B, 3, Int>,
}

/// Nearest-neighbour quantizer over a learned [`Codebook`].
#[derive(Module, Debug)]
pub struct VectorQuantizer<B: Backend> {
    /// Trainable code vectors.
    pub codebook: Codebook<B>,
}

impl<B: Backend> VectorQuantizer<B> {
    /// Create a quantizer with a freshly initialized `K x D` codebook.
    pub fn new<R: Rng>(
        num_embeddings: usize,
        embedding_dim: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        Self {
            codebook: Codebook::new(num_embeddings, embedding_dim, rng, device),
        }
    }

    /// Create a quantizer around an existing codebook.
    pub fn from_codebook(codebook: Codebook<B>) -> Self {
        Self { codebook }
    }

    /// Quantize a channel-last latent grid `[N, H, W, D]`.
    ///
    /// # Errors
    ///
    /// Returns an error when `D` differs from the codebook dimensionality.
    pub fn quantize(&self, latent: Tensor<B, 4>) -> Result<Quantized<B>> {
        let [batch, height, width, dim] = latent.dims();
        let expected = self.codebook.embedding_dim();
        if dim != expected {
            anyhow::bail!(
                "latent dimension {dim} does not match codebook embedding_dim {expected}"
            );
        }

        let positions = batch * height * width;
        let weights = self.codebook.weights();
        let flat = latent.clone().reshape([positions, dim]);
        let indices = {
            let _span = perf::span(Metric::QuantizerSearch);
            nearest_indices(flat.detach(), weights.clone().detach())
        };

        let quantized = weights
            .select(0, indices.clone())
            .reshape([batch, height, width, dim]);
        let straight_through = latent.clone() + (quantized.clone() - latent).detach();

        Ok(Quantized {
            straight_through,
            quantized,
            indices: indices.reshape([batch, height, width]),
        })
    }
}

/// Rows of `vectors` compared against the whole codebook at once.
const SEARCH_CHUNK: usize = 256;

/// Index of the nearest codebook row for every row of `vectors`.
///
/// Distances are squared Euclidean, summed from the elementwise differences
/// so equidistant codes compare exactly equal. Ties resolve to the lowest
/// index. Rows are processed in fixed-size chunks to bound the
/// `rows x K x D` difference tensor.
pub fn nearest_indices<B: Backend>(vectors: Tensor<B, 2>, codebook: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [rows, dim] = vectors.dims();
    if rows <= SEARCH_CHUNK {
        return nearest_in_chunk(vectors, codebook);
    }
    let chunks = (0..rows)
        .step_by(SEARCH_CHUNK)
        .map(|start| {
            let end = (start + SEARCH_CHUNK).min(rows);
            nearest_in_chunk(vectors.clone().slice([start..end, 0..dim]), codebook.clone())
        })
        .collect();
    Tensor::cat(chunks, 0)
}

fn nearest_in_chunk<B: Backend>(vectors: Tensor<B, 2>, codebook: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [rows, dim] = vectors.dims();
    let [codes, _] = codebook.dims();
    let device = vectors.device();

    let diff = vectors.reshape([rows, 1, dim]).repeat_dim(1, codes)
        - codebook.reshape([1, codes, dim]).repeat_dim(0, rows);
    let distances = (diff.clone() * diff).sum_dim(2).reshape([rows, codes]);

    let minimum = distances.clone().min_dim(1).repeat_dim(1, codes);
    let is_min = distances.equal(minimum);
    let ids = Tensor::<B, 1, Int>::arange(0..codes as i64, &device)
        .reshape([1, codes])
        .repeat_dim(0, rows);

    // NaN rows match nothing; clamp keeps them a valid (last) index.
    ids.mask_fill(is_min.bool_not(), codes as i64)
        .min_dim(1)
        .clamp_max(codes as i64 - 1)
        .reshape([rows])
}

/// Count how often each of the `num_embeddings` codes was selected.
pub fn codebook_usage<B: Backend, const D: usize>(
    indices: Tensor<B, D, Int>,
    num_embeddings: usize,
) -> Vec<u64> {
    let mut usage = vec![0u64; num_embeddings];
    for index in indices.into_data().iter::<i64>() {
        if let Some(slot) = usize::try_from(index)
            .ok()
            .and_then(|idx| usage.get_mut(idx))
        {
            *slot += 1;
        }
    }
    usage
}

/// Perplexity `exp(-sum p log p)` of a code-usage histogram.
///
/// Ranges from 1 (a single code used) to K (uniform usage); 0 for an empty
/// histogram.
pub fn perplexity(usage: &[u64]) -> f64 {
    let total: u64 = usage.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let entropy: f64 = usage
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total as f64;
            -p * p.ln()
        })
        .sum();
    entropy.exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn grid_codebook(device: &NdArrayDevice) -> VectorQuantizer<TestBackend> {
        let weights = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0]],
            device,
        );
        VectorQuantizer::from_codebook(Codebook::from_tensor(weights))
    }

    #[test]
    fn picks_nearest_corner() {
        let device = NdArrayDevice::default();
        let quantizer = grid_codebook(&device);
        let latent =
            Tensor::<TestBackend, 4>::from_floats([[[[1.0, 1.0], [9.0, 9.0]]]], &device);
        let out = quantizer.quantize(latent).expect("quantize");

        let indices = out.indices.into_data();
        assert_eq!(indices.iter::<i64>().collect::<Vec<_>>(), vec![0, 3]);
        let values = out.quantized.into_data();
        assert_eq!(
            values.as_slice::<f32>().unwrap(),
            &[0.0, 0.0, 10.0, 10.0]
        );
    }

    #[test]
    fn exact_ties_pick_lowest_index() {
        let device = NdArrayDevice::default();
        let codebook = Tensor::<TestBackend, 2>::from_floats(
            [[5.0, 5.0], [1.0, 0.0], [-1.0, 0.0], [1.0, 0.0]],
            &device,
        );
        let vectors = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0], [1.0, 0.0]], &device);
        let indices = nearest_indices(vectors, codebook).into_data();
        assert_eq!(indices.iter::<i64>().collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn chunked_search_covers_every_row() {
        let device = NdArrayDevice::default();
        let codebook = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]],
            &device,
        );
        let rows = SEARCH_CHUNK * 2 + 3;
        let values: Vec<f32> = (0..rows)
            .flat_map(|row| match row % 3 {
                0 => [1.0, 1.0],
                1 => [9.0, 1.0],
                _ => [1.0, 9.0],
            })
            .collect();
        let vectors = Tensor::<TestBackend, 2>::from_data(
            burn::tensor::TensorData::new(values, [rows, 2]),
            &device,
        );
        let indices: Vec<i64> = nearest_indices(vectors, codebook)
            .into_data()
            .iter::<i64>()
            .collect();
        assert_eq!(indices.len(), rows);
        assert!(indices
            .iter()
            .enumerate()
            .all(|(row, &index)| index == (row % 3) as i64));
    }

    #[test]
    fn rejects_mismatched_dimension() {
        let device = NdArrayDevice::default();
        let quantizer = grid_codebook(&device);
        let latent = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 3], &device);
        let err = quantizer.quantize(latent).unwrap_err();
        assert!(err.to_string().contains("embedding_dim 2"));
    }

    #[test]
    fn usage_and_perplexity() {
        let device = NdArrayDevice::default();
        let indices = Tensor::<TestBackend, 1, Int>::from_ints([0, 0, 2, 3], &device);
        let usage = codebook_usage(indices, 4);
        assert_eq!(usage, vec![2, 0, 1, 1]);

        assert_eq!(perplexity(&[0, 0]), 0.0);
        assert!((perplexity(&[5, 0, 0]) - 1.0).abs() < 1e-12);
        assert!((perplexity(&[3, 3, 3, 3]) - 4.0).abs() < 1e-9);
    }
}
