//! Shared test utilities for building small models, images and fixtures.
#![allow(dead_code)]

use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use vqvae::data::{self, ImageItem};
use vqvae::{DatasetKind, ModelConfig, TrainConfig};

pub type TestBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<TestBackend>;

pub const FIXTURE_DIR: &str = "tests/fixtures";

/// Assert two tensor data slices are element-wise close within tolerance.
pub fn assert_close(a: &TensorData, b: &TensorData, tol: f32) {
    let a_slice = a.as_slice::<f32>().expect("a slice");
    let b_slice = b.as_slice::<f32>().expect("b slice");
    assert_eq!(
        a_slice.len(),
        b_slice.len(),
        "tensor length mismatch: {} vs {}",
        a_slice.len(),
        b_slice.len()
    );
    for (idx, (x, y)) in a_slice.iter().zip(b_slice.iter()).enumerate() {
        if (x - y).abs() > tol {
            panic!(
                "mismatch at {idx}: {x} vs {y} (diff: {}, tol: {tol})",
                (x - y).abs()
            );
        }
    }
}

/// Uniform random rows in `[-scale, scale)` as nested Vecs.
pub fn random_rows(rng: &mut StdRng, rows: usize, cols: usize, scale: f32) -> Vec<Vec<f32>> {
    (0..rows)
        .map(|_| (0..cols).map(|_| (rng.gen::<f32>() * 2.0 - 1.0) * scale).collect())
        .collect()
}

/// Create a 2D tensor from nested Vecs.
pub fn tensor2<B: burn::tensor::backend::Backend>(
    data: &[Vec<f32>],
    device: &B::Device,
) -> Tensor<B, 2> {
    let rows = data.len();
    let cols = data.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = data.iter().flatten().copied().collect();
    Tensor::from_data(TensorData::new(flat, [rows, cols]), device)
}

/// Architecture small enough for a handful of CPU steps.
pub fn small_model(in_channels: usize) -> ModelConfig {
    ModelConfig {
        in_channels,
        hidden_channels: 8,
        residual_layers: 1,
        residual_hidden_channels: None,
        num_embeddings: 8,
        embedding_dim: 4,
    }
}

/// One-channel training config rooted at `root`.
pub fn small_config(root: &Path, name: &str) -> TrainConfig {
    let mut config = TrainConfig::new(DatasetKind::Mnist, name);
    config.experiments_root = root.to_path_buf();
    config.batch_size = 4;
    config.num_epochs = 1;
    config.learning_rate = 1e-3;
    config.model = small_model(1);
    config
}

/// Deterministic synthetic images.
pub fn images(count: usize, channels: usize, seed: u64) -> Vec<ImageItem> {
    let mut rng = StdRng::seed_from_u64(seed);
    data::synthetic(count, channels, &mut rng)
}

/// Stack synthetic images into a `[N, C, 32, 32]` tensor.
pub fn image_tensor<B: burn::tensor::backend::Backend>(
    count: usize,
    channels: usize,
    seed: u64,
    device: &B::Device,
) -> Tensor<B, 4> {
    let pixels: Vec<f32> = images(count, channels, seed)
        .into_iter()
        .flat_map(|item| item.pixels)
        .collect();
    Tensor::from_data(TensorData::new(pixels, [count, channels, 32, 32]), device)
}

pub fn device() -> NdArrayDevice {
    NdArrayDevice::default()
}
