//! Image datasets and batching.
//!
//! Readers load dataset files that are already on disk into burn
//! [`InMemDataset`]s of [`ImageItem`]s; the [`ImageBatcher`] turns a list of
//! items into a `[N, C, 32, 32]` tensor with pixels in `[0, 1]`.

pub mod batcher;
pub mod cifar;
pub mod mnist;

use crate::config::DatasetKind;
use crate::perf::{self, Metric};
use anyhow::Result;
use burn::data::dataset::InMemDataset;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

pub use batcher::{ImageBatch, ImageBatcher, IMAGE_SIZE};

/// Which half of a dataset to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// One image with its class label.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// Channel-major pixels (`[C, H, W]` flattened) in `[0, 1]`.
    pub pixels: Vec<f32>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub label: u8,
}

impl ImageItem {
    /// Build an item from raw bytes, scaling `0..=255` to `[0, 1]`.
    pub fn from_bytes(bytes: &[u8], channels: usize, height: usize, width: usize, label: u8) -> Self {
        Self {
            pixels: bytes.iter().map(|&b| f32::from(b) / 255.0).collect(),
            channels,
            height,
            width,
            label,
        }
    }
}

/// Load one split of a dataset from `dir`.
///
/// # Errors
///
/// Returns an error if the expected files are missing or malformed.
pub fn load_dataset(kind: DatasetKind, dir: &Path, split: Split) -> Result<InMemDataset<ImageItem>> {
    let _span = perf::span(Metric::DatasetLoad);
    let items = match kind {
        DatasetKind::Mnist => mnist::load(dir, split)?,
        DatasetKind::Cifar10 => cifar::load(dir, split)?,
    };
    log::info!("loaded {} {kind} {split:?} images from {}", items.len(), dir.display());
    Ok(InMemDataset::new(items))
}

/// Deterministic smooth-pattern images, useful for smoke runs and tests.
pub fn synthetic<R: Rng>(count: usize, channels: usize, rng: &mut R) -> Vec<ImageItem> {
    (0..count)
        .map(|index| {
            let phase: f32 = rng.gen::<f32>() * std::f32::consts::TAU;
            let freq = 1.0 + rng.gen::<f32>() * 3.0;
            let mut pixels = Vec::with_capacity(channels * IMAGE_SIZE * IMAGE_SIZE);
            for channel in 0..channels {
                for y in 0..IMAGE_SIZE {
                    for x in 0..IMAGE_SIZE {
                        let u = x as f32 / IMAGE_SIZE as f32;
                        let v = y as f32 / IMAGE_SIZE as f32;
                        let wave = (freq * (u + v) * std::f32::consts::PI + phase + channel as f32)
                            .sin();
                        pixels.push(0.5 + 0.5 * wave);
                    }
                }
            }
            ImageItem {
                pixels,
                channels,
                height: IMAGE_SIZE,
                width: IMAGE_SIZE,
                label: (index % 10) as u8,
            }
        })
        .collect()
}

/// Split `0..len` into batches of at most `batch_size` indices, shuffled
/// when an RNG is given. The last batch may be short.
pub fn batch_indices<R: Rng>(len: usize, batch_size: usize, rng: Option<&mut R>) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..len).collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }
    order
        .chunks(batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn batches_cover_every_index_once() {
        let mut rng = StdRng::seed_from_u64(9);
        let batches = batch_indices(10, 4, Some(&mut rng));
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn unshuffled_batches_are_in_order() {
        let batches = batch_indices::<StdRng>(5, 2, None);
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn synthetic_pixels_stay_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(2);
        let items = synthetic(3, 3, &mut rng);
        assert_eq!(items.len(), 3);
        for item in &items {
            assert_eq!(item.pixels.len(), 3 * IMAGE_SIZE * IMAGE_SIZE);
            assert!(item.pixels.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }
}
