//! Turn [`ImageItem`]s into image tensors.

use crate::data::ImageItem;
use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{
    backend::Backend,
    module::interpolate,
    ops::{InterpolateMode, InterpolateOptions},
    Int, Tensor, TensorData,
};

/// Side length every batch is resized to.
pub const IMAGE_SIZE: usize = 32;

/// A batch of images with labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Images `[N, C, 32, 32]` in `[0, 1]`.
    pub images: Tensor<B, 4>,
    /// Class labels `[N]`.
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of images in the batch.
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks items and resizes them (bicubic, clamped to `[0, 1]`) to 32x32.
///
/// All items in one batch must share a shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBatcher;

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let (channels, height, width) = items
            .first()
            .map(|item| (item.channels, item.height, item.width))
            .unwrap_or((1, IMAGE_SIZE, IMAGE_SIZE));

        let labels: Vec<i64> = items.iter().map(|item| i64::from(item.label)).collect();
        let pixels: Vec<f32> = items.into_iter().flat_map(|item| item.pixels).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, channels, height, width]),
            device,
        );
        let images = if batch_size > 0 && (height != IMAGE_SIZE || width != IMAGE_SIZE) {
            interpolate(
                images,
                [IMAGE_SIZE, IMAGE_SIZE],
                InterpolateOptions::new(InterpolateMode::Bicubic),
            )
            .clamp(0.0, 1.0)
        } else {
            images
        };
        let labels = Tensor::from_data(TensorData::new(labels, [batch_size]), device);

        ImageBatch { images, labels }
    }
}
