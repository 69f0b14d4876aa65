//! 2D convolution primitives with explicitly initialized parameters.
//!
//! Weights are owned as raw [`Param`] tensors and applied with burn's
//! functional convolution ops, so initialization can draw from a caller-owned
//! RNG instead of backend-global random state.

use burn::module::{Module, Param};
use burn::tensor::{
    backend::Backend,
    module::{conv2d, conv_transpose2d},
    ops::{ConvOptions, ConvTransposeOptions},
    Tensor, TensorData,
};
use rand::Rng;

/// Shape and stride settings for a square-kernel convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    /// Input channels.
    pub in_channels: usize,
    /// Output channels.
    pub out_channels: usize,
    /// Square kernel size.
    pub kernel_size: usize,
    /// Stride along both spatial axes.
    pub stride: usize,
    /// Zero padding along both spatial axes.
    pub padding: usize,
}

impl Conv2dConfig {
    /// Create a stride-1, unpadded config.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
        }
    }

    /// Set the stride.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Set the padding.
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Initialize a convolution with weights `[out, in, k, k]`.
    pub fn init<B: Backend, R: Rng>(&self, rng: &mut R, device: &B::Device) -> Conv2d<B> {
        let fan_in = self.in_channels * self.kernel_size * self.kernel_size;
        let shape = [
            self.out_channels,
            self.in_channels,
            self.kernel_size,
            self.kernel_size,
        ];
        Conv2d {
            weight: Param::from_tensor(uniform_fan_in(rng, shape, fan_in, device)),
            bias: Param::from_tensor(uniform_fan_in(rng, [self.out_channels], fan_in, device)),
            stride: self.stride,
            padding: self.padding,
        }
    }

    /// Initialize a transposed convolution with weights `[in, out, k, k]`.
    pub fn init_transpose<B: Backend, R: Rng>(
        &self,
        rng: &mut R,
        device: &B::Device,
    ) -> ConvTranspose2d<B> {
        // Transposed convs scale by the fan-in seen from the output side.
        let fan_in = self.out_channels * self.kernel_size * self.kernel_size;
        let shape = [
            self.in_channels,
            self.out_channels,
            self.kernel_size,
            self.kernel_size,
        ];
        ConvTranspose2d {
            weight: Param::from_tensor(uniform_fan_in(rng, shape, fan_in, device)),
            bias: Param::from_tensor(uniform_fan_in(rng, [self.out_channels], fan_in, device)),
            stride: self.stride,
            padding: self.padding,
        }
    }
}

/// Sample `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` into a new tensor.
pub fn uniform_fan_in<B: Backend, R: Rng, const D: usize>(
    rng: &mut R,
    shape: [usize; D],
    fan_in: usize,
    device: &B::Device,
) -> Tensor<B, D> {
    let limit = 1.0 / (fan_in.max(1) as f32).sqrt();
    uniform(rng, shape, limit, device)
}

/// Sample `U(-limit, limit)` into a new tensor.
pub fn uniform<B: Backend, R: Rng, const D: usize>(
    rng: &mut R,
    shape: [usize; D],
    limit: f32,
    device: &B::Device,
) -> Tensor<B, D> {
    let total: usize = shape.iter().product();
    let values: Vec<f32> = (0..total)
        .map(|_| rng.gen::<f32>() * 2.0 * limit - limit)
        .collect();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// Square-kernel 2D convolution on `[batch, channels, height, width]`.
#[derive(Module, Debug)]
pub struct Conv2d<B: Backend> {
    /// Weight tensor `[out, in, k, k]`.
    pub weight: Param<Tensor<B, 4>>,
    /// Bias `[out]`.
    pub bias: Param<Tensor<B, 1>>,
    /// Spatial stride.
    pub stride: usize,
    /// Spatial zero padding.
    pub padding: usize,
}

impl<B: Backend> Conv2d<B> {
    /// Apply the convolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        conv2d(
            input,
            self.weight.val(),
            Some(self.bias.val()),
            ConvOptions::new(
                [self.stride, self.stride],
                [self.padding, self.padding],
                [1, 1],
                1,
            ),
        )
    }
}

/// Square-kernel 2D transposed convolution on `[batch, channels, height, width]`.
#[derive(Module, Debug)]
pub struct ConvTranspose2d<B: Backend> {
    /// Weight tensor `[in, out, k, k]`.
    pub weight: Param<Tensor<B, 4>>,
    /// Bias `[out]`.
    pub bias: Param<Tensor<B, 1>>,
    /// Spatial stride.
    pub stride: usize,
    /// Spatial padding removed from the output.
    pub padding: usize,
}

impl<B: Backend> ConvTranspose2d<B> {
    /// Apply the transposed convolution.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        conv_transpose2d(
            input,
            self.weight.val(),
            Some(self.bias.val()),
            ConvTransposeOptions::new(
                [self.stride, self.stride],
                [self.padding, self.padding],
                [0, 0],
                [1, 1],
                1,
            ),
        )
    }
}
