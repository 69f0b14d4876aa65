//! Convolutional decoder: `[N, D, 8, 8]` quantized grids to `[N, C, 32, 32]` images.

use crate::config::ModelConfig;
use crate::modules::conv::{Conv2d, Conv2dConfig, ConvTranspose2d};
use crate::modules::residual::ResidualStack;
use burn::module::Module;
use burn::tensor::{activation::relu, backend::Backend, Tensor};
use rand::Rng;

/// Mirror of the encoder: a 3x3 conv, residual trunk and two stride-2
/// transposed convs back to image resolution. The output is not squashed.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub conv_1: Conv2d<B>,
    pub residual_stack: ResidualStack<B>,
    pub conv_transpose_1: ConvTranspose2d<B>,
    pub conv_transpose_2: ConvTranspose2d<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn new<R: Rng>(config: &ModelConfig, rng: &mut R, device: &B::Device) -> Self {
        let hidden = config.hidden_channels;
        let half = (hidden / 2).max(1);
        Self {
            conv_1: Conv2dConfig::new(config.embedding_dim, hidden, 3)
                .with_padding(1)
                .init(rng, device),
            residual_stack: ResidualStack::new(
                hidden,
                config.residual_hidden(),
                config.residual_layers,
                rng,
                device,
            ),
            conv_transpose_1: Conv2dConfig::new(hidden, half, 4)
                .with_stride(2)
                .with_padding(1)
                .init_transpose(rng, device),
            conv_transpose_2: Conv2dConfig::new(half, config.in_channels, 4)
                .with_stride(2)
                .with_padding(1)
                .init_transpose(rng, device),
        }
    }

    /// Decode a channel-first quantized grid into images.
    pub fn forward(&self, quantized: Tensor<B, 4>) -> Tensor<B, 4> {
        let value = self.conv_1.forward(quantized);
        let value = self.residual_stack.forward(value);
        let value = relu(self.conv_transpose_1.forward(value));
        self.conv_transpose_2.forward(value)
    }
}
