//! Convolutional encoder: `[N, C, 32, 32]` images to `[N, D, 8, 8]` latents.

use crate::config::ModelConfig;
use crate::modules::conv::{Conv2d, Conv2dConfig};
use crate::modules::residual::ResidualStack;
use burn::module::Module;
use burn::tensor::{activation::relu, backend::Backend, Tensor};
use rand::Rng;

/// Two stride-2 downsampling convs, a residual trunk and a 1x1 projection
/// into the codebook dimensionality.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub conv_1: Conv2d<B>,
    pub conv_2: Conv2d<B>,
    pub conv_3: Conv2d<B>,
    pub residual_stack: ResidualStack<B>,
    pub pre_quantization: Conv2d<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn new<R: Rng>(config: &ModelConfig, rng: &mut R, device: &B::Device) -> Self {
        let hidden = config.hidden_channels;
        let half = (hidden / 2).max(1);
        Self {
            conv_1: Conv2dConfig::new(config.in_channels, half, 4)
                .with_stride(2)
                .with_padding(1)
                .init(rng, device),
            conv_2: Conv2dConfig::new(half, hidden, 4)
                .with_stride(2)
                .with_padding(1)
                .init(rng, device),
            conv_3: Conv2dConfig::new(hidden, hidden, 3)
                .with_padding(1)
                .init(rng, device),
            residual_stack: ResidualStack::new(
                hidden,
                config.residual_hidden(),
                config.residual_layers,
                rng,
                device,
            ),
            pre_quantization: Conv2dConfig::new(hidden, config.embedding_dim, 1)
                .init(rng, device),
        }
    }

    /// Encode images into a channel-first latent grid.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let value = relu(self.conv_1.forward(images));
        let value = relu(self.conv_2.forward(value));
        let value = self.conv_3.forward(value);
        let value = self.residual_stack.forward(value);
        self.pre_quantization.forward(value)
    }
}
