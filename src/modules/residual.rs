//! Residual stacks shared by the encoder and decoder trunks.

use crate::modules::conv::{Conv2d, Conv2dConfig};
use burn::module::Module;
use burn::tensor::{activation::relu, backend::Backend, Tensor};
use rand::Rng;

/// One `relu -> conv3x3 -> relu -> conv1x1` residual layer.
#[derive(Module, Debug)]
pub struct ResidualLayer<B: Backend> {
    pub(crate) conv_3x3: Conv2d<B>,
    pub(crate) conv_1x1: Conv2d<B>,
}

impl<B: Backend> ResidualLayer<B> {
    pub fn new<R: Rng>(
        channels: usize,
        hidden_channels: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        Self {
            conv_3x3: Conv2dConfig::new(channels, hidden_channels, 3)
                .with_padding(1)
                .init(rng, device),
            conv_1x1: Conv2dConfig::new(hidden_channels, channels, 1).init(rng, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let value = self.conv_3x3.forward(relu(input.clone()));
        let value = self.conv_1x1.forward(relu(value));
        input + value
    }
}

/// Sequence of residual layers followed by a final ReLU.
#[derive(Module, Debug)]
pub struct ResidualStack<B: Backend> {
    pub(crate) layers: Vec<ResidualLayer<B>>,
}

impl<B: Backend> ResidualStack<B> {
    pub fn new<R: Rng>(
        channels: usize,
        hidden_channels: usize,
        num_layers: usize,
        rng: &mut R,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|_| ResidualLayer::new(channels, hidden_channels, rng, device))
            .collect();
        Self { layers }
    }

    pub fn forward(&self, mut input: Tensor<B, 4>) -> Tensor<B, 4> {
        for layer in &self.layers {
            input = layer.forward(input);
        }
        relu(input)
    }
}
