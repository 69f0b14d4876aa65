//! Full VQ-VAE: encoder, vector-quantizer bottleneck and decoder.

use crate::config::ModelConfig;
use crate::model::decoder::Decoder;
use crate::model::encoder::Encoder;
use crate::modules::quantizer::VectorQuantizer;
use anyhow::Result;
use burn::module::Module;
use burn::tensor::{backend::Backend, Int, Tensor};
use rand::Rng;

/// Tensors produced by one forward pass.
#[derive(Debug, Clone)]
pub struct ModelOutput<B: Backend> {
    /// Encoder output, channel-last `[N, H, W, D]`.
    pub latent: Tensor<B, 4>,
    /// Selected codebook vectors `[N, H, W, D]` (gradient path to the codebook).
    pub quantized: Tensor<B, 4>,
    /// Selected code indices `[N, H, W]`.
    pub indices: Tensor<B, 3, Int>,
    /// Decoder output `[N, C, 32, 32]`.
    pub reconstruction: Tensor<B, 4>,
}

/// Vector-quantized autoencoder.
#[derive(Module, Debug)]
pub struct VqVae<B: Backend> {
    pub encoder: Encoder<B>,
    pub vector_quantizer: VectorQuantizer<B>,
    pub decoder: Decoder<B>,
}

impl<B: Backend> VqVae<B> {
    /// Build a model, drawing every initial parameter from `rng`.
    ///
    /// Parameters are drawn encoder first, then codebook, then decoder, so
    /// the same seed always yields the same model.
    pub fn new<R: Rng>(config: &ModelConfig, rng: &mut R, device: &B::Device) -> Self {
        let encoder = Encoder::new(config, rng, device);
        let vector_quantizer =
            VectorQuantizer::new(config.num_embeddings, config.embedding_dim, rng, device);
        let decoder = Decoder::new(config, rng, device);
        Self {
            encoder,
            vector_quantizer,
            decoder,
        }
    }

    /// Image channels expected by the encoder.
    pub fn in_channels(&self) -> usize {
        self.encoder.conv_1.weight.val().dims()[1]
    }

    /// Current codebook matrix `[K, D]`.
    pub fn codebook(&self) -> Tensor<B, 2> {
        self.vector_quantizer.codebook.weights()
    }

    /// Encode images to a channel-last latent grid `[N, H, W, D]`.
    pub fn encode(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.encoder.forward(images).permute([0, 2, 3, 1])
    }

    /// Run encoder, quantizer and decoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the image channel count or the latent
    /// dimensionality disagree with the model configuration.
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<ModelOutput<B>> {
        let channels = images.dims()[1];
        let expected = self.in_channels();
        if channels != expected {
            anyhow::bail!("model expects {expected} image channels, got {channels}");
        }

        let latent = self.encode(images);
        let quantized = self.vector_quantizer.quantize(latent.clone())?;
        let reconstruction = self
            .decoder
            .forward(quantized.straight_through.permute([0, 3, 1, 2]));

        Ok(ModelOutput {
            latent,
            quantized: quantized.quantized,
            indices: quantized.indices,
            reconstruction,
        })
    }
}
