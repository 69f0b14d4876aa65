//! Composite VQ-VAE loss.
//!
//! `total = reconstruction + vq + beta * commitment`, where the codebook (vq)
//! term detaches the latent so only codebook rows move, and the commitment
//! term detaches the quantized vectors so only the encoder moves.

use anyhow::Result;
use burn::tensor::{backend::Backend, ElementConversion, Tensor};

/// Loss terms for one batch, each a single-element tensor.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    /// Weighted sum used for backpropagation.
    pub total: Tensor<B, 1>,
    /// MSE between the input images and their reconstruction.
    pub reconstruction: Tensor<B, 1>,
    /// MSE pulling selected codes toward the (detached) latents.
    pub vq: Tensor<B, 1>,
    /// Unscaled MSE pulling latents toward the (detached) codes.
    pub commitment: Tensor<B, 1>,
}

/// Host-side copy of [`LossTerms`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossValues {
    pub total: f64,
    pub reconstruction: f64,
    pub vq: f64,
    pub commitment: f64,
}

impl<B: Backend> LossTerms<B> {
    /// Read every term back to the host.
    pub fn values(&self) -> LossValues {
        LossValues {
            total: scalar(&self.total),
            reconstruction: scalar(&self.reconstruction),
            vq: scalar(&self.vq),
            commitment: scalar(&self.commitment),
        }
    }
}

fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f64 {
    tensor.clone().into_scalar().elem::<f64>()
}

/// Loss criterion with commitment coefficient `beta`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criterion {
    /// Commitment strength.
    pub beta: f32,
}

impl Default for Criterion {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

impl Criterion {
    pub fn new(beta: f32) -> Self {
        Self { beta }
    }

    /// Compute all loss terms for a batch.
    ///
    /// `latent` and `quantized` are channel-last `[N, H, W, D]`; `original`
    /// and `reconstruction` are `[N, C, H, W]` images.
    ///
    /// # Errors
    ///
    /// Returns an error when either pair of tensors disagrees in shape.
    pub fn compute<B: Backend>(
        &self,
        original: Tensor<B, 4>,
        latent: Tensor<B, 4>,
        quantized: Tensor<B, 4>,
        reconstruction: Tensor<B, 4>,
    ) -> Result<LossTerms<B>> {
        if latent.dims() != quantized.dims() {
            anyhow::bail!(
                "latent shape {:?} does not match quantized shape {:?}",
                latent.dims(),
                quantized.dims()
            );
        }
        if original.dims() != reconstruction.dims() {
            anyhow::bail!(
                "image shape {:?} does not match reconstruction shape {:?}",
                original.dims(),
                reconstruction.dims()
            );
        }

        let reconstruction = mse(reconstruction, original);
        let vq = mse(quantized.clone(), latent.clone().detach());
        let commitment = mse(latent, quantized.detach());
        let total = reconstruction.clone() + vq.clone() + commitment.clone().mul_scalar(self.beta);

        Ok(LossTerms {
            total,
            reconstruction,
            vq,
            commitment,
        })
    }
}

/// Mean squared error over every element.
pub fn mse<B: Backend, const D: usize>(lhs: Tensor<B, D>, rhs: Tensor<B, D>) -> Tensor<B, 1> {
    let diff = lhs - rhs;
    (diff.clone() * diff).mean()
}
