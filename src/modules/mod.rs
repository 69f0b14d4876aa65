//! Low-level neural network building blocks for the VQ-VAE.
//!
//! Convolutions and residual stacks form the encoder/decoder trunks; the
//! codebook and quantizer form the discrete bottleneck between them.

pub mod codebook;
pub mod conv;
pub mod quantizer;
pub mod residual;
