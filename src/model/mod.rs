//! The VQ-VAE model and its loss.
//!
//! `encoder` and `decoder` are the convolutional trunks, `vqvae` wires them
//! around the quantizer, and `criterion` turns a forward pass into losses.

pub mod criterion;
pub mod decoder;
pub mod encoder;
pub mod vqvae;

pub use criterion::{Criterion, LossTerms, LossValues};
pub use vqvae::{ModelOutput, VqVae};
