//! # vqvae - Vector-Quantized Autoencoder training on burn
//!
//! An image autoencoder whose latent grid is discretized through a learned
//! codebook, trained end to end with a straight-through estimator.
//!
//! ## Architecture Overview
//!
//! 1. **Encoder** ([`model::encoder::Encoder`]): two stride-2 convolutions, a
//!    residual stack and a 1x1 projection turn `[N, C, 32, 32]` images into an
//!    `[N, D, 8, 8]` latent grid.
//!
//! 2. **Vector Quantizer** ([`VectorQuantizer`]): replaces every latent vector
//!    with its nearest codebook row. The decoder sees
//!    `latent + detach(quantized - latent)`, so gradients pass through the
//!    discrete choice unchanged.
//!
//! 3. **Decoder** ([`model::decoder::Decoder`]): mirrors the encoder with
//!    transposed convolutions back to `[N, C, 32, 32]`.
//!
//! 4. **Criterion** ([`Criterion`]): reconstruction MSE plus a codebook term
//!    (codes move toward detached latents) plus `beta` times a commitment
//!    term (latents move toward detached codes).
//!
//! ## Quick Start
//!
//! ```no_run
//! use burn::backend::Autodiff;
//! use burn::data::dataset::InMemDataset;
//! use burn_ndarray::{NdArray, NdArrayDevice};
//! use rand::{rngs::StdRng, SeedableRng};
//! use std::sync::atomic::AtomicBool;
//! use vqvae::{data, DatasetKind, ExperimentLogger, TrainConfig, Trainer};
//!
//! let mut config = TrainConfig::new(DatasetKind::Mnist, "smoke");
//! config.num_epochs = 1;
//! let mut trainer =
//!     Trainer::<Autodiff<NdArray<f32>>>::new(config, NdArrayDevice::default()).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let train = InMemDataset::new(data::synthetic(64, 1, &mut rng));
//! let eval = InMemDataset::new(data::synthetic(16, 1, &mut rng));
//! let mut logger = ExperimentLogger::new(trainer.paths().logs.clone());
//! let reports = trainer
//!     .run(&train, &eval, &mut logger, &AtomicBool::new(false))
//!     .unwrap();
//! println!("val loss {}", reports[0].eval.total_loss);
//! ```
//!
//! ## Configuration
//!
//! Runs are configured with [`TrainConfig`], loaded from YAML with
//! [`load_config`] or built in code. Each run owns an experiment directory
//! holding `config.json`, `logs/` and `models/`.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod metrics;
pub mod perf;
pub mod train;

// Building blocks, exposed for integration tests.
#[doc(hidden)]
pub mod model;
#[doc(hidden)]
pub mod modules;
#[doc(hidden)]
pub mod weights;

pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use config::{load_config, DatasetKind, ExperimentPaths, ModelConfig, TrainConfig};
pub use metrics::{EpochReport, EpochSink, ExperimentLogger, MeterLogger, PhaseMetrics};
pub use model::{Criterion, LossTerms, LossValues, ModelOutput, VqVae};
pub use modules::quantizer::{Quantized, VectorQuantizer};
pub use train::{eval_step, train_step, StepOutput, Trainer};
