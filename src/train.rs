//! Epoch loop: train, evaluate, checkpoint, report.
//!
//! Each epoch runs a shuffled pass over the training set with one Adam step
//! per batch, then an unshuffled pass over the evaluation set on the
//! inference backend (`model.valid()`), then writes a checkpoint and hands an
//! [`EpochReport`] to the sink.

use crate::checkpoint::save_checkpoint;
use crate::config::{ExperimentPaths, TrainConfig};
use crate::data::{batch_indices, ImageBatch, ImageBatcher, ImageItem};
use crate::metrics::{EpochReport, EpochSink, ImageSample, MeterLogger, PhaseMetrics};
use crate::model::{Criterion, LossValues, ModelOutput, VqVae};
use crate::modules::quantizer::{codebook_usage, perplexity};
use crate::perf::{self, Metric};
use anyhow::Result;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Losses and tensors of one processed batch.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    pub losses: LossValues,
    pub output: ModelOutput<B>,
}

/// One optimization step on a batch of images.
///
/// Runs the forward pass, backpropagates the total loss and applies one
/// optimizer update at `learning_rate`. Returns the updated model.
///
/// # Errors
///
/// Returns an error if the forward pass or the criterion rejects the batch.
pub fn train_step<B, O>(
    model: VqVae<B>,
    optimizer: &mut O,
    criterion: &Criterion,
    images: Tensor<B, 4>,
    learning_rate: f64,
) -> Result<(VqVae<B>, StepOutput<B>)>
where
    B: AutodiffBackend,
    O: Optimizer<VqVae<B>, B>,
{
    let _span = perf::span(Metric::TrainStep);
    let output = model.forward(images.clone())?;
    let terms = criterion.compute(
        images,
        output.latent.clone(),
        output.quantized.clone(),
        output.reconstruction.clone(),
    )?;
    let losses = terms.values();

    let grads = terms.total.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optimizer.step(learning_rate, model, grads);

    Ok((model, StepOutput { losses, output }))
}

/// Forward pass and losses without any parameter update.
///
/// # Errors
///
/// Returns an error if the forward pass or the criterion rejects the batch.
pub fn eval_step<B: Backend>(
    model: &VqVae<B>,
    criterion: &Criterion,
    images: Tensor<B, 4>,
) -> Result<StepOutput<B>> {
    let _span = perf::span(Metric::EvalStep);
    let output = model.forward(images.clone())?;
    let losses = criterion
        .compute(
            images,
            output.latent.clone(),
            output.quantized.clone(),
            output.reconstruction.clone(),
        )?
        .values();
    Ok(StepOutput { losses, output })
}

/// Averages, code usage and last batch of an evaluation pass.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: PhaseMetrics,
    /// How often each code was selected.
    pub usage: Vec<u64>,
    pub sample: Option<ImageSample>,
}

impl Evaluation {
    pub fn perplexity(&self) -> f64 {
        perplexity(&self.usage)
    }
}

/// Run [`eval_step`] over a whole dataset in order.
///
/// # Errors
///
/// Returns the first error from [`eval_step`].
pub fn evaluate<B, D>(
    model: &VqVae<B>,
    criterion: &Criterion,
    dataset: &D,
    batch_size: usize,
    device: &B::Device,
) -> Result<Evaluation>
where
    B: Backend,
    D: Dataset<ImageItem>,
{
    let num_embeddings = model.codebook().dims()[0];
    let mut meter = MeterLogger::new();
    let mut usage = vec![0u64; num_embeddings];
    let mut last = None;
    for indices in batch_indices::<StdRng>(dataset.len(), batch_size, None) {
        let batch: ImageBatch<B> = ImageBatcher.batch(gather(dataset, &indices), device);
        let size = batch.len();
        let step = eval_step(model, criterion, batch.images.clone())?;
        meter.update(&step.losses, size);
        perf::add_count(Metric::EvalImages, size as u64);
        for (slot, count) in usage
            .iter_mut()
            .zip(codebook_usage(step.output.indices, num_embeddings))
        {
            *slot += count;
        }
        last = Some((batch.images, step.output.reconstruction));
    }
    Ok(Evaluation {
        metrics: meter.averages(),
        usage,
        sample: last.map(sample),
    })
}

/// Where the trainer is within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochPhase {
    Start,
    Train,
    Eval,
    Checkpoint,
    End,
}

/// Owns the model, RNG and experiment directory for one training run.
pub struct Trainer<B: AutodiffBackend> {
    config: TrainConfig,
    paths: ExperimentPaths,
    device: B::Device,
    rng: StdRng,
    model: VqVae<B>,
    criterion: Criterion,
    phase: EpochPhase,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Validate `config`, create the experiment directory and initialize the
    /// model from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config or an unwritable experiment
    /// directory.
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        let paths = ExperimentPaths::prepare(&config)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let model = VqVae::new(&config.model, &mut rng, &device);
        log::info!(
            "initialized VQ-VAE with {} parameters ({} codes of dim {}) in {}",
            model.num_params(),
            config.model.num_embeddings,
            config.model.embedding_dim,
            paths.root.display()
        );
        let criterion = Criterion::new(config.beta);
        Ok(Self {
            config,
            paths,
            device,
            rng,
            model,
            criterion,
            phase: EpochPhase::Start,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    pub fn model(&self) -> &VqVae<B> {
        &self.model
    }

    /// Phase of the most recent epoch step.
    pub fn phase(&self) -> EpochPhase {
        self.phase
    }

    /// Train for `num_epochs` epochs, or until `interrupt` is set.
    ///
    /// The interrupt flag is only checked between epochs, so every reported
    /// epoch has its checkpoint on disk.
    ///
    /// # Errors
    ///
    /// Returns the first error from a step, the checkpoint writer or the sink.
    pub fn run<T, E, S>(
        &mut self,
        train: &T,
        eval: &E,
        sink: &mut S,
        interrupt: &AtomicBool,
    ) -> Result<Vec<EpochReport>>
    where
        T: Dataset<ImageItem>,
        E: Dataset<ImageItem>,
        S: EpochSink + ?Sized,
    {
        let mut optimizer = AdamConfig::new().init::<B, VqVae<B>>();
        let mut reports = Vec::with_capacity(self.config.num_epochs);

        for epoch in 0..self.config.num_epochs {
            if interrupt.load(Ordering::SeqCst) {
                log::warn!("interrupted; stopping before epoch {epoch}");
                break;
            }
            self.phase = EpochPhase::Start;
            let report = self.run_epoch(epoch, train, eval, &mut optimizer)?;
            sink.record(&report)?;
            reports.push(report);
            self.phase = EpochPhase::End;
        }

        Ok(reports)
    }

    fn run_epoch<T, E, O>(
        &mut self,
        epoch: usize,
        train: &T,
        eval: &E,
        optimizer: &mut O,
    ) -> Result<EpochReport>
    where
        T: Dataset<ImageItem>,
        E: Dataset<ImageItem>,
        O: Optimizer<VqVae<B>, B>,
    {
        self.phase = EpochPhase::Train;
        let mut meter = MeterLogger::new();
        let mut last_train = None;
        let mut model = self.model.clone();
        for indices in batch_indices(train.len(), self.config.batch_size, Some(&mut self.rng)) {
            let batch: ImageBatch<B> = ImageBatcher.batch(gather(train, &indices), &self.device);
            let size = batch.len();
            let (updated, step) = train_step(
                model,
                optimizer,
                &self.criterion,
                batch.images.clone(),
                self.config.learning_rate,
            )?;
            model = updated;
            meter.update(&step.losses, size);
            perf::add_count(Metric::TrainImages, size as u64);
            log::debug!("epoch {epoch} train batch: total {:.5}", step.losses.total);
            last_train = Some((batch.images.inner(), step.output.reconstruction.inner()));
        }
        self.model = model;
        let train_metrics = meter.averages();

        self.phase = EpochPhase::Eval;
        let valid = self.model.valid();
        let evaluation = evaluate(
            &valid,
            &self.criterion,
            eval,
            self.config.eval_batch_size(),
            &self.device,
        )?;

        self.phase = EpochPhase::Checkpoint;
        let checkpoint = save_checkpoint(&self.model, &self.paths.models, epoch)?;

        Ok(EpochReport {
            epoch,
            train: train_metrics,
            eval: evaluation.metrics,
            train_sample: last_train.map(sample),
            eval_sample: evaluation.sample,
            codebook: valid.codebook().into_data(),
            perplexity: perplexity(&evaluation.usage),
            usage: evaluation.usage,
            checkpoint,
        })
    }
}

fn gather<D: Dataset<ImageItem>>(dataset: &D, indices: &[usize]) -> Vec<ImageItem> {
    indices.iter().filter_map(|&index| dataset.get(index)).collect()
}

fn sample<B: Backend>((original, reconstruction): (Tensor<B, 4>, Tensor<B, 4>)) -> ImageSample {
    ImageSample {
        original: original.into_data(),
        reconstruction: reconstruction.into_data(),
    }
}
