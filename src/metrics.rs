//! Per-epoch metric aggregation and experiment logging.
//!
//! The trainer accumulates losses in a [`MeterLogger`] per phase and hands a
//! finished [`EpochReport`] to an [`EpochSink`]. [`ExperimentLogger`] is the
//! default sink and writes everything under the experiment's `logs/` folder.

use crate::model::LossValues;
use crate::perf::{self, Metric};
use crate::weights::{save_tensors, NamedTensor};
use anyhow::Result;
use burn::tensor::TensorData;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which half of an epoch produced a set of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }
}

/// Averaged losses for one phase of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseMetrics {
    pub total_loss: f64,
    pub reconstruction_loss: f64,
    pub vq_loss: f64,
    /// Number of images the averages are taken over.
    pub images: u64,
}

/// Running, sample-weighted averages of the total, reconstruction and
/// codebook losses.
#[derive(Debug, Clone, Default)]
pub struct MeterLogger {
    total: f64,
    reconstruction: f64,
    vq: f64,
    images: u64,
}

impl MeterLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add one batch of `batch_size` images with per-batch mean losses.
    pub fn update(&mut self, losses: &LossValues, batch_size: usize) {
        let weight = batch_size as f64;
        self.total += losses.total * weight;
        self.reconstruction += losses.reconstruction * weight;
        self.vq += losses.vq * weight;
        self.images += batch_size as u64;
    }

    /// Current averages; all zero before the first update.
    pub fn averages(&self) -> PhaseMetrics {
        if self.images == 0 {
            return PhaseMetrics::default();
        }
        let n = self.images as f64;
        PhaseMetrics {
            total_loss: self.total / n,
            reconstruction_loss: self.reconstruction / n,
            vq_loss: self.vq / n,
            images: self.images,
        }
    }
}

/// Originals and reconstructions of one batch, copied to the host.
#[derive(Debug, Clone)]
pub struct ImageSample {
    /// `[N, C, 32, 32]` inputs.
    pub original: TensorData,
    /// `[N, C, 32, 32]` decoder outputs.
    pub reconstruction: TensorData,
}

/// Everything produced by one completed epoch.
#[derive(Debug, Clone)]
pub struct EpochReport {
    /// Zero-based epoch number.
    pub epoch: usize,
    pub train: PhaseMetrics,
    pub eval: PhaseMetrics,
    /// Last training batch of the epoch.
    pub train_sample: Option<ImageSample>,
    /// Last evaluation batch of the epoch.
    pub eval_sample: Option<ImageSample>,
    /// Codebook `[K, D]` after the training phase.
    pub codebook: TensorData,
    /// How often each code was selected during evaluation.
    pub usage: Vec<u64>,
    /// Perplexity of `usage`.
    pub perplexity: f64,
    /// Checkpoint written for this epoch.
    pub checkpoint: PathBuf,
}

/// Destination for finished epochs.
pub trait EpochSink {
    /// Persist or display one epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    fn record(&mut self, report: &EpochReport) -> Result<()>;
}

/// Collects reports in memory.
impl EpochSink for Vec<EpochReport> {
    fn record(&mut self, report: &EpochReport) -> Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct MetricsLine<'a> {
    epoch: usize,
    phase: Phase,
    #[serde(flatten)]
    metrics: &'a PhaseMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    perplexity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_codes: Option<usize>,
}

/// Writes metrics, image samples and codebooks under a `logs/` directory.
///
/// - `metrics.jsonl`: one JSON object per phase per epoch
/// - `images_<phase>_<epoch>.safetensors`: `original` and `reconstruction`
/// - `codebook_<epoch>.safetensors`: `embeddings`
#[derive(Debug, Clone)]
pub struct ExperimentLogger {
    logs: PathBuf,
}

impl ExperimentLogger {
    /// Log into `logs`, which must already exist.
    pub fn new(logs: impl Into<PathBuf>) -> Self {
        Self { logs: logs.into() }
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.logs.join("metrics.jsonl")
    }

    pub fn images_path(&self, phase: Phase, epoch: usize) -> PathBuf {
        self.logs
            .join(format!("images_{}_{epoch}.safetensors", phase.name()))
    }

    pub fn codebook_path(&self, epoch: usize) -> PathBuf {
        self.logs.join(format!("codebook_{epoch}.safetensors"))
    }

    fn append_metrics(&self, lines: &[MetricsLine<'_>]) -> Result<()> {
        let path = self.metrics_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", path.display()))?;
        for line in lines {
            let json = serde_json::to_string(line)?;
            writeln!(file, "{json}")?;
        }
        Ok(())
    }

    fn write_images(&self, phase: Phase, epoch: usize, sample: &ImageSample) -> Result<()> {
        write_snapshot(
            &self.images_path(phase, epoch),
            vec![
                NamedTensor::from_data("original", sample.original.clone())?,
                NamedTensor::from_data("reconstruction", sample.reconstruction.clone())?,
            ],
        )
    }
}

fn write_snapshot(path: &Path, tensors: Vec<NamedTensor>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    save_tensors(path, &tensors)
}

impl EpochSink for ExperimentLogger {
    fn record(&mut self, report: &EpochReport) -> Result<()> {
        let _span = perf::span(Metric::EpochLog);
        let epoch = report.epoch;
        let active_codes = report.usage.iter().filter(|&&count| count > 0).count();

        self.append_metrics(&[
            MetricsLine {
                epoch,
                phase: Phase::Train,
                metrics: &report.train,
                perplexity: None,
                active_codes: None,
            },
            MetricsLine {
                epoch,
                phase: Phase::Val,
                metrics: &report.eval,
                perplexity: Some(report.perplexity),
                active_codes: Some(active_codes),
            },
        ])?;

        if let Some(sample) = &report.train_sample {
            self.write_images(Phase::Train, epoch, sample)?;
        }
        if let Some(sample) = &report.eval_sample {
            self.write_images(Phase::Val, epoch, sample)?;
        }
        write_snapshot(
            &self.codebook_path(epoch),
            vec![NamedTensor::from_data("embeddings", report.codebook.clone())?],
        )?;

        log::info!(
            "epoch {epoch}: train total {:.5} rec {:.5} vq {:.5} | val total {:.5} rec {:.5} vq {:.5} | perplexity {:.2} ({active_codes}/{} codes)",
            report.train.total_loss,
            report.train.reconstruction_loss,
            report.train.vq_loss,
            report.eval.total_loss,
            report.eval.reconstruction_loss,
            report.eval.vq_loss,
            report.perplexity,
            report.usage.len(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(total: f64, reconstruction: f64, vq: f64) -> LossValues {
        LossValues {
            total,
            reconstruction,
            vq,
            commitment: vq,
        }
    }

    #[test]
    fn meter_weights_by_batch_size() {
        let mut meter = MeterLogger::new();
        assert_eq!(meter.averages(), PhaseMetrics::default());

        meter.update(&losses(1.0, 0.5, 0.25), 3);
        meter.update(&losses(5.0, 1.5, 2.25), 1);
        let averages = meter.averages();
        assert_eq!(averages.images, 4);
        assert!((averages.total_loss - 2.0).abs() < 1e-12);
        assert!((averages.reconstruction_loss - 0.75).abs() < 1e-12);
        assert!((averages.vq_loss - 0.75).abs() < 1e-12);

        meter.reset();
        assert_eq!(meter.averages().images, 0);
    }

    #[test]
    fn experiment_logger_writes_every_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut logger = ExperimentLogger::new(dir.path());
        let image = TensorData::new(vec![0.5f32; 4], [1, 1, 2, 2]);
        let report = EpochReport {
            epoch: 2,
            train: PhaseMetrics {
                total_loss: 1.0,
                reconstruction_loss: 0.5,
                vq_loss: 0.25,
                images: 8,
            },
            eval: PhaseMetrics::default(),
            train_sample: Some(ImageSample {
                original: image.clone(),
                reconstruction: image,
            }),
            eval_sample: None,
            codebook: TensorData::new(vec![0.0f32, 1.0, 2.0, 3.0], [2, 2]),
            usage: vec![3, 0],
            perplexity: 1.0,
            checkpoint: dir.path().join("2.bin"),
        };
        logger.record(&report).expect("record");
        logger.record(&EpochReport { epoch: 3, ..report }).expect("record");

        let text = fs::read_to_string(logger.metrics_path()).expect("metrics");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["phase"], "train");
        assert_eq!(lines[0]["images"], 8);
        assert_eq!(lines[1]["phase"], "val");
        assert_eq!(lines[1]["active_codes"], 1);
        assert_eq!(lines[3]["epoch"], 3);

        assert!(logger.images_path(Phase::Train, 2).is_file());
        assert!(!logger.images_path(Phase::Val, 2).exists());
        assert!(logger.codebook_path(3).is_file());
    }
}
