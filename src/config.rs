//! Run configuration for VQ-VAE training.
//!
//! Configurations are loaded from YAML files using [`load_config`] and may be
//! overridden from the command line. A config is immutable once a run starts.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Datasets the trainer knows how to read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum DatasetKind {
    /// CIFAR-10 binary batches, 3 channels.
    Cifar10,
    /// MNIST IDX files, 1 channel.
    Mnist,
}

impl DatasetKind {
    /// Number of image channels produced by this dataset.
    pub fn in_channels(self) -> usize {
        match self {
            DatasetKind::Cifar10 => 3,
            DatasetKind::Mnist => 1,
        }
    }

    /// Lowercase dataset name, as used in configs and on the CLI.
    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Cifar10 => "cifar10",
            DatasetKind::Mnist => "mnist",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "cifar10" => Ok(DatasetKind::Cifar10),
            "mnist" => Ok(DatasetKind::Mnist),
            _ => anyhow::bail!("Invalid dataset: {value}"),
        }
    }
}

/// Encoder/decoder/codebook architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Image channels fed to the encoder and produced by the decoder.
    pub in_channels: usize,
    /// Width of the convolutional trunk.
    pub hidden_channels: usize,
    /// Number of residual layers in each residual stack.
    #[serde(default = "default_residual_layers")]
    pub residual_layers: usize,
    /// Bottleneck width inside residual layers. Defaults to `hidden_channels / 4`.
    #[serde(default)]
    pub residual_hidden_channels: Option<usize>,
    /// Codebook size K.
    pub num_embeddings: usize,
    /// Codebook vector dimensionality D.
    pub embedding_dim: usize,
}

fn default_residual_layers() -> usize {
    2
}

impl ModelConfig {
    /// Residual bottleneck width, never zero.
    pub fn residual_hidden(&self) -> usize {
        self.residual_hidden_channels
            .unwrap_or(self.hidden_channels / 4)
            .max(1)
    }
}

/// Full training configuration.
///
/// # Example YAML
///
/// ```yaml
/// dataset: cifar10
/// data_dir: data
/// experiment_name: baseline
/// seed: 987
/// batch_size: 128
/// num_epochs: 100
/// learning_rate: 0.0003
/// beta: 1.0
/// model:
///   in_channels: 3
///   hidden_channels: 256
///   num_embeddings: 512
///   embedding_dim: 64
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    /// Which dataset to train on.
    pub dataset: DatasetKind,
    /// Directory containing the dataset files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Name of the experiment directory under `experiments_root`.
    pub experiment_name: String,
    /// Parent directory for all experiments.
    #[serde(default = "default_experiments_root")]
    pub experiments_root: PathBuf,
    /// Seed for parameter initialization and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Training batch size. Evaluation uses a quarter of it.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of train/eval epochs.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    /// Adam learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Commitment loss coefficient.
    #[serde(default = "default_beta")]
    pub beta: f32,
    /// Architecture.
    pub model: ModelConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_experiments_root() -> PathBuf {
    PathBuf::from("experiments")
}

fn default_seed() -> u64 {
    987
}

fn default_batch_size() -> usize {
    128
}

fn default_num_epochs() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    3e-4
}

fn default_beta() -> f32 {
    1.0
}

impl TrainConfig {
    /// Defaults matching the reference hyperparameters for a dataset.
    pub fn new(dataset: DatasetKind, experiment_name: impl Into<String>) -> Self {
        Self {
            dataset,
            data_dir: default_data_dir(),
            experiment_name: experiment_name.into(),
            experiments_root: default_experiments_root(),
            seed: default_seed(),
            batch_size: default_batch_size(),
            num_epochs: default_num_epochs(),
            learning_rate: default_learning_rate(),
            beta: default_beta(),
            model: ModelConfig {
                in_channels: dataset.in_channels(),
                hidden_channels: 256,
                residual_layers: default_residual_layers(),
                residual_hidden_channels: None,
                num_embeddings: 512,
                embedding_dim: 64,
            },
        }
    }

    /// Evaluation batch size (a quarter of the training batch, at least 1).
    pub fn eval_batch_size(&self) -> usize {
        (self.batch_size / 4).max(1)
    }

    /// Root directory of this experiment.
    pub fn experiment_root(&self) -> PathBuf {
        self.experiments_root.join(&self.experiment_name)
    }

    /// Reject configurations that cannot produce a valid run.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.experiment_name.trim().is_empty() {
            anyhow::bail!("experiment_name must not be empty");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }
        if self.num_epochs == 0 {
            anyhow::bail!("num_epochs must be > 0");
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            anyhow::bail!("learning_rate must be a positive number");
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            anyhow::bail!("beta must be a non-negative number");
        }
        let model = &self.model;
        if model.in_channels != self.dataset.in_channels() {
            anyhow::bail!(
                "model.in_channels is {} but {} images have {} channels",
                model.in_channels,
                self.dataset,
                self.dataset.in_channels()
            );
        }
        if model.hidden_channels < 2 {
            anyhow::bail!("model.hidden_channels must be >= 2");
        }
        if model.num_embeddings == 0 || model.embedding_dim == 0 {
            anyhow::bail!("model.num_embeddings and model.embedding_dim must be > 0");
        }
        Ok(())
    }
}

/// Load a training configuration from a YAML file.
///
/// # Errors
///
/// Returns an error if the file doesn't exist or contains invalid YAML.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<TrainConfig> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let data = fs::read_to_string(path)?;
    let config: TrainConfig = serde_yaml::from_str(&data)?;
    Ok(config)
}

/// On-disk layout of one experiment: `config.json`, `logs/`, `models/`.
#[derive(Debug, Clone)]
pub struct ExperimentPaths {
    /// Experiment root directory.
    pub root: PathBuf,
    /// Metric, image and codebook logs.
    pub logs: PathBuf,
    /// Per-epoch checkpoints.
    pub models: PathBuf,
}

impl ExperimentPaths {
    /// Create the experiment tree (if missing) and persist the config as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or `config.json` cannot be written.
    pub fn prepare(config: &TrainConfig) -> anyhow::Result<Self> {
        let root = config.experiment_root();
        let paths = Self {
            logs: root.join("logs"),
            models: root.join("models"),
            root,
        };
        for dir in [&paths.root, &paths.logs, &paths.models] {
            fs::create_dir_all(dir).map_err(|e| {
                anyhow::anyhow!("failed to create directory {}: {e}", dir.display())
            })?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let config_path = paths.root.join("config.json");
        fs::write(&config_path, json)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", config_path.display()))?;
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_names_parse_case_insensitively() {
        assert_eq!("MNIST".parse::<DatasetKind>().unwrap(), DatasetKind::Mnist);
        assert_eq!(
            "cifar10".parse::<DatasetKind>().unwrap(),
            DatasetKind::Cifar10
        );
        let err = "imagenet".parse::<DatasetKind>().unwrap_err();
        assert!(err.to_string().contains("Invalid dataset"));
    }

    #[test]
    fn defaults_follow_dataset_channels() {
        let config = TrainConfig::new(DatasetKind::Mnist, "run");
        assert_eq!(config.model.in_channels, 1);
        assert_eq!(config.eval_batch_size(), 32);
        assert_eq!(config.model.residual_hidden(), 64);
        config.validate().expect("valid defaults");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = TrainConfig::new(DatasetKind::Cifar10, "run");
        config.beta = -1.0;
        assert!(config.validate().is_err());

        let mut config = TrainConfig::new(DatasetKind::Cifar10, "run");
        config.model.in_channels = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("in_channels"));

        let mut config = TrainConfig::new(DatasetKind::Cifar10, "run");
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_rejects_unknown_dataset() {
        let yaml = "dataset: svhn\nexperiment_name: x\nmodel:\n  in_channels: 3\n  hidden_channels: 8\n  num_embeddings: 4\n  embedding_dim: 2\n";
        assert!(serde_yaml::from_str::<TrainConfig>(yaml).is_err());
    }

    #[test]
    fn prepare_writes_experiment_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = TrainConfig::new(DatasetKind::Mnist, "exp");
        config.experiments_root = dir.path().to_path_buf();

        let paths = ExperimentPaths::prepare(&config).expect("prepare");
        assert!(paths.logs.is_dir());
        assert!(paths.models.is_dir());

        let json = fs::read_to_string(paths.root.join("config.json")).expect("read config");
        let restored: TrainConfig = serde_json::from_str(&json).expect("parse config");
        assert_eq!(restored, config);
    }
}
