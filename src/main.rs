//! Command-line interface for VQ-VAE training.
//!
//! `train` builds a [`TrainConfig`] from an optional YAML file plus flag
//! overrides and runs the epoch loop; `evaluate` scores a saved checkpoint on
//! the test split.

#![recursion_limit = "256"]

use anyhow::Result;
use burn::backend::Autodiff;
use burn::data::dataset::InMemDataset;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vqvae::data::{self, load_dataset, Split};
use vqvae::train::evaluate;
use vqvae::{
    load_checkpoint, load_config, perf, Criterion, DatasetKind, ExperimentLogger, TrainConfig,
    Trainer,
};

#[cfg(feature = "backend-wgpu")]
use burn_wgpu::graphics::AutoGraphicsApi;
#[cfg(feature = "backend-wgpu")]
use burn_wgpu::{init_setup, Wgpu, WgpuDevice};

/// Supported compute backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
enum BackendChoice {
    /// Use the WGPU backend (GPU acceleration when available).
    Wgpu,
    /// Use the ndarray backend (CPU).
    Ndarray,
}

#[cfg(feature = "backend-wgpu")]
const DEFAULT_BACKEND: BackendChoice = BackendChoice::Wgpu;
#[cfg(not(feature = "backend-wgpu"))]
const DEFAULT_BACKEND: BackendChoice = BackendChoice::Ndarray;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "vqvae")]
#[command(about = "Train a vector-quantized autoencoder", long_about = None)]
struct Cli {
    /// Print performance summary at the end of the run.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Compute backend to use.
    #[arg(long, value_enum, default_value_t = DEFAULT_BACKEND, global = true)]
    backend: BackendChoice,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Train a model and write an experiment directory.
    Train(TrainArgs),
    /// Score a checkpoint on the test split.
    Evaluate {
        /// Experiment directory containing `config.json`.
        #[arg(long)]
        experiment: PathBuf,
        /// Epoch whose checkpoint to load.
        #[arg(long)]
        epoch: usize,
        /// Override the dataset directory stored in the experiment.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct TrainArgs {
    /// Training configuration YAML. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Dataset to train on.
    #[arg(long, value_enum)]
    dataset: Option<DatasetKind>,
    /// Directory holding the dataset files.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Experiment name (directory under the experiments root).
    #[arg(long)]
    experiment_name: Option<String>,
    /// Parent directory for experiments.
    #[arg(long)]
    experiments_root: Option<PathBuf>,
    /// Seed for initialization and shuffling.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long = "num-epoch")]
    num_epochs: Option<usize>,
    /// Adam learning rate.
    #[arg(long)]
    lr: Option<f64>,
    #[arg(long)]
    hidden_channels: Option<usize>,
    /// Codebook size.
    #[arg(long)]
    num_embeddings: Option<usize>,
    /// Codebook vector dimensionality.
    #[arg(long)]
    embedding_dim: Option<usize>,
    /// Commitment loss coefficient.
    #[arg(long)]
    beta: Option<f32>,
    /// Train on this many generated images instead of reading the dataset.
    #[arg(long)]
    synthetic: Option<usize>,
}

impl TrainArgs {
    fn into_config(self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => {
                let name = self.experiment_name.clone().ok_or_else(|| {
                    anyhow::anyhow!("--experiment-name is required without --config")
                })?;
                TrainConfig::new(self.dataset.unwrap_or(DatasetKind::Cifar10), name)
            }
        };

        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
            config.model.in_channels = dataset.in_channels();
        }
        if let Some(name) = self.experiment_name {
            config.experiment_name = name;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(root) = self.experiments_root {
            config.experiments_root = root;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if let Some(hidden) = self.hidden_channels {
            config.model.hidden_channels = hidden;
        }
        if let Some(k) = self.num_embeddings {
            config.model.num_embeddings = k;
        }
        if let Some(d) = self.embedding_dim {
            config.model.embedding_dim = d;
        }
        if let Some(beta) = self.beta {
            config.beta = beta;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Entry point for the CLI.
fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();

    let cli = Cli::parse();
    let verbose = cli.verbose;
    let backend = cli.backend;

    match cli.command {
        Commands::Train(args) => {
            let synthetic = args.synthetic;
            let config = args.into_config()?;
            let interrupted = Arc::new(AtomicBool::new(false));
            let interrupt_flag = Arc::clone(&interrupted);
            ctrlc::set_handler(move || {
                interrupt_flag.store(true, Ordering::SeqCst);
            })?;
            match backend {
                BackendChoice::Wgpu => {
                    #[cfg(feature = "backend-wgpu")]
                    {
                        let device = WgpuDevice::default();
                        init_setup::<AutoGraphicsApi>(&device, Default::default());
                        run_train::<Autodiff<Wgpu>>(config, synthetic, device, &interrupted)?;
                    }
                    #[cfg(not(feature = "backend-wgpu"))]
                    {
                        let _ = (config, synthetic);
                        anyhow::bail!("WGPU backend not enabled; build with --features backend-wgpu");
                    }
                }
                BackendChoice::Ndarray => {
                    let device = NdArrayDevice::default();
                    run_train::<Autodiff<NdArray<f32>>>(config, synthetic, device, &interrupted)?;
                }
            }
        }
        Commands::Evaluate {
            experiment,
            epoch,
            data_dir,
        } => match backend {
            BackendChoice::Wgpu => {
                #[cfg(feature = "backend-wgpu")]
                {
                    let device = WgpuDevice::default();
                    init_setup::<AutoGraphicsApi>(&device, Default::default());
                    run_evaluate::<Wgpu>(experiment, epoch, data_dir, &device)?;
                }
                #[cfg(not(feature = "backend-wgpu"))]
                {
                    let _ = (experiment, epoch, data_dir);
                    anyhow::bail!("WGPU backend not enabled; build with --features backend-wgpu");
                }
            }
            BackendChoice::Ndarray => {
                let device = NdArrayDevice::default();
                run_evaluate::<NdArray<f32>>(experiment, epoch, data_dir, &device)?;
            }
        },
    }

    if verbose {
        eprintln!("{}", perf::report());
    }

    Ok(())
}

fn run_train<B: AutodiffBackend>(
    config: TrainConfig,
    synthetic: Option<usize>,
    device: B::Device,
    interrupted: &AtomicBool,
) -> Result<()> {
    let (train, test) = match synthetic {
        Some(count) => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let channels = config.dataset.in_channels();
            let train = data::synthetic(count, channels, &mut rng);
            let test = data::synthetic((count / 4).max(1), channels, &mut rng);
            (InMemDataset::new(train), InMemDataset::new(test))
        }
        None => (
            load_dataset(config.dataset, &config.data_dir, Split::Train)?,
            load_dataset(config.dataset, &config.data_dir, Split::Test)?,
        ),
    };

    let mut trainer = Trainer::<B>::new(config, device)?;
    let mut logger = ExperimentLogger::new(trainer.paths().logs.clone());
    let reports = trainer.run(&train, &test, &mut logger, interrupted)?;
    if interrupted.load(Ordering::SeqCst) {
        log::warn!("training interrupted after {} epochs", reports.len());
    }
    if let Some(last) = reports.last() {
        log::info!(
            "finished: val total loss {:.5}, last checkpoint {}",
            last.eval.total_loss,
            last.checkpoint.display()
        );
    }
    Ok(())
}

fn run_evaluate<B: Backend>(
    experiment: PathBuf,
    epoch: usize,
    data_dir: Option<PathBuf>,
    device: &B::Device,
) -> Result<()> {
    let config_path = experiment.join("config.json");
    let json = fs::read_to_string(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", config_path.display()))?;
    let mut config: TrainConfig = serde_json::from_str(&json)?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }

    let checkpoint = vqvae::checkpoint::checkpoint_path(&experiment.join("models"), epoch);
    let model = load_checkpoint::<B>(&config.model, &checkpoint, device)?;
    let test = load_dataset(config.dataset, &config.data_dir, Split::Test)?;
    let evaluation = evaluate(
        &model,
        &Criterion::new(config.beta),
        &test,
        config.eval_batch_size(),
        device,
    )?;

    let metrics = evaluation.metrics;
    println!(
        "epoch {epoch}: total {:.5} reconstruction {:.5} vq {:.5} perplexity {:.2} over {} images",
        metrics.total_loss,
        metrics.reconstruction_loss,
        metrics.vq_loss,
        evaluation.perplexity(),
        metrics.images
    );
    Ok(())
}
