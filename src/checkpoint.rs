//! Per-epoch model checkpoints.
//!
//! Each checkpoint is the full parameter record (encoder, codebook and
//! decoder) written with burn's binary recorder at full precision, as
//! `models/<epoch>.bin`.

use crate::config::ModelConfig;
use crate::model::VqVae;
use crate::perf::{self, Metric};
use anyhow::Result;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

type CheckpointRecorder = BinFileRecorder<FullPrecisionSettings>;

/// Path of the checkpoint for `epoch` inside `models_dir`.
pub fn checkpoint_path(models_dir: &Path, epoch: usize) -> PathBuf {
    models_dir.join(format!("{epoch}.bin"))
}

/// Write the model parameters for `epoch` and return the file path.
///
/// # Errors
///
/// Returns an error if the recorder fails to write the file.
pub fn save_checkpoint<B: Backend>(
    model: &VqVae<B>,
    models_dir: &Path,
    epoch: usize,
) -> Result<PathBuf> {
    let _span = perf::span(Metric::CheckpointSave);
    let path = checkpoint_path(models_dir, epoch);
    model
        .clone()
        .save_file(path.clone(), &CheckpointRecorder::new())
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e:?}", path.display()))?;
    log::debug!("saved checkpoint {}", path.display());
    Ok(path)
}

/// Restore a model saved by [`save_checkpoint`].
///
/// # Errors
///
/// Returns an error if the file is missing or does not match `config`.
pub fn load_checkpoint<B: Backend>(
    config: &ModelConfig,
    path: &Path,
    device: &B::Device,
) -> Result<VqVae<B>> {
    if !path.is_file() {
        anyhow::bail!("Checkpoint not found: {}", path.display());
    }
    let record = CheckpointRecorder::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e:?}", path.display()))?;
    // Placeholder parameters; every one of them is replaced by the record.
    let mut rng = StdRng::seed_from_u64(0);
    Ok(VqVae::new(config, &mut rng, device).load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            in_channels: 1,
            hidden_channels: 4,
            residual_layers: 1,
            residual_hidden_channels: None,
            num_embeddings: 3,
            embedding_dim: 2,
        }
    }

    #[test]
    fn round_trips_codebook() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = NdArrayDevice::default();
        let mut rng = StdRng::seed_from_u64(21);
        let model = VqVae::<TestBackend>::new(&tiny_config(), &mut rng, &device);

        let path = save_checkpoint(&model, dir.path(), 4).expect("save");
        assert_eq!(path, dir.path().join("4.bin"));
        assert!(path.is_file());

        let restored: VqVae<TestBackend> =
            load_checkpoint(&tiny_config(), &path, &device).expect("load");
        assert_eq!(restored.codebook().into_data(), model.codebook().into_data());
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let device = NdArrayDevice::default();
        let err = load_checkpoint::<TestBackend>(&tiny_config(), &dir.path().join("1.bin"), &device)
            .unwrap_err();
        assert!(err.to_string().contains("Checkpoint not found"));
    }
}
