//! CIFAR-10 reader for the binary distribution.
//!
//! Each record is one label byte followed by 3072 pixel bytes (red, green,
//! blue planes of 32x32). Batches are read from the data directory or from
//! `cifar-10-batches-bin/` inside it.

use crate::data::{ImageItem, Split};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const SIDE: usize = 32;
const CHANNELS: usize = 3;
const RECORD_LEN: usize = 1 + CHANNELS * SIDE * SIDE;

fn file_names(split: Split) -> Vec<String> {
    match split {
        Split::Train => (1..=5).map(|i| format!("data_batch_{i}.bin")).collect(),
        Split::Test => vec!["test_batch.bin".to_string()],
    }
}

fn locate(dir: &Path, name: &str) -> Result<PathBuf> {
    [dir.join(name), dir.join("cifar-10-batches-bin").join(name)]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| anyhow::anyhow!("CIFAR-10 file {name} not found under {}", dir.display()))
}

/// Parse one binary batch file.
pub fn parse_batch(bytes: &[u8]) -> Result<Vec<ImageItem>> {
    if bytes.len() % RECORD_LEN != 0 {
        anyhow::bail!(
            "CIFAR-10 batch length {} is not a multiple of {RECORD_LEN}",
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(RECORD_LEN)
        .map(|record| ImageItem::from_bytes(&record[1..], CHANNELS, SIDE, SIDE, record[0]))
        .collect())
}

/// Load one CIFAR-10 split.
pub fn load(dir: &Path, split: Split) -> Result<Vec<ImageItem>> {
    let mut items = Vec::new();
    for name in file_names(split) {
        let path = locate(dir, &name)?;
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        items.extend(parse_batch(&bytes)?);
    }
    Ok(items)
}
