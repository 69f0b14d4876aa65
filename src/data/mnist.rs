//! MNIST reader for the IDX file format.
//!
//! Looks for `train-images-idx3-ubyte`/`train-labels-idx1-ubyte` (or the
//! `t10k-` pair) directly in the data directory or under `MNIST/raw/`.

use crate::data::{ImageItem, Split};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

fn file_names(split: Split) -> (&'static str, &'static str) {
    match split {
        Split::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
        Split::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
    }
}

fn locate(dir: &Path, name: &str) -> Result<PathBuf> {
    [dir.join(name), dir.join("MNIST").join("raw").join(name)]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| anyhow::anyhow!("MNIST file {name} not found under {}", dir.display()))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let chunk = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| anyhow::anyhow!("IDX header truncated at byte {offset}"))?;
    Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// Parse an IDX3 image file into `(rows, cols, images)`.
pub fn parse_images(bytes: &[u8]) -> Result<(usize, usize, Vec<&[u8]>)> {
    let magic = read_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        anyhow::bail!("bad IDX image magic {magic}, expected {IMAGES_MAGIC}");
    }
    let count = read_u32(bytes, 4)? as usize;
    let rows = read_u32(bytes, 8)? as usize;
    let cols = read_u32(bytes, 12)? as usize;
    if rows == 0 || cols == 0 {
        anyhow::bail!("IDX image dimensions {rows}x{cols} must be non-zero");
    }
    let image_len = rows * cols;
    let body = &bytes[16..];
    if body.len() < count * image_len {
        anyhow::bail!(
            "IDX image file holds {} bytes, expected {}",
            body.len(),
            count * image_len
        );
    }
    let images = body.chunks_exact(image_len).take(count).collect();
    Ok((rows, cols, images))
}

/// Parse an IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<&[u8]> {
    let magic = read_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        anyhow::bail!("bad IDX label magic {magic}, expected {LABELS_MAGIC}");
    }
    let count = read_u32(bytes, 4)? as usize;
    bytes
        .get(8..8 + count)
        .ok_or_else(|| anyhow::anyhow!("IDX label file truncated"))
}

/// Load one MNIST split.
pub fn load(dir: &Path, split: Split) -> Result<Vec<ImageItem>> {
    let (images_name, labels_name) = file_names(split);
    let images_path = locate(dir, images_name)?;
    let labels_path = locate(dir, labels_name)?;

    let image_bytes =
        fs::read(&images_path).with_context(|| format!("reading {}", images_path.display()))?;
    let label_bytes =
        fs::read(&labels_path).with_context(|| format!("reading {}", labels_path.display()))?;
    let (rows, cols, images) = parse_images(&image_bytes)?;
    let labels = parse_labels(&label_bytes)?;
    if images.len() != labels.len() {
        anyhow::bail!(
            "MNIST {split:?} has {} images but {} labels",
            images.len(),
            labels.len()
        );
    }

    Ok(images
        .into_iter()
        .zip(labels)
        .map(|(image, &label)| ImageItem::from_bytes(image, 1, rows, cols, label))
        .collect())
}
