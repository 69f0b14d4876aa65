//! SafeTensors export of individual tensors.
//!
//! Used for the per-epoch codebook and image snapshots written next to the
//! metrics log.

use anyhow::Result;
use burn::tensor::TensorData;
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Little-endian `f32` payload plus shape for one named tensor.
#[derive(Debug, Clone)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub bytes: Vec<u8>,
}

impl NamedTensor {
    /// Copy host tensor data, converting it to `f32`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read back as floats.
    pub fn from_data(name: impl Into<String>, data: TensorData) -> Result<Self> {
        let data = data.convert::<f32>();
        let shape = data.shape.clone();
        let values = data
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("failed to read tensor data: {e:?}"))?;
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Ok(Self {
            name: name.into(),
            shape,
            bytes,
        })
    }
}

/// Write tensors to a SafeTensors file.
///
/// # Errors
///
/// Returns an error if serialization or the file write fails.
pub fn save_tensors(path: impl AsRef<Path>, tensors: &[NamedTensor]) -> Result<()> {
    let path = path.as_ref();
    let mut views = HashMap::new();
    for tensor in tensors {
        let view = TensorView::new(Dtype::F32, tensor.shape.clone(), &tensor.bytes)?;
        views.insert(tensor.name.clone(), view);
    }
    let serialized = safetensors::serialize(&views, &None)?;
    fs::write(path, serialized)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::SafeTensors;

    #[test]
    fn saves_named_tensors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("codebook.safetensors");
        let data = TensorData::new(vec![1.0f32, -2.0, 0.5, 4.0], [2, 2]);
        let tensor = NamedTensor::from_data("embeddings", data).expect("export");
        assert_eq!(tensor.bytes.len(), 16);
        save_tensors(&path, &[tensor]).expect("save");

        let bytes = fs::read(&path).expect("read");
        let tensors = SafeTensors::deserialize(&bytes).expect("deserialize");
        let view = tensors.tensor("embeddings").expect("embeddings");
        assert_eq!(view.dtype(), Dtype::F32);
        assert_eq!(view.shape(), &[2, 2]);
        let values: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![1.0, -2.0, 0.5, 4.0]);
        assert!(tensors.tensor("other").is_err());
    }

    #[test]
    fn converts_other_float_types_to_f32() {
        let data = TensorData::new(vec![1.5f64, -3.0], [2]);
        let tensor = NamedTensor::from_data("values", data).expect("export");
        assert_eq!(tensor.shape, vec![2]);
        let mut expected = 1.5f32.to_le_bytes().to_vec();
        expected.extend_from_slice(&(-3.0f32).to_le_bytes());
        assert_eq!(tensor.bytes, expected);
    }
}
