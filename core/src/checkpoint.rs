//! Checkpointing in the `safetensors` format.
//!
//! Weights are stored flattened to rank 1 under their path-style names;
//! the model reshapes on restore. Only `f32` is supported, which is the
//! only element type the demo trains with.

use crate::tensor::{Cpu, Tensor};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Safetensors error: {0}")]
    Format(#[from] safetensors::SafeTensorError),

    #[error("Tensor {name:?} has unsupported dtype {dtype:?}")]
    UnsupportedDtype { name: String, dtype: Dtype },

    #[error(transparent)]
    Tensor(#[from] crate::tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Saves named flat tensors to a safetensors file.
pub fn save_checkpoint<P: AsRef<Path>>(
    path: P,
    weights: &[(String, Tensor<f32, 1, Cpu>)],
) -> Result<()> {
    // TensorView borrows raw bytes, so the byte buffers must outlive the
    // views.
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = weights
        .iter()
        .map(|(name, tensor)| {
            let bytes: Vec<u8> = tensor
                .data()
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect();
            (name.clone(), tensor.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)?;
        views.push((name.as_str(), view));
    }

    safetensors::serialize_to_file(views, &None, path.as_ref())?;
    Ok(())
}

/// Loads a checkpoint back into named flat tensors.
pub fn load_checkpoint<P: AsRef<Path>>(
    path: P,
) -> Result<HashMap<String, Tensor<f32, 1, Cpu>>> {
    let file_content = std::fs::read(path)?;
    let safetensors = SafeTensors::deserialize(&file_content)?;

    let mut tensors = HashMap::new();
    for (name, view) in safetensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(CheckpointError::UnsupportedDtype {
                name,
                dtype: view.dtype(),
            });
        }

        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let len = data.len();
        tensors.insert(name, Tensor::new(data, [len])?);
    }

    Ok(tensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let weights = vec![
            (
                "logits/kernel".to_string(),
                Tensor::new(vec![1.0f32, -2.5, 3.25], [3]).unwrap(),
            ),
            (
                "logits/bias".to_string(),
                Tensor::new(vec![0.5f32], [1]).unwrap(),
            ),
        ];

        save_checkpoint(&path, &weights).unwrap();
        let loaded = load_checkpoint(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["logits/kernel"].data(), &[1.0, -2.5, 3.25]);
        assert_eq!(loaded["logits/bias"].data(), &[0.5]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_checkpoint("/nonexistent/model.safetensors");
        assert!(matches!(err, Err(CheckpointError::Io(_))));
    }

    #[test]
    fn test_load_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.safetensors");
        std::fs::write(&path, b"not a checkpoint").unwrap();

        let err = load_checkpoint(&path);
        assert!(matches!(err, Err(CheckpointError::Format(_))));
    }
}
