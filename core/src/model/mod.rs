//! The BERT-style classifier.
//!
//! A small transformer encoder with a classification head, built against a
//! [`DeviceMesh`](crate::mesh::DeviceMesh) and a
//! [`LayoutMap`](crate::mesh::LayoutMap): every weight gets a path-style
//! name, its sharding layout is resolved through the map and validated at
//! construction time, and the resulting (name, shape, layout) table is the
//! model's sharding report.

use thiserror::Error;

pub mod bert;

pub use bert::{model_parallel_layout_map, BertClassifier, BertConfig, WeightSpec};

/// Error type for model construction and execution.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Mesh(#[from] crate::mesh::MeshError),

    #[error(transparent)]
    Tensor(#[from] crate::tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
