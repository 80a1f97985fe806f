//! # meshgrad
//!
//! `meshgrad` is a pure Rust framework for training a BERT-style text
//! classifier over a virtual device mesh, designed for educational purposes
//! and understanding how mesh-sharded ("SPMD") training is configured.
//!
//! Everything runs on **CPU only**; the devices of the mesh are virtual.
//! The interesting part is not the arithmetic but the configuration layer:
//! how a 2-D mesh is named, how per-weight sharding layouts are declared
//! with regex rules, and how those layouts are validated against real
//! weight shapes.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: Core N-dimensional tensor implementation.
//! - [`autograd`]: Tape-based reverse-mode automatic differentiation.
//! - [`mesh`]: Device mesh, sharding layouts and the regex layout map.
//! - [`nn`]: Neural network layers (Dense, LayerNorm, embeddings).
//! - [`model`]: The BERT-style classifier and its sharding table.
//! - [`optim`]: Adam and SGD optimizers.
//! - [`train`]: The training loop.
//! - [`checkpoint`]: Safetensors save/restore.
//!
//! ## Example
//!
//! ```rust
//! use meshgrad::mesh::{DeviceMesh, DeviceType, Layout, LocalClient, Sharding};
//!
//! let client = LocalClient::configure_virtual_cpus(8).unwrap();
//! let mesh = DeviceMesh::distributed(
//!     &[("batch", 4), ("model", 2)],
//!     &client,
//!     DeviceType::Cpu,
//!     8,
//! )
//! .unwrap();
//!
//! // Shard the second axis of a [6, 4] weight across the "model" dim.
//! let layout = Layout::new(vec![Sharding::Unsharded, Sharding::dim("model")]);
//! assert_eq!(layout.local_shape(&mesh, &[6, 4]).unwrap(), vec![6, 2]);
//! ```

pub mod autograd;
pub mod checkpoint;
pub mod data;
pub mod loss;
pub mod mesh;
pub mod model;
pub mod nn;
pub mod optim;
pub mod tensor;
pub mod train;

pub use autograd::Variable;
pub use mesh::{DeviceMesh, DeviceType, Layout, LayoutMap, LocalClient, Sharding};
pub use model::{BertClassifier, BertConfig};
pub use tensor::{Cpu, Device, Storage, Tensor, TensorElem, TensorError, TensorOps};
