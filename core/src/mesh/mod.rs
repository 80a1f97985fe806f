//! # Device meshes and sharding layouts
//!
//! This is the heart of the crate: the machinery that decides *where each
//! piece of each tensor lives* on a logical grid of devices.
//!
//! ## The "Why" of mesh sharding
//!
//! Imagine a model too heavy for one device. Two classic ways to split the
//! work:
//!
//! 1. **Data parallelism**: every device holds the whole model and works on
//!    its own slice of the batch.
//! 2. **Model parallelism**: the weight matrices themselves are cut up, and
//!    each device holds one piece.
//!
//! A **device mesh** expresses both at once. Arrange the devices in a grid
//! with *named* dimensions, e.g. `[("batch", 4), ("model", 2)]` over 8
//! devices. A tensor then gets a **layout**: one [`Sharding`] per tensor
//! axis saying "split this axis over that mesh dimension" or "keep it
//! whole". A kernel matrix with layout `[UNSHARDED, model]` is split
//! column-wise across the `model` dimension of the grid and replicated
//! across `batch`.
//!
//! ## Module contents
//!
//! * [`LocalClient`]: virtual-device configuration for single-process
//!   simulation (this build has no real accelerators, like the rest of the
//!   crate it is CPU-only and educational).
//! * [`DeviceMesh`]: the named logical grid, validated against the client.
//! * [`Layout`] / [`Sharding`]: per-axis placement of one tensor.
//! * [`LayoutMap`]: regex-keyed rules mapping weight *names* to layouts, so
//!   a whole model's sharding strategy is one declarative table.
//! * [`ShardedTensor`]: a tensor actually materialized per device under a
//!   layout, with reassembly back to the full tensor.

use thiserror::Error;

pub mod client;
pub mod layout;
pub mod layout_map;
#[allow(clippy::module_inception)]
pub mod mesh;
pub mod sharded;

pub use client::{DeviceType, LocalClient};
pub use layout::{Layout, Sharding};
pub use layout_map::LayoutMap;
pub use mesh::DeviceMesh;
pub use sharded::ShardedTensor;

/// Error type for mesh, layout and sharding operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The product of the mesh dimension sizes does not equal the number of
    /// global devices.
    #[error("Mesh shape requires {expected} devices, got {got}")]
    DeviceCount { expected: usize, got: usize },

    /// The client cannot provide devices of the requested type.
    #[error("No {0} devices available on this client")]
    UnsupportedDevice(String),

    /// A mesh dimension name appears more than once.
    #[error("Duplicate mesh dimension name: {0:?}")]
    DuplicateDimName(String),

    /// A layout references a mesh dimension that does not exist.
    #[error("Unknown mesh dimension: {0:?}")]
    NoSuchDim(String),

    /// A layout uses the same mesh dimension for two tensor axes.
    #[error("Mesh dimension {0:?} used for more than one tensor axis")]
    DimReused(String),

    /// Layout rank does not match tensor rank.
    #[error("Layout has {layout} specs but tensor has rank {tensor}")]
    RankMismatch { layout: usize, tensor: usize },

    /// A sharded tensor axis is not evenly divisible by the mesh dimension.
    #[error("Axis {axis} of size {size} not divisible into {shards} shards over mesh dimension {dim:?}")]
    Indivisible {
        axis: usize,
        size: usize,
        dim: String,
        shards: usize,
    },

    /// A device index outside the mesh.
    #[error("Device index {index} out of range for mesh of {num_devices} devices")]
    DeviceOutOfRange { index: usize, num_devices: usize },

    /// A layout map rule pattern failed to compile.
    #[error("Invalid layout pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// An underlying tensor operation failed.
    #[error(transparent)]
    Tensor(#[from] crate::tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, MeshError>;
