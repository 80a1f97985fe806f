//! Tensors materialized per device under a layout.
//!
//! [`ShardedTensor`] is where a [`Layout`](super::Layout) stops being a
//! description and becomes data movement: `copy_to_mesh` cuts a full tensor
//! into one block per device (replicating along unsharded axes), and
//! `to_full` reassembles the original. Everything lives in host memory; the
//! per-device blocks are real, separate allocations, so the demo can show
//! exactly what each virtual device would hold.

use super::{DeviceMesh, Layout, MeshError, Result};
use crate::tensor::{Cpu, Tensor, TensorElem};

/// A tensor split across a device mesh according to a layout.
#[derive(Clone, Debug)]
pub struct ShardedTensor<T: TensorElem, const RANK: usize> {
    mesh: DeviceMesh,
    layout: Layout,
    global_shape: [usize; RANK],
    local_shape: [usize; RANK],
    /// One block per device, in device-index order.
    shards: Vec<Tensor<T, RANK, Cpu>>,
}

impl<T: TensorElem, const RANK: usize> ShardedTensor<T, RANK> {
    /// Distributes `tensor` over `mesh` under `layout`.
    ///
    /// Each device receives the block selected by its grid coordinates
    /// along the sharded axes; along unsharded axes (and unused mesh
    /// dimensions) the data is replicated.
    pub fn copy_to_mesh(
        tensor: &Tensor<T, RANK, Cpu>,
        layout: &Layout,
        mesh: &DeviceMesh,
    ) -> Result<Self> {
        layout.validate(mesh, tensor.shape())?;

        let global_shape = *tensor.shape();
        let mut local_shape = global_shape;
        for (axis, spec) in layout.specs().iter().enumerate() {
            if let super::Sharding::Dim(name) = spec {
                let shards = mesh
                    .dim_size(name)
                    .ok_or_else(|| MeshError::NoSuchDim(name.clone()))?;
                local_shape[axis] /= shards;
            }
        }

        let mut shards = Vec::with_capacity(mesh.num_devices());
        for device in 0..mesh.num_devices() {
            let offsets = Self::block_offsets(layout, mesh, &local_shape, device)?;

            let mut shard = Tensor::zeros(local_shape);
            let local_strides = *shard.strides();
            let global_strides = *tensor.strides();

            for i in 0..shard.size() {
                let mut rem = i;
                let mut src = 0;
                for axis in 0..RANK {
                    let coord = rem / local_strides[axis];
                    rem %= local_strides[axis];
                    src += (coord + offsets[axis]) * global_strides[axis];
                }
                shard.data_mut()[i] = tensor.data()[src];
            }

            shards.push(shard);
        }

        Ok(Self {
            mesh: mesh.clone(),
            layout: layout.clone(),
            global_shape,
            local_shape,
            shards,
        })
    }

    /// Distributes `tensor` fully replicated: every device gets a copy.
    ///
    /// The input path of the demo: features and labels are small enough to
    /// live everywhere, only the weights are worth sharding.
    pub fn replicated(tensor: &Tensor<T, RANK, Cpu>, mesh: &DeviceMesh) -> Result<Self> {
        Self::copy_to_mesh(tensor, &Layout::replicated(RANK), mesh)
    }

    /// Reassembles the full tensor from the device blocks.
    pub fn to_full(&self) -> Result<Tensor<T, RANK, Cpu>> {
        let mut full = Tensor::zeros(self.global_shape);
        let global_strides = *full.strides();

        for (device, shard) in self.shards.iter().enumerate() {
            let offsets = Self::block_offsets(&self.layout, &self.mesh, &self.local_shape, device)?;
            let local_strides = *shard.strides();

            // Replicas write identical data over each other.
            for i in 0..shard.size() {
                let mut rem = i;
                let mut dst = 0;
                for axis in 0..RANK {
                    let coord = rem / local_strides[axis];
                    rem %= local_strides[axis];
                    dst += (coord + offsets[axis]) * global_strides[axis];
                }
                full.data_mut()[dst] = shard.data()[i];
            }
        }

        Ok(full)
    }

    /// The block held by device `index`.
    pub fn shard(&self, index: usize) -> Option<&Tensor<T, RANK, Cpu>> {
        self.shards.get(index)
    }

    /// All blocks, in device-index order.
    pub fn shards(&self) -> &[Tensor<T, RANK, Cpu>] {
        &self.shards
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn local_shape(&self) -> &[usize; RANK] {
        &self.local_shape
    }

    pub fn global_shape(&self) -> &[usize; RANK] {
        &self.global_shape
    }

    /// Starting global coordinates of `device`'s block.
    fn block_offsets(
        layout: &Layout,
        mesh: &DeviceMesh,
        local_shape: &[usize; RANK],
        device: usize,
    ) -> Result<[usize; RANK]> {
        let coords = mesh.device_coords(device)?;

        let mut offsets = [0; RANK];
        for (axis, spec) in layout.specs().iter().enumerate() {
            if let super::Sharding::Dim(name) = spec {
                let dim = mesh
                    .dim_index(name)
                    .ok_or_else(|| MeshError::NoSuchDim(name.clone()))?;
                offsets[axis] = coords[dim] * local_shape[axis];
            }
        }
        Ok(offsets)
    }
}
