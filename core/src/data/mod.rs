//! Synthetic training data.
//!
//! The demo trains on random tokens with random labels. That sounds
//! pointless until you remember what the demo is *for*: exercising the
//! mesh/layout plumbing end to end. A model that can overfit random labels
//! proves the gradients flow; the data never needs to mean anything.

use crate::mesh::{DeviceMesh, ShardedTensor};
use crate::tensor::{Cpu, Result, Tensor};
use rand::Rng;

/// One batch of classifier inputs: `[batch, seq]` id tensors plus
/// `[batch]` labels.
#[derive(Clone, Debug)]
pub struct TextBatch {
    pub word_ids: Tensor<u32, 2, Cpu>,
    pub mask: Tensor<u32, 2, Cpu>,
    pub type_ids: Tensor<u32, 2, Cpu>,
    pub labels: Tensor<u32, 1, Cpu>,
}

impl TextBatch {
    /// Copies every input onto the mesh, fully replicated.
    pub fn replicate_to_mesh(&self, mesh: &DeviceMesh) -> crate::mesh::Result<MeshBatch> {
        Ok(MeshBatch {
            word_ids: ShardedTensor::replicated(&self.word_ids, mesh)?,
            mask: ShardedTensor::replicated(&self.mask, mesh)?,
            type_ids: ShardedTensor::replicated(&self.type_ids, mesh)?,
            labels: ShardedTensor::replicated(&self.labels, mesh)?,
        })
    }
}

/// A [`TextBatch`] materialized on every device of a mesh.
#[derive(Clone, Debug)]
pub struct MeshBatch {
    pub word_ids: ShardedTensor<u32, 2>,
    pub mask: ShardedTensor<u32, 2>,
    pub type_ids: ShardedTensor<u32, 2>,
    pub labels: ShardedTensor<u32, 1>,
}

impl MeshBatch {
    /// The batch as seen by one device. With replicated inputs every
    /// device sees the same data.
    pub fn local(&self, device: usize) -> crate::mesh::Result<TextBatch> {
        let get2 = |s: &ShardedTensor<u32, 2>| {
            s.shard(device)
                .cloned()
                .ok_or(crate::mesh::MeshError::DeviceOutOfRange {
                    index: device,
                    num_devices: s.shards().len(),
                })
        };

        Ok(TextBatch {
            word_ids: get2(&self.word_ids)?,
            mask: get2(&self.mask)?,
            type_ids: get2(&self.type_ids)?,
            labels: self.labels.shard(device).cloned().ok_or(
                crate::mesh::MeshError::DeviceOutOfRange {
                    index: device,
                    num_devices: self.labels.shards().len(),
                },
            )?,
        })
    }
}

/// A single random batch, served forever.
#[derive(Clone, Debug)]
pub struct SyntheticTextDataset {
    batch: TextBatch,
}

impl SyntheticTextDataset {
    /// Generates uniform random word ids, 0/1 masks, type ids and labels.
    pub fn generate(
        vocab_size: usize,
        num_classes: usize,
        batch_size: usize,
        seq_len: usize,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let n = batch_size * seq_len;

        let word_ids: Vec<u32> = (0..n)
            .map(|_| rng.random_range(0..vocab_size as u32))
            .collect();
        let mask: Vec<u32> = (0..n).map(|_| rng.random_range(0..2u32)).collect();
        let type_ids: Vec<u32> = (0..n).map(|_| rng.random_range(0..2u32)).collect();
        let labels: Vec<u32> = (0..batch_size)
            .map(|_| rng.random_range(0..num_classes as u32))
            .collect();

        Ok(Self {
            batch: TextBatch {
                word_ids: Tensor::new(word_ids, [batch_size, seq_len])?,
                mask: Tensor::new(mask, [batch_size, seq_len])?,
                type_ids: Tensor::new(type_ids, [batch_size, seq_len])?,
                labels: Tensor::new(labels, [batch_size])?,
            },
        })
    }

    pub fn batch(&self) -> &TextBatch {
        &self.batch
    }

    /// Repeats the batch forever, the `repeat().batch(n)` idiom of the
    /// original input pipeline.
    pub fn iter(&self) -> impl Iterator<Item = &TextBatch> + '_ {
        std::iter::repeat(&self.batch)
    }
}
