//! Per-tensor sharding layouts.
//!
//! A [`Layout`] assigns one [`Sharding`] to each axis of a tensor: either
//! the axis is kept whole on every device (`Unsharded`) or it is split
//! evenly across one named mesh dimension. The layout for a rank-2 kernel
//! sharded column-wise over the demo's `model` dimension prints as
//! `[UNSHARDED, model]`.

use super::{DeviceMesh, MeshError, Result};
use std::fmt;

/// Placement of a single tensor axis on the mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sharding {
    /// The axis is fully present on every device.
    Unsharded,
    /// The axis is split evenly across the named mesh dimension.
    Dim(String),
}

impl Sharding {
    /// Shorthand for `Sharding::Dim(name.into())`.
    pub fn dim(name: &str) -> Self {
        Sharding::Dim(name.into())
    }
}

impl fmt::Display for Sharding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sharding::Unsharded => write!(f, "UNSHARDED"),
            Sharding::Dim(name) => write!(f, "{name}"),
        }
    }
}

/// One sharding spec per tensor axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    specs: Vec<Sharding>,
}

impl Layout {
    pub fn new(specs: Vec<Sharding>) -> Self {
        Self { specs }
    }

    /// A layout that keeps every axis whole on every device.
    pub fn replicated(rank: usize) -> Self {
        Self {
            specs: vec![Sharding::Unsharded; rank],
        }
    }

    /// Number of tensor axes this layout describes.
    pub fn rank(&self) -> usize {
        self.specs.len()
    }

    /// The per-axis sharding specs.
    pub fn specs(&self) -> &[Sharding] {
        &self.specs
    }

    /// `true` if no axis is sharded.
    pub fn is_fully_replicated(&self) -> bool {
        self.specs.iter().all(|s| *s == Sharding::Unsharded)
    }

    /// Checks this layout against a mesh and a concrete tensor shape.
    ///
    /// Verifies the rank matches, every referenced mesh dimension exists
    /// and is used for at most one axis, and every sharded axis divides
    /// evenly into its mesh dimension.
    pub fn validate(&self, mesh: &DeviceMesh, global_shape: &[usize]) -> Result<()> {
        if self.specs.len() != global_shape.len() {
            return Err(MeshError::RankMismatch {
                layout: self.specs.len(),
                tensor: global_shape.len(),
            });
        }

        let mut used: Vec<&str> = Vec::new();
        for (axis, spec) in self.specs.iter().enumerate() {
            let Sharding::Dim(name) = spec else { continue };

            let shards = mesh
                .dim_size(name)
                .ok_or_else(|| MeshError::NoSuchDim(name.clone()))?;

            if used.contains(&name.as_str()) {
                return Err(MeshError::DimReused(name.clone()));
            }
            used.push(name.as_str());

            if global_shape[axis] % shards != 0 {
                return Err(MeshError::Indivisible {
                    axis,
                    size: global_shape[axis],
                    dim: name.clone(),
                    shards,
                });
            }
        }

        Ok(())
    }

    /// The shape of one device's shard of a tensor with `global_shape`.
    pub fn local_shape(&self, mesh: &DeviceMesh, global_shape: &[usize]) -> Result<Vec<usize>> {
        self.validate(mesh, global_shape)?;

        Ok(self
            .specs
            .iter()
            .zip(global_shape.iter())
            .map(|(spec, &size)| match spec {
                Sharding::Unsharded => size,
                // dim_size cannot fail after validate.
                Sharding::Dim(name) => size / mesh.dim_size(name).unwrap_or(1),
            })
            .collect())
    }

    /// Number of distinct shards this layout produces on `mesh`.
    ///
    /// Replicas do not count: a fully replicated layout has one shard.
    pub fn num_shards(&self, mesh: &DeviceMesh) -> usize {
        self.specs
            .iter()
            .filter_map(|spec| match spec {
                Sharding::Unsharded => None,
                Sharding::Dim(name) => mesh.dim_size(name),
            })
            .product()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, spec) in self.specs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{spec}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{DeviceType, LocalClient};

    fn demo_mesh() -> DeviceMesh {
        let client = LocalClient::configure_virtual_cpus(8).unwrap();
        DeviceMesh::distributed(&[("batch", 4), ("model", 2)], &client, DeviceType::Cpu, 8)
            .unwrap()
    }

    #[test]
    fn test_replicated_layout() {
        let layout = Layout::replicated(2);
        assert_eq!(layout.rank(), 2);
        assert!(layout.is_fully_replicated());
        assert_eq!(layout.num_shards(&demo_mesh()), 1);
        assert_eq!(format!("{layout}"), "[UNSHARDED, UNSHARDED]");
    }

    #[test]
    fn test_validate_and_local_shape() {
        let mesh = demo_mesh();
        let layout = Layout::new(vec![Sharding::Unsharded, Sharding::dim("model")]);

        layout.validate(&mesh, &[16, 8]).unwrap();
        assert_eq!(layout.local_shape(&mesh, &[16, 8]).unwrap(), vec![16, 4]);
        assert_eq!(layout.num_shards(&mesh), 2);
        assert_eq!(format!("{layout}"), "[UNSHARDED, model]");
    }

    #[test]
    fn test_validate_rank_mismatch() {
        let mesh = demo_mesh();
        let layout = Layout::replicated(2);
        let err = layout.validate(&mesh, &[4, 4, 4]);
        assert!(matches!(err, Err(MeshError::RankMismatch { .. })));
    }

    #[test]
    fn test_validate_unknown_dim() {
        let mesh = demo_mesh();
        let layout = Layout::new(vec![Sharding::dim("expert")]);
        let err = layout.validate(&mesh, &[8]);
        assert!(matches!(err, Err(MeshError::NoSuchDim(_))));
    }

    #[test]
    fn test_validate_dim_reuse() {
        let mesh = demo_mesh();
        let layout = Layout::new(vec![Sharding::dim("model"), Sharding::dim("model")]);
        let err = layout.validate(&mesh, &[8, 8]);
        assert!(matches!(err, Err(MeshError::DimReused(_))));
    }

    #[test]
    fn test_validate_indivisible() {
        let mesh = demo_mesh();
        let layout = Layout::new(vec![Sharding::dim("batch")]);
        // 6 rows cannot split across 4 batch shards.
        let err = layout.validate(&mesh, &[6]);
        assert!(matches!(err, Err(MeshError::Indivisible { .. })));
    }

    #[test]
    fn test_two_dim_sharding() {
        let mesh = demo_mesh();
        let layout = Layout::new(vec![Sharding::dim("batch"), Sharding::dim("model")]);

        assert_eq!(layout.local_shape(&mesh, &[8, 6]).unwrap(), vec![2, 3]);
        assert_eq!(layout.num_shards(&mesh), 8);
    }
}
