//! The logical device grid.

use super::{DeviceType, LocalClient, MeshError, Result};
use std::fmt;

/// A logical grid of devices with named dimensions.
///
/// The grid is purely an *addressing scheme*: device `i` sits at the
/// row-major coordinates [`device_coords(i)`](DeviceMesh::device_coords),
/// and layouts refer to grid dimensions by name. For the demo's
/// `[("batch", 4), ("model", 2)]` mesh, device 5 sits at batch-row 2,
/// model-column 1.
#[derive(Clone, Debug)]
pub struct DeviceMesh {
    dims: Vec<(String, usize)>,
    device_type: DeviceType,
    num_devices: usize,
}

impl DeviceMesh {
    /// Builds a mesh over the client's devices.
    ///
    /// # Errors
    ///
    /// - [`MeshError::DeviceCount`] if the product of the dimension sizes
    ///   does not equal `num_global_devices`, or the client cannot supply
    ///   that many devices.
    /// - [`MeshError::UnsupportedDevice`] if no device of `device_type`
    ///   exists (requesting a GPU mesh on this CPU-only build).
    /// - [`MeshError::DuplicateDimName`] if a dimension name repeats.
    pub fn distributed(
        dims: &[(&str, usize)],
        client: &LocalClient,
        device_type: DeviceType,
        num_global_devices: usize,
    ) -> Result<Self> {
        let product: usize = dims.iter().map(|(_, size)| size).product();
        if product != num_global_devices {
            return Err(MeshError::DeviceCount {
                expected: product,
                got: num_global_devices,
            });
        }

        let available = client.num_local_devices(device_type) * client.num_clients();
        if available == 0 {
            return Err(MeshError::UnsupportedDevice(device_type.to_string()));
        }
        if available < num_global_devices {
            return Err(MeshError::DeviceCount {
                expected: num_global_devices,
                got: available,
            });
        }

        let mut seen: Vec<&str> = Vec::with_capacity(dims.len());
        for (name, _) in dims {
            if seen.contains(name) {
                return Err(MeshError::DuplicateDimName((*name).into()));
            }
            seen.push(*name);
        }

        let mesh = Self {
            dims: dims
                .iter()
                .map(|(name, size)| ((*name).into(), *size))
                .collect(),
            device_type,
            num_devices: num_global_devices,
        };
        tracing::debug!(%mesh, "created device mesh");
        Ok(mesh)
    }

    /// Total number of devices in the grid.
    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// The grid shape, in dimension order.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(|(_, size)| *size).collect()
    }

    /// The dimension names, in order.
    pub fn dim_names(&self) -> Vec<&str> {
        self.dims.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Size of the named dimension, if it exists.
    pub fn dim_size(&self, name: &str) -> Option<usize> {
        self.dims
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, size)| *size)
    }

    /// Position of the named dimension in the grid, if it exists.
    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|(n, _)| n == name)
    }

    /// The device type this mesh was built over.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Row-major grid coordinates of device `index`.
    pub fn device_coords(&self, index: usize) -> Result<Vec<usize>> {
        if index >= self.num_devices {
            return Err(MeshError::DeviceOutOfRange {
                index,
                num_devices: self.num_devices,
            });
        }

        let mut coords = vec![0; self.dims.len()];
        let mut rem = index;
        for (i, (_, size)) in self.dims.iter().enumerate().rev() {
            coords[i] = rem % size;
            rem /= size;
        }
        Ok(coords)
    }
}

impl fmt::Display for DeviceMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mesh[")?;
        for (i, (name, size)) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={size}")?;
        }
        write!(f, "; {} x {}]", self.device_type, self.num_devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_mesh() -> DeviceMesh {
        let client = LocalClient::configure_virtual_cpus(8).unwrap();
        DeviceMesh::distributed(&[("batch", 4), ("model", 2)], &client, DeviceType::Cpu, 8)
            .unwrap()
    }

    #[test]
    fn test_mesh_construction() {
        let mesh = demo_mesh();
        assert_eq!(mesh.num_devices(), 8);
        assert_eq!(mesh.shape(), vec![4, 2]);
        assert_eq!(mesh.dim_names(), vec!["batch", "model"]);
        assert_eq!(mesh.dim_size("batch"), Some(4));
        assert_eq!(mesh.dim_size("model"), Some(2));
        assert_eq!(mesh.dim_size("missing"), None);
        assert_eq!(mesh.dim_index("model"), Some(1));
    }

    #[test]
    fn test_mesh_device_count_mismatch() {
        let client = LocalClient::configure_virtual_cpus(8).unwrap();
        let err =
            DeviceMesh::distributed(&[("batch", 4), ("model", 2)], &client, DeviceType::Cpu, 6);
        assert!(matches!(err, Err(MeshError::DeviceCount { .. })));
    }

    #[test]
    fn test_mesh_too_few_devices() {
        let client = LocalClient::configure_virtual_cpus(4).unwrap();
        let err =
            DeviceMesh::distributed(&[("batch", 4), ("model", 2)], &client, DeviceType::Cpu, 8);
        assert!(matches!(err, Err(MeshError::DeviceCount { .. })));
    }

    #[test]
    fn test_mesh_no_gpus() {
        let client = LocalClient::configure_virtual_cpus(8).unwrap();
        let err =
            DeviceMesh::distributed(&[("batch", 4), ("model", 2)], &client, DeviceType::Gpu, 8);
        assert!(matches!(err, Err(MeshError::UnsupportedDevice(_))));
    }

    #[test]
    fn test_mesh_duplicate_dim() {
        let client = LocalClient::configure_virtual_cpus(8).unwrap();
        let err =
            DeviceMesh::distributed(&[("batch", 4), ("batch", 2)], &client, DeviceType::Cpu, 8);
        assert!(matches!(err, Err(MeshError::DuplicateDimName(_))));
    }

    #[test]
    fn test_device_coords_row_major() {
        let mesh = demo_mesh();
        // Last dimension varies fastest.
        assert_eq!(mesh.device_coords(0).unwrap(), vec![0, 0]);
        assert_eq!(mesh.device_coords(1).unwrap(), vec![0, 1]);
        assert_eq!(mesh.device_coords(2).unwrap(), vec![1, 0]);
        assert_eq!(mesh.device_coords(5).unwrap(), vec![2, 1]);
        assert_eq!(mesh.device_coords(7).unwrap(), vec![3, 1]);

        assert!(matches!(
            mesh.device_coords(8),
            Err(MeshError::DeviceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_mesh_display() {
        let mesh = demo_mesh();
        assert_eq!(format!("{mesh}"), "Mesh[batch=4, model=2; CPU x 8]");
    }
}
