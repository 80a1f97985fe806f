//! Virtual device configuration.
//!
//! The original sharding runtimes let a single process pretend to own many
//! devices by carving the host CPU into *virtual* devices. That is how a
//! sharding strategy for an 8-device cluster can be developed and tested on
//! a laptop. [`LocalClient`] models that single-client setup: one process,
//! `n` virtual CPU devices, no accelerators.

use super::{MeshError, Result};
use std::fmt;

/// The kind of compute device a mesh is built over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => write!(f, "CPU"),
            DeviceType::Gpu => write!(f, "GPU"),
        }
    }
}

/// A single-process client owning a set of virtual local devices.
///
/// Must be configured before any mesh is built, exactly once, the same
/// contract the original runtimes impose on virtual device configuration.
#[derive(Clone, Debug)]
pub struct LocalClient {
    virtual_cpus: usize,
}

impl LocalClient {
    /// Splits the host CPU into `n` virtual devices.
    pub fn configure_virtual_cpus(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(MeshError::DeviceCount {
                expected: 1,
                got: 0,
            });
        }
        Ok(Self { virtual_cpus: n })
    }

    /// This client's id. Always 0: there is exactly one client.
    pub fn client_id(&self) -> usize {
        0
    }

    /// Number of participating clients. Always 1 in this build.
    pub fn num_clients(&self) -> usize {
        1
    }

    /// Number of local devices of the given type.
    pub fn num_local_devices(&self, device_type: DeviceType) -> usize {
        match device_type {
            DeviceType::Cpu => self.virtual_cpus,
            // No accelerator backend in this build.
            DeviceType::Gpu => 0,
        }
    }

    /// Names of the local devices of the given type, in mesh order.
    pub fn local_devices(&self, device_type: DeviceType) -> Vec<String> {
        (0..self.num_local_devices(device_type))
            .map(|i| format!("{device_type}:{i}"))
            .collect()
    }
}
