//! Compute device abstraction for Tensor storage.
//!
//! A `Device` decides where tensor data is allocated and how device-specific
//! operations (currently only `transpose`) are executed. Only [`Cpu`] is
//! implemented; the demo's "GPU vs CPU" choice happens one level up, in the
//! mesh module, where a logical grid of virtual devices is configured. That
//! mirrors how sharding frameworks separate the *logical* device mesh from
//! the physical compute backend.

use crate::tensor::{Storage, TensorElem};
use std::fmt::Debug;

/// A trait representing the storage device backing a Tensor.
///
/// The `Storage` associated type lets each device define its own memory
/// container (`Vec<T>` for CPU, a device buffer for a future accelerator).
pub trait Device: Clone + Debug + PartialEq + Send + Sync {
    /// The type of storage used by this device.
    type Storage<T>: Storage<T>
    where
        T: TensorElem;

    /// Returns the name of the device.
    ///
    /// ```rust
    /// use meshgrad::tensor::{Cpu, Device};
    /// assert_eq!(Cpu.name(), "CPU");
    /// ```
    fn name(&self) -> &'static str;

    /// Transposes the last two dimensions of `data`.
    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> crate::tensor::Result<Self::Storage<T>>;
}

/// The system CPU. Data lives in system RAM as `Vec<T>`.
///
/// All heavy loops are parallelized with `rayon` through the kernels crate,
/// which is plenty for the toy model sizes this demo trains.
#[derive(Clone, Debug, PartialEq)]
pub struct Cpu;

impl Device for Cpu {
    type Storage<T>
        = Vec<T>
    where
        T: TensorElem;

    fn name(&self) -> &'static str {
        "CPU"
    }

    fn transpose<T: TensorElem, const RANK: usize>(
        data: &Self::Storage<T>,
        shape: &[usize; RANK],
    ) -> crate::tensor::Result<Self::Storage<T>> {
        if RANK < 2 {
            return Err(crate::tensor::TensorError::Unsupported(
                "Transpose requires rank >= 2".into(),
            ));
        }
        meshgrad_kernels::cpu_transpose(data, shape).map_err(|e| match e {
            meshgrad_kernels::KernelError::ShapeMismatch { expected, got } => {
                crate::tensor::TensorError::ShapeMismatch { expected, got }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_device_name() {
        assert_eq!(Cpu.name(), "CPU");
    }

    #[test]
    fn test_cpu_device_traits() {
        let device = Cpu;
        let device_clone = device.clone();
        assert_eq!(device, device_clone);
        assert_eq!(format!("{:?}", device), "Cpu");
    }

    #[test]
    fn test_cpu_transpose_rank_error() {
        let data = vec![1.0];
        let result = Cpu::transpose(&data, &[1]);
        assert!(matches!(
            result,
            Err(crate::tensor::TensorError::Unsupported(_))
        ));
    }

    #[test]
    fn test_cpu_transpose() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = Cpu::transpose(&data, &[2, 3]).unwrap();
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }
}
