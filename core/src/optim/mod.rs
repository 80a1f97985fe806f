//! Optimizers.
//!
//! An optimizer turns accumulated gradients into parameter updates. The
//! model's parameters have mixed ranks (rank-1 biases, rank-2 kernels,
//! rank-3 attention projections), so `update` is generic over the rank and
//! the model calls it once per parameter with a stable integer key that
//! identifies the parameter across steps.

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use crate::tensor::{Cpu, Result, Tensor, TensorElem};

pub trait Optimizer<T: TensorElem> {
    /// Applies one update to a single parameter.
    ///
    /// `key` identifies the parameter for optimizers that keep per-parameter
    /// state (moment estimates); it must be stable across calls.
    ///
    /// # Errors
    ///
    /// `TensorError::ShapeMismatch` if the gradient shape differs from the
    /// parameter shape.
    fn update<const RANK: usize>(
        &mut self,
        key: usize,
        param: &mut Tensor<T, RANK, Cpu>,
        grad: &Tensor<T, RANK, Cpu>,
    ) -> Result<()>;
}
