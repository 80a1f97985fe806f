//! Plain stochastic gradient descent.

use super::Optimizer;
use crate::tensor::{Cpu, Result, Tensor, TensorElem};
use rayon::prelude::*;

/// `p = p - lr * g`. No state; the baseline the unit tests lean on.
pub struct Sgd<T: TensorElem> {
    pub learning_rate: T,
}

impl<T: TensorElem> Sgd<T> {
    pub fn new(learning_rate: T) -> Self {
        Self { learning_rate }
    }
}

impl<T: TensorElem> Optimizer<T> for Sgd<T> {
    fn update<const RANK: usize>(
        &mut self,
        _key: usize,
        param: &mut Tensor<T, RANK, Cpu>,
        grad: &Tensor<T, RANK, Cpu>,
    ) -> Result<()> {
        if param.shape() != grad.shape() {
            return Err(crate::tensor::TensorError::ShapeMismatch {
                expected: param.shape().to_vec(),
                got: grad.shape().to_vec(),
            });
        }

        let lr = self.learning_rate;
        param
            .data_mut()
            .par_iter_mut()
            .zip(grad.data().par_iter())
            .for_each(|(p, g)| {
                *p = *p - lr * *g;
            });

        Ok(())
    }
}
