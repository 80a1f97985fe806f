//! Layer normalization.
//!
//! Keeps activations in a healthy range by normalizing each row to zero
//! mean and unit variance, then letting learnable `gamma`/`beta` undo as
//! much of that as training finds useful. Applied after the embeddings and
//! around every encoder sub-layer, as in the original architecture.

use crate::autograd::{functional, Variable};
use crate::tensor::{Result, Tensor, TensorElem};

#[derive(Clone, Debug)]
pub struct LayerNorm<T: TensorElem> {
    pub gamma: Variable<T, 1>,
    pub beta: Variable<T, 1>,
    eps: f64,
}

impl<T: TensorElem + 'static> LayerNorm<T> {
    pub fn new(features: usize) -> Self {
        Self {
            gamma: Variable::new(Tensor::ones([features])),
            beta: Variable::new(Tensor::zeros([features])),
            eps: 1e-6,
        }
    }

    pub fn forward(&self, input: &Variable<T, 2>) -> Result<Variable<T, 2>> {
        functional::layer_norm(input, &self.gamma, &self.beta, self.eps)
    }
}
