//! Fully connected layer.

use super::{glorot_limit, uniform_init};
use crate::autograd::Variable;
use crate::tensor::{Result, Tensor, TensorElem};
use rand::Rng;

/// `y = x @ kernel + bias`, with a `[in, out]` kernel.
#[derive(Clone, Debug)]
pub struct Dense<T: TensorElem> {
    pub kernel: Variable<T, 2>,
    pub bias: Variable<T, 1>,
}

impl<T: TensorElem + 'static> Dense<T> {
    pub fn new(in_features: usize, out_features: usize, rng: &mut impl Rng) -> Self {
        Self {
            kernel: uniform_init(
                [in_features, out_features],
                glorot_limit(in_features, out_features),
                rng,
            ),
            bias: Variable::new(Tensor::zeros([out_features])),
        }
    }

    pub fn forward(&self, input: &Variable<T, 2>) -> Result<Variable<T, 2>> {
        input.matmul(&self.kernel)?.add_bias(&self.bias)
    }
}
