//! Neural network layers.
//!
//! Thin, explicit layers over the autograd ops: a one-hot embedding, a
//! dense (fully connected) layer, and layer normalization. Each layer owns
//! its weights as [`Variable`]s; the model above decides their names and
//! sharding layouts.

use crate::autograd::Variable;
use crate::tensor::{Tensor, TensorElem};
use rand::Rng;

pub mod dense;
pub mod embedding;
pub mod norm;

pub use dense::Dense;
pub use embedding::OneHotEmbedding;
pub use norm::LayerNorm;

/// Uniform weight initialization in `[-limit, limit)`.
pub(crate) fn uniform_init<T: TensorElem + 'static, const RANK: usize>(
    shape: [usize; RANK],
    limit: f64,
    rng: &mut impl Rng,
) -> Variable<T, RANK> {
    let size: usize = shape.iter().product();
    let data: Vec<T> = (0..size)
        .map(|_| T::from_f64(rng.random_range(-limit..limit)).unwrap())
        .collect();

    // Shape and length match by construction.
    let tensor = Tensor::new(data, shape).unwrap_or_else(|_| Tensor::zeros(shape));
    Variable::new(tensor)
}

/// Glorot-style limit for a dense kernel: `sqrt(6 / (fan_in + fan_out))`.
pub(crate) fn glorot_limit(fan_in: usize, fan_out: usize) -> f64 {
    (6.0 / (fan_in + fan_out) as f64).sqrt()
}
