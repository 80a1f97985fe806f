//! The Adam optimizer.

use super::Optimizer;
use crate::tensor::{Cpu, Result, Tensor, TensorElem};
use rayon::prelude::*;
use std::collections::HashMap;

/// Adam: adaptive moment estimation.
///
/// # Formula
///
/// $$
/// \begin{aligned}
/// & m_t = \beta_1 m_{t-1} + (1 - \beta_1) g_t \\
/// & v_t = \beta_2 v_{t-1} + (1 - \beta_2) g_t^2 \\
/// & \hat{m}_t = m_t / (1 - \beta_1^t), \quad \hat{v}_t = v_t / (1 - \beta_2^t) \\
/// & \theta_t = \theta_{t-1} - \eta \, \hat{m}_t / (\sqrt{\hat{v}_t} + \epsilon)
/// \end{aligned}
/// $$
///
/// The demo trains with the stock `lr = 0.001`, `betas = (0.9, 0.999)`.
pub struct Adam<T: TensorElem> {
    pub learning_rate: T,
    pub beta1: T,
    pub beta2: T,
    pub epsilon: T,
    /// Per-parameter state: key -> (m, v, step). Moments are stored flat to
    /// handle parameters of any rank.
    state: HashMap<usize, (Vec<T>, Vec<T>, u64)>,
}

impl<T: TensorElem> Adam<T> {
    pub fn new(learning_rate: T) -> Self {
        Self {
            learning_rate,
            beta1: T::from_f64(0.9).unwrap_or_else(T::one),
            beta2: T::from_f64(0.999).unwrap_or_else(T::one),
            epsilon: T::from_f64(1e-7).unwrap_or_else(T::zero),
            state: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: T, beta2: T) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: T) -> Self {
        self.epsilon = epsilon;
        self
    }
}

impl<T: TensorElem> Optimizer<T> for Adam<T> {
    fn update<const RANK: usize>(
        &mut self,
        key: usize,
        param: &mut Tensor<T, RANK, Cpu>,
        grad: &Tensor<T, RANK, Cpu>,
    ) -> Result<()> {
        if param.shape() != grad.shape() {
            return Err(crate::tensor::TensorError::ShapeMismatch {
                expected: param.shape().to_vec(),
                got: grad.shape().to_vec(),
            });
        }

        let size = param.size();
        let (m, v, step) = self
            .state
            .entry(key)
            .or_insert_with(|| (vec![T::zero(); size], vec![T::zero(); size], 0));
        *step += 1;

        let lr = self.learning_rate;
        let b1 = self.beta1;
        let b2 = self.beta2;
        let eps = self.epsilon;
        let one = T::one();

        let b1_t = b1.to_f64().unwrap_or(0.0).powi(*step as i32);
        let b2_t = b2.to_f64().unwrap_or(0.0).powi(*step as i32);
        let bias_correction1 = T::from_f64(1.0 - b1_t).unwrap_or_else(T::one);
        let bias_correction2 = T::from_f64(1.0 - b2_t).unwrap_or_else(T::one);

        param
            .data_mut()
            .par_iter_mut()
            .zip(grad.data().par_iter())
            .zip(m.par_iter_mut())
            .zip(v.par_iter_mut())
            .for_each(|(((p, g), m_elem), v_elem)| {
                *m_elem = b1 * *m_elem + (one - b1) * *g;
                *v_elem = b2 * *v_elem + (one - b2) * *g * *g;

                let m_hat = *m_elem / bias_correction1;
                let v_hat = *v_elem / bias_correction2;

                let v_sqrt = v_hat.to_f64().unwrap_or(0.0).sqrt();
                let denom = T::from_f64(v_sqrt).unwrap_or_else(T::zero) + eps;

                *p = *p - lr * (m_hat / denom);
            });

        Ok(())
    }
}
