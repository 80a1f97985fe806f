//! Sparse categorical cross-entropy, from logits.
//!
//! The classifier's training objective: mean negative log-likelihood of the
//! integer labels under the softmax of the logits. Softmax and NLL are
//! fused into a single graph node, both for numerical stability (log-sum-exp
//! with max subtraction) and because the fused backward is simply
//! `(softmax - one_hot) / batch`.

use crate::autograd::ops::{accumulate, collect_parents, GradCell};
use crate::autograd::{GraphNode, Variable};
use crate::tensor::{Cpu, Result, Tensor, TensorElem, TensorError};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
struct SoftmaxCrossEntropyNode<T: TensorElem> {
    /// `(softmax - one_hot) / batch`, precomputed in the forward pass.
    dlogits: Tensor<T, 2, Cpu>,
    logits_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 0>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for SoftmaxCrossEntropyNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            let scale = grad.data()[0];
            accumulate(&self.logits_grad, self.dlogits.scale(scale));
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

/// Mean cross-entropy of integer `labels` under `softmax(logits)`.
///
/// Returns a rank-0 variable, ready for `.backward()`.
///
/// # Errors
///
/// Shape errors if `labels.len()` differs from the number of logit rows or
/// any label is outside the class range.
pub fn sparse_categorical_cross_entropy<T: TensorElem + 'static>(
    logits: &Variable<T, 2>,
    labels: &[u32],
) -> Result<Variable<T, 0>> {
    let [rows, classes] = *logits.data.shape();
    if labels.len() != rows {
        return Err(TensorError::ShapeMismatch {
            expected: vec![rows],
            got: vec![labels.len()],
        });
    }

    let n = rows as f64;
    let mut dlogits = Tensor::<T, 2>::zeros([rows, classes]);
    let mut total_nll = 0.0f64;

    for (r, &label) in labels.iter().enumerate() {
        let label = label as usize;
        if label >= classes {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![label],
                shape: vec![classes],
            });
        }

        let start = r * classes;
        let row = &logits.data.data()[start..start + classes];

        let max = row
            .iter()
            .map(|x| x.to_f64().unwrap())
            .fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = row
            .iter()
            .map(|x| (x.to_f64().unwrap() - max).exp())
            .collect();
        let sum: f64 = exps.iter().sum();

        // log p_label = logit_label - max - log(sum)
        total_nll -= row[label].to_f64().unwrap() - max - sum.ln();

        for c in 0..classes {
            let p = exps[c] / sum;
            let one_hot = if c == label { 1.0 } else { 0.0 };
            dlogits.data_mut()[start + c] = T::from_f64((p - one_hot) / n).unwrap();
        }
    }

    let loss = Tensor::<T, 0>::new(vec![T::from_f64(total_nll / n).unwrap()], [])?;

    let parents = collect_parents(&[&logits.node]);
    let out_grad = Rc::new(RefCell::new(None));

    let node = Rc::new(SoftmaxCrossEntropyNode {
        dlogits,
        logits_grad: logits.grad.clone(),
        out_grad: out_grad.clone(),
        parents,
    });

    Ok(Variable {
        data: loss,
        grad: out_grad,
        node: Some(node),
    })
}
