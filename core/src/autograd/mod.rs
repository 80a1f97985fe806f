//! Reverse-mode automatic differentiation.
//!
//! Training needs the gradient of the loss with respect to every weight.
//! `meshgrad` computes it with tape-based reverse-mode AD (backpropagation):
//!
//! 1. **Forward pass**: operations on [`Variable`]s build a computation
//!    graph dynamically. Each operation records a node that knows how to
//!    push gradients to its inputs.
//! 2. **Backward pass**: calling `.backward()` on the loss traverses the
//!    graph in reverse topological order, applying the chain rule node by
//!    node.
//!
//! The tape is implicit: `Rc<dyn GraphNode>` links between variables form
//! it as the forward pass runs, so ordinary Rust control flow (the
//! per-batch, per-head loops in attention) just works.
//!
//! # Example
//!
//! Derivative of $f(x) = x \cdot x$ at $x = 3$:
//!
//! ```rust
//! use meshgrad::tensor::Tensor;
//! use meshgrad::autograd::Variable;
//!
//! let x = Variable::new(Tensor::new(vec![3.0], []).unwrap());
//! let y = x.clone() * x.clone();
//! y.backward();
//!
//! // dy/dx = 2x = 6
//! assert_eq!(x.grad.borrow().as_ref().unwrap().data()[0], 6.0);
//! ```

use crate::tensor::{Cpu, Tensor, TensorElem};
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

pub mod engine;
pub mod functional;
pub mod ops;

pub use functional::{concat_cols, concat_rows, layer_norm};

/// A node in the computation graph.
///
/// Each operation contributes one node that, given the gradient of the loss
/// with respect to its output, accumulates gradients into its inputs.
pub trait GraphNode: Debug {
    /// Propagates the output gradient to this node's inputs.
    fn backward(&self);
    /// Returns the nodes that produced this node's inputs.
    fn parents(&self) -> Vec<Rc<dyn GraphNode>>;
}

/// A tensor that participates in gradient computation.
///
/// Wraps a [`Tensor`] together with its gradient cell and, for non-leaf
/// variables, the graph node that produced it. Cloning a `Variable` is
/// cheap in spirit: the gradient cell is shared via `Rc`, so all clones see
/// the same accumulated gradient.
#[derive(Clone, Debug)]
pub struct Variable<T, const RANK: usize>
where
    T: TensorElem,
{
    /// The forward-pass value.
    pub data: Tensor<T, RANK, Cpu>,
    /// Gradient of the loss with respect to this variable.
    pub grad: Rc<RefCell<Option<Tensor<T, RANK, Cpu>>>>,
    /// The operation that produced this variable (`None` for leaves).
    pub node: Option<Rc<dyn GraphNode>>,
}

impl<T, const RANK: usize> Variable<T, RANK>
where
    T: TensorElem + 'static,
{
    /// Creates a leaf variable (a weight or an input).
    pub fn new(data: Tensor<T, RANK, Cpu>) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            node: None,
        }
    }

    /// Creates a variable produced by a graph node.
    pub fn with_node(data: Tensor<T, RANK, Cpu>, node: Rc<dyn GraphNode>) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            node: Some(node),
        }
    }

    /// Runs the backward pass starting from this variable.
    ///
    /// Typically called on the scalar loss. If no gradient has been seeded
    /// yet, it is seeded with ones.
    pub fn backward(&self) {
        if self.grad.borrow().is_none() {
            *self.grad.borrow_mut() = Some(Tensor::ones(*self.data.shape()));
        }

        crate::autograd::engine::backward(self.node.clone());
    }

    /// Clears the accumulated gradient.
    ///
    /// Called between training steps so gradients from one batch do not
    /// leak into the next.
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_creation() {
        let data = Tensor::new(vec![1.0, 2.0], [2]).unwrap();
        let var = Variable::new(data.clone());

        assert_eq!(var.data.data(), data.data());
        assert!(var.grad.borrow().is_none());
        assert!(var.node.is_none());
    }

    #[test]
    fn test_backward_seeds_leaf() {
        let var = Variable::new(Tensor::new(vec![1.0], []).unwrap());
        var.backward();

        assert_eq!(var.grad.borrow().as_ref().unwrap().data()[0], 1.0);
    }

    #[test]
    fn test_zero_grad() {
        let var = Variable::new(Tensor::new(vec![1.0], []).unwrap());
        var.backward();
        assert!(var.grad.borrow().is_some());

        var.zero_grad();
        assert!(var.grad.borrow().is_none());
    }

    #[test]
    fn test_clones_share_grad() {
        let var = Variable::new(Tensor::new(vec![2.0], []).unwrap());
        let alias = var.clone();

        var.backward();
        assert!(alias.grad.borrow().is_some());
    }
}
