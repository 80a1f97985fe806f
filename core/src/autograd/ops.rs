//! Primitive differentiable operations.
//!
//! Each operation has two halves: a forward function that computes the
//! output tensor and records a graph node, and the node's `backward` that
//! pushes the output gradient to the inputs. Gradients always *accumulate*
//! so a variable used in several places (a shared weight, a residual input)
//! collects contributions from every use.

use super::{GraphNode, Variable};
use crate::tensor::{Cpu, Tensor, TensorElem, TensorOps};
use std::cell::RefCell;
use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};
use std::rc::Rc;

/// Shared gradient cell, as held by every node for each of its inputs.
pub(crate) type GradCell<T, const RANK: usize> = Rc<RefCell<Option<Tensor<T, RANK, Cpu>>>>;

/// Adds `delta` into a gradient cell, initializing it on first touch.
pub(crate) fn accumulate<T: TensorElem, const RANK: usize>(
    cell: &GradCell<T, RANK>,
    delta: Tensor<T, RANK, Cpu>,
) {
    let mut slot = cell.borrow_mut();
    match slot.as_mut() {
        Some(g) => *g = (&*g + &delta).unwrap(),
        None => *slot = Some(delta),
    }
}

/// Collects the creator nodes of a set of input variables.
///
/// Leaves have no creator; traversal stops at them, which is exactly what
/// the topological sort needs.
pub(crate) fn collect_parents(nodes: &[&Option<Rc<dyn GraphNode>>]) -> Vec<Rc<dyn GraphNode>> {
    nodes.iter().filter_map(|n| (*n).clone()).collect()
}

// --- Element-wise addition ---

#[derive(Debug)]
struct AddNode<T: TensorElem, const RANK: usize> {
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for AddNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(x+y)/dx = d(x+y)/dy = 1
            accumulate(&self.lhs_grad, grad.clone());
            accumulate(&self.rhs_grad, grad.clone());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Add for Variable<T, RANK> {
    type Output = Variable<T, RANK>;

    fn add(self, rhs: Self) -> Self::Output {
        let data = (&self.data + &rhs.data).unwrap();
        let parents = collect_parents(&[&self.node, &rhs.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(AddNode {
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

// --- Element-wise subtraction ---

#[derive(Debug)]
struct SubNode<T: TensorElem, const RANK: usize> {
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for SubNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(x-y)/dx = 1, d(x-y)/dy = -1
            accumulate(&self.lhs_grad, grad.clone());

            let zero = Tensor::zeros(*grad.shape());
            let neg_grad = (&zero - grad).unwrap();
            accumulate(&self.rhs_grad, neg_grad);
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Sub for Variable<T, RANK> {
    type Output = Variable<T, RANK>;

    fn sub(self, rhs: Self) -> Self::Output {
        let data = (&self.data - &rhs.data).unwrap();
        let parents = collect_parents(&[&self.node, &rhs.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(SubNode {
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

// --- Element-wise multiplication ---

#[derive(Debug)]
struct MulNode<T: TensorElem, const RANK: usize> {
    lhs_data: Tensor<T, RANK, Cpu>,
    rhs_data: Tensor<T, RANK, Cpu>,
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for MulNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(x*y)/dx = y, d(x*y)/dy = x
            accumulate(&self.lhs_grad, (&self.rhs_data * grad).unwrap());
            accumulate(&self.rhs_grad, (&self.lhs_data * grad).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Mul for Variable<T, RANK> {
    type Output = Variable<T, RANK>;

    fn mul(self, rhs: Self) -> Self::Output {
        let data = (&self.data * &rhs.data).unwrap();
        let parents = collect_parents(&[&self.node, &rhs.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(MulNode {
            lhs_data: self.data.clone(),
            rhs_data: rhs.data.clone(),
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }
}

// --- Matrix multiplication ---

#[derive(Debug)]
struct MatMulNode<T: TensorElem, const RANK: usize> {
    lhs_data: Tensor<T, RANK, Cpu>,
    rhs_data: Tensor<T, RANK, Cpu>,
    lhs_grad: GradCell<T, RANK>,
    rhs_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for MatMulNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // C = A @ B:  dA = dC @ B^T,  dB = A^T @ dC
            let rhs_t = self.rhs_data.transpose().unwrap();
            accumulate(&self.lhs_grad, grad.matmul(&rhs_t).unwrap());

            let lhs_t = self.lhs_data.transpose().unwrap();
            accumulate(&self.rhs_grad, lhs_t.matmul(grad).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Transpose ---

#[derive(Debug)]
struct TransposeNode<T: TensorElem, const RANK: usize> {
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for TransposeNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // Transpose is its own adjoint.
            accumulate(&self.input_grad, grad.transpose().unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Scalar multiplication ---

#[derive(Debug)]
struct ScaleNode<T: TensorElem, const RANK: usize> {
    factor: T,
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for ScaleNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            accumulate(&self.input_grad, grad.scale(self.factor));
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Reshape ---

/// Rank-changing reshape. The data is untouched; only the view changes, so
/// the backward pass reshapes the gradient back to the input shape.
#[derive(Debug)]
struct ReshapeNode<T: TensorElem, const IN_RANK: usize, const OUT_RANK: usize> {
    input_shape: [usize; IN_RANK],
    input_grad: GradCell<T, IN_RANK>,
    out_grad: GradCell<T, OUT_RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const IN_RANK: usize, const OUT_RANK: usize> GraphNode
    for ReshapeNode<T, IN_RANK, OUT_RANK>
{
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            let back = grad.clone().reshape(self.input_shape).unwrap();
            accumulate(&self.input_grad, back);
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Bias addition (row broadcast) ---

/// `out[r, c] = input[r, c] + bias[c]`.
///
/// The one broadcast the model needs. Its backward sums the output gradient
/// over rows to recover the bias gradient.
#[derive(Debug)]
struct AddBiasNode<T: TensorElem> {
    input_grad: GradCell<T, 2>,
    bias_grad: GradCell<T, 1>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for AddBiasNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            accumulate(&self.input_grad, grad.clone());

            let [rows, cols] = *grad.shape();
            let mut bias_delta = Tensor::<T, 1>::zeros([cols]);
            for r in 0..rows {
                for c in 0..cols {
                    bias_delta.data_mut()[c] += grad.data()[r * cols + c];
                }
            }
            accumulate(&self.bias_grad, bias_delta);
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static, const RANK: usize> Variable<T, RANK> {
    /// Matrix multiplication on the last two dimensions.
    pub fn matmul(&self, rhs: &Self) -> crate::tensor::Result<Self> {
        let data = self.data.matmul(&rhs.data)?;
        let parents = collect_parents(&[&self.node, &rhs.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(MatMulNode {
            lhs_data: self.data.clone(),
            rhs_data: rhs.data.clone(),
            lhs_grad: self.grad.clone(),
            rhs_grad: rhs.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Ok(Variable {
            data,
            grad: out_grad,
            node: Some(node),
        })
    }

    /// Transposes the last two dimensions.
    pub fn transpose(&self) -> crate::tensor::Result<Self> {
        let data = self.data.transpose()?;
        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(TransposeNode {
            input_grad: self.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Ok(Variable {
            data,
            grad: out_grad,
            node: Some(node),
        })
    }

    /// Multiplies every element by a constant.
    ///
    /// The constant is not differentiated through; attention uses this for
    /// the fixed `1/sqrt(head_dim)` score scaling.
    pub fn scale(&self, factor: T) -> Self {
        let data = self.data.scale(factor);
        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(ScaleNode {
            factor,
            input_grad: self.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Variable {
            data,
            grad: out_grad,
            node: Some(node),
        }
    }

    /// Reshapes the variable, possibly changing its rank.
    ///
    /// Used to view rank-3 attention projection weights
    /// `[hidden, heads, head_dim]` as rank-2 `[hidden, heads * head_dim]`
    /// matrices for the actual matmuls.
    pub fn reshape<const NEW_RANK: usize>(
        &self,
        new_shape: [usize; NEW_RANK],
    ) -> crate::tensor::Result<Variable<T, NEW_RANK>> {
        let data = self.data.clone().reshape(new_shape)?;
        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(ReshapeNode {
            input_shape: *self.data.shape(),
            input_grad: self.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Ok(Variable {
            data,
            grad: out_grad,
            node: Some(node),
        })
    }
}

impl<T: TensorElem + 'static> Variable<T, 2> {
    /// Adds a rank-1 bias to every row.
    pub fn add_bias(&self, bias: &Variable<T, 1>) -> crate::tensor::Result<Self> {
        let [rows, cols] = *self.data.shape();
        if bias.data.shape()[0] != cols {
            return Err(crate::tensor::TensorError::ShapeMismatch {
                expected: vec![cols],
                got: bias.data.shape().to_vec(),
            });
        }

        let mut data = self.data.clone();
        for r in 0..rows {
            for c in 0..cols {
                data.data_mut()[r * cols + c] += bias.data.data()[c];
            }
        }

        let parents = collect_parents(&[&self.node, &bias.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(AddBiasNode {
            input_grad: self.grad.clone(),
            bias_grad: bias.grad.clone(),
            out_grad: out_grad.clone(),
            parents,
        });

        Ok(Variable {
            data,
            grad: out_grad,
            node: Some(node),
        })
    }
}
