//! Composite differentiable operations.
//!
//! The building blocks the transformer layers are assembled from: block
//! slicing and concatenation (how attention routes per-batch, per-head
//! blocks through plain 2-D matmuls), row softmax, the tanh and GELU
//! activations, and layer normalization as a single fused node.
//!
//! Element math goes through `f64` and back, the same route the primitive
//! `exp`-style ops take, so all of this works for any float-like element.

use super::ops::{accumulate, collect_parents, GradCell};
use super::{GraphNode, Variable};
use crate::tensor::{Cpu, Tensor, TensorElem, TensorError};
use std::cell::RefCell;
use std::fmt::Debug;
use std::ops::Range;
use std::rc::Rc;

// GELU tanh approximation constants: sqrt(2/pi) and the cubic coefficient.
const GELU_C: f64 = 0.797_884_560_802_865_4;
const GELU_A: f64 = 0.044715;

// --- Block slice ---

#[derive(Debug)]
struct SliceNode<T: TensorElem> {
    rows: Range<usize>,
    cols: Range<usize>,
    input_shape: [usize; 2],
    input_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for SliceNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // The gradient of a slice scatters back into the region it was
            // cut from; everything outside the block is zero.
            let mut slot = self.input_grad.borrow_mut();
            let target = slot.get_or_insert_with(|| Tensor::zeros(self.input_shape));
            target
                .accumulate_block(self.rows.clone(), self.cols.clone(), grad)
                .unwrap();
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Concatenation ---

/// One input of a concat node: its gradient cell, its shape, and its offset
/// along the concatenation axis.
#[derive(Debug)]
struct ConcatPart<T: TensorElem> {
    grad: GradCell<T, 2>,
    shape: [usize; 2],
    offset: usize,
}

#[derive(Debug)]
struct ConcatRowsNode<T: TensorElem> {
    parts: Vec<ConcatPart<T>>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for ConcatRowsNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            for part in &self.parts {
                let [rows, cols] = part.shape;
                let block = grad
                    .slice_block(part.offset..part.offset + rows, 0..cols)
                    .unwrap();
                accumulate(&part.grad, block);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

#[derive(Debug)]
struct ConcatColsNode<T: TensorElem> {
    parts: Vec<ConcatPart<T>>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for ConcatColsNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            for part in &self.parts {
                let [rows, cols] = part.shape;
                let block = grad
                    .slice_block(0..rows, part.offset..part.offset + cols)
                    .unwrap();
                accumulate(&part.grad, block);
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Row softmax ---

#[derive(Debug)]
struct SoftmaxNode<T: TensorElem> {
    out_data: Tensor<T, 2, Cpu>,
    input_grad: GradCell<T, 2>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for SoftmaxNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // Per row: dx_i = p_i * (g_i - sum_j g_j p_j)
            let [rows, cols] = *grad.shape();
            let mut dx = Tensor::<T, 2>::zeros([rows, cols]);

            for r in 0..rows {
                let start = r * cols;
                let g = &grad.data()[start..start + cols];
                let p = &self.out_data.data()[start..start + cols];

                let dot: f64 = g
                    .iter()
                    .zip(p.iter())
                    .map(|(gi, pi)| gi.to_f64().unwrap() * pi.to_f64().unwrap())
                    .sum();

                for c in 0..cols {
                    let gi = g[c].to_f64().unwrap();
                    let pi = p[c].to_f64().unwrap();
                    dx.data_mut()[start + c] = T::from_f64(pi * (gi - dot)).unwrap();
                }
            }

            accumulate(&self.input_grad, dx);
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Tanh ---

#[derive(Debug)]
struct TanhNode<T: TensorElem, const RANK: usize> {
    out_data: Tensor<T, RANK, Cpu>,
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for TanhNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // d(tanh x)/dx = 1 - tanh^2 x, and out_data already holds tanh x.
            let one_minus_sq = self.out_data.map(|y| T::one() - y * y);
            accumulate(&self.input_grad, (&one_minus_sq * grad).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- GELU ---

#[derive(Debug)]
struct GeluNode<T: TensorElem, const RANK: usize> {
    input_data: Tensor<T, RANK, Cpu>,
    input_grad: GradCell<T, RANK>,
    out_grad: GradCell<T, RANK>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem, const RANK: usize> GraphNode for GeluNode<T, RANK> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            // y = 0.5 x (1 + tanh u), u = C (x + A x^3)
            // dy/dx = 0.5 (1 + tanh u) + 0.5 x sech^2(u) C (1 + 3 A x^2)
            let deriv = self.input_data.map(|x| {
                let x = x.to_f64().unwrap();
                let u = GELU_C * (x + GELU_A * x * x * x);
                let t = u.tanh();
                let sech_sq = 1.0 - t * t;
                let du_dx = GELU_C * (1.0 + 3.0 * GELU_A * x * x);
                T::from_f64(0.5 * (1.0 + t) + 0.5 * x * sech_sq * du_dx).unwrap()
            });
            accumulate(&self.input_grad, (&deriv * grad).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

// --- Layer normalization ---

#[derive(Debug)]
struct LayerNormNode<T: TensorElem> {
    x_hat: Tensor<T, 2, Cpu>,
    rstd: Vec<f64>,
    gamma: Tensor<T, 1, Cpu>,
    input_grad: GradCell<T, 2>,
    gamma_grad: GradCell<T, 1>,
    beta_grad: GradCell<T, 1>,
    out_grad: GradCell<T, 2>,
    parents: Vec<Rc<dyn GraphNode>>,
}

impl<T: TensorElem> GraphNode for LayerNormNode<T> {
    fn backward(&self) {
        if let Some(grad) = self.out_grad.borrow().as_ref() {
            let [rows, cols] = *grad.shape();
            let n = cols as f64;

            let mut dx = Tensor::<T, 2>::zeros([rows, cols]);
            let mut dgamma = vec![0.0f64; cols];
            let mut dbeta = vec![0.0f64; cols];

            for r in 0..rows {
                let start = r * cols;
                let g = &grad.data()[start..start + cols];
                let xh = &self.x_hat.data()[start..start + cols];

                // dyg = g * gamma; the two row means below come from
                // differentiating through the row's own mean and variance.
                let mut m1 = 0.0;
                let mut m2 = 0.0;
                for c in 0..cols {
                    let gi = g[c].to_f64().unwrap();
                    let xi = xh[c].to_f64().unwrap();
                    let dyg = gi * self.gamma.data()[c].to_f64().unwrap();
                    m1 += dyg;
                    m2 += dyg * xi;
                    dgamma[c] += gi * xi;
                    dbeta[c] += gi;
                }
                m1 /= n;
                m2 /= n;

                for c in 0..cols {
                    let gi = g[c].to_f64().unwrap();
                    let xi = xh[c].to_f64().unwrap();
                    let dyg = gi * self.gamma.data()[c].to_f64().unwrap();
                    dx.data_mut()[start + c] =
                        T::from_f64(self.rstd[r] * (dyg - m1 - xi * m2)).unwrap();
                }
            }

            accumulate(&self.input_grad, dx);

            let dgamma = dgamma.iter().map(|&v| T::from_f64(v).unwrap()).collect();
            let dbeta = dbeta.iter().map(|&v| T::from_f64(v).unwrap()).collect();
            accumulate(&self.gamma_grad, Tensor::new(dgamma, [cols]).unwrap());
            accumulate(&self.beta_grad, Tensor::new(dbeta, [cols]).unwrap());
        }
    }

    fn parents(&self) -> Vec<Rc<dyn GraphNode>> {
        self.parents.clone()
    }
}

impl<T: TensorElem + 'static> Variable<T, 2> {
    /// Extracts a rectangular block as a new variable.
    pub fn slice_block(
        &self,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> crate::tensor::Result<Self> {
        let data = self.data.slice_block(rows.clone(), cols.clone())?;
        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(SliceNode {
            rows,
            cols,
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

    /// Row-wise softmax.
    pub fn softmax_rows(&self) -> Self {
        let [rows, cols] = *self.data.shape();
        let mut data = Tensor::<T, 2>::zeros([rows, cols]);

        for r in 0..rows {
            let start = r * cols;
            let row = &self.data.data()[start..start + cols];

            // Max subtraction keeps exp from overflowing.
            let max = row
                .iter()
                .map(|x| x.to_f64().unwrap())
                .fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = row
                .iter()
                .map(|x| (x.to_f64().unwrap() - max).exp())
                .collect();
            let sum: f64 = exps.iter().sum();

            for c in 0..cols {
                data.data_mut()[start + c] = T::from_f64(exps[c] / sum).unwrap();
            }
        }

        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(SoftmaxNode {
            out_data: data.clone(),
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
}

impl<T: TensorElem + 'static, const RANK: usize> Variable<T, RANK> {
    /// Hyperbolic tangent, applied element-wise.
    pub fn tanh(&self) -> Self {
        let data = self
            .data
            .map(|x| T::from_f64(x.to_f64().unwrap().tanh()).unwrap());

        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(TanhNode {
            out_data: data.clone(),
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

    /// GELU activation (tanh approximation), applied element-wise.
    pub fn gelu(&self) -> Self {
        let data = self.data.map(|x| {
            let x = x.to_f64().unwrap();
            let u = GELU_C * (x + GELU_A * x * x * x);
            T::from_f64(0.5 * x * (1.0 + u.tanh())).unwrap()
        });

        let parents = collect_parents(&[&self.node]);
        let out_grad = Rc::new(RefCell::new(None));

        let node = Rc::new(GeluNode {
            input_data: self.data.clone(),
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
}

/// Concatenates variables along the row axis. All parts must have the same
/// number of columns.
pub fn concat_rows<T: TensorElem + 'static>(
    parts: &[Variable<T, 2>],
) -> crate::tensor::Result<Variable<T, 2>> {
    let (data, node_parts, parents) = build_concat(parts, /* along_rows */ true)?;
    let out_grad = Rc::new(RefCell::new(None));

    let node = Rc::new(ConcatRowsNode {
        parts: node_parts,
        out_grad: out_grad.clone(),
        parents,
    });

    Ok(Variable {
        data,
        grad: out_grad,
        node: Some(node),
    })
}

/// Concatenates variables along the column axis. All parts must have the
/// same number of rows.
pub fn concat_cols<T: TensorElem + 'static>(
    parts: &[Variable<T, 2>],
) -> crate::tensor::Result<Variable<T, 2>> {
    let (data, node_parts, parents) = build_concat(parts, /* along_rows */ false)?;
    let out_grad = Rc::new(RefCell::new(None));

    let node = Rc::new(ConcatColsNode {
        parts: node_parts,
        out_grad: out_grad.clone(),
        parents,
    });

    Ok(Variable {
        data,
        grad: out_grad,
        node: Some(node),
    })
}

type ConcatPieces<T> = (
    Tensor<T, 2, Cpu>,
    Vec<ConcatPart<T>>,
    Vec<Rc<dyn GraphNode>>,
);

fn build_concat<T: TensorElem + 'static>(
    parts: &[Variable<T, 2>],
    along_rows: bool,
) -> crate::tensor::Result<ConcatPieces<T>> {
    let first = parts
        .first()
        .ok_or_else(|| TensorError::Unsupported("Concat of zero tensors".into()))?;

    let [first_rows, first_cols] = *first.data.shape();
    let fixed = if along_rows { first_cols } else { first_rows };

    let mut total = 0;
    for part in parts {
        let [rows, cols] = *part.data.shape();
        let (varying, part_fixed) = if along_rows { (rows, cols) } else { (cols, rows) };
        if part_fixed != fixed {
            return Err(TensorError::ShapeMismatch {
                expected: first.data.shape().to_vec(),
                got: part.data.shape().to_vec(),
            });
        }
        total += varying;
    }

    let out_shape = if along_rows {
        [total, fixed]
    } else {
        [fixed, total]
    };
    let mut data = Tensor::<T, 2>::zeros(out_shape);

    let mut node_parts = Vec::with_capacity(parts.len());
    let mut offset = 0;
    for part in parts {
        let [rows, cols] = *part.data.shape();
        if along_rows {
            let dst_start = offset * fixed;
            data.data_mut()[dst_start..dst_start + rows * cols]
                .copy_from_slice(part.data.data());
        } else {
            for r in 0..fixed {
                let src_start = r * cols;
                let dst_start = r * total + offset;
                data.data_mut()[dst_start..dst_start + cols]
                    .copy_from_slice(&part.data.data()[src_start..src_start + cols]);
            }
        }

        node_parts.push(ConcatPart {
            grad: part.grad.clone(),
            shape: [rows, cols],
            offset,
        });
        offset += if along_rows { rows } else { cols };
    }

    let parent_opts: Vec<&Option<Rc<dyn GraphNode>>> = parts.iter().map(|p| &p.node).collect();
    let parents = collect_parents(&parent_opts);

    Ok((data, node_parts, parents))
}

/// Layer normalization over the last axis, with learnable scale and shift.
///
/// Normalizes each row of `input` to zero mean and unit variance, then
/// applies `gamma * x_hat + beta`. A single fused node; the backward pass
/// differentiates through the row statistics.
pub fn layer_norm<T: TensorElem + 'static>(
    input: &Variable<T, 2>,
    gamma: &Variable<T, 1>,
    beta: &Variable<T, 1>,
    eps: f64,
) -> crate::tensor::Result<Variable<T, 2>> {
    let [rows, cols] = *input.data.shape();
    if gamma.data.shape()[0] != cols || beta.data.shape()[0] != cols {
        return Err(TensorError::ShapeMismatch {
            expected: vec![cols],
            got: gamma.data.shape().to_vec(),
        });
    }

    let n = cols as f64;
    let mut x_hat = Tensor::<T, 2>::zeros([rows, cols]);
    let mut out = Tensor::<T, 2>::zeros([rows, cols]);
    let mut rstd = Vec::with_capacity(rows);

    for r in 0..rows {
        let start = r * cols;
        let row = &input.data.data()[start..start + cols];

        let mean: f64 = row.iter().map(|x| x.to_f64().unwrap()).sum::<f64>() / n;
        let var: f64 = row
            .iter()
            .map(|x| {
                let d = x.to_f64().unwrap() - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let r_std = 1.0 / (var + eps).sqrt();
        rstd.push(r_std);

        for c in 0..cols {
            let xh = (row[c].to_f64().unwrap() - mean) * r_std;
            x_hat.data_mut()[start + c] = T::from_f64(xh).unwrap();
            let y = gamma.data.data()[c].to_f64().unwrap() * xh
                + beta.data.data()[c].to_f64().unwrap();
            out.data_mut()[start + c] = T::from_f64(y).unwrap();
        }
    }

    let parents = collect_parents(&[&input.node, &gamma.node, &beta.node]);
    let out_grad = Rc::new(RefCell::new(None));

    let node = Rc::new(LayerNormNode {
        x_hat,
        rstd,
        gamma: gamma.data.clone(),
        input_grad: input.grad.clone(),
        gamma_grad: gamma.grad.clone(),
        beta_grad: beta.grad.clone(),
        out_grad: out_grad.clone(),
        parents,
    });

    Ok(Variable {
        data: out,
        grad: out_grad,
        node: Some(node),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < tol, "expected {e}, got {a}");
        }
    }

    #[test]
    fn test_slice_backward() {
        let x = Variable::new(
            Tensor::<f32, 2>::new((0..6).map(|i| i as f32).collect(), [2, 3]).unwrap(),
        );

        let block = x.slice_block(0..1, 1..3).unwrap();
        assert_eq!(block.data.data(), &[1.0, 2.0]);

        *block.grad.borrow_mut() = Some(Tensor::new(vec![10.0, 20.0], [1, 2]).unwrap());
        block.backward();

        assert_eq!(
            x.grad.borrow().as_ref().unwrap().data(),
            &[0.0, 10.0, 20.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_concat_cols_roundtrip() {
        let a = Variable::new(Tensor::<f32, 2>::new(vec![1.0, 2.0], [2, 1]).unwrap());
        let b = Variable::new(Tensor::<f32, 2>::new(vec![3.0, 4.0, 5.0, 6.0], [2, 2]).unwrap());

        let joined = concat_cols(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.data.shape(), &[2, 3]);
        assert_eq!(joined.data.data(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);

        *joined.grad.borrow_mut() =
            Some(Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap());
        joined.backward();

        assert_eq!(a.grad.borrow().as_ref().unwrap().data(), &[1.0, 4.0]);
        assert_eq!(
            b.grad.borrow().as_ref().unwrap().data(),
            &[2.0, 3.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_concat_rows_roundtrip() {
        let a = Variable::new(Tensor::<f32, 2>::new(vec![1.0, 2.0], [1, 2]).unwrap());
        let b = Variable::new(Tensor::<f32, 2>::new(vec![3.0, 4.0], [1, 2]).unwrap());

        let joined = concat_rows(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(joined.data.shape(), &[2, 2]);
        assert_eq!(joined.data.data(), &[1.0, 2.0, 3.0, 4.0]);

        *joined.grad.borrow_mut() =
            Some(Tensor::new(vec![10.0, 20.0, 30.0, 40.0], [2, 2]).unwrap());
        joined.backward();

        assert_eq!(a.grad.borrow().as_ref().unwrap().data(), &[10.0, 20.0]);
        assert_eq!(b.grad.borrow().as_ref().unwrap().data(), &[30.0, 40.0]);
    }

    #[test]
    fn test_concat_shape_mismatch() {
        let a = Variable::new(Tensor::<f32, 2>::zeros([2, 2]));
        let b = Variable::new(Tensor::<f32, 2>::zeros([3, 2]));
        assert!(concat_cols(&[a.clone(), b.clone()]).is_err());
        assert!(concat_rows::<f32>(&[]).is_err());
    }

    #[test]
    fn test_softmax_forward() {
        let x = Variable::new(Tensor::<f32, 2>::new(vec![0.0, 0.0, 1.0, 1.0], [2, 2]).unwrap());
        let p = x.softmax_rows();

        assert_close(p.data.data(), &[0.5, 0.5, 0.5, 0.5], 1e-6);
    }

    #[test]
    fn test_softmax_backward() {
        // Uniform probabilities, upstream gradient [1, 0]:
        // dx = p * (g - sum(g*p)) = [0.5*(1-0.5), 0.5*(0-0.5)] = [0.25, -0.25]
        let x = Variable::new(Tensor::<f32, 2>::new(vec![0.0, 0.0], [1, 2]).unwrap());
        let p = x.softmax_rows();

        *p.grad.borrow_mut() = Some(Tensor::new(vec![1.0, 0.0], [1, 2]).unwrap());
        p.backward();

        assert_close(x.grad.borrow().as_ref().unwrap().data(), &[0.25, -0.25], 1e-6);
    }

    #[test]
    fn test_softmax_large_logits() {
        // Max subtraction keeps this finite.
        let x = Variable::new(Tensor::<f32, 2>::new(vec![1000.0, 1000.0], [1, 2]).unwrap());
        let p = x.softmax_rows();
        assert_close(p.data.data(), &[0.5, 0.5], 1e-6);
    }

    #[test]
    fn test_tanh_backward() {
        let x = Variable::new(Tensor::<f32, 1>::new(vec![0.0], [1]).unwrap());
        let y = x.tanh();
        assert_eq!(y.data.data(), &[0.0]);

        y.backward();
        // d(tanh)/dx at 0 is 1.
        assert_close(x.grad.borrow().as_ref().unwrap().data(), &[1.0], 1e-6);
    }

    #[test]
    fn test_gelu_values() {
        let x = Variable::new(Tensor::<f32, 1>::new(vec![0.0, 10.0, -10.0], [3]).unwrap());
        let y = x.gelu();

        // gelu(0) = 0, gelu(x) -> x for large x, -> 0 for very negative x.
        assert_close(y.data.data(), &[0.0, 10.0, 0.0], 1e-3);
    }

    #[test]
    fn test_gelu_backward_at_zero() {
        let x = Variable::new(Tensor::<f32, 1>::new(vec![0.0], [1]).unwrap());
        let y = x.gelu();
        y.backward();

        // dy/dx at 0 = 0.5.
        assert_close(x.grad.borrow().as_ref().unwrap().data(), &[0.5], 1e-6);
    }

    #[test]
    fn test_layer_norm_forward() {
        let x = Variable::new(Tensor::<f32, 2>::new(vec![1.0, 3.0], [1, 2]).unwrap());
        let gamma = Variable::new(Tensor::<f32, 1>::ones([2]));
        let beta = Variable::new(Tensor::<f32, 1>::zeros([2]));

        let y = layer_norm(&x, &gamma, &beta, 1e-6).unwrap();
        // mean 2, var 1: x_hat = [-1, 1]
        assert_close(y.data.data(), &[-1.0, 1.0], 1e-3);
    }

    #[test]
    fn test_layer_norm_shift_scale() {
        let x = Variable::new(Tensor::<f32, 2>::new(vec![1.0, 3.0], [1, 2]).unwrap());
        let gamma = Variable::new(Tensor::<f32, 1>::new(vec![2.0, 2.0], [2]).unwrap());
        let beta = Variable::new(Tensor::<f32, 1>::new(vec![10.0, 10.0], [2]).unwrap());

        let y = layer_norm(&x, &gamma, &beta, 1e-6).unwrap();
        assert_close(y.data.data(), &[8.0, 12.0], 1e-3);
    }

    #[test]
    fn test_layer_norm_beta_gamma_grads() {
        let x = Variable::new(Tensor::<f32, 2>::new(vec![1.0, 3.0, 2.0, 6.0], [2, 2]).unwrap());
        let gamma = Variable::new(Tensor::<f32, 1>::ones([2]));
        let beta = Variable::new(Tensor::<f32, 1>::zeros([2]));

        let y = layer_norm(&x, &gamma, &beta, 1e-6).unwrap();
        *y.grad.borrow_mut() = Some(Tensor::ones([2, 2]));
        y.backward();

        // dbeta = column sums of the upstream gradient.
        assert_close(beta.grad.borrow().as_ref().unwrap().data(), &[2.0, 2.0], 1e-5);
        // Both rows normalize to [-1, 1], so dgamma = [-2, 2].
        assert_close(gamma.grad.borrow().as_ref().unwrap().data(), &[-2.0, 2.0], 1e-3);
    }

    #[test]
    fn test_layer_norm_shape_error() {
        let x = Variable::new(Tensor::<f32, 2>::zeros([1, 4]));
        let gamma = Variable::new(Tensor::<f32, 1>::zeros([3]));
        let beta = Variable::new(Tensor::<f32, 1>::zeros([4]));
        assert!(layer_norm(&x, &gamma, &beta, 1e-6).is_err());
    }
}
