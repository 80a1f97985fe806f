//! Tensor operations.
//!
//! The mathematical engine of the crate:
//! - **Element-wise arithmetic**: `+`, `-`, `*`, `/` on `&Tensor` (strict
//!   same-shape; no implicit broadcasting — the autograd layer has explicit
//!   ops for the one broadcast the model needs, bias addition).
//! - **Matrix multiplication**: delegated to the kernels crate.
//! - **Block slicing**: rank-2 sub-matrix extraction and accumulation, the
//!   primitive the attention layers use to route per-batch, per-head blocks
//!   through plain 2-D matmuls.
//!
//! All element-wise loops are parallelized with `rayon`.

use super::{compute_strides, Cpu, Device, Result, Tensor, TensorElem, TensorError};

use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Range, Sub};

/// Implements a binary arithmetic trait (e.g. `Add`) for `&Tensor`.
///
/// Handles the shared boilerplate: shape check, output allocation, and the
/// parallel element-wise loop.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK, Cpu>
        where
            T: TensorElem,
        {
            type Output = crate::tensor::Result<Tensor<T, RANK, Cpu>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .as_mut_slice()
                    .par_iter_mut()
                    .zip(self.data.as_slice().par_iter())
                    .zip(rhs.data.as_slice().par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);
impl_bin_op!(Div, div);

/// Trait for tensor operations that depend on the device implementation.
pub trait TensorOps<T: TensorElem, const RANK: usize> {
    type Device;

    /// Transposes the last two dimensions.
    fn transpose(&self) -> Result<Tensor<T, RANK, <Self as HasDevice>::Device>>
    where
        Self: HasDevice,
        <Self as HasDevice>::Device: Device;
}

/// Helper trait to access the device type.
pub trait HasDevice {
    type Device;
}

impl<T: TensorElem, const RANK: usize, D: Device> HasDevice for Tensor<T, RANK, D> {
    type Device = D;
}

impl<T, const RANK: usize, D: Device> TensorOps<T, RANK> for Tensor<T, RANK, D>
where
    T: TensorElem,
{
    type Device = D;

    fn transpose(&self) -> Result<Tensor<T, RANK, <Self as HasDevice>::Device>> {
        let out_data = D::transpose(&self.data, &self.shape)?;

        let mut new_shape = self.shape;
        if RANK >= 2 {
            new_shape.swap(RANK - 1, RANK - 2);
        }

        let strides = compute_strides(&new_shape);
        Ok(Tensor {
            shape: new_shape,
            strides,
            data: out_data,
            device: self.device.clone(),
        })
    }
}

impl<T, const RANK: usize> Tensor<T, RANK, Cpu>
where
    T: TensorElem,
{
    /// Applies a function element-wise, returning a new tensor.
    ///
    /// ```rust
    /// use meshgrad::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// let squared = t.map(|x| x * x);
    /// assert_eq!(squared.data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .as_mut_slice()
            .par_iter_mut()
            .zip(self.data.as_slice().par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }

    /// Multiplies every element by a scalar.
    pub fn scale(&self, factor: T) -> Self {
        self.map(|x| x * factor)
    }

    /// Matrix multiplication on the last two dimensions.
    ///
    /// - Rank 2: `[M, K] x [K, N] -> [M, N]`
    /// - Rank 3+: leading dimensions are batch dimensions and must match.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        if RANK < 2 {
            return Err(TensorError::Unsupported(
                "Matmul requires rank >= 2".into(),
            ));
        }

        let m = self.shape[RANK - 2];
        let n = rhs.shape[RANK - 1];

        if self.shape[..RANK - 2] != rhs.shape[..RANK - 2] {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.to_vec(),
                got: rhs.shape.to_vec(),
            });
        }

        let mut out_shape = self.shape;
        out_shape[RANK - 2] = m;
        out_shape[RANK - 1] = n;

        // This is the seam where a BLAS call would be swapped in.
        let out_data = meshgrad_kernels::cpu_matmul(
            self.data.as_slice(),
            rhs.data.as_slice(),
            &self.shape,
            &rhs.shape,
        )
        .map_err(|e| match e {
            meshgrad_kernels::KernelError::ShapeMismatch { expected, got } => {
                TensorError::ShapeMismatch { expected, got }
            }
        })?;

        let strides = compute_strides(&out_shape);
        Ok(Tensor {
            shape: out_shape,
            strides,
            data: out_data,
            device: Cpu,
        })
    }
}

impl<T> Tensor<T, 2, Cpu>
where
    T: TensorElem,
{
    /// Copies out a rectangular block `[rows, cols]` of a matrix.
    pub fn slice_block(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Self> {
        let [n_rows, n_cols] = self.shape;
        if rows.end > n_rows || cols.end > n_cols || rows.start > rows.end || cols.start > cols.end
        {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![rows.end, cols.end],
                shape: self.shape.to_vec(),
            });
        }

        let out_rows = rows.end - rows.start;
        let out_cols = cols.end - cols.start;
        let mut out = Tensor::zeros([out_rows, out_cols]);

        for (out_r, r) in rows.clone().enumerate() {
            let src_start = r * n_cols + cols.start;
            let dst_start = out_r * out_cols;
            out.data[dst_start..dst_start + out_cols]
                .copy_from_slice(&self.data[src_start..src_start + out_cols]);
        }

        Ok(out)
    }

    /// Adds `block` into the rectangular region `[rows, cols]` in place.
    ///
    /// The counterpart of [`slice_block`](Self::slice_block); the autograd
    /// slice/concat nodes use it to accumulate gradients back into the
    /// region they were cut from.
    pub fn accumulate_block(
        &mut self,
        rows: Range<usize>,
        cols: Range<usize>,
        block: &Self,
    ) -> Result<()> {
        let [n_rows, n_cols] = self.shape;
        if rows.end > n_rows || cols.end > n_cols || rows.start > rows.end || cols.start > cols.end
        {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![rows.end, cols.end],
                shape: self.shape.to_vec(),
            });
        }

        let out_rows = rows.end - rows.start;
        let out_cols = cols.end - cols.start;
        if *block.shape() != [out_rows, out_cols] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![out_rows, out_cols],
                got: block.shape().to_vec(),
            });
        }

        for (blk_r, r) in rows.clone().enumerate() {
            let dst_start = r * n_cols + cols.start;
            let src_start = blk_r * out_cols;
            for c in 0..out_cols {
                self.data[dst_start + c] += block.data[src_start + c];
            }
        }

        Ok(())
    }
}
