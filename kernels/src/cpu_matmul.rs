use crate::{KernelElem, Result};
use rayon::prelude::*;

/// Row-major (batched) matrix multiplication.
///
/// Multiplies the last two dimensions; leading dimensions are treated as
/// batch dimensions and must match between the operands. The right-hand side
/// is transposed up front so both inner loops walk memory sequentially.
///
/// This is the single hot loop behind every dense layer and attention score
/// in the encoder, so it is the natural place to drop in `sgemm` from a BLAS
/// if the demo ever needs to scale past toy sizes.
pub fn cpu_matmul<T, const RANK: usize>(
    lhs_data: &[T],
    rhs_data: &[T],
    lhs_shape: &[usize; RANK],
    rhs_shape: &[usize; RANK],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let m = lhs_shape[RANK - 2];
    let k = lhs_shape[RANK - 1];
    let n = rhs_shape[RANK - 1];

    if k != rhs_shape[RANK - 2] {
        return Err(crate::KernelError::ShapeMismatch {
            expected: vec![k],
            got: vec![rhs_shape[RANK - 2]],
        });
    }

    let mut out_shape = *lhs_shape;
    out_shape[RANK - 2] = m;
    out_shape[RANK - 1] = n;
    let size: usize = out_shape.iter().product();
    let mut out_data = vec![T::zero(); size];

    // rhs is [..., K, N]; transpose to [..., N, K] for sequential access.
    let rhs_t_data = super::cpu_transpose::cpu_transpose(rhs_data, rhs_shape)?;

    // Parallelize over output rows across all batches.
    out_data
        .as_mut_slice()
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(global_row_idx, out_row)| {
            let batch_idx = global_row_idx / m;
            let row_in_matrix = global_row_idx % m;

            let a_batch_offset = batch_idx * m * k;
            let b_t_batch_offset = batch_idx * n * k;

            let a_row_start = a_batch_offset + row_in_matrix * k;
            let a_slice = &lhs_data[a_row_start..a_row_start + k];

            for (col_in_matrix, out_elem) in out_row.iter_mut().enumerate() {
                let b_t_row_start = b_t_batch_offset + col_in_matrix * k;
                let b_t_slice = &rhs_t_data[b_t_row_start..b_t_row_start + k];

                let mut sum = T::zero();
                for (&val_a, &val_b) in a_slice.iter().zip(b_t_slice.iter()) {
                    sum += val_a * val_b;
                }
                *out_elem = sum;
            }
        });

    Ok(out_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KernelError;

    #[test]
    fn test_matmul_simple() {
        let a = vec![1.0, 2.0, 3.0, 4.0]; // 2x2
        let b = vec![5.0, 6.0, 7.0, 8.0]; // 2x2

        let result = cpu_matmul(&a, &b, &[2, 2], &[2, 2]).unwrap();
        // [1*5+2*7, 1*6+2*8] = [19, 22]
        // [3*5+4*7, 3*6+4*8] = [43, 50]
        assert_eq!(result, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_rectangular() {
        // [1, 3] x [3, 2] -> [1, 2]
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0];

        let result = cpu_matmul(&a, &b, &[1, 3], &[3, 2]).unwrap();
        assert_eq!(result, vec![14.0, 32.0]);
    }

    #[test]
    fn test_matmul_batch() {
        // Batch size 2, 2x2 matrices
        let a = vec![
            1.0, 0.0, 0.0, 1.0, // Identity
            2.0, 0.0, 0.0, 2.0, // Scaled identity
        ];
        let b = vec![
            1.0, 2.0, 3.0, 4.0, // B1
            5.0, 6.0, 7.0, 8.0, // B2
        ];

        let result = cpu_matmul(&a, &b, &[2, 2, 2], &[2, 2, 2]).unwrap();
        let expected = vec![1.0, 2.0, 3.0, 4.0, 10.0, 12.0, 14.0, 16.0];
        assert_eq!(result, expected);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = vec![1.0; 4]; // 2x2
        let b = vec![1.0; 6]; // 3x2 -> inner dim mismatch

        let err = cpu_matmul(&a, &b, &[2, 2], &[3, 2]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }
}
