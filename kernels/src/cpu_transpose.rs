use crate::{KernelElem, Result};
use rayon::prelude::*;

/// Swaps the last two dimensions of row-major data.
///
/// Leading dimensions are treated as batch dimensions. Used directly by the
/// tensor `transpose` op and internally by `cpu_matmul` to linearize access
/// to the right-hand operand.
pub fn cpu_transpose<T, const RANK: usize>(data: &[T], shape: &[usize; RANK]) -> Result<Vec<T>>
where
    T: KernelElem,
{
    let m = shape[RANK - 2];
    let n = shape[RANK - 1];

    let mut new_shape = *shape;
    new_shape.swap(RANK - 1, RANK - 2);
    let size: usize = new_shape.iter().product();
    if data.len() != size {
        return Err(crate::KernelError::ShapeMismatch {
            expected: vec![size],
            got: vec![data.len()],
        });
    }
    let mut out_data = vec![T::zero(); size];

    // Parallelize over rows of the output, viewed as [batch * N, M].
    out_data
        .as_mut_slice()
        .par_chunks_mut(m)
        .enumerate()
        .for_each(|(i, out_row)| {
            let batch_idx = i / n;
            let col_idx = i % n;

            let input_batch_offset = batch_idx * m * n;

            // Output row i is input column `col_idx` of batch `batch_idx`.
            for (r, out_elem) in out_row.iter_mut().enumerate() {
                *out_elem = data[input_batch_offset + r * n + col_idx];
            }
        });

    Ok(out_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_simple() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3

        let result = cpu_transpose(&data, &[2, 3]).unwrap();
        // [1, 4]
        // [2, 5]
        // [3, 6]
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_transpose_batch() {
        let data = vec![
            1.0, 2.0, 3.0, 4.0, // Matrix 1
            5.0, 6.0, 7.0, 8.0, // Matrix 2
        ];

        let result = cpu_transpose(&data, &[2, 2, 2]).unwrap();
        let expected = vec![1.0, 3.0, 2.0, 4.0, 5.0, 7.0, 6.0, 8.0];
        assert_eq!(result, expected);
    }

    #[test]
    fn test_transpose_size_mismatch() {
        let data = vec![1.0, 2.0];
        let err = cpu_transpose(&data, &[2, 2]);
        assert!(matches!(err, Err(crate::KernelError::ShapeMismatch { .. })));
    }
}
