//! Storage abstraction for Tensors.
//!
//! A `Tensor` holds metadata (shape, strides); the `Storage` holds the bits.
//! Keeping the two apart lets the same tensor API sit on top of different
//! memory containers: `Vec<T>` today, a GPU buffer or a memory-mapped
//! checkpoint some day. Operations assume the storage is one contiguous
//! block, which is what the kernels and the mesh block-copy code require.

use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A trait for the underlying data container of a tensor.
pub trait Storage<T>: Clone + Debug + Send + Sync {
    /// Returns the data as an immutable slice.
    fn as_slice(&self) -> &[T];

    /// Returns the data as a mutable slice.
    fn as_mut_slice(&mut self) -> &mut [T];

    /// Returns the number of elements in the storage.
    fn len(&self) -> usize;

    /// Returns `true` if the storage contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies data from a slice into the storage.
    fn copy_from_slice(&mut self, src: &[T])
    where
        T: Copy,
    {
        self.as_mut_slice().copy_from_slice(src);
    }
}

/// Standard heap storage for CPU tensors.
impl<T: TensorElem> Storage<T> for Vec<T> {
    fn as_slice(&self) -> &[T] {
        self
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
    fn len(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_storage() {
        let mut storage = vec![1.0, 2.0, 3.0];

        assert_eq!(storage.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(Storage::len(&storage), 3);
        assert!(!Storage::is_empty(&storage));

        storage.as_mut_slice()[0] = 10.0;
        assert_eq!(storage.as_slice(), &[10.0, 2.0, 3.0]);

        Storage::copy_from_slice(&mut storage, &[4.0, 5.0, 6.0]);
        assert_eq!(storage.as_slice(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_empty_storage() {
        let storage: Vec<f32> = vec![];
        assert!(Storage::is_empty(&storage));
    }
}
