//! One-hot embedding lookup.
//!
//! An embedding turns a token id into a dense vector: row `id` of a
//! `[vocab, hidden]` table. The usual implementation is a gather, but a
//! gather's backward is a scatter, which sharding runtimes historically
//! struggled to partition. The workaround (used verbatim by the original
//! demo) is to express the lookup as `one_hot(ids) @ table`: a plain
//! matmul, which every sharding pass understands. Wasteful for big vocabs,
//! perfectly fine for a toy one.

use super::uniform_init;
use crate::autograd::Variable;
use crate::tensor::{Result, Tensor, TensorElem, TensorError};
use rand::Rng;

/// Embedding layer implemented as one-hot matmul.
#[derive(Clone, Debug)]
pub struct OneHotEmbedding<T: TensorElem> {
    /// The `[vocab, hidden]` table.
    pub table: Variable<T, 2>,
    vocab_size: usize,
}

impl<T: TensorElem + 'static> OneHotEmbedding<T> {
    pub fn new(vocab_size: usize, hidden: usize, rng: &mut impl Rng) -> Self {
        Self {
            table: uniform_init([vocab_size, hidden], 0.05, rng),
            vocab_size,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Looks up `ids`, returning `[ids.len(), hidden]`.
    ///
    /// # Errors
    ///
    /// `TensorError::IndexOutOfBounds` if any id is outside the vocabulary.
    pub fn forward(&self, ids: &[u32]) -> Result<Variable<T, 2>> {
        let mut one_hot = Tensor::<T, 2>::zeros([ids.len(), self.vocab_size]);
        for (row, &id) in ids.iter().enumerate() {
            let id = id as usize;
            if id >= self.vocab_size {
                return Err(TensorError::IndexOutOfBounds {
                    index: vec![id],
                    shape: vec![self.vocab_size],
                });
            }
            one_hot.data_mut()[row * self.vocab_size + id] = T::one();
        }

        // The one-hot matrix is a constant; only the table receives
        // gradients through the matmul.
        Variable::new(one_hot).matmul(&self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_lookup_selects_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let emb = OneHotEmbedding::<f32>::new(5, 3, &mut rng);

        let out = emb.forward(&[2, 0, 2]).unwrap();
        assert_eq!(out.data.shape(), &[3, 3]);

        let table = emb.table.data.data();
        assert_eq!(&out.data.data()[0..3], &table[6..9]); // row 2
        assert_eq!(&out.data.data()[3..6], &table[0..3]); // row 0
        assert_eq!(&out.data.data()[6..9], &table[6..9]); // row 2 again
    }

    #[test]
    fn test_out_of_vocab_id() {
        let mut rng = StdRng::seed_from_u64(1);
        let emb = OneHotEmbedding::<f32>::new(5, 3, &mut rng);
        assert!(emb.forward(&[5]).is_err());
    }

    #[test]
    fn test_table_gradient_is_scatter() {
        let mut rng = StdRng::seed_from_u64(1);
        let emb = OneHotEmbedding::<f32>::new(4, 2, &mut rng);

        let out = emb.forward(&[1, 1]).unwrap();
        *out.grad.borrow_mut() =
            Some(Tensor::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap());
        out.backward();

        let grad = emb.table.grad.borrow();
        let grad = grad.as_ref().unwrap();
        // Both lookups hit row 1: its gradient is the sum, other rows zero.
        assert_eq!(grad.data(), &[0.0, 0.0, 4.0, 6.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
