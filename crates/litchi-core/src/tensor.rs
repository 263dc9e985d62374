use crate::error::{Error, Result};
use crate::scalar::Scalar;

// Tensor — A batch of samples
//
// Data moves through the graph as plain nested vectors:
//
//   Vector = Vec<Scalar>   — one sample, flattened by its Shape3D
//   Tensor = Vec<Vector>   — one Vector per sample in the batch
//
// There is no stride or view machinery here; a layer only ever needs to walk
// samples in order and index within a sample. The helpers below are the only
// behavior the model has: filling, zero-allocating, growing and checking
// per-sample lengths.
//
// GROWTH-ONLY:
//
//   Edge buffers are reused across forward calls. When a bigger batch comes
//   in the tensor grows; when a smaller one comes in it keeps its high-water
//   length so later large batches do not reallocate. Samples that already
//   exist are never touched by a resize.

/// One sample: a flat run of scalars.
pub type Vector = Vec<Scalar>;

/// A batch of samples.
pub type Tensor = Vec<Vector>;

/// Allocate `samples` zero vectors of length `dim`.
pub fn zeros(samples: usize, dim: usize) -> Tensor {
    vec![vec![0.0; dim]; samples]
}

/// Write `value` into every element of every sample.
pub fn fill_tensor(tensor: &mut Tensor, value: Scalar) {
    for sample in tensor.iter_mut() {
        sample.iter_mut().for_each(|v| *v = value);
    }
}

/// Grow `tensor` to at least `samples` entries, appending zero vectors of
/// length `dim`. Never shrinks and never modifies existing samples.
pub fn grow_tensor(tensor: &mut Tensor, samples: usize, dim: usize) {
    if tensor.len() < samples {
        tensor.resize(samples, vec![0.0; dim]);
    }
}

/// Check that every sample of `tensor` holds exactly `dim` scalars.
pub fn check_sample_len(what: &'static str, tensor: &Tensor, dim: usize) -> Result<()> {
    match tensor.iter().find(|s| s.len() != dim) {
        Some(bad) => Err(Error::ShapeInconsistency {
            what,
            expected: dim,
            got: bad.len(),
        }),
        None => Ok(()),
    }
}

/// Check that `tensor` has at least `samples` entries and that each of the
/// first `samples` holds `dim` scalars.
pub fn check_batch(what: &'static str, tensor: &Tensor, samples: usize, dim: usize) -> Result<()> {
    if tensor.len() < samples {
        return Err(Error::IndexOutOfRange {
            what,
            index: samples.saturating_sub(1),
            len: tensor.len(),
        });
    }
    match tensor[..samples].iter().find(|s| s.len() != dim) {
        Some(bad) => Err(Error::ShapeInconsistency {
            what,
            expected: dim,
            got: bad.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = zeros(3, 4);
        assert_eq!(t.len(), 3);
        assert!(t.iter().all(|s| s.len() == 4 && s.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn test_fill_tensor() {
        let mut t = zeros(2, 3);
        fill_tensor(&mut t, 1.5);
        assert!(t.iter().flatten().all(|&v| v == 1.5));
    }

    #[test]
    fn test_grow_preserves_existing_samples() {
        let mut t: Tensor = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let before = t.clone();
        grow_tensor(&mut t, 5, 2);
        assert_eq!(t.len(), 5);
        assert_eq!(&t[..2], &before[..]);
        assert_eq!(t[4], vec![0.0, 0.0]);
    }

    #[test]
    fn test_grow_never_shrinks() {
        let mut t = zeros(4, 2);
        t[3][1] = 9.0;
        grow_tensor(&mut t, 2, 2);
        assert_eq!(t.len(), 4);
        assert_eq!(t[3][1], 9.0);
    }

    #[test]
    fn test_check_sample_len() {
        let t: Tensor = vec![vec![0.0; 3], vec![0.0; 2]];
        assert!(check_sample_len("input", &t[..1].to_vec(), 3).is_ok());
        match check_sample_len("input", &t, 3) {
            Err(Error::ShapeInconsistency { expected, got, .. }) => {
                assert_eq!(expected, 3);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_batch() {
        let t = zeros(2, 3);
        assert!(check_batch("out", &t, 2, 3).is_ok());
        assert!(check_batch("out", &t, 1, 3).is_ok());
        assert!(matches!(
            check_batch("out", &t, 3, 3),
            Err(Error::IndexOutOfRange { index: 2, len: 2, .. })
        ));
        assert!(matches!(
            check_batch("out", &t, 2, 4),
            Err(Error::ShapeInconsistency { expected: 4, got: 3, .. })
        ));
    }
}
