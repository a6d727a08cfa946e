//! Convolution kernels: construction and composition.
//!
//! A [`Kernel`] is a square matrix of weights plus an output scale (`factor`)
//! and offset (`bias`). Kernels are immutable after construction and are
//! shared read-only across every worker thread applying them.

pub mod presets;

use crate::core::error::{AllocationError, KernelError, KernelResult};

/// A square convolution kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    factor: f64,
    bias: f64,
    // Row-major, size * size entries.
    weights: Vec<f64>,
}

impl Kernel {
    /// Build a kernel from row-major weights.
    ///
    /// `size` must be odd and at least 1, and `values` must hold exactly
    /// `size * size` weights. The weight matrix is allocated all-or-nothing;
    /// an allocation failure returns an error rather than a partial kernel.
    pub fn new(size: usize, factor: f64, bias: f64, values: &[f64]) -> KernelResult<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(KernelError::InvalidSize(size));
        }
        let expected = size * size;
        if values.len() != expected {
            return Err(KernelError::WeightCount {
                size,
                expected,
                got: values.len(),
            });
        }

        let mut weights = Vec::new();
        weights
            .try_reserve_exact(expected)
            .map_err(|_| AllocationError {
                what: "kernel weights",
                bytes: expected * std::mem::size_of::<f64>(),
            })?;
        weights.extend_from_slice(values);

        Ok(Self {
            size,
            factor,
            bias,
            weights,
        })
    }

    /// The identity kernel of the given size: center weight 1, rest 0.
    pub fn identity(size: usize) -> KernelResult<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(KernelError::InvalidSize(size));
        }
        let mut values = vec![0.0; size * size];
        values[(size / 2) * size + size / 2] = 1.0;
        Self::new(size, 1.0, 0.0, &values)
    }

    /// Kernel side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Output scale applied to the accumulated sum.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Output offset added after scaling.
    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Weight at `(row, col)`.
    #[inline]
    pub fn weight(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.size + col]
    }

    /// Compose this kernel with `other` into a single equivalent kernel.
    ///
    /// Applying the result once is equivalent (up to the per-pixel integer
    /// truncation) to applying `self` and then `other`. The weight matrix of
    /// the result is the discrete 2D convolution of the two weight matrices:
    ///
    /// - `size = self.size + other.size - 1`
    /// - `factor = self.factor * other.factor`
    /// - `bias = self.bias * other.factor + other.bias`
    /// - `weights[i][j] = sum over (p, q) of self[p][q] * other[i-p][j-q]`
    ///   for every index pair that lands inside both matrices.
    ///
    /// The summation ranges over the first kernel's full bounds with the
    /// second's bounds as the in-range guard, so kernels of different sizes
    /// compose correctly.
    pub fn compose(&self, other: &Kernel) -> KernelResult<Kernel> {
        let new_size = self.size + other.size - 1;
        let mut weights = Vec::new();
        weights
            .try_reserve_exact(new_size * new_size)
            .map_err(|_| AllocationError {
                what: "kernel weights",
                bytes: new_size * new_size * std::mem::size_of::<f64>(),
            })?;
        weights.resize(new_size * new_size, 0.0);

        for i in 0..new_size {
            for j in 0..new_size {
                let mut acc = 0.0;
                for p in 0..self.size {
                    for q in 0..self.size {
                        let oi = i as isize - p as isize;
                        let oj = j as isize - q as isize;
                        if oi >= 0
                            && (oi as usize) < other.size
                            && oj >= 0
                            && (oj as usize) < other.size
                        {
                            acc += self.weight(p, q) * other.weight(oi as usize, oj as usize);
                        }
                    }
                }
                weights[i * new_size + j] = acc;
            }
        }

        Ok(Kernel {
            size: new_size,
            factor: self.factor * other.factor,
            bias: self.bias * other.factor + other.bias,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_size() {
        assert!(matches!(
            Kernel::new(0, 1.0, 0.0, &[]),
            Err(KernelError::InvalidSize(0))
        ));
        assert!(matches!(
            Kernel::new(4, 1.0, 0.0, &[0.0; 16]),
            Err(KernelError::InvalidSize(4))
        ));
    }

    #[test]
    fn test_new_validates_weight_count() {
        assert!(matches!(
            Kernel::new(3, 1.0, 0.0, &[0.0; 8]),
            Err(KernelError::WeightCount { expected: 9, .. })
        ));
    }

    #[test]
    fn test_create_kernel() {
        let values = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let k = Kernel::new(3, 1.0, 0.0, &values).unwrap();
        assert_eq!(k.size(), 3);
        assert_eq!(k.factor(), 1.0);
        assert_eq!(k.bias(), 0.0);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(k.weight(i, j), values[i * 3 + j]);
            }
        }
    }

    #[test]
    fn test_identity_kernel() {
        let k = Kernel::identity(5).unwrap();
        assert_eq!(k.weight(2, 2), 1.0);
        assert_eq!(
            k.weights.iter().copied().sum::<f64>(),
            1.0,
            "only the center weight is set"
        );
    }

    #[test]
    fn test_compose_size_factor_bias() {
        let a = Kernel::new(3, 0.5, 2.0, &[0.0; 9]).unwrap();
        let b = Kernel::new(5, 4.0, 1.0, &[0.0; 25]).unwrap();
        let c = a.compose(&b).unwrap();
        assert_eq!(c.size(), 7);
        assert_eq!(c.factor(), 2.0);
        assert_eq!(c.bias(), 9.0); // 2.0 * 4.0 + 1.0
    }

    #[test]
    fn test_compose_with_identity_preserves_weights() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let a = Kernel::new(3, 1.0, 0.0, &values).unwrap();
        let id = Kernel::identity(1).unwrap();

        // Composing with the 1x1 identity must not change the matrix.
        let c = a.compose(&id).unwrap();
        assert_eq!(c.size(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(c.weight(i, j), a.weight(i, j));
            }
        }

        let c = id.compose(&a).unwrap();
        assert_eq!(c.size(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(c.weight(i, j), a.weight(i, j));
            }
        }
    }

    #[test]
    fn test_compose_mismatched_sizes() {
        // 1x1 doubler convolved with a 3x3 ones matrix: every entry doubled.
        let a = Kernel::new(1, 1.0, 0.0, &[2.0]).unwrap();
        let b = Kernel::new(3, 1.0, 0.0, &[1.0; 9]).unwrap();
        let c = a.compose(&b).unwrap();
        assert_eq!(c.size(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(c.weight(i, j), 2.0);
            }
        }
    }

    #[test]
    fn test_compose_shift_kernels_cancel() {
        // Shift right (read from x-1) then shift left (read from x+1)
        // composes to the identity.
        let mut right = [0.0; 9];
        right[3] = 1.0; // row 1, col 0
        let mut left = [0.0; 9];
        left[5] = 1.0; // row 1, col 2

        let r = Kernel::new(3, 1.0, 0.0, &right).unwrap();
        let l = Kernel::new(3, 1.0, 0.0, &left).unwrap();
        let c = r.compose(&l).unwrap();

        assert_eq!(c.size(), 5);
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == 2 && j == 2 { 1.0 } else { 0.0 };
                assert_eq!(c.weight(i, j), expected, "at ({i}, {j})");
            }
        }
    }
}
