//! This module defines the core abstraction for linear operators.
//!
//! The Arnoldi process never inspects individual entries of the matrix A.
//! Its only interaction with A is the matrix-vector product, so the solver
//! is written against a "matrix-free" contract: any object that can compute
//! `y = A * x` for an n-vector `x` can drive the iteration. This keeps the
//! algorithm generic over dense matrices, sparse matrices, and user-defined
//! operators (e.g. the result of a physical simulation that is never
//! assembled explicitly), and it makes the core easy to test against small
//! dense problems with known spectra.
//!
//! Two capability sets are defined:
//!
//! * [`LinearOperator`]: the plain product `y = A * x`, used by the standard
//!   eigensolver.
//! * [`RealShiftSolve`]: the shift-and-invert product
//!   `y = (A - sigma * I)^{-1} * x`, used by the shift-and-invert solver to
//!   target eigenvalues near `sigma`.
//!
//! Vectors cross the boundary as `n x 1` [`faer`] matrix views. The callee
//! must not mutate `x` (the shared view enforces this) and must fully
//! overwrite `y`.

use crate::error::{EigsError, EigsErrorKind};
use faer::linalg::solvers::PartialPivLu;
use faer::linalg::solvers::Solve;
use faer::sparse::SparseColMat;
use faer::{Mat, MatMut, MatRef};

/// Represents a linear operator that can be applied to a vector.
///
/// This trait provides an abstraction for the matrix-vector product, the
/// fundamental operation required by Krylov subspace methods. The operator is
/// conceptually an `n x n` real matrix; `rows` returns `n`.
///
/// # Example
///
/// A generic power-iteration step written against the contract:
///
/// ```
/// use arnoldi_eigs::LinearOperator;
/// use faer::Mat;
///
/// fn power_step(operator: &impl LinearOperator, x: &Mat<f64>) -> Mat<f64> {
///     let mut y = Mat::zeros(operator.rows(), 1);
///     operator.apply(x.as_ref(), y.as_mut());
///     let norm = y.norm_l2();
///     &y * faer::Scale(1.0 / norm)
/// }
///
/// let a = Mat::from_fn(4, 4, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
/// let x = Mat::from_fn(4, 1, |_, _| 1.0);
/// let y = power_step(&a, &x);
/// assert!((y.norm_l2() - 1.0).abs() < 1e-14);
/// ```
pub trait LinearOperator {
    /// Returns the dimension `n` of the (square) operator.
    fn rows(&self) -> usize;

    /// Computes `y = A * x`, where `x` and `y` are `n x 1` views.
    ///
    /// # Panics
    ///
    /// Implementations are expected to panic if the dimension of `x` does not
    /// match the operator.
    fn apply(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>);
}

/// Any shared reference to an operator is itself an operator. This is what
/// lets the solver own an `&A` while the caller keeps the matrix.
impl<O: LinearOperator + ?Sized> LinearOperator for &O {
    #[inline]
    fn rows(&self) -> usize {
        (**self).rows()
    }

    #[inline]
    fn apply(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) {
        (**self).apply(x, y)
    }
}

/// Implementation of [`LinearOperator`] for `faer`'s immutable dense matrix
/// view. This is the primary concrete implementation that the solver is
/// tested against.
impl<'a> LinearOperator for MatRef<'a, f64> {
    #[inline]
    fn rows(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) {
        assert_eq!(
            self.ncols(),
            x.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.ncols(),
            x.nrows(),
        );
        let mut y = y;
        let product = self * x;
        y.copy_from(&product);
    }
}

/// Implementation of [`LinearOperator`] for `faer`'s owned dense matrix.
/// Delegates to the `MatRef` implementation.
impl LinearOperator for Mat<f64> {
    #[inline]
    fn rows(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn apply(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) {
        self.as_ref().apply(x, y)
    }
}

/// Implementation of [`LinearOperator`] for `faer`'s compressed sparse column
/// matrix, covering the common case of large sparse eigenproblems.
impl LinearOperator for SparseColMat<usize, f64> {
    #[inline]
    fn rows(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) {
        assert_eq!(
            self.ncols(),
            x.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.ncols(),
            x.nrows(),
        );
        let mut y = y;
        let product = self.as_ref() * x;
        y.copy_from(&product);
    }
}

/// The capability set required by the shift-and-invert solver.
///
/// `apply_shift_solve` computes `y = (A - sigma * I)^{-1} * x`. The shift is
/// installed once through `set_shift` before the iteration starts, so
/// implementations can factor `A - sigma * I` a single time and reuse the
/// factorization for every application.
pub trait RealShiftSolve {
    /// Returns the dimension `n` of the (square) operator.
    fn rows(&self) -> usize;

    /// Installs the shift `sigma`. Called once, before any
    /// `apply_shift_solve`.
    fn set_shift(&mut self, sigma: f64);

    /// Computes `y = (A - sigma * I)^{-1} * x`.
    ///
    /// # Panics
    ///
    /// Panics if `set_shift` has not been called, or if the dimension of `x`
    /// does not match the operator.
    fn apply_shift_solve(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>);
}

/// Shift-and-invert wrapper around a dense matrix.
///
/// `set_shift` performs one LU decomposition with partial pivoting of
/// `A - sigma * I`; each `apply_shift_solve` is then a pair of triangular
/// solves.
pub struct DenseRealShiftSolve {
    mat: Mat<f64>,
    lu: Option<PartialPivLu<f64>>,
}

impl DenseRealShiftSolve {
    /// Wraps the dense matrix `mat`. The matrix must be square.
    pub fn new(mat: Mat<f64>) -> Result<Self, EigsError> {
        if mat.nrows() != mat.ncols() {
            return Err(EigsErrorKind::InputError(format!(
                "shift-solve operator must be square, got {} x {}",
                mat.nrows(),
                mat.ncols()
            ))
            .into());
        }
        Ok(Self { mat, lu: None })
    }
}

impl RealShiftSolve for DenseRealShiftSolve {
    #[inline]
    fn rows(&self) -> usize {
        self.mat.nrows()
    }

    fn set_shift(&mut self, sigma: f64) {
        let n = self.mat.nrows();
        let mut shifted = self.mat.clone();
        for i in 0..n {
            shifted.as_mut()[(i, i)] -= sigma;
        }
        self.lu = Some(shifted.as_ref().partial_piv_lu());
    }

    fn apply_shift_solve(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) {
        let lu = self
            .lu
            .as_ref()
            .expect("set_shift must be called before apply_shift_solve");
        assert_eq!(
            self.mat.ncols(),
            x.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.mat.ncols(),
            x.nrows(),
        );
        let mut y = y;
        let solution = lu.solve(x);
        y.copy_from(&solution);
    }
}

// Unit tests to verify the correctness of the operator abstractions.
#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn test_linear_operator_for_mat() {
        let matrix: Mat<f64> = mat![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0],];
        let vector: Mat<f64> = mat![[1.0], [2.0], [3.0]];

        let expected = &matrix * &vector;

        let operator: &dyn LinearOperator = &matrix;
        let mut result = Mat::zeros(3, 1);
        operator.apply(vector.as_ref(), result.as_mut());

        assert_eq!(result, expected);
        assert_eq!(operator.rows(), 3);
    }

    #[test]
    fn test_linear_operator_for_reference() {
        let matrix: Mat<f64> = mat![[1.0, 2.0], [3.0, 4.0]];
        let vector: Mat<f64> = mat![[1.0], [1.0]];

        let expected = &matrix * &vector;

        // The blanket impl lets a borrowed matrix act as the operator.
        let operator = &matrix;
        let mut result = Mat::zeros(2, 1);
        operator.apply(vector.as_ref(), result.as_mut());
        assert_eq!(result, expected);
        assert_eq!(LinearOperator::rows(&operator), 2);
    }

    #[test]
    #[should_panic(
        expected = "Dimension mismatch: operator columns (2) do not match vector rows (3)."
    )]
    fn test_dimension_mismatch_panic() {
        let matrix: Mat<f64> = mat![[1.0, 0.0], [0.0, 1.0]];
        let vector: Mat<f64> = mat![[1.0], [2.0], [3.0]]; // Incorrect dimension

        let mut out = Mat::zeros(2, 1);
        matrix.apply(vector.as_ref(), out.as_mut());
    }

    #[test]
    fn test_linear_operator_for_sparse_matrix() {
        use faer::sparse::Triplet;

        let n = 4;
        let triplets: Vec<_> = (0..n)
            .map(|i| Triplet {
                row: i,
                col: i,
                val: (i + 1) as f64,
            })
            .collect();
        let a = SparseColMat::try_new_from_triplets(n, n, &triplets).unwrap();

        let x = Mat::from_fn(n, 1, |_, _| 1.0);
        let mut y = Mat::zeros(n, 1);
        a.apply(x.as_ref(), y.as_mut());
        for i in 0..n {
            assert_eq!(y.as_ref()[(i, 0)], (i + 1) as f64);
        }
        assert_eq!(LinearOperator::rows(&a), n);
    }

    #[test]
    fn test_dense_shift_solve_inverts_shifted_matrix() {
        // A = diag(1, 2, 3), sigma = 0.5. Then (A - 0.5 I)^{-1} is
        // diag(2, 2/3, 0.4) and the solve can be checked entrywise.
        let a = Mat::from_fn(3, 3, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        let mut op = DenseRealShiftSolve::new(a).unwrap();
        op.set_shift(0.5);

        let x: Mat<f64> = mat![[1.0], [1.0], [1.0]];
        let mut y = Mat::zeros(3, 1);
        op.apply_shift_solve(x.as_ref(), y.as_mut());

        let expected = [2.0, 2.0 / 3.0, 0.4];
        for (i, &want) in expected.iter().enumerate() {
            assert!((y.as_ref()[(i, 0)] - want).abs() < 1e-14);
        }
    }

    #[test]
    fn test_dense_shift_solve_rejects_non_square() {
        let a = Mat::from_fn(3, 2, |_, _| 1.0);
        assert!(DenseRealShiftSolve::new(a).is_err());
    }
}
