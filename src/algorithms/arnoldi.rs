//! The Arnoldi factorization with re-orthogonalization.
//!
//! An order-`j` Arnoldi factorization of the operator A is the relation
//!
//! ```text
//! A V_j = V_j H_j + f e_j^T,    V_j^T V_j = I,    V_j^T f = 0,
//! ```
//!
//! where the columns of `V_j` span the Krylov subspace generated by the
//! initial residual, `H_j` is upper-Hessenberg, and `f` is the residual of
//! the factorization. [`ArnoldiFactorization`] owns this state at a fixed
//! maximum order `m` and supports two operations: initializing from a
//! starting residual (step 0) and extending an order-`k` factorization to a
//! higher order. The restarted iteration shrinks the factorization back to
//! a small order by orthogonal transformations and then re-extends it here.
//!
//! In floating point the computed residual slowly loses orthogonality
//! against the earlier basis vectors. After each Gram-Schmidt step the
//! factorizer probes `<v_1, f>`, where the largest drift typically shows
//! up, and runs one correction pass against the whole basis when the probe
//! exceeds the orthogonality tolerance.

use crate::algorithms::{dot, orthogonality_tolerance};
use crate::error::{EigsError, EigsErrorKind};
use crate::matrix::LinearOperator;
use faer::prelude::*;
use faer::{Mat, MatRef, Scale};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// State of an Arnoldi factorization of maximum order `m` for an operator
/// of dimension `n`.
///
/// The first `j` columns of `v` and the leading `j x j` block of `h` are
/// meaningful for an order-`j` factorization; the remaining storage is kept
/// zeroed so the factorization can grow without reallocation.
pub struct ArnoldiFactorization {
    n: usize,
    m: usize,
    /// Orthonormal basis of the Krylov subspace, `n x m`.
    pub(crate) v: Mat<f64>,
    /// Upper-Hessenberg projection of the operator, `m x m`.
    pub(crate) h: Mat<f64>,
    /// Residual vector, `n x 1`.
    pub(crate) f: Mat<f64>,
    matvec_count: usize,
    random_restart: bool,
    prec: f64,
}

impl ArnoldiFactorization {
    /// Allocates an empty factorization for dimension `n` and maximum order
    /// `m`.
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            m,
            v: Mat::zeros(n, m),
            h: Mat::zeros(m, m),
            f: Mat::zeros(n, 1),
            matvec_count: 0,
            random_restart: false,
            prec: orthogonality_tolerance(),
        }
    }

    /// Controls what happens when the residual vanishes mid-extension.
    ///
    /// By default the extension stops with the `Breakdown` error kind: an
    /// invariant subspace has been found and the factorization cannot grow
    /// further from the current residual. With random restarts enabled, the
    /// factorizer instead continues from a random direction orthogonal to
    /// the basis found so far, which lets the iteration pick up additional
    /// copies of a multiple eigenvalue.
    pub fn set_random_restart(&mut self, enabled: bool) {
        self.random_restart = enabled;
    }

    /// The orthonormal basis V.
    #[inline]
    pub fn basis(&self) -> MatRef<'_, f64> {
        self.v.as_ref()
    }

    /// The upper-Hessenberg matrix H.
    #[inline]
    pub fn hessenberg(&self) -> MatRef<'_, f64> {
        self.h.as_ref()
    }

    /// The residual vector f.
    #[inline]
    pub fn residual(&self) -> MatRef<'_, f64> {
        self.f.as_ref()
    }

    /// Number of operator applications performed so far.
    #[inline]
    pub fn num_matvecs(&self) -> usize {
        self.matvec_count
    }

    /// Performs step 0: normalizes `resid` into the first basis vector and
    /// computes the initial `H(0, 0)` and residual.
    ///
    /// Any previous factorization state is discarded; the operator
    /// application counter keeps accumulating.
    pub fn initialize<O: LinearOperator>(
        &mut self,
        op: &O,
        resid: MatRef<'_, f64>,
    ) -> Result<(), EigsError> {
        if resid.nrows() != self.n || resid.ncols() != 1 {
            return Err(EigsErrorKind::DimensionMismatch {
                operator_rows: self.n,
                vector_rows: resid.nrows(),
            }
            .into());
        }
        let vnorm = resid.norm_l2();
        if vnorm <= self.prec {
            return Err(EigsErrorKind::InputError(
                "the initial residual vector must not be zero".to_string(),
            )
            .into());
        }

        self.v = Mat::zeros(self.n, self.m);
        self.h = Mat::zeros(self.m, self.m);

        let v0 = resid * Scale(1.0 / vnorm);
        let mut w = Mat::zeros(self.n, 1);
        op.apply(v0.as_ref(), w.as_mut());
        self.matvec_count += 1;

        let h00 = dot(v0.as_ref(), w.as_ref());
        self.f = &w - &(&v0 * Scale(h00));
        self.v.col_mut(0).copy_from(v0.col(0));
        self.h.as_mut()[(0, 0)] = h00;

        Ok(())
    }

    /// Extends the factorization from order `from_k` to order `to_m` using
    /// the current residual.
    ///
    /// Columns `from_k..to_m` of V and the corresponding parts of H are
    /// rebuilt; the leading `from_k x from_k` block of H and the first
    /// `from_k` columns of V are taken as given. Returns the `Breakdown`
    /// error kind if the residual norm falls below the orthogonality
    /// tolerance, which means an invariant subspace has been found.
    pub fn factorize_from<O: LinearOperator>(
        &mut self,
        op: &O,
        from_k: usize,
        to_m: usize,
    ) -> Result<(), EigsError> {
        if to_m <= from_k {
            return Ok(());
        }

        // Keep the upper-left from_k x from_k block of H and zero the rest.
        for j in from_k..self.m {
            for i in 0..self.m {
                self.h.as_mut()[(i, j)] = 0.0;
            }
        }
        for j in 0..from_k {
            for i in from_k..self.m {
                self.h.as_mut()[(i, j)] = 0.0;
            }
        }

        for i in from_k..to_m {
            let beta = self.f.norm_l2();
            let v = if beta <= self.prec {
                if !self.random_restart {
                    return Err(EigsErrorKind::Breakdown { step: i }.into());
                }
                // The subspace is invariant. Continue from a fresh random
                // direction orthogonal to the basis; the negligible beta
                // stays in H as the (exact) coupling of the new block.
                self.random_orthonormal_direction(i)?
            } else {
                &self.f * Scale(1.0 / beta)
            };
            self.v.col_mut(i).copy_from(v.col(0));
            for j in 0..i {
                self.h.as_mut()[(i, j)] = 0.0;
            }
            self.h.as_mut()[(i, i - 1)] = beta;

            let mut w = Mat::zeros(self.n, 1);
            op.apply(v.as_ref(), w.as_mut());
            self.matvec_count += 1;

            // Classical Gram-Schmidt: h = V^T w, f = w - V h.
            let basis = self.v.as_ref().get(.., 0..i + 1);
            let h_col = basis.transpose() * w.as_ref();
            for r in 0..i + 1 {
                self.h.as_mut()[(r, i)] = h_col.as_ref()[(r, 0)];
            }
            let projection = basis * &h_col;
            self.f = &w - &projection;

            // One-step re-orthogonalization. The largest orthogonality
            // drift typically shows up against the first basis vector, so
            // <v_1, f> serves as the test quantity.
            let v1f = dot(self.v.as_ref().get(.., 0..1), self.f.as_ref());
            if v1f.abs() > self.prec {
                let correction = basis.transpose() * self.f.as_ref();
                let delta = basis * &correction;
                self.f = &self.f - &delta;
            }
        }

        Ok(())
    }

    /// Draws a random unit vector orthogonal to the first `i` basis
    /// columns, for continuing past an invariant subspace. The draw is
    /// seeded by the step index so repeated runs stay reproducible.
    fn random_orthonormal_direction(&self, i: usize) -> Result<Mat<f64>, EigsError> {
        let mut rng = StdRng::seed_from_u64(i as u64);
        let mut r = Mat::from_fn(self.n, 1, |_, _| rng.random::<f64>() - 0.5);

        let basis = self.v.as_ref().get(.., 0..i);
        // Two orthogonalization passes; one is not always enough in
        // floating point.
        for _ in 0..2 {
            let coeffs = basis.transpose() * r.as_ref();
            let projection = basis * &coeffs;
            r = &r - &projection;
        }

        let norm = r.norm_l2();
        if norm <= self.prec {
            // The random draw happened to lie in the span of the basis;
            // treat it as a genuine breakdown.
            return Err(EigsErrorKind::Breakdown { step: i }.into());
        }
        Ok(&r * Scale(1.0 / norm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::orthogonality_tolerance;

    /// A nonsymmetric dense test operator with a known, well-separated
    /// spectrum (upper bidiagonal, eigenvalues 1..=n on the diagonal).
    fn test_operator(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                (i + 1) as f64
            } else if j == i + 1 {
                0.5
            } else {
                0.0
            }
        })
    }

    fn ones(n: usize) -> Mat<f64> {
        Mat::from_fn(n, 1, |_, _| 1.0)
    }

    fn build(n: usize, m: usize) -> ArnoldiFactorization {
        let a = test_operator(n);
        let mut fac = ArnoldiFactorization::new(n, m);
        fac.initialize(&a, ones(n).as_ref()).unwrap();
        fac.factorize_from(&a, 1, m).unwrap();
        fac
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let (n, m) = (20, 8);
        let fac = build(n, m);
        let vtv = fac.basis().transpose() * fac.basis();
        let tol = 10.0 * m as f64 * orthogonality_tolerance();
        for i in 0..m {
            for j in 0..m {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (vtv.as_ref()[(i, j)] - expected).abs() < tol,
                    "V^T V deviates at ({}, {})",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_residual_is_orthogonal_to_basis() {
        let (n, m) = (20, 8);
        let fac = build(n, m);
        let vtf = fac.basis().transpose() * fac.residual();
        for i in 0..m {
            assert!(vtf.as_ref()[(i, 0)].abs() < 1e-9);
        }
    }

    #[test]
    fn test_arnoldi_relation_holds() {
        let (n, m) = (20, 8);
        let a = test_operator(n);
        let fac = build(n, m);

        // A V = V H + f e_m^T, checked column by column.
        let av = a.as_ref() * fac.basis();
        let vh = fac.basis() * fac.hessenberg();
        let a_norm = a.norm_l2();
        for j in 0..m {
            for i in 0..n {
                let mut expected = vh.as_ref()[(i, j)];
                if j == m - 1 {
                    expected += fac.residual()[(i, 0)];
                }
                assert!(
                    (av.as_ref()[(i, j)] - expected).abs()
                        < 10.0 * m as f64 * orthogonality_tolerance() * a_norm,
                    "Arnoldi relation violated at ({}, {})",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_hessenberg_structure() {
        let (n, m) = (15, 6);
        let fac = build(n, m);
        for j in 0..m {
            for i in (j + 2)..m {
                assert_eq!(fac.hessenberg()[(i, j)], 0.0);
            }
        }
    }

    #[test]
    fn test_zero_initial_residual_is_rejected() {
        let a = test_operator(5);
        let mut fac = ArnoldiFactorization::new(5, 3);
        let zero = Mat::zeros(5, 1);
        assert!(fac.initialize(&a, zero.as_ref()).is_err());
    }

    #[test]
    fn test_breakdown_on_invariant_subspace() {
        // e_1 is an eigenvector of a diagonal matrix, so the Krylov
        // subspace is one-dimensional and the extension must break down.
        let n = 6;
        let a = Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        let mut fac = ArnoldiFactorization::new(n, 4);
        let e1 = Mat::from_fn(n, 1, |i, _| if i == 0 { 1.0 } else { 0.0 });
        fac.initialize(&a, e1.as_ref()).unwrap();
        let err = fac.factorize_from(&a, 1, 4).unwrap_err();
        assert!(err.is_breakdown());
    }

    #[test]
    fn test_random_restart_continues_past_invariant_subspace() {
        // Same setup as the breakdown test, but with random restarts the
        // factorization grows to full order and stays orthonormal.
        let n = 6;
        let a = Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
        let mut fac = ArnoldiFactorization::new(n, 4);
        fac.set_random_restart(true);
        let e1 = Mat::from_fn(n, 1, |i, _| if i == 0 { 1.0 } else { 0.0 });
        fac.initialize(&a, e1.as_ref()).unwrap();
        fac.factorize_from(&a, 1, 4).unwrap();

        let vtv = fac.basis().transpose() * fac.basis();
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((vtv.as_ref()[(i, j)] - expected).abs() < 1e-10);
            }
        }
        // The coupling below the invariant block is negligible.
        assert!(fac.hessenberg()[(1, 0)].abs() <= orthogonality_tolerance());
    }

    #[test]
    fn test_matvec_counter() {
        let (n, m) = (12, 5);
        let fac = build(n, m);
        // One application in initialize, one per extension step.
        assert_eq!(fac.num_matvecs(), m);
    }
}
