//! High-level eigensolvers built on the implicitly restarted Arnoldi method.
//!
//! [`GenEigsSolver`] computes a few eigenpairs of a large nonsymmetric real
//! matrix that is only available as a [`LinearOperator`]. The solver builds
//! an order-`ncv` Arnoldi factorization, extracts the Ritz pairs of the
//! small projected matrix H, and repeatedly compresses the factorization
//! back to a smaller order by applying shifted QR sweeps with the unwanted
//! Ritz values as shifts (Sorensen's exact-shift strategy). Each such
//! restart purges the unwanted spectral directions from the residual, so
//! the retained subspace converges to the invariant subspace of the `nev`
//! wanted eigenvalues.
//!
//! [`GenEigsRealShiftSolver`] wraps the same iteration around a
//! shift-and-invert operator `(A - sigma I)^{-1}` to find the eigenvalues
//! closest to a real target `sigma`; the computed Ritz values are mapped
//! back through `theta -> 1/theta + sigma` before the results are sorted.

use crate::algorithms::arnoldi::ArnoldiFactorization;
use crate::algorithms::double_shift_qr::DoubleShiftQR;
use crate::algorithms::hessenberg_qr::UpperHessenbergQR;
use crate::algorithms::orthogonality_tolerance;
use crate::error::{EigsError, EigsErrorKind};
use crate::matrix::{LinearOperator, RealShiftSolve};
use crate::selection::SelectionRule;
use faer::{c64, Mat, MatMut, MatRef, Scale};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A Ritz value with an imaginary part above `eps` counts as complex.
fn is_complex(v: c64, eps: f64) -> bool {
    v.im.abs() > eps
}

/// Tests whether `a` and `b` form a complex-conjugate pair.
fn is_conj(a: c64, b: c64, eps: f64) -> bool {
    (a - b.conj()).norm() < eps
}

/// Full eigendecomposition of the small Hessenberg matrix H.
///
/// The eigenvalues of a real matrix are complex in general, so both the
/// values and the vectors are returned in complex form. Conjugate pairs
/// come out adjacent.
fn hessenberg_eigs(h: MatRef<'_, f64>) -> Result<(Vec<c64>, Mat<c64>), EigsError> {
    let evd = h
        .eigen()
        .map_err(|e| EigsError::from(EigsErrorKind::EvdError(e)))?;
    let n = h.nrows();
    let values_diag = evd.S().column_vector();
    let vectors = evd.U();
    let values = (0..n).map(|i| values_diag[i]).collect();
    let vectors = Mat::from_fn(n, n, |i, j| vectors[(i, j)]);
    Ok((values, vectors))
}

/// Eigensolver for a few eigenpairs of a general (nonsymmetric) real
/// matrix, using the implicitly restarted Arnoldi method.
///
/// The solver borrows the operator for its whole lifetime: pass `&A` (any
/// `&O` is itself a [`LinearOperator`]) and keep `A` alive alongside the
/// solver.
///
/// # Example
///
/// ```
/// use arnoldi_eigs::{GenEigsSolver, SelectionRule};
/// use faer::Mat;
///
/// // A = diag(1, ..., 10); the three eigenvalues of largest magnitude
/// // are 10, 9 and 8.
/// let a = Mat::from_fn(10, 10, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
/// let mut solver = GenEigsSolver::new(&a, 3, 6, SelectionRule::LargestMagn).unwrap();
/// solver.init_seeded(0).unwrap();
/// let nconv = solver.compute(1000, 1e-10).unwrap();
/// assert_eq!(nconv, 3);
/// let values = solver.eigenvalues();
/// assert!((values[0].re - 10.0).abs() < 1e-8);
/// ```
pub struct GenEigsSolver<O: LinearOperator> {
    op: O,
    n: usize,
    nev: usize,
    ncv: usize,
    rule: SelectionRule,
    fac: ArnoldiFactorization,
    niter: usize,
    ritz_val: Vec<c64>,
    ritz_vec: Mat<c64>,
    ritz_conv: Vec<bool>,
    /// Convergence precision, `eps^(2/3)`.
    prec: f64,
}

impl<O: LinearOperator> GenEigsSolver<O> {
    /// Creates a solver for `nev` eigenvalues with an Arnoldi subspace of
    /// dimension `ncv`.
    ///
    /// Requirements: `1 <= nev < n` and `nev < ncv <= n` with `ncv >= 3`
    /// (an `ncv` larger than `n` is truncated to `n`). Convergence is
    /// typically best with `ncv >= 2 * nev + 1`.
    pub fn new(op: O, nev: usize, ncv: usize, rule: SelectionRule) -> Result<Self, EigsError> {
        let n = op.rows();
        if nev < 1 || nev >= n {
            return Err(EigsErrorKind::InputError(format!(
                "nev must satisfy 1 <= nev <= n - 1, got nev = {} for n = {}",
                nev, n
            ))
            .into());
        }
        let ncv = ncv.min(n);
        if ncv <= nev || ncv < 3 {
            return Err(EigsErrorKind::InputError(format!(
                "ncv must satisfy max(3, nev + 1) <= ncv <= n, got ncv = {} for nev = {}",
                ncv, nev
            ))
            .into());
        }

        Ok(Self {
            op,
            n,
            nev,
            ncv,
            rule,
            fac: ArnoldiFactorization::new(n, ncv),
            niter: 0,
            ritz_val: vec![c64::new(0.0, 0.0); ncv],
            ritz_vec: Mat::zeros(ncv, nev),
            ritz_conv: vec![false; nev],
            prec: orthogonality_tolerance(),
        })
    }

    /// Enables or disables random restarts after an Arnoldi breakdown.
    ///
    /// Off by default: finding an invariant subspace ends the iteration
    /// early with whatever has converged. Enabling this continues the
    /// factorization from a random orthogonal direction instead, which is
    /// the only way to resolve the multiplicity of a repeated eigenvalue
    /// whose eigenspace is wider than one Krylov direction.
    pub fn set_random_restart(&mut self, enabled: bool) {
        self.fac.set_random_restart(enabled);
    }

    /// Initializes the solver with the user-supplied starting residual
    /// (an `n x 1` column).
    ///
    /// A residual that is zero to within `eps^(2/3)` is rejected.
    pub fn init_with(&mut self, init_resid: MatRef<'_, f64>) -> Result<(), EigsError> {
        self.ritz_val = vec![c64::new(0.0, 0.0); self.ncv];
        self.ritz_vec = Mat::zeros(self.ncv, self.nev);
        self.ritz_conv = vec![false; self.nev];
        self.fac.initialize(&self.op, init_resid)
    }

    /// Initializes the solver with a pseudo-random starting residual drawn
    /// uniformly from `[-0.5, 0.5]^n`.
    pub fn init(&mut self) -> Result<(), EigsError> {
        let mut rng = rand::rng();
        self.init_from_rng(&mut rng)
    }

    /// Like [`GenEigsSolver::init`], but with a fixed seed so runs are
    /// reproducible.
    pub fn init_seeded(&mut self, seed: u64) -> Result<(), EigsError> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.init_from_rng(&mut rng)
    }

    fn init_from_rng(&mut self, rng: &mut impl Rng) -> Result<(), EigsError> {
        let resid = Mat::from_fn(self.n, 1, |_, _| rng.random::<f64>() - 0.5);
        self.init_with(resid.as_ref())
    }

    /// Runs the restarted iteration until `nev` Ritz values converge to the
    /// relative tolerance `tol`, or `maxit` restarts have been performed.
    ///
    /// Returns the number of converged eigenvalues, at most `nev`.
    /// Nonconvergence is not an error: a return value below `nev` simply
    /// means the iteration budget ran out (or an invariant subspace smaller
    /// than requested was found), and the converged part of the results
    /// remains accessible.
    pub fn compute(&mut self, maxit: usize, tol: f64) -> Result<usize, EigsError> {
        let nconv = self.iterate(maxit, tol)?;
        self.sort_ritzpair();
        Ok(nconv)
    }

    /// The iteration of `compute`, without the final canonical sort. The
    /// shift-and-invert wrapper runs this, transforms the Ritz values, and
    /// sorts afterwards.
    fn iterate(&mut self, maxit: usize, tol: f64) -> Result<usize, EigsError> {
        // Grow the initial factorization from order 1 to order ncv.
        match self.fac.factorize_from(&self.op, 1, self.ncv) {
            Ok(()) => {}
            // An invariant subspace right away: nothing has been extracted
            // yet, so nothing has converged.
            Err(e) if e.is_breakdown() => return Ok(0),
            Err(e) => return Err(e),
        }
        self.retrieve_ritzpair()?;

        let mut nconv = 0;
        for _ in 0..maxit {
            nconv = self.num_converged(tol);
            if nconv >= self.nev {
                break;
            }
            let k_adj = self.nev_adjusted(nconv);
            self.niter += 1;
            match self.restart(k_adj) {
                Ok(()) => {}
                // The compressed factorization hit an invariant subspace;
                // report what has converged so far.
                Err(e) if e.is_breakdown() => break,
                Err(e) => return Err(e),
            }
        }

        Ok(nconv.min(self.nev))
    }

    /// Counts the wanted Ritz values that pass the convergence test
    /// `|y[ncv - 1]| * ||f|| < tol * max(eps^(2/3), |theta|)`, where the
    /// bottom entry of the Ritz eigenvector estimates the eigenpair
    /// residual.
    fn num_converged(&mut self, tol: f64) -> usize {
        let f_norm = self.fac.f.norm_l2();
        for i in 0..self.nev {
            let thresh = tol * self.ritz_val[i].norm().max(self.prec);
            let resid = self.ritz_vec.as_ref()[(self.ncv - 1, i)].norm() * f_norm;
            self.ritz_conv[i] = resid < thresh;
        }
        self.ritz_conv.iter().filter(|&&c| c).count()
    }

    /// The restart-width heuristic: widens the retained subspace with half
    /// of the already-converged values (after ARPACK's dnaup2), never
    /// splitting a complex-conjugate pair at the boundary.
    fn nev_adjusted(&self, nconv: usize) -> usize {
        let ncv = self.ncv;
        let mut nev_new = self.nev;

        // Retain one extra value if the boundary falls inside a pair.
        if is_complex(self.ritz_val[self.nev - 1], self.prec)
            && self.nev < ncv
            && is_conj(self.ritz_val[self.nev - 1], self.ritz_val[self.nev], self.prec)
        {
            nev_new = self.nev + 1;
        }

        nev_new += usize::min(nconv, (ncv - nev_new) / 2);
        if nev_new == 1 && ncv >= 6 {
            nev_new = ncv / 2;
        } else if nev_new == 1 && ncv > 3 {
            nev_new = 2;
        }
        if nev_new > ncv - 2 {
            nev_new = ncv - 2;
        }

        // The adjustment may have moved the boundary into a pair; bump once
        // more if so.
        if is_complex(self.ritz_val[nev_new - 1], self.prec)
            && is_conj(self.ritz_val[nev_new - 1], self.ritz_val[nev_new], self.prec)
        {
            nev_new += 1;
        }

        nev_new
    }

    /// Compresses the order-`ncv` factorization to order `k` with exact
    /// shifts and re-extends it to order `ncv`.
    ///
    /// Every unwanted Ritz value becomes a QR shift: real values drive a
    /// single-shift Hessenberg QR step, while a conjugate pair drives one
    /// Francis double-shift sweep and consumes two slots. V, H and the
    /// tracked coordinate vector `e_m` are updated in place so that `V Q`,
    /// `Q^T H Q` and `Q^T e_m` replace their predecessors.
    fn restart(&mut self, k: usize) -> Result<(), EigsError> {
        if k >= self.ncv {
            return Ok(());
        }
        let ncv = self.ncv;
        let mut em = Mat::zeros(ncv, 1);
        em.as_mut()[(ncv - 1, 0)] = 1.0;

        let mut i = k;
        while i < ncv {
            let theta = self.ritz_val[i];
            let paired = is_complex(theta, self.prec)
                && i + 1 < ncv
                && is_conj(theta, self.ritz_val[i + 1], self.prec);
            if paired {
                // One real sweep performs the QR steps for both theta and
                // its conjugate, driven by the sum and product of the pair.
                let s = 2.0 * theta.re;
                let t = theta.norm_sqr();
                let qr = DoubleShiftQR::new(self.fac.h.as_ref(), s, t)?;
                qr.apply_yq(&mut self.fac.v);
                self.fac.h = qr.matrix_qthq();
                qr.apply_qty(&mut em);
                i += 2;
            } else {
                let mu = theta.re;
                let qr = UpperHessenbergQR::new(self.fac.h.as_ref(), mu)?;
                qr.apply_yq(&mut self.fac.v);
                // H <- R Q + mu I = Q^T H Q.
                let mut rq = qr.matrix_rq();
                for d in 0..ncv {
                    rq.as_mut()[(d, d)] += mu;
                }
                self.fac.h = rq;
                qr.apply_qty(&mut em);
                i += 1;
            }
        }

        // Residual of the compressed order-k factorization.
        let em_k = em.as_ref()[(k - 1, 0)];
        let h_sub = self.fac.h.as_ref()[(k, k - 1)];
        let vk = self.fac.v.as_ref().get(.., k..k + 1).to_owned();
        self.fac.f = &(&self.fac.f * Scale(em_k)) + &(&vk * Scale(h_sub));

        self.fac.factorize_from(&self.op, k, ncv)?;
        self.retrieve_ritzpair()
    }

    /// Diagonalizes H and stores the Ritz values sorted by the selection
    /// rule, together with the first `nev` Ritz eigenvectors.
    fn retrieve_ritzpair(&mut self) -> Result<(), EigsError> {
        let (values, vectors) = hessenberg_eigs(self.fac.h.as_ref())?;

        let mut pairs: Vec<(c64, usize)> = values
            .iter()
            .copied()
            .enumerate()
            .map(|(i, v)| (v, i))
            .collect();
        // Stable sort: conjugate pairs compare equal on both keys and stay
        // adjacent.
        pairs.sort_by(|a, b| self.rule.compare(a.0, b.0));

        for i in 0..self.ncv {
            self.ritz_val[i] = pairs[i].0;
        }
        for i in 0..self.nev {
            let src = pairs[i].1;
            for r in 0..self.ncv {
                self.ritz_vec.as_mut()[(r, i)] = vectors.as_ref()[(r, src)];
            }
        }
        Ok(())
    }

    /// Re-sorts the first `nev` Ritz pairs by decreasing magnitude. This
    /// canonical order of the returned results is independent of the
    /// selection rule used during the iteration.
    fn sort_ritzpair(&mut self) {
        let mut pairs: Vec<(c64, usize)> =
            (0..self.nev).map(|i| (self.ritz_val[i], i)).collect();
        pairs.sort_by(|a, b| SelectionRule::LargestMagn.compare(a.0, b.0));

        let mut new_vec = Mat::<c64>::zeros(self.ncv, self.nev);
        let mut new_conv = vec![false; self.nev];
        for (i, &(val, src)) in pairs.iter().enumerate() {
            self.ritz_val[i] = val;
            for r in 0..self.ncv {
                new_vec.as_mut()[(r, i)] = self.ritz_vec.as_ref()[(r, src)];
            }
            new_conv[i] = self.ritz_conv[src];
        }
        self.ritz_vec = new_vec;
        self.ritz_conv = new_conv;
    }

    /// Applies a spectral transformation to the retained Ritz values. Used
    /// by the shift-and-invert wrapper before the final sort.
    fn transform_ritz_values(&mut self, f: impl Fn(c64) -> c64) {
        for i in 0..self.nev {
            self.ritz_val[i] = f(self.ritz_val[i]);
        }
    }

    /// The converged eigenvalues, in the canonical (largest magnitude
    /// first) order.
    pub fn eigenvalues(&self) -> Vec<c64> {
        (0..self.nev)
            .filter(|&i| self.ritz_conv[i])
            .map(|i| self.ritz_val[i])
            .collect()
    }

    /// The converged eigenvectors as the columns of an `n x nconv` complex
    /// matrix, in the same order as [`GenEigsSolver::eigenvalues`].
    ///
    /// Each column is `V y` for the corresponding Ritz eigenvector `y` of
    /// H; the vectors are not normalized to any canonical phase.
    pub fn eigenvectors(&self) -> Mat<c64> {
        let converged: Vec<usize> = (0..self.nev).filter(|&i| self.ritz_conv[i]).collect();
        let nconv = converged.len();

        // V is real, so the product splits into real and imaginary parts.
        let mut vec_re = Mat::<f64>::zeros(self.ncv, nconv);
        let mut vec_im = Mat::<f64>::zeros(self.ncv, nconv);
        for (j, &src) in converged.iter().enumerate() {
            for r in 0..self.ncv {
                let y = self.ritz_vec.as_ref()[(r, src)];
                vec_re.as_mut()[(r, j)] = y.re;
                vec_im.as_mut()[(r, j)] = y.im;
            }
        }
        let res_re = &self.fac.v * &vec_re;
        let res_im = &self.fac.v * &vec_im;

        Mat::from_fn(self.n, nconv, |i, j| {
            c64::new(res_re.as_ref()[(i, j)], res_im.as_ref()[(i, j)])
        })
    }

    /// Number of restarts performed across all `compute` calls.
    #[inline]
    pub fn num_iterations(&self) -> usize {
        self.niter
    }

    /// Number of operator applications performed across all calls.
    #[inline]
    pub fn num_operations(&self) -> usize {
        self.fac.num_matvecs()
    }
}

/// Adapter presenting a [`RealShiftSolve`] operator to the base solver as a
/// plain [`LinearOperator`]: `apply` is the shift-solve.
struct ShiftSolveAdapter<'a, O: RealShiftSolve> {
    op: &'a O,
}

impl<'a, O: RealShiftSolve> LinearOperator for ShiftSolveAdapter<'a, O> {
    #[inline]
    fn rows(&self) -> usize {
        self.op.rows()
    }

    #[inline]
    fn apply(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) {
        self.op.apply_shift_solve(x, y)
    }
}

/// Eigensolver for the eigenvalues of A closest to a real shift `sigma`,
/// via the shift-and-invert transformation.
///
/// The iteration runs on `(A - sigma I)^{-1}`, whose dominant eigenvalues
/// `theta = 1 / (lambda - sigma)` correspond to the `lambda` nearest
/// `sigma`. Select with [`SelectionRule::LargestMagn`] in the transformed
/// space; the solver maps the converged values back through
/// `theta -> 1/theta + sigma` before sorting and returning them.
///
/// This is a thin wrapper owning a [`GenEigsSolver`] over an adapter that
/// routes `apply` to [`RealShiftSolve::apply_shift_solve`].
pub struct GenEigsRealShiftSolver<'a, O: RealShiftSolve> {
    solver: GenEigsSolver<ShiftSolveAdapter<'a, O>>,
    sigma: f64,
}

impl<'a, O: RealShiftSolve> GenEigsRealShiftSolver<'a, O> {
    /// Creates the shift-and-invert solver. Installs `sigma` into the
    /// operator once; the parameter requirements are those of
    /// [`GenEigsSolver::new`].
    pub fn new(
        op: &'a mut O,
        nev: usize,
        ncv: usize,
        rule: SelectionRule,
        sigma: f64,
    ) -> Result<Self, EigsError> {
        op.set_shift(sigma);
        let op: &'a O = op;
        let solver = GenEigsSolver::new(ShiftSolveAdapter { op }, nev, ncv, rule)?;
        Ok(Self { solver, sigma })
    }

    /// See [`GenEigsSolver::set_random_restart`].
    pub fn set_random_restart(&mut self, enabled: bool) {
        self.solver.set_random_restart(enabled);
    }

    /// See [`GenEigsSolver::init_with`].
    pub fn init_with(&mut self, init_resid: MatRef<'_, f64>) -> Result<(), EigsError> {
        self.solver.init_with(init_resid)
    }

    /// See [`GenEigsSolver::init`].
    pub fn init(&mut self) -> Result<(), EigsError> {
        self.solver.init()
    }

    /// See [`GenEigsSolver::init_seeded`].
    pub fn init_seeded(&mut self, seed: u64) -> Result<(), EigsError> {
        self.solver.init_seeded(seed)
    }

    /// Runs the iteration and maps the Ritz values back to the original
    /// spectrum. Returns the number of converged eigenvalues.
    pub fn compute(&mut self, maxit: usize, tol: f64) -> Result<usize, EigsError> {
        let nconv = self.solver.iterate(maxit, tol)?;
        let sigma = self.sigma;
        self.solver
            .transform_ritz_values(|theta| c64::new(1.0, 0.0) / theta + sigma);
        self.solver.sort_ritzpair();
        Ok(nconv)
    }

    /// The converged eigenvalues of A (already transformed back), largest
    /// magnitude first.
    pub fn eigenvalues(&self) -> Vec<c64> {
        self.solver.eigenvalues()
    }

    /// The converged eigenvectors of A. Eigenvectors are invariant under
    /// the spectral transformation, so no back-mapping is needed.
    pub fn eigenvectors(&self) -> Mat<c64> {
        self.solver.eigenvectors()
    }

    /// Number of restarts performed.
    #[inline]
    pub fn num_iterations(&self) -> usize {
        self.solver.num_iterations()
    }

    /// Number of shift-solve applications performed.
    #[inline]
    pub fn num_operations(&self) -> usize {
        self.solver.num_operations()
    }
}
