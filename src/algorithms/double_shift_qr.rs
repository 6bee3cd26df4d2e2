//! Francis double-implicit-shift QR sweep on an upper-Hessenberg matrix.
//!
//! When an unwanted Ritz value `mu` is complex it always comes paired with
//! its conjugate, and filtering both with two single-shift QR steps would
//! force complex arithmetic on a real matrix. The Francis sweep performs
//! the combined transform of both steps in one pass of real arithmetic,
//! driven only by the real quantities
//!
//! ```text
//! s = mu + conj(mu) = 2 Re(mu),    t = mu * conj(mu) = |mu|^2
//! ```
//!
//! The sweep works by bulge chasing. The first column of
//! `(H - mu I)(H - conj(mu) I) = H^2 - s H + t I` has only three nonzero
//! entries; a 3-vector Householder reflector aligned with it, applied from
//! both sides, pushes a 3 x 3 bulge below the Hessenberg band. A sequence
//! of further reflectors then chases the bulge down the diagonal and off
//! the bottom, with a final 2-vector reflector restoring Hessenberg form.
//! The accumulated orthogonal factor `Q = P_0 P_1 ...` is kept as the list
//! of reflector vectors.
//!
//! The matrix is first split into unreduced diagonal blocks wherever a
//! subdiagonal entry is negligible relative to its diagonal neighbors; each
//! block is swept independently and the reflectors are afterwards applied
//! to the rows right of and the columns above the block, so the whole
//! transform remains one global similarity.

use crate::algorithms::near_zero_tolerance;
use crate::error::{EigsError, EigsErrorKind};
use faer::{Mat, MatRef};
use std::f64::consts::SQRT_2;

/// Applies `P = I - u u^T` (with `u` pre-scaled by `sqrt(2)`) from the left
/// to the `nrows x (cols.len())` window of `m` starting at row `row`.
/// Reflectors below the near-zero threshold act as the identity.
fn house_apply_left(
    u: [f64; 3],
    prec: f64,
    m: &mut Mat<f64>,
    row: usize,
    cols: std::ops::Range<usize>,
    nrows: usize,
) {
    let u0 = SQRT_2 * u[0];
    let u1 = SQRT_2 * u[1];
    let u2 = SQRT_2 * u[2];
    if u0 * u0 + u1 * u1 + u2 * u2 <= prec {
        return;
    }

    if nrows == 2 {
        for col in cols {
            let tmp = u0 * m.as_ref()[(row, col)] + u1 * m.as_ref()[(row + 1, col)];
            m.as_mut()[(row, col)] -= tmp * u0;
            m.as_mut()[(row + 1, col)] -= tmp * u1;
        }
    } else {
        for col in cols {
            let tmp = u0 * m.as_ref()[(row, col)]
                + u1 * m.as_ref()[(row + 1, col)]
                + u2 * m.as_ref()[(row + 2, col)];
            m.as_mut()[(row, col)] -= tmp * u0;
            m.as_mut()[(row + 1, col)] -= tmp * u1;
            m.as_mut()[(row + 2, col)] -= tmp * u2;
        }
    }
}

/// Applies `P = I - u u^T` from the right to the `(rows.len()) x ncols`
/// window of `m` starting at column `col`.
fn house_apply_right(
    u: [f64; 3],
    prec: f64,
    m: &mut Mat<f64>,
    rows: std::ops::Range<usize>,
    col: usize,
    ncols: usize,
) {
    let u0 = SQRT_2 * u[0];
    let u1 = SQRT_2 * u[1];
    let u2 = SQRT_2 * u[2];
    if u0 * u0 + u1 * u1 + u2 * u2 <= prec {
        return;
    }

    if ncols == 2 {
        for row in rows {
            let tmp = u0 * m.as_ref()[(row, col)] + u1 * m.as_ref()[(row, col + 1)];
            m.as_mut()[(row, col)] -= tmp * u0;
            m.as_mut()[(row, col + 1)] -= tmp * u1;
        }
    } else {
        for row in rows {
            let tmp = u0 * m.as_ref()[(row, col)]
                + u1 * m.as_ref()[(row, col + 1)]
                + u2 * m.as_ref()[(row, col + 2)];
            m.as_mut()[(row, col)] -= tmp * u0;
            m.as_mut()[(row, col + 1)] -= tmp * u1;
            m.as_mut()[(row, col + 2)] -= tmp * u2;
        }
    }
}

/// One Francis double-shift sweep `H -> Q^T H Q`, with Q held as a sequence
/// of 3-vector Householder reflectors.
///
/// Constructed by [`DoubleShiftQR::new`]; immutable afterwards.
pub struct DoubleShiftQR {
    n: usize,
    /// The swept matrix `Q^T H Q`, upper-Hessenberg with exact zeros below
    /// the subdiagonal.
    mat_h: Mat<f64>,
    shift_s: f64,
    shift_t: f64,
    /// Unit reflector vectors, one per column. An all-zero entry stands for
    /// the identity.
    ref_u: Vec<[f64; 3]>,
    prec: f64,
}

impl DoubleShiftQR {
    /// Performs the sweep on `mat` with the shift sums `s = 2 Re(mu)` and
    /// `t = |mu|^2`.
    ///
    /// `mat` is read as an upper-Hessenberg matrix: entries below the first
    /// subdiagonal are ignored. Returns an error if `mat` is not square.
    pub fn new(mat: MatRef<'_, f64>, s: f64, t: f64) -> Result<Self, EigsError> {
        if mat.nrows() != mat.ncols() || mat.nrows() == 0 {
            return Err(EigsErrorKind::InputError(format!(
                "double-shift QR requires a non-empty square matrix, got {} x {}",
                mat.nrows(),
                mat.ncols()
            ))
            .into());
        }

        let n = mat.nrows();
        let prec = near_zero_tolerance();
        let mut this = Self {
            n,
            mat_h: Mat::from_fn(n, n, |i, j| if i > j + 1 { 0.0 } else { mat[(i, j)] }),
            shift_s: s,
            shift_t: t,
            ref_u: vec![[0.0; 3]; n],
            prec,
        };

        // Split into unreduced blocks. A subdiagonal entry that is
        // negligible relative to its diagonal neighbors is zeroed and
        // starts a new block.
        let mut block_starts = Vec::with_capacity(n);
        block_starts.push(0);
        for i in 1..n.saturating_sub(1) {
            let sub = this.mat_h.as_ref()[(i, i - 1)].abs();
            let diag_scale =
                this.mat_h.as_ref()[(i - 1, i - 1)].abs() + this.mat_h.as_ref()[(i, i)].abs();
            if sub <= prec * diag_scale {
                this.mat_h.as_mut()[(i, i - 1)] = 0.0;
                block_starts.push(i);
            }
        }
        block_starts.push(n);

        for w in 0..block_starts.len() - 1 {
            let start = block_starts[w];
            let end = block_starts[w + 1] - 1;
            this.sweep_block(start, end);

            // Blocks of size <= 2 contribute identity reflectors and need
            // no off-block updates.
            if end - start < 2 {
                continue;
            }
            // Carry the block's reflectors across the rows to its right and
            // the columns above it, keeping the transform a global
            // similarity.
            if end < n - 1 {
                for j in start..end {
                    let u = this.ref_u[j];
                    let nrows = usize::min(3, end - j + 1);
                    house_apply_left(u, prec, &mut this.mat_h, j, (end + 1)..n, nrows);
                }
            }
            if start > 0 {
                for j in start..end {
                    let u = this.ref_u[j];
                    let ncols = usize::min(3, end - j + 1);
                    house_apply_right(u, prec, &mut this.mat_h, 0..start, j, ncols);
                }
            }
        }

        // The reflectors restore Hessenberg form only up to roundoff; pin
        // the strictly-sub-subdiagonal part to exact zeros.
        for j in 0..n {
            for i in (j + 2)..n {
                this.mat_h.as_mut()[(i, j)] = 0.0;
            }
        }

        Ok(this)
    }

    /// Builds the unit Householder vector for `(x1, x2, x3)` with the sign
    /// convention `rho = -sign(x1)`, storing the identity when the vector
    /// degenerates.
    fn compute_reflector(&mut self, x1: f64, x2: f64, x3: f64, ind: usize) {
        let tail = x2 * x2 + x3 * x3;
        // x1' = x1 - rho * ||x||, rho = -sign(x1).
        let sign = if x1 < 0.0 {
            1.0
        } else if x1 > 0.0 {
            -1.0
        } else {
            0.0
        };
        let x1_new = x1 - sign * (x1 * x1 + tail).sqrt();
        let x_norm = (x1_new * x1_new + tail).sqrt();
        if x_norm <= self.prec {
            self.ref_u[ind] = [0.0; 3];
        } else {
            self.ref_u[ind] = [x1_new / x_norm, x2 / x_norm, x3 / x_norm];
        }
    }

    /// Chases the bulge through the unreduced block `start..=end`.
    fn sweep_block(&mut self, start: usize, end: usize) {
        let nrow = end - start + 1;
        // Nothing to do for blocks of size 1 or 2; their reflector slots
        // stay at the identity.
        if nrow <= 2 {
            return;
        }

        let (s, t) = (self.shift_s, self.shift_t);
        let h = |this: &Self, i: usize, j: usize| this.mat_h.as_ref()[(start + i, start + j)];

        // First column of (X - mu I)(X - conj(mu) I), which has only three
        // nonzero entries for Hessenberg X.
        let v0 = h(self, 0, 0) * (h(self, 0, 0) - s) + h(self, 0, 1) * h(self, 1, 0) + t;
        let v1 = h(self, 1, 0) * (h(self, 0, 0) + h(self, 1, 1) - s);
        let v2 = h(self, 2, 1) * h(self, 1, 0);
        self.compute_reflector(v0, v1, v2, start);

        // Apply the first reflector from both sides; this opens the bulge.
        let u = self.ref_u[start];
        house_apply_left(u, self.prec, &mut self.mat_h, start, start..(end + 1), 3);
        house_apply_right(
            u,
            self.prec,
            &mut self.mat_h,
            start..(start + usize::min(nrow, 4)),
            start,
            3,
        );

        // Chase the bulge one row down per step.
        for i in 1..nrow - 2 {
            // nrow is at least 4 if this loop is entered.
            let x1 = h(self, i, i - 1);
            let x2 = h(self, i + 1, i - 1);
            let x3 = h(self, i + 2, i - 1);
            self.compute_reflector(x1, x2, x3, start + i);

            let u = self.ref_u[start + i];
            house_apply_left(
                u,
                self.prec,
                &mut self.mat_h,
                start + i,
                (start + i - 1)..(end + 1),
                3,
            );
            house_apply_right(
                u,
                self.prec,
                &mut self.mat_h,
                start..(start + usize::min(nrow, i + 4)),
                start + i,
                3,
            );
        }

        // The terminal 2-vector reflector annihilates the last bulge entry.
        let x1 = h(self, nrow - 2, nrow - 3);
        let x2 = h(self, nrow - 1, nrow - 3);
        self.compute_reflector(x1, x2, 0.0, start + nrow - 2);
        self.ref_u[start + nrow - 1] = [0.0; 3];

        let u = self.ref_u[start + nrow - 2];
        house_apply_left(
            u,
            self.prec,
            &mut self.mat_h,
            start + nrow - 2,
            (start + nrow - 3)..(end + 1),
            2,
        );
        house_apply_right(
            u,
            self.prec,
            &mut self.mat_h,
            start..(start + nrow),
            start + nrow - 2,
            2,
        );
    }

    /// Returns the swept matrix `Q^T H Q`.
    pub fn matrix_qthq(&self) -> Mat<f64> {
        self.mat_h.clone()
    }

    /// Applies Q from the right: `Y <- Y Q = Y P_0 P_1 ...`. `Y` must have
    /// `n` columns.
    pub fn apply_yq(&self, y: &mut Mat<f64>) {
        assert_eq!(y.ncols(), self.n, "apply_yq: column count must match");
        if self.n < 2 {
            return;
        }
        let nrow = y.nrows();
        for i in 0..self.n - 2 {
            house_apply_right(self.ref_u[i], self.prec, y, 0..nrow, i, 3);
        }
        house_apply_right(self.ref_u[self.n - 2], self.prec, y, 0..nrow, self.n - 2, 2);
    }

    /// Applies the transpose of Q from the left:
    /// `y <- Q^T y = P_{n-2} ... P_1 P_0 y`. `y` must be an `n x 1` column.
    pub fn apply_qty(&self, y: &mut Mat<f64>) {
        assert_eq!(y.nrows(), self.n, "apply_qty: row count must match");
        assert_eq!(y.ncols(), 1, "apply_qty: expected a column vector");
        for i in 0..self.n.saturating_sub(1) {
            let u = self.ref_u[i];
            if u[0] * u[0] + u[1] * u[1] + u[2] * u[2] <= self.prec {
                continue;
            }
            // The terminal reflector is a 2-vector; its third component is
            // an exact zero, which also keeps the access in bounds.
            let mut dot2 = y.as_ref()[(i, 0)] * u[0] + y.as_ref()[(i + 1, 0)] * u[1];
            if u[2].abs() > self.prec {
                dot2 += y.as_ref()[(i + 2, 0)] * u[2];
            }
            dot2 *= 2.0;
            y.as_mut()[(i, 0)] -= dot2 * u[0];
            y.as_mut()[(i + 1, 0)] -= dot2 * u[1];
            if u[2].abs() > self.prec {
                y.as_mut()[(i + 2, 0)] -= dot2 * u[2];
            }
        }
    }
}
