//! Single-shift QR step on an upper-Hessenberg matrix.
//!
//! For an upper-Hessenberg matrix H and a real shift `mu`, the decomposition
//! `H - mu * I = Q R` needs only `m - 1` Givens rotations, one per
//! subdiagonal entry. This module computes the rotations once and then
//! exposes the three applications the restart logic needs:
//!
//! - `R Q` (again upper-Hessenberg), from which the caller forms the
//!   similarity transform `Q^T H Q = R Q + mu * I`;
//! - `Y <- Y Q`, to carry the Krylov basis along;
//! - `y <- Q^T y`, to track the last coordinate vector through the sweep.
//!
//! Rotations are stored as `(cos, sin)` pairs. A rotation whose defining
//! column pair is below the near-zero threshold is stored as `(0, 0)` and
//! skipped by every application routine, so numerical noise never produces
//! a spurious rotation.

use crate::algorithms::near_zero_tolerance;
use crate::error::{EigsError, EigsErrorKind};
use faer::{Mat, MatRef};

/// QR decomposition of `H - mu * I` for upper-Hessenberg `H`, held as a
/// sequence of Givens rotations together with the triangular factor.
///
/// The decomposition is computed by [`UpperHessenbergQR::new`]; the struct
/// is immutable afterwards.
pub struct UpperHessenbergQR {
    n: usize,
    /// The triangular factor R. Entries below the diagonal are exact zeros
    /// by construction of `matrix_rq`.
    mat_r: Mat<f64>,
    rot_cos: Vec<f64>,
    rot_sin: Vec<f64>,
    prec: f64,
}

impl UpperHessenbergQR {
    /// Decomposes `mat - shift * I = Q R`.
    ///
    /// `mat` is read as an upper-Hessenberg matrix: entries below the first
    /// subdiagonal are ignored. Returns an error if `mat` is not square.
    pub fn new(mat: MatRef<'_, f64>, shift: f64) -> Result<Self, EigsError> {
        if mat.nrows() != mat.ncols() {
            return Err(EigsErrorKind::InputError(format!(
                "Hessenberg QR requires a square matrix, got {} x {}",
                mat.nrows(),
                mat.ncols()
            ))
            .into());
        }

        let n = mat.nrows();
        let prec = near_zero_tolerance();
        let mut mat_r = mat.to_owned();
        for i in 0..n {
            mat_r.as_mut()[(i, i)] -= shift;
        }

        let mut rot_cos = vec![0.0; n.saturating_sub(1)];
        let mut rot_sin = vec![0.0; n.saturating_sub(1)];

        for i in 0..n.saturating_sub(1) {
            // Annihilate the subdiagonal entry (i + 1, i).
            let xi = mat_r.as_ref()[(i, i)];
            let xj = mat_r.as_ref()[(i + 1, i)];
            let r = xi.hypot(xj);
            if r <= prec {
                // Both entries vanish; leave the identity marker (0, 0).
                continue;
            }
            let c = xi / r;
            let s = xj / r;
            rot_cos[i] = c;
            rot_sin[i] = s;

            // Rows i and i + 1 are zero to the left of column i, so the
            // rotation only touches columns i..n.
            for col in i..n {
                let t1 = mat_r.as_ref()[(i, col)];
                let t2 = mat_r.as_ref()[(i + 1, col)];
                mat_r.as_mut()[(i, col)] = c * t1 + s * t2;
                mat_r.as_mut()[(i + 1, col)] = -s * t1 + c * t2;
            }
            mat_r.as_mut()[(i + 1, i)] = 0.0;
        }

        Ok(Self {
            n,
            mat_r,
            rot_cos,
            rot_sin,
            prec,
        })
    }

    #[inline]
    fn is_identity(&self, i: usize) -> bool {
        let c = self.rot_cos[i];
        let s = self.rot_sin[i];
        c * c + s * s <= self.prec
    }

    /// Returns the product `R Q`, which is upper-Hessenberg again.
    ///
    /// The product is assembled from the upper triangle of R only, so every
    /// entry below the subdiagonal of the result is an exact zero. Adding
    /// `shift * I` to the result yields the similarity transform
    /// `Q^T H Q`.
    pub fn matrix_rq(&self) -> Mat<f64> {
        let n = self.n;
        let mut rq = Mat::zeros(n, n);
        for j in 0..n {
            for i in 0..=j {
                rq.as_mut()[(i, j)] = self.mat_r.as_ref()[(i, j)];
            }
        }

        for i in 0..n.saturating_sub(1) {
            if self.is_identity(i) {
                continue;
            }
            let c = self.rot_cos[i];
            let s = self.rot_sin[i];
            // Right-multiplying by G_i mixes columns i and i + 1. Column i
            // of R is zero below row i and column i + 1 below row i + 1, so
            // only rows 0..=i + 1 are affected.
            for row in 0..=(i + 1) {
                let t1 = rq.as_ref()[(row, i)];
                let t2 = rq.as_ref()[(row, i + 1)];
                rq.as_mut()[(row, i)] = c * t1 + s * t2;
                rq.as_mut()[(row, i + 1)] = -s * t1 + c * t2;
            }
        }

        rq
    }

    /// Applies Q from the right: `Y <- Y Q`. `Y` must have `n` columns.
    pub fn apply_yq(&self, y: &mut Mat<f64>) {
        assert_eq!(y.ncols(), self.n, "apply_yq: column count must match");
        let nrow = y.nrows();
        for i in 0..self.n.saturating_sub(1) {
            if self.is_identity(i) {
                continue;
            }
            let c = self.rot_cos[i];
            let s = self.rot_sin[i];
            for row in 0..nrow {
                let t1 = y.as_ref()[(row, i)];
                let t2 = y.as_ref()[(row, i + 1)];
                y.as_mut()[(row, i)] = c * t1 + s * t2;
                y.as_mut()[(row, i + 1)] = -s * t1 + c * t2;
            }
        }
    }

    /// Applies the transpose of Q from the left: `y <- Q^T y`. `y` must be
    /// an `n x 1` column.
    pub fn apply_qty(&self, y: &mut Mat<f64>) {
        assert_eq!(y.nrows(), self.n, "apply_qty: row count must match");
        assert_eq!(y.ncols(), 1, "apply_qty: expected a column vector");
        for i in 0..self.n.saturating_sub(1) {
            if self.is_identity(i) {
                continue;
            }
            let c = self.rot_cos[i];
            let s = self.rot_sin[i];
            let t1 = y.as_ref()[(i, 0)];
            let t2 = y.as_ref()[(i + 1, 0)];
            y.as_mut()[(i, 0)] = c * t1 + s * t2;
            y.as_mut()[(i + 1, 0)] = -s * t1 + c * t2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A small nonsymmetric upper-Hessenberg test matrix.
    fn sample_hessenberg(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            if i > j + 1 {
                0.0
            } else {
                ((2 * i + 3 * j + 1) % 7) as f64 - 2.0
            }
        })
    }

    /// Builds the explicit Q by applying the rotations to the identity.
    fn explicit_q(qr: &UpperHessenbergQR, n: usize) -> Mat<f64> {
        let mut q = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
        qr.apply_yq(&mut q);
        q
    }

    fn trace(m: MatRef<'_, f64>) -> f64 {
        (0..m.nrows()).map(|i| m[(i, i)]).sum()
    }

    #[test]
    fn test_qr_reconstructs_shifted_matrix() {
        let n = 6;
        let h = sample_hessenberg(n);
        let shift = 0.7;
        let qr = UpperHessenbergQR::new(h.as_ref(), shift).unwrap();

        // Q R must equal H - shift * I.
        let q = explicit_q(&qr, n);
        let reconstructed = &q * &qr.mat_r;
        for i in 0..n {
            for j in 0..n {
                let expected = h.as_ref()[(i, j)] - if i == j { shift } else { 0.0 };
                assert!(
                    (reconstructed.as_ref()[(i, j)] - expected).abs() < 1e-12,
                    "mismatch at ({}, {})",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_q_is_orthogonal() {
        let n = 5;
        let h = sample_hessenberg(n);
        let qr = UpperHessenbergQR::new(h.as_ref(), -1.3).unwrap();
        let q = explicit_q(&qr, n);
        let qtq = q.as_ref().transpose() * q.as_ref();
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((qtq.as_ref()[(i, j)] - expected).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn test_rq_is_hessenberg_and_similar() {
        let n = 7;
        let h = sample_hessenberg(n);
        let shift = 2.1;
        let qr = UpperHessenbergQR::new(h.as_ref(), shift).unwrap();
        let mut rq = qr.matrix_rq();
        for i in 0..n {
            rq.as_mut()[(i, i)] += shift;
        }

        // Exact zeros below the subdiagonal.
        for j in 0..n {
            for i in (j + 2)..n {
                assert_eq!(rq.as_ref()[(i, j)], 0.0);
            }
        }

        // Similarity preserves the trace and the trace of powers.
        let h2 = &h * &h;
        let rq2 = &rq * &rq;
        assert!((trace(h.as_ref()) - trace(rq.as_ref())).abs() < 1e-10);
        assert!((trace(h2.as_ref()) - trace(rq2.as_ref())).abs() < 1e-9);
    }

    #[test]
    fn test_zero_shift_on_triangular_matrix_is_identity() {
        // With a positive diagonal and a zero subdiagonal every rotation is
        // the identity, so R Q returns the matrix unchanged.
        let n = 5;
        let h = Mat::from_fn(n, n, |i, j| {
            if i > j {
                0.0
            } else {
                1.0 + (i + 2 * j) as f64
            }
        });
        let qr = UpperHessenbergQR::new(h.as_ref(), 0.0).unwrap();
        let rq = qr.matrix_rq();
        for i in 0..n {
            for j in 0..n {
                assert!((rq.as_ref()[(i, j)] - h.as_ref()[(i, j)]).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn test_apply_qty_inverts_apply_yq() {
        let n = 6;
        let h = sample_hessenberg(n);
        let qr = UpperHessenbergQR::new(h.as_ref(), 0.4).unwrap();
        let q = explicit_q(&qr, n);

        // Q^T (Q e_k) = e_k for every coordinate vector.
        for k in 0..n {
            let mut y = Mat::from_fn(n, 1, |i, _| q.as_ref()[(i, k)]);
            qr.apply_qty(&mut y);
            for i in 0..n {
                let expected = if i == k { 1.0 } else { 0.0 };
                assert!((y.as_ref()[(i, 0)] - expected).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn test_successive_sweeps_compose_into_one_similarity() {
        // Two sweeps with shifts mu then mu' amount to a single similarity
        // by Q Q'. The result stays Hessenberg with the spectrum intact,
        // and the order of the shifts does not affect either property.
        let n = 6;
        let h = sample_hessenberg(n);

        let sweep = |m: &Mat<f64>, shift: f64| -> Mat<f64> {
            let qr = UpperHessenbergQR::new(m.as_ref(), shift).unwrap();
            let mut next = qr.matrix_rq();
            for i in 0..n {
                next.as_mut()[(i, i)] += shift;
            }
            next
        };

        let h_ab = sweep(&sweep(&h, 0.9), -1.4);
        let h_ba = sweep(&sweep(&h, -1.4), 0.9);

        for result in [&h_ab, &h_ba] {
            for j in 0..n {
                for i in (j + 2)..n {
                    assert_eq!(result.as_ref()[(i, j)], 0.0);
                }
            }
            let r2 = result * result;
            let h2 = &h * &h;
            assert!((trace(h.as_ref()) - trace(result.as_ref())).abs() < 1e-10);
            assert!((trace(h2.as_ref()) - trace(r2.as_ref())).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_non_square_input() {
        let m = Mat::from_fn(3, 4, |_, _| 1.0);
        assert!(UpperHessenbergQR::new(m.as_ref(), 0.0).is_err());
    }
}
