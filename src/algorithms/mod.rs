//! Numerical kernels of the implicitly restarted Arnoldi method.
//!
//! The solver in [`crate::solvers`] is a thin driver over three kernels:
//!
//! - [`arnoldi`]: builds and extends the Arnoldi factorization
//!   `A V_j = V_j H_j + f e_j^T` with re-orthogonalization.
//! - [`hessenberg_qr`]: one implicit QR step on an upper-Hessenberg matrix
//!   with a single real shift, used to filter a real unwanted Ritz value
//!   out of the factorization.
//! - [`double_shift_qr`]: the Francis double-implicit-shift sweep, which
//!   applies a conjugate pair of shifts in one pass of real arithmetic.
//!
//! All kernels share the two derived tolerances below. They are functions of
//! the machine epsilon of `f64` only; no global state is involved.

pub mod arnoldi;
pub mod double_shift_qr;
pub mod hessenberg_qr;

/// Tolerance for orthogonality maintenance and breakdown detection,
/// `eps^(2/3)` (about `4e-11` for `f64`).
///
/// A residual whose norm falls below this value is treated as zero: the
/// Krylov subspace is invariant and the factorization cannot be extended.
/// The same threshold decides whether a computed Ritz value is "real" and
/// whether two Ritz values form a conjugate pair.
#[inline]
pub fn orthogonality_tolerance() -> f64 {
    f64::EPSILON.powf(2.0 / 3.0)
}

/// Tolerance for near-zero detection inside the QR sweeps, `eps^0.9`
/// (about `8e-15` for `f64`).
///
/// Givens rotations and Householder reflectors whose defining vector falls
/// below this threshold are replaced by the identity, and subdiagonal
/// entries below it are treated as exact zeros when splitting a Hessenberg
/// matrix into unreduced blocks.
#[inline]
pub fn near_zero_tolerance() -> f64 {
    f64::EPSILON.powf(0.9)
}

/// Inner product of two `n x 1` column matrices.
#[inline]
pub(crate) fn dot(a: faer::MatRef<'_, f64>, b: faer::MatRef<'_, f64>) -> f64 {
    (a.transpose() * b).as_ref()[(0, 0)]
}
