//! This module defines the custom error types for the library.
//!
//! All error conditions that can arise while building an Arnoldi
//! factorization or running the implicitly restarted iteration are
//! centralized in a single enum wrapped by [`EigsError`].
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types with minimal
//! boilerplate. Note that [`faer::linalg::evd::EvdError`] does not implement the standard
//! [`std::error::Error`] trait, so we wrap it manually to provide a compatible error type.
use thiserror::Error;

/// Represents all possible errors that can occur during the Arnoldi process.
///
#[derive(Error, Debug)]
#[error(transparent)]
pub struct EigsError(#[from] pub(crate) EigsErrorKind);

/// Private enum containing the distinct kinds of errors.
/// This separation allows for a clean `Display` implementation via [`thiserror`]
/// while handling non-standard error types manually.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum EigsErrorKind {
    /// Occurs when the Arnoldi extension terminates prematurely because the
    /// residual norm becomes zero (or numerically indistinguishable from zero).
    #[error(
        "Arnoldi iteration breakdown at step {step}: residual norm is zero. The Krylov subspace is invariant."
    )]
    Breakdown { step: usize },

    /// Indicates that the dimensions of the operator and an input vector are
    /// incompatible.
    #[error(
        "Dimension mismatch: operator has {operator_rows} rows but vector has {vector_rows} rows."
    )]
    DimensionMismatch {
        operator_rows: usize,
        vector_rows: usize,
    },

    /// Indicates that an invalid input parameter was provided to a function.
    #[error("Invalid input parameter: {0}")]
    InputError(String),

    /// Wraps an error originating from [`faer`]'s eigendecomposition module.
    #[error("A numerical error occurred during the eigendecomposition of H: {0:?}")]
    EvdError(faer::linalg::evd::EvdError),
}

// Manually implement PartialEq for the public error type.
// We compare the inner `EigsErrorKind`.
impl PartialEq for EigsError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl EigsError {
    /// Returns `true` when the error signals an Arnoldi breakdown, i.e. the
    /// iteration discovered an invariant subspace. The driver treats this as
    /// an early-termination condition rather than a failure.
    pub fn is_breakdown(&self) -> bool {
        matches!(self.0, EigsErrorKind::Breakdown { .. })
    }
}
