//! # Implicitly Restarted Arnoldi Eigensolver

//! A library for computing a few extremal eigenvalues and eigenvectors of
//! large nonsymmetric real matrices, supplied only as matrix-free linear
//! operators. This crate provides the core algorithms and the operator
//! abstractions.

// Declare the modules that form the public API of the crate.
pub mod algorithms;
pub mod error;
pub mod matrix;
pub mod selection;
pub mod solvers;

// Re-export key types to the top level of the crate for easier access.
pub use error::EigsError;
pub use matrix::{DenseRealShiftSolve, LinearOperator, RealShiftSolve};
pub use selection::SelectionRule;
pub use solvers::{GenEigsRealShiftSolver, GenEigsSolver};
