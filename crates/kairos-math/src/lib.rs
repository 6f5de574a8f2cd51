//! # kairos-math
//!
//! Numerical primitives for the kairos time-stepping engine.
//!
//! Provides:
//! - Variable layouts and per-variable component weights
//! - The error-norm evaluator (discrete L1 / L2 / L∞, optionally weighted)
//! - Sparse matrix representation (CSR) and a pluggable linear-solver interface
//! - A direct sparse LU solver backed by `faer` and a Jacobi-preconditioned BiCGSTAB

pub mod faer_solver;
pub mod krylov;
pub mod layout;
pub mod norm;
pub mod sparse;

pub use faer_solver::FaerLuSolver;
pub use krylov::BiCgStabSolver;
pub use layout::{ComponentWeights, VariableLayout};
pub use norm::{NormEvaluator, NormType};
pub use sparse::{CsrMatrix, LinearSolveControls, LinearSolveReport, LinearSolver};
