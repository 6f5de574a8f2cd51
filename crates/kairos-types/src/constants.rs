//! Numerical defaults shared by configuration types.

/// Default target tolerance for the step-doubling error estimate.
pub const DEFAULT_TARGET_TOLERANCE: f64 = 1.0e-2;

/// Default cap on nonlinear iterations per solve.
pub const DEFAULT_MAX_NONLINEAR_ITERATIONS: usize = 50;

/// Default cap on iterations of each inner linear solve.
pub const DEFAULT_MAX_LINEAR_ITERATIONS: usize = 1000;

/// Default tolerance for the first linear solve of a Newton loop.
pub const DEFAULT_INITIAL_LINEAR_TOLERANCE: f64 = 1.0e-12;

/// Floor for the tightened linear tolerance.
pub const DEFAULT_MINIMUM_LINEAR_TOLERANCE: f64 = 1.0e-24;

/// Factor applied to the residual reduction when tightening the linear tolerance.
pub const DEFAULT_LINEAR_TOLERANCE_MULTIPLIER: f64 = 1.0e-3;

/// Residual growth (relative to the initial residual) treated as divergence.
pub const DEFAULT_DIVERGENCE_TOLERANCE: f64 = 1.0e10;

/// Step shrink applied after a nonlinear solve fails to converge.
pub const DEFAULT_FAILURE_SHRINK: f64 = 0.5;

/// Default cap on rejected attempts inside a single advance.
pub const DEFAULT_MAX_REJECTIONS: usize = 50;

/// Smallest norm treated as nonzero when normalising errors.
pub const NORM_FLOOR: f64 = 1.0e-300;
