//! # kairos-solver
//!
//! Nonlinear solves, time schemes, and adaptive timestep control.
//!
//! ## Key Types
//!
//! - [`SolutionState`]: solution vector plus simulation time
//! - [`DifferentialSystem`] / [`TransientSystem`]: the model and its committed state
//! - [`ConvergenceMonitor`]: ITERATING → CONVERGED / DIVERGED / ITERATION_LIMIT
//! - [`NewtonSolver`]: Newton iteration over a pluggable linear solver
//! - [`TimeScheme`]: pluggable fixed-step scheme trait ([`ThetaScheme`])
//! - [`AdaptiveStepController`]: step-doubling error control

pub mod adaptive;
pub mod config;
pub mod convergence;
pub mod newton;
pub mod state;
pub mod strategy;
pub mod system;
pub mod theta;

pub use adaptive::{AdaptiveStepController, AdvanceOutcome, AttemptRecord, ControllerStats, ErrorEstimate};
pub use config::{ControllerConfig, NewtonConfig};
pub use convergence::{ConvergenceMonitor, ConvergenceReason, ConvergenceState, ConvergenceStatus};
pub use newton::{NewtonOutcome, NewtonSolver, NonlinearProblem};
pub use state::SolutionState;
pub use strategy::{StepAttempt, TimeScheme};
pub use system::{DifferentialSystem, TransientSystem};
pub use theta::ThetaScheme;
