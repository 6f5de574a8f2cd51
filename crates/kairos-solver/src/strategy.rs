//! Time scheme trait: the core abstraction for one fixed-size step.
//!
//! Every discretization implements this trait, letting the adaptive
//! controller swap between backward Euler, trapezoidal or any other
//! scheme at runtime.

use kairos_math::VariableLayout;
use kairos_types::KairosResult;

use crate::convergence::ConvergenceStatus;
use crate::state::SolutionState;
use crate::system::DifferentialSystem;

/// Result of one fixed-size step.
#[derive(Debug, Clone)]
pub struct StepAttempt {
    /// Step size the attempt was made with.
    pub requested_deltat: f64,
    /// State at `time + requested_deltat`; the best iterate when the
    /// nonlinear solve did not converge.
    pub resulting_state: SolutionState,
    /// Whether the nonlinear solve converged.
    pub converged: bool,
    /// Nonlinear iterations actually performed.
    pub iterations_used: usize,
    /// Terminal status of the nonlinear solve.
    pub status: ConvergenceStatus,
    /// Final residual norm.
    pub final_residual: f64,
    /// Wall-clock time for this step (seconds).
    pub wall_time: f64,
}

/// Trait for fixed-step time discretizations.
///
/// The controller calls these methods in order:
///
/// ```text
/// scheme.reinit(layout)?;
/// loop {
///     let attempt = scheme.step(model, &state, deltat)?;
/// }
/// ```
///
/// # Implementations
///
/// - [`ThetaScheme`](crate::theta::ThetaScheme): backward Euler,
///   trapezoidal, forward Euler and general theta methods
pub trait TimeScheme: Send {
    /// Prepare for solution vectors partitioned by `layout`.
    ///
    /// Called on controller init and after the variable set changes.
    fn reinit(&mut self, layout: &VariableLayout) -> KairosResult<()>;

    /// Advance `state` by `deltat`.
    ///
    /// Must not modify `state`; the result is a fresh attempt. A
    /// non-converged nonlinear solve is reported through
    /// [`StepAttempt::converged`], not as an error.
    fn step(
        &mut self,
        model: &dyn DifferentialSystem,
        state: &SolutionState,
        deltat: f64,
    ) -> KairosResult<StepAttempt>;

    /// Order `p` of the step-doubling error model: local error control
    /// grows steps with exponent `1/(p+1)`, global control with `1/p`.
    /// This is the scheme's order of accuracy (1 for backward Euler, 2
    /// for trapezoidal).
    fn error_order(&self) -> u32;

    /// Returns the scheme's name.
    fn name(&self) -> &str;
}
