//! Convergence state machine for one nonlinear solve.
//!
//! ```text
//!              ┌──────────── CONVERGED
//! ITERATING ───┼──────────── DIVERGED
//!              └──────────── ITERATION_LIMIT
//! ```
//!
//! The monitor is fed the residual and increment norms after each
//! iteration and classifies the solve. While the solve keeps iterating
//! it also tracks the tolerance the next inner linear solve should use.

use kairos_math::{ComponentWeights, NormEvaluator, VariableLayout};
use kairos_types::constants::NORM_FLOOR;
use kairos_types::KairosResult;
use serde::{Deserialize, Serialize};

use crate::config::NewtonConfig;

/// Where a nonlinear solve stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// Not yet terminal.
    Iterating,
    /// A residual or step criterion was met.
    Converged,
    /// The iterate blew up or the linear solve failed.
    Diverged,
    /// `max_nonlinear_iterations` reached without converging.
    IterationLimit,
}

impl ConvergenceStatus {
    /// True for every state except [`ConvergenceStatus::Iterating`].
    pub fn is_terminal(self) -> bool {
        self != Self::Iterating
    }

    /// True only for [`ConvergenceStatus::Converged`].
    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

/// Which rule produced a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceReason {
    AbsoluteResidual,
    RelativeResidual,
    AbsoluteStep,
    RelativeStep,
    NonFinite,
    ResidualGrowth,
    LinearSolveFailure,
    IterationLimit,
}

/// Per-solve bookkeeping, reset by [`ConvergenceMonitor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    /// Completed iterations.
    pub iteration: usize,
    /// Residual norm after the last iteration.
    pub residual_norm: f64,
    /// Increment norm of the last iteration.
    pub step_norm: f64,
    /// Residual norm of the initial guess.
    pub initial_residual_norm: f64,
    /// Largest residual norm seen so far (initial residual included).
    pub max_residual_seen: f64,
    /// Largest increment norm seen so far.
    pub max_step_seen: f64,
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self {
            iteration: 0,
            residual_norm: 0.0,
            step_norm: 0.0,
            initial_residual_norm: 0.0,
            max_residual_seen: 0.0,
            max_step_seen: 0.0,
        }
    }
}

/// Classifies the iterations of a single nonlinear solve.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    config: NewtonConfig,
    norm: NormEvaluator,
    state: ConvergenceState,
    status: ConvergenceStatus,
    reason: Option<ConvergenceReason>,
    linear_tolerance: f64,
}

impl ConvergenceMonitor {
    /// Creates a monitor; call [`start`](Self::start) before recording.
    pub fn new(config: NewtonConfig, norm: NormEvaluator) -> Self {
        let linear_tolerance = config.initial_linear_tolerance;
        Self {
            config,
            norm,
            state: ConvergenceState::default(),
            status: ConvergenceStatus::Iterating,
            reason: None,
            linear_tolerance,
        }
    }

    /// Norm of a residual or increment vector, uniformly weighted.
    pub fn measure(&self, vector: &[f64], layout: &VariableLayout) -> KairosResult<f64> {
        self.norm
            .evaluate(vector, layout, &ComponentWeights::uniform())
    }

    /// Resets the bookkeeping for a new solve whose initial guess has
    /// residual norm `initial_residual_norm`.
    ///
    /// An initial guess that already meets the absolute residual
    /// tolerance converges with zero iterations.
    pub fn start(&mut self, initial_residual_norm: f64) -> ConvergenceStatus {
        self.state = ConvergenceState {
            residual_norm: initial_residual_norm,
            initial_residual_norm,
            max_residual_seen: initial_residual_norm,
            ..Default::default()
        };
        self.linear_tolerance = self.config.initial_linear_tolerance;
        self.status = ConvergenceStatus::Iterating;
        self.reason = None;

        if !initial_residual_norm.is_finite() {
            self.finish(ConvergenceStatus::Diverged, ConvergenceReason::NonFinite);
        } else if initial_residual_norm == 0.0
            || meets(initial_residual_norm, self.config.absolute_residual_tolerance)
        {
            self.finish(
                ConvergenceStatus::Converged,
                ConvergenceReason::AbsoluteResidual,
            );
        }
        self.status
    }

    /// Records iteration `k = iteration + 1` and returns the new status.
    ///
    /// Recording after a terminal status is a no-op.
    pub fn record(&mut self, residual_norm: f64, step_norm: f64) -> ConvergenceStatus {
        if self.status.is_terminal() {
            return self.status;
        }

        let s = &mut self.state;
        s.iteration += 1;
        s.residual_norm = residual_norm;
        s.step_norm = step_norm;
        s.max_residual_seen = s.max_residual_seen.max(residual_norm);
        s.max_step_seen = s.max_step_seen.max(step_norm);
        let s = *s;
        let c = &self.config;

        if !residual_norm.is_finite() || !step_norm.is_finite() {
            self.finish(ConvergenceStatus::Diverged, ConvergenceReason::NonFinite);
        } else if residual_norm == 0.0 || meets(residual_norm, c.absolute_residual_tolerance) {
            self.finish(
                ConvergenceStatus::Converged,
                ConvergenceReason::AbsoluteResidual,
            );
        } else if meets_relative(
            residual_norm,
            c.relative_residual_tolerance,
            s.initial_residual_norm,
        ) {
            self.finish(
                ConvergenceStatus::Converged,
                ConvergenceReason::RelativeResidual,
            );
        } else if meets(step_norm, c.absolute_step_tolerance) {
            self.finish(ConvergenceStatus::Converged, ConvergenceReason::AbsoluteStep);
        } else if meets_relative(step_norm, c.relative_step_tolerance, s.max_step_seen) {
            self.finish(ConvergenceStatus::Converged, ConvergenceReason::RelativeStep);
        } else if c.divergence_tolerance > 0.0
            && residual_norm > c.divergence_tolerance * s.initial_residual_norm.max(NORM_FLOOR)
        {
            self.finish(
                ConvergenceStatus::Diverged,
                ConvergenceReason::ResidualGrowth,
            );
        } else if s.iteration >= c.max_nonlinear_iterations {
            self.finish(
                ConvergenceStatus::IterationLimit,
                ConvergenceReason::IterationLimit,
            );
        } else {
            self.tighten_linear_tolerance();
        }
        self.status
    }

    /// Marks the solve diverged after its inner linear solve failed.
    pub fn record_linear_failure(&mut self) -> ConvergenceStatus {
        if !self.status.is_terminal() {
            self.finish(
                ConvergenceStatus::Diverged,
                ConvergenceReason::LinearSolveFailure,
            );
        }
        self.status
    }

    /// Tolerance for the next inner linear solve.
    pub fn linear_tolerance(&self) -> f64 {
        self.linear_tolerance
    }

    /// Current status.
    pub fn status(&self) -> ConvergenceStatus {
        self.status
    }

    /// Rule that produced the terminal status, if any.
    pub fn reason(&self) -> Option<ConvergenceReason> {
        self.reason
    }

    /// Bookkeeping of the current solve.
    pub fn state(&self) -> &ConvergenceState {
        &self.state
    }

    /// The configuration in use.
    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    fn finish(&mut self, status: ConvergenceStatus, reason: ConvergenceReason) {
        self.status = status;
        self.reason = Some(reason);
    }

    // tol_{k+1} = min(tol_k, max(minimum, multiplier · r_k / max_r))
    fn tighten_linear_tolerance(&mut self) {
        let max_r = self.state.max_residual_seen.max(NORM_FLOOR);
        let candidate = (self.config.linear_tolerance_multiplier * self.state.residual_norm
            / max_r)
            .max(self.config.minimum_linear_tolerance);
        self.linear_tolerance = self.linear_tolerance.min(candidate);
    }
}

/// `value ≤ tolerance` with a zero tolerance disabling the test.
fn meets(value: f64, tolerance: f64) -> bool {
    tolerance > 0.0 && value <= tolerance
}

fn meets_relative(value: f64, tolerance: f64, reference: f64) -> bool {
    tolerance > 0.0 && reference > 0.0 && value <= tolerance * reference
}
