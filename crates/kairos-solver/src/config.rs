//! Solver configuration.
//!
//! Parameters that control the nonlinear solve of each step attempt
//! ([`NewtonConfig`]) and the step-doubling controller
//! ([`ControllerConfig`]). Fields are plain data: they may be assigned
//! freely and are checked by `validate()` when the solver uses them.

use kairos_math::{ComponentWeights, NormType, VariableLayout};
use kairos_types::constants::{
    DEFAULT_DIVERGENCE_TOLERANCE, DEFAULT_FAILURE_SHRINK, DEFAULT_INITIAL_LINEAR_TOLERANCE,
    DEFAULT_LINEAR_TOLERANCE_MULTIPLIER, DEFAULT_MAX_LINEAR_ITERATIONS,
    DEFAULT_MAX_NONLINEAR_ITERATIONS, DEFAULT_MAX_REJECTIONS, DEFAULT_MINIMUM_LINEAR_TOLERANCE,
    DEFAULT_TARGET_TOLERANCE,
};
use kairos_types::{KairosError, KairosResult};
use serde::{Deserialize, Serialize};

/// Configuration for the nonlinear (Newton) solve of one step attempt.
///
/// A solve converges as soon as any of the four residual/step criteria
/// holds; a tolerance of 0 disables its criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Maximum nonlinear iterations per solve.
    pub max_nonlinear_iterations: usize,

    /// Iteration cap handed to each inner linear solve.
    pub max_linear_iterations: usize,

    /// Converged when the residual norm falls below this value.
    pub absolute_residual_tolerance: f64,

    /// Converged when the residual norm falls below this fraction of
    /// the initial residual norm.
    pub relative_residual_tolerance: f64,

    /// Converged when the Newton increment norm falls below this value.
    pub absolute_step_tolerance: f64,

    /// Converged when the increment norm falls below this fraction of the
    /// largest increment seen in the solve.
    pub relative_step_tolerance: f64,

    /// Linear tolerance for the first inner solve.
    pub initial_linear_tolerance: f64,

    /// Floor for the tightened linear tolerance.
    pub minimum_linear_tolerance: f64,

    /// Factor applied to the residual reduction when tightening the
    /// linear tolerance.
    pub linear_tolerance_multiplier: f64,

    /// Residual growth over the initial residual treated as divergence
    /// (0 disables the ratio test).
    pub divergence_tolerance: f64,

    /// Report per-iteration residuals at `trace` instead of `info`.
    pub quiet: bool,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_nonlinear_iterations: DEFAULT_MAX_NONLINEAR_ITERATIONS,
            max_linear_iterations: DEFAULT_MAX_LINEAR_ITERATIONS,
            absolute_residual_tolerance: 1e-12,
            relative_residual_tolerance: 1e-9,
            absolute_step_tolerance: 0.0,
            relative_step_tolerance: 1e-9,
            initial_linear_tolerance: DEFAULT_INITIAL_LINEAR_TOLERANCE,
            minimum_linear_tolerance: DEFAULT_MINIMUM_LINEAR_TOLERANCE,
            linear_tolerance_multiplier: DEFAULT_LINEAR_TOLERANCE_MULTIPLIER,
            divergence_tolerance: DEFAULT_DIVERGENCE_TOLERANCE,
            quiet: true,
        }
    }
}

impl NewtonConfig {
    /// Creates a tight config (more iterations, tighter tolerances).
    pub fn tight() -> Self {
        Self {
            max_nonlinear_iterations: 100,
            absolute_residual_tolerance: 1e-14,
            relative_residual_tolerance: 1e-12,
            relative_step_tolerance: 1e-12,
            ..Default::default()
        }
    }

    /// Checks that the configuration can drive a solve.
    pub fn validate(&self) -> KairosResult<()> {
        if self.max_nonlinear_iterations == 0 {
            return Err(KairosError::InvalidConfig(
                "max_nonlinear_iterations must be at least 1".into(),
            ));
        }
        let fields = [
            ("absolute_residual_tolerance", self.absolute_residual_tolerance),
            ("relative_residual_tolerance", self.relative_residual_tolerance),
            ("absolute_step_tolerance", self.absolute_step_tolerance),
            ("relative_step_tolerance", self.relative_step_tolerance),
            ("initial_linear_tolerance", self.initial_linear_tolerance),
            ("minimum_linear_tolerance", self.minimum_linear_tolerance),
            ("linear_tolerance_multiplier", self.linear_tolerance_multiplier),
            ("divergence_tolerance", self.divergence_tolerance),
        ];
        for (name, value) in fields {
            non_negative(name, value)?;
        }
        Ok(())
    }
}

/// Configuration of the step-doubling controller.
///
/// `upper_tolerance`, `max_deltat`, `min_deltat` and `max_growth` use 0
/// for "no limit". `target_tolerance` must be strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Scaled error the next step size is chosen to hit.
    pub target_tolerance: f64,

    /// Attempts whose scaled error exceeds this are rejected (0 = never).
    pub upper_tolerance: f64,

    /// Largest step size (0 = unbounded).
    pub max_deltat: f64,

    /// Smallest step size (0 = unbounded).
    pub min_deltat: f64,

    /// Largest growth factor between consecutive accepted steps
    /// (0 = unbounded).
    pub max_growth: f64,

    /// Target whole-run accuracy instead of per-step accuracy.
    pub global_tolerance: bool,

    /// Per-variable error weights (empty = uniform).
    pub component_scale: ComponentWeights,

    /// Norm used for the step-doubling error.
    pub norm_type: NormType,

    /// Divide the raw error by the larger of the two solution norms.
    pub relative_error: bool,

    /// Rejected attempts allowed inside one advance.
    pub max_rejections: usize,

    /// Step shrink applied after a nonlinear solve fails.
    pub failure_shrink: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_tolerance: DEFAULT_TARGET_TOLERANCE,
            upper_tolerance: 0.0,
            max_deltat: 0.0,
            min_deltat: 0.0,
            max_growth: 0.0,
            global_tolerance: true,
            component_scale: ComponentWeights::uniform(),
            norm_type: NormType::DiscreteL2,
            relative_error: true,
            max_rejections: DEFAULT_MAX_REJECTIONS,
            failure_shrink: DEFAULT_FAILURE_SHRINK,
        }
    }
}

impl ControllerConfig {
    /// Per-step accuracy with absolute errors.
    pub fn local() -> Self {
        Self {
            global_tolerance: false,
            relative_error: false,
            ..Default::default()
        }
    }

    /// Checks the configuration against the variables being scored.
    pub fn validate(&self, layout: &VariableLayout) -> KairosResult<()> {
        if !(self.target_tolerance > 0.0 && self.target_tolerance.is_finite()) {
            return Err(KairosError::InvalidConfig(format!(
                "target_tolerance must be finite and > 0, got {}",
                self.target_tolerance
            )));
        }
        let bounds = [
            ("upper_tolerance", self.upper_tolerance),
            ("max_deltat", self.max_deltat),
            ("min_deltat", self.min_deltat),
            ("max_growth", self.max_growth),
        ];
        for (name, value) in bounds {
            non_negative(name, value)?;
        }
        if self.upper_tolerance > 0.0 && self.upper_tolerance < self.target_tolerance {
            return Err(KairosError::InvalidConfig(format!(
                "upper_tolerance ({}) must be >= target_tolerance ({})",
                self.upper_tolerance, self.target_tolerance
            )));
        }
        if self.max_deltat > 0.0 && self.min_deltat > self.max_deltat {
            return Err(KairosError::InvalidConfig(format!(
                "min_deltat ({}) exceeds max_deltat ({})",
                self.min_deltat, self.max_deltat
            )));
        }
        if self.max_growth > 0.0 && self.max_growth < 1.0 {
            return Err(KairosError::InvalidConfig(format!(
                "max_growth must be 0 or >= 1, got {}",
                self.max_growth
            )));
        }
        if !(self.failure_shrink > 0.0 && self.failure_shrink < 1.0) {
            return Err(KairosError::InvalidConfig(format!(
                "failure_shrink must lie in (0, 1), got {}",
                self.failure_shrink
            )));
        }
        self.component_scale.validate(layout)
    }
}

fn non_negative(name: &str, value: f64) -> KairosResult<()> {
    if !(value >= 0.0 && value.is_finite()) {
        return Err(KairosError::InvalidConfig(format!(
            "{name} must be finite and >= 0, got {value}"
        )));
    }
    Ok(())
}
