//! Step-doubling adaptive timestep controller.
//!
//! Each attempt runs the wrapped [`TimeScheme`] once with the candidate
//! step and twice with half of it. The weighted norm of the difference
//! is a Richardson estimate of the error of the full step:
//!
//! ```text
//! local  (per step):  e = ‖u_full - u_half‖              factor = (tol/e)^(1/(p+1))
//! global (whole run): e = ‖u_full - u_half‖ / ((2^p-1) dt)  factor = (tol/e)^(1/p)
//! ```
//!
//! with `p` the scheme's `error_order`. With `relative_error` the norm
//! is further divided by the larger of the two solution norms. An attempt
//! is rejected when any of its three solves fails or when `e` exceeds a
//! nonzero `upper_tolerance`; it is then retried with a smaller step.
//! Accepted attempts yield the half-step result and a next-step
//! suggestion clamped by `max_growth`, `max_deltat` and `min_deltat`.
//!
//! Nothing outside the controller is mutated until an attempt is
//! accepted, and a failed advance leaves the controller's own
//! bookkeeping (`last_deltat`, norms, [`ControllerStats`]) untouched.
//! Its rejections and iterations are reported in the error instead.

use std::fmt;

use kairos_math::{NormEvaluator, VariableLayout};
use kairos_types::constants::NORM_FLOOR;
use kairos_types::{KairosError, KairosResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::convergence::ConvergenceStatus;
use crate::state::SolutionState;
use crate::strategy::{StepAttempt, TimeScheme};
use crate::system::{DifferentialSystem, TransientSystem};

/// Step-doubling error estimate of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorEstimate {
    /// Weighted norm of `u_full - u_half`.
    pub raw_norm: f64,
    /// Error compared against the tolerances (after relative and
    /// global scaling).
    pub scaled_error: f64,
}

/// One attempt inside an advance, accepted or not.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Step size tried.
    pub deltat: f64,
    /// Whether all three nonlinear solves converged.
    pub converged: bool,
    /// Worst status among the solves.
    pub status: ConvergenceStatus,
    /// Nonlinear iterations over the three solves.
    pub iterations: usize,
    /// Scaled error; `None` when a solve failed.
    pub scaled_error: Option<f64>,
    /// Whether this attempt was accepted.
    pub accepted: bool,
}

/// Result of a successful advance.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    /// Accepted state at `time + accepted_deltat`.
    pub state: SolutionState,
    /// Step size that produced `state`.
    pub accepted_deltat: f64,
    /// Suggested size for the next advance.
    pub next_deltat: f64,
    /// Error estimate of the accepted attempt.
    pub estimate: ErrorEstimate,
    /// Every attempt, rejected ones first.
    pub attempts: Vec<AttemptRecord>,
    /// Nonlinear iterations over all attempts.
    pub nonlinear_iterations: usize,
    /// Largest final residual norm of the accepted attempt's solves.
    pub residual_norm: f64,
}

impl AdvanceOutcome {
    /// Number of rejected attempts.
    pub fn rejections(&self) -> usize {
        self.attempts.iter().filter(|a| !a.accepted).count()
    }
}

/// Run statistics since the last `init`/`reinit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub nonlinear_iterations: usize,
    /// Smallest accepted step (0 before the first acceptance).
    pub min_accepted_deltat: f64,
    /// Largest accepted step.
    pub max_accepted_deltat: f64,
}

impl ControllerStats {
    /// Fraction of attempts that were rejected.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.accepted_steps + self.rejected_steps;
        if total == 0 {
            0.0
        } else {
            self.rejected_steps as f64 / total as f64
        }
    }

    fn record_accept(&mut self, deltat: f64) {
        if self.accepted_steps == 0 {
            self.min_accepted_deltat = deltat;
            self.max_accepted_deltat = deltat;
        } else {
            self.min_accepted_deltat = self.min_accepted_deltat.min(deltat);
            self.max_accepted_deltat = self.max_accepted_deltat.max(deltat);
        }
        self.accepted_steps += 1;
    }
}

impl fmt::Display for ControllerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Steps: {} accepted, {} rejected ({:.1}%), {} nonlinear iterations, dt range [{:.3e}, {:.3e}]",
            self.accepted_steps,
            self.rejected_steps,
            self.rejection_rate() * 100.0,
            self.nonlinear_iterations,
            self.min_accepted_deltat,
            self.max_accepted_deltat
        )
    }
}

/// Adaptive controller wrapping a fixed-step [`TimeScheme`].
pub struct AdaptiveStepController {
    /// Controller parameters; validated on every advance.
    pub config: ControllerConfig,
    scheme: Box<dyn TimeScheme>,
    layout: Option<VariableLayout>,
    last_deltat: Option<f64>,
    max_solution_norm: f64,
    max_residual_norm: f64,
    stats: ControllerStats,
}

impl AdaptiveStepController {
    /// Creates a controller; call [`init`](Self::init) before advancing.
    pub fn new(config: ControllerConfig, scheme: Box<dyn TimeScheme>) -> Self {
        Self {
            config,
            scheme,
            layout: None,
            last_deltat: None,
            max_solution_norm: 0.0,
            max_residual_norm: 0.0,
            stats: ControllerStats::default(),
        }
    }

    /// Sizes the bookkeeping for solutions partitioned by `layout`.
    pub fn init(&mut self, layout: &VariableLayout) -> KairosResult<()> {
        self.scheme.reinit(layout)?;
        self.layout = Some(layout.clone());
        self.last_deltat = None;
        self.max_solution_norm = 0.0;
        self.max_residual_norm = 0.0;
        self.stats = ControllerStats::default();
        Ok(())
    }

    /// Re-sizes after the variable set changed. Configuration is kept,
    /// bookkeeping is reset.
    pub fn reinit(&mut self, layout: &VariableLayout) -> KairosResult<()> {
        self.init(layout)
    }

    /// Step size of the last accepted attempt.
    pub fn last_deltat(&self) -> Option<f64> {
        self.last_deltat
    }

    /// Largest accepted solution norm.
    pub fn max_solution_norm(&self) -> f64 {
        self.max_solution_norm
    }

    /// Largest final nonlinear residual norm of an accepted attempt.
    pub fn max_residual_norm(&self) -> f64 {
        self.max_residual_norm
    }

    /// Statistics since the last `init`/`reinit`.
    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// The wrapped scheme.
    pub fn scheme(&self) -> &dyn TimeScheme {
        self.scheme.as_ref()
    }

    /// The layout given to the last `init`/`reinit`.
    pub fn layout(&self) -> Option<&VariableLayout> {
        self.layout.as_ref()
    }

    /// Advances `state` by one accepted step, starting from `deltat_hint`.
    ///
    /// `state` is never modified; the caller commits
    /// [`AdvanceOutcome::state`] and must advance its clock by
    /// `accepted_deltat`, not by the hint.
    pub fn advance(
        &mut self,
        model: &dyn DifferentialSystem,
        state: &SolutionState,
        deltat_hint: f64,
    ) -> KairosResult<AdvanceOutcome> {
        self.advance_within(model, state, deltat_hint, f64::INFINITY)
    }

    /// Like [`advance`](Self::advance), but no attempt is longer than
    /// `limit`, even when `min_deltat` is larger.
    ///
    /// Used to land exactly on an end time. Within such a step `limit`
    /// takes the place of `min_deltat` as the smallest allowed step.
    pub fn advance_within(
        &mut self,
        model: &dyn DifferentialSystem,
        state: &SolutionState,
        deltat_hint: f64,
        limit: f64,
    ) -> KairosResult<AdvanceOutcome> {
        let layout = self
            .layout
            .clone()
            .ok_or_else(|| KairosError::NotInitialized("AdaptiveStepController".into()))?;
        if model.layout() != &layout {
            return Err(layout_mismatch(&layout, model.layout()));
        }
        self.config.validate(&layout)?;
        state.check_layout(&layout)?;
        if !(deltat_hint > 0.0 && deltat_hint.is_finite()) {
            return Err(KairosError::InvalidConfig(format!(
                "deltat hint must be finite and > 0, got {deltat_hint}"
            )));
        }
        if !(limit > 0.0) {
            return Err(KairosError::InvalidConfig(format!(
                "step limit must be > 0, got {limit}"
            )));
        }

        let norm = NormEvaluator::new(self.config.norm_type);
        let order = self.scheme.error_order().max(1);
        let mut deltat = self.clamp_hint(deltat_hint).min(limit);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut iterations = 0;
        let mut last_scaled_error = f64::INFINITY;

        loop {
            let trial = self.attempt(model, state, deltat)?;
            iterations += trial.iterations;

            let estimate = if trial.converged {
                Some(self.estimate(&norm, &layout, &trial, order, deltat)?)
            } else {
                None
            };
            let scaled_error = estimate.map(|e| e.scaled_error);
            if let Some(e) = scaled_error {
                last_scaled_error = e;
            }

            let upper = self.config.upper_tolerance;
            let rejected = match scaled_error {
                None => true,
                Some(e) => !e.is_finite() || (upper > 0.0 && e > upper),
            };

            attempts.push(AttemptRecord {
                deltat,
                converged: trial.converged,
                status: trial.status,
                iterations: trial.iterations,
                scaled_error,
                accepted: !rejected,
            });
            if let (false, Some(estimate)) = (rejected, estimate) {
                let end_time = state.time + deltat;
                return Ok(self.accept(trial, estimate, end_time, deltat, attempts, iterations));
            }
            let proposed = match scaled_error {
                Some(e) if e.is_finite() => deltat * self.growth_factor(e, order),
                _ => deltat * self.config.failure_shrink,
            };
            warn!(
                deltat,
                scaled_error = ?scaled_error,
                converged = trial.converged,
                next_deltat = proposed,
                "Step rejected"
            );

            let failure = |attempted: f64, reason: String| KairosError::TimestepFailure {
                requested_deltat: deltat_hint,
                attempted_deltat: attempted,
                min_deltat: self.config.min_deltat,
                last_scaled_error,
                nonlinear_iterations: iterations,
                rejections: attempts.len(),
                reason,
            };

            let min = self.config.min_deltat.min(limit);
            let next = if min > 0.0 && proposed < min {
                if deltat > min {
                    min
                } else {
                    return Err(failure(
                        deltat,
                        format!("deltat would fall below min_deltat {min:.3e}"),
                    ));
                }
            } else {
                proposed
            };
            if attempts.len() >= self.config.max_rejections {
                return Err(failure(
                    deltat,
                    format!("{} rejections without acceptance", attempts.len()),
                ));
            }
            if !next.is_normal() || state.time + next == state.time {
                return Err(failure(deltat, "deltat underflow".into()));
            }
            deltat = next;
        }
    }

    /// Runs one [`advance`](Self::advance) on `system` and commits the
    /// accepted state and the next step hint to it.
    pub fn advance_timestep<M: DifferentialSystem>(
        &mut self,
        system: &mut TransientSystem<M>,
    ) -> KairosResult<AdvanceOutcome> {
        self.advance_timestep_within(system, f64::INFINITY)
    }

    /// [`advance_within`](Self::advance_within) on `system`, committing
    /// the result.
    pub fn advance_timestep_within<M: DifferentialSystem>(
        &mut self,
        system: &mut TransientSystem<M>,
        limit: f64,
    ) -> KairosResult<AdvanceOutcome> {
        let outcome = self.advance_within(system.model(), system.state(), system.deltat(), limit)?;
        system.commit(outcome.state.clone(), outcome.next_deltat);
        Ok(outcome)
    }

    /// Clamps the incoming hint so any attempt respects the step bounds.
    fn clamp_hint(&self, hint: f64) -> f64 {
        let c = &self.config;
        let mut deltat = hint;
        if let (Some(last), true) = (self.last_deltat, c.max_growth > 0.0) {
            deltat = deltat.min(c.max_growth * last);
        }
        if c.max_deltat > 0.0 {
            deltat = deltat.min(c.max_deltat);
        }
        if c.min_deltat > 0.0 {
            deltat = deltat.max(c.min_deltat);
        }
        deltat
    }

    /// `(target / e)^exponent`, with `e` floored so zero error gives a
    /// finite factor.
    fn growth_factor(&self, scaled_error: f64, order: u32) -> f64 {
        let exponent = if self.config.global_tolerance {
            1.0 / order as f64
        } else {
            1.0 / (order as f64 + 1.0)
        };
        (self.config.target_tolerance / scaled_error.max(f64::EPSILON)).powf(exponent)
    }

    /// One full step and two chained half steps.
    fn attempt(
        &mut self,
        model: &dyn DifferentialSystem,
        state: &SolutionState,
        deltat: f64,
    ) -> KairosResult<Trial> {
        debug!(deltat, time = state.time, scheme = self.scheme.name(), "Step-doubling attempt");

        let full = self.scheme.step(model, state, deltat)?;
        if !full.converged {
            return Ok(Trial::failed(full));
        }
        let first = self.scheme.step(model, state, 0.5 * deltat)?;
        if !first.converged {
            return Ok(Trial::failed_after(full, first));
        }
        let second = self.scheme.step(model, &first.resulting_state, 0.5 * deltat)?;
        Ok(Trial::new(full, first, second))
    }

    fn estimate(
        &self,
        norm: &NormEvaluator,
        layout: &VariableLayout,
        trial: &Trial,
        order: u32,
        deltat: f64,
    ) -> KairosResult<ErrorEstimate> {
        let weights = &self.config.component_scale;
        let full = &trial.full.values;
        let half = &trial.half.values;
        let raw_norm = norm.difference(full, half, layout, weights)?;

        let mut error = raw_norm;
        if self.config.relative_error {
            let scale = norm
                .evaluate(full, layout, weights)?
                .max(norm.evaluate(half, layout, weights)?);
            if scale > NORM_FLOOR {
                error /= scale;
            }
        }
        if self.config.global_tolerance {
            error /= (2f64.powi(order as i32) - 1.0) * deltat;
        }
        Ok(ErrorEstimate {
            raw_norm,
            scaled_error: error,
        })
    }

    fn accept(
        &mut self,
        trial: Trial,
        estimate: ErrorEstimate,
        end_time: f64,
        deltat: f64,
        attempts: Vec<AttemptRecord>,
        iterations: usize,
    ) -> AdvanceOutcome {
        let order = self.scheme.error_order().max(1);
        let c = &self.config;
        let mut next = deltat * self.growth_factor(estimate.scaled_error, order);
        if c.max_growth > 0.0 {
            next = next.min(c.max_growth * deltat);
        }
        if c.max_deltat > 0.0 {
            next = next.min(c.max_deltat);
        }
        if c.min_deltat > 0.0 {
            next = next.max(c.min_deltat);
        }

        let norm = NormEvaluator::new(c.norm_type);
        let solution_norm = norm.vector(&trial.half.values);
        self.max_solution_norm = self.max_solution_norm.max(solution_norm);
        self.max_residual_norm = self.max_residual_norm.max(trial.residual_norm);
        self.last_deltat = Some(deltat);
        self.stats.record_accept(deltat);
        self.stats.rejected_steps += attempts.len() - 1;
        self.stats.nonlinear_iterations += iterations;

        debug!(
            deltat,
            next_deltat = next,
            raw_error = estimate.raw_norm,
            scaled_error = estimate.scaled_error,
            rejections = attempts.len() - 1,
            "Step accepted"
        );

        let mut state = trial.half;
        state.time = end_time;
        AdvanceOutcome {
            state,
            accepted_deltat: deltat,
            next_deltat: next,
            estimate,
            attempts,
            nonlinear_iterations: iterations,
            residual_norm: trial.residual_norm,
        }
    }
}

/// The three solves of one attempt, reduced to what the controller needs.
struct Trial {
    full: SolutionState,
    half: SolutionState,
    converged: bool,
    status: ConvergenceStatus,
    iterations: usize,
    residual_norm: f64,
}

impl Trial {
    fn new(full: StepAttempt, first: StepAttempt, second: StepAttempt) -> Self {
        let parts = [&full, &first, &second];
        let status = parts
            .iter()
            .map(|a| a.status)
            .find(|s| !s.is_converged())
            .unwrap_or(ConvergenceStatus::Converged);
        Self {
            converged: parts.iter().all(|a| a.converged),
            status,
            iterations: parts.iter().map(|a| a.iterations_used).sum(),
            residual_norm: parts.iter().map(|a| a.final_residual).fold(0.0, f64::max),
            full: full.resulting_state,
            half: second.resulting_state,
        }
    }

    fn failed(full: StepAttempt) -> Self {
        Self {
            converged: false,
            status: full.status,
            iterations: full.iterations_used,
            residual_norm: full.final_residual,
            half: full.resulting_state.clone(),
            full: full.resulting_state,
        }
    }

    fn failed_after(full: StepAttempt, first: StepAttempt) -> Self {
        Self {
            converged: false,
            status: first.status,
            iterations: full.iterations_used + first.iterations_used,
            residual_norm: first.final_residual,
            full: full.resulting_state,
            half: first.resulting_state,
        }
    }
}

fn layout_mismatch(expected: &VariableLayout, found: &VariableLayout) -> KairosError {
    if expected.n_dofs() != found.n_dofs() {
        KairosError::dimension("controller layout (dofs)", expected.n_dofs(), found.n_dofs())
    } else {
        KairosError::dimension(
            "controller layout (variables)",
            expected.n_variables(),
            found.n_variables(),
        )
    }
}
