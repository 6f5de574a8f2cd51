//! Newton iteration driven by a [`ConvergenceMonitor`].
//!
//! Each iteration assembles the Jacobian, solves `J δ = -R(u)` with the
//! pluggable [`LinearSolver`] at the monitor's current linear tolerance,
//! applies `u ← u + δ` and re-evaluates the residual. A linear solve that
//! fails outright ends the solve as DIVERGED; one that merely misses its
//! tolerance is accepted silently.

use std::time::Instant;

use kairos_math::{
    CsrMatrix, FaerLuSolver, LinearSolveControls, LinearSolver, NormEvaluator, VariableLayout,
};
use kairos_types::{KairosError, KairosResult};
use tracing::{debug, info, trace, warn};

use crate::config::NewtonConfig;
use crate::convergence::{ConvergenceMonitor, ConvergenceReason, ConvergenceState, ConvergenceStatus};

/// A square nonlinear system `R(u) = 0`.
pub trait NonlinearProblem {
    /// Partition of the unknown vector.
    fn layout(&self) -> &VariableLayout;

    /// Evaluates `R(u)` into `out`.
    fn residual(&self, values: &[f64], out: &mut [f64]) -> KairosResult<()>;

    /// Evaluates `∂R/∂u`.
    fn jacobian(&self, values: &[f64]) -> KairosResult<CsrMatrix>;
}

/// Result of a nonlinear solve.
#[derive(Debug, Clone)]
pub struct NewtonOutcome {
    /// Final iterate (the best available even when not converged).
    pub solution: Vec<f64>,
    /// Terminal status.
    pub status: ConvergenceStatus,
    /// Rule that ended the solve.
    pub reason: Option<ConvergenceReason>,
    /// Bookkeeping at termination.
    pub convergence: ConvergenceState,
    /// Inner linear iterations summed over the solve.
    pub linear_iterations: usize,
    /// Wall-clock time (seconds).
    pub wall_time: f64,
}

impl NewtonOutcome {
    /// True when the solve converged.
    pub fn converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Nonlinear iterations performed.
    pub fn iterations(&self) -> usize {
        self.convergence.iteration
    }

    /// Residual norm of the returned iterate.
    pub fn final_residual(&self) -> f64 {
        self.convergence.residual_norm
    }
}

/// Newton solver owning its linear solver.
pub struct NewtonSolver {
    /// Tolerances and iteration caps.
    pub config: NewtonConfig,
    /// Norm used for residual and increment norms.
    pub norm: NormEvaluator,
    linear: Box<dyn LinearSolver>,
}

impl NewtonSolver {
    /// Creates a solver with the given configuration and linear solver.
    pub fn new(config: NewtonConfig, linear: Box<dyn LinearSolver>) -> Self {
        Self {
            config,
            norm: NormEvaluator::default(),
            linear,
        }
    }

    /// The linear solver's name.
    pub fn linear_solver_name(&self) -> &str {
        self.linear.name()
    }

    /// Solves `problem` starting from `initial_guess`.
    ///
    /// Errors are reserved for invalid configuration, dimension
    /// mismatches and model evaluation failures. Non-convergence is
    /// reported through [`NewtonOutcome::status`].
    pub fn solve(
        &mut self,
        problem: &dyn NonlinearProblem,
        initial_guess: Vec<f64>,
    ) -> KairosResult<NewtonOutcome> {
        let start = Instant::now();
        self.config.validate()?;
        let layout = problem.layout();
        layout.check_len("newton initial guess", initial_guess.len())?;

        let n = initial_guess.len();
        let quiet = self.config.quiet;
        let mut u = initial_guess;
        let mut residual = vec![0.0; n];
        let mut rhs = vec![0.0; n];
        let mut delta = vec![0.0; n];
        let mut linear_iterations = 0;

        let mut monitor = ConvergenceMonitor::new(self.config.clone(), self.norm);
        problem.residual(&u, &mut residual)?;
        let initial_norm = monitor.measure(&residual, layout)?;
        let mut status = monitor.start(initial_norm);

        while status == ConvergenceStatus::Iterating {
            let jacobian = problem.jacobian(&u)?;
            if jacobian.rows != n || jacobian.cols != n {
                return Err(KairosError::dimension("newton jacobian", n, jacobian.rows));
            }

            if let Err(e) = self.linear.factorize(&jacobian) {
                warn!(solver = self.linear.name(), error = %e, "Linear factorization failed");
                status = monitor.record_linear_failure();
                break;
            }

            for (b, r) in rhs.iter_mut().zip(&residual) {
                *b = -r;
            }
            let controls = LinearSolveControls {
                tolerance: monitor.linear_tolerance(),
                max_iterations: self.config.max_linear_iterations,
            };
            match self.linear.solve(&rhs, &mut delta, controls) {
                Ok(report) => {
                    linear_iterations += report.iterations;
                    if !report.converged {
                        trace!(
                            iterations = report.iterations,
                            residual = report.residual,
                            tolerance = controls.tolerance,
                            "Linear solve stopped short of tolerance"
                        );
                    }
                }
                Err(e) => {
                    warn!(solver = self.linear.name(), error = %e, "Linear solve failed");
                    status = monitor.record_linear_failure();
                    break;
                }
            }

            for (x, d) in u.iter_mut().zip(&delta) {
                *x += d;
            }
            problem.residual(&u, &mut residual)?;
            let residual_norm = monitor.measure(&residual, layout)?;
            let step_norm = monitor.measure(&delta, layout)?;
            status = monitor.record(residual_norm, step_norm);

            let k = monitor.state().iteration;
            if quiet {
                trace!(iteration = k, residual_norm, step_norm, "Nonlinear iteration");
            } else {
                info!(iteration = k, residual_norm, step_norm, "Nonlinear iteration");
            }
        }

        let convergence = *monitor.state();
        match status {
            ConvergenceStatus::Converged => debug!(
                iterations = convergence.iteration,
                residual_norm = convergence.residual_norm,
                reason = ?monitor.reason(),
                "Nonlinear solve converged"
            ),
            _ => warn!(
                ?status,
                iterations = convergence.iteration,
                residual_norm = convergence.residual_norm,
                reason = ?monitor.reason(),
                "Nonlinear solve did not converge"
            ),
        }

        Ok(NewtonOutcome {
            solution: u,
            status,
            reason: monitor.reason(),
            convergence,
            linear_iterations,
            wall_time: start.elapsed().as_secs_f64(),
        })
    }
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self::new(NewtonConfig::default(), Box::new(FaerLuSolver::new()))
    }
}
