//! Theta-method time schemes.
//!
//! One step of size `dt` from `(t, u_n)` solves
//!
//! ```text
//! R(u) = u - u_n - dt (θ f(t+dt, u) + (1-θ) f(t, u_n)) = 0
//! J(u) = I - dt θ ∂f/∂u
//! ```
//!
//! θ = 1 is backward Euler, θ = ½ the trapezoidal rule
//! (Crank–Nicolson), θ = 0 forward Euler. Only θ = ½ is second order.

use std::time::Instant;

use kairos_math::{CsrMatrix, VariableLayout};
use kairos_types::{KairosError, KairosResult};

use crate::newton::{NewtonSolver, NonlinearProblem};
use crate::state::SolutionState;
use crate::strategy::{StepAttempt, TimeScheme};
use crate::system::DifferentialSystem;

/// Theta-method scheme with an embedded Newton solve.
pub struct ThetaScheme {
    theta: f64,
    newton: NewtonSolver,
    n_dofs: Option<usize>,
}

impl ThetaScheme {
    /// General theta method, `theta ∈ [0, 1]`.
    pub fn new(theta: f64) -> KairosResult<Self> {
        if !(0.0..=1.0).contains(&theta) {
            return Err(KairosError::InvalidConfig(format!(
                "theta must lie in [0, 1], got {theta}"
            )));
        }
        Ok(Self {
            theta,
            newton: NewtonSolver::default(),
            n_dofs: None,
        })
    }

    /// θ = 1.
    pub fn backward_euler() -> Self {
        Self {
            theta: 1.0,
            newton: NewtonSolver::default(),
            n_dofs: None,
        }
    }

    /// θ = ½.
    pub fn trapezoidal() -> Self {
        Self {
            theta: 0.5,
            ..Self::backward_euler()
        }
    }

    /// θ = 0.
    pub fn forward_euler() -> Self {
        Self {
            theta: 0.0,
            ..Self::backward_euler()
        }
    }

    /// Replaces the embedded Newton solver.
    pub fn with_solver(mut self, newton: NewtonSolver) -> Self {
        self.newton = newton;
        self
    }

    /// The implicitness parameter θ.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// The embedded Newton solver.
    pub fn newton(&self) -> &NewtonSolver {
        &self.newton
    }

    /// Mutable access to the embedded Newton solver.
    pub fn newton_mut(&mut self) -> &mut NewtonSolver {
        &mut self.newton
    }
}

/// The nonlinear system of one theta step.
struct ThetaStage<'a> {
    model: &'a dyn DifferentialSystem,
    theta: f64,
    time: f64,
    deltat: f64,
    previous: &'a [f64],
    /// (1-θ) f(t, u_n)
    explicit: Vec<f64>,
}

impl NonlinearProblem for ThetaStage<'_> {
    fn layout(&self) -> &VariableLayout {
        self.model.layout()
    }

    fn residual(&self, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        if self.theta > 0.0 {
            self.model.rate(self.time + self.deltat, values, out)?;
        } else {
            out.iter_mut().for_each(|f| *f = 0.0);
        }
        let rows = out.iter_mut().zip(values).zip(self.previous).zip(&self.explicit);
        for (((r, u), prev), explicit) in rows {
            *r = u - prev - self.deltat * (self.theta * *r + explicit);
        }
        Ok(())
    }

    fn jacobian(&self, values: &[f64]) -> KairosResult<CsrMatrix> {
        if self.theta == 0.0 {
            return Ok(CsrMatrix::identity(values.len()));
        }
        self.model
            .jacobian(self.time + self.deltat, values)?
            .shifted(-self.deltat * self.theta, 1.0)
            .map_err(KairosError::LinearSolve)
    }
}

impl TimeScheme for ThetaScheme {
    fn reinit(&mut self, layout: &VariableLayout) -> KairosResult<()> {
        self.n_dofs = Some(layout.n_dofs());
        Ok(())
    }

    fn step(
        &mut self,
        model: &dyn DifferentialSystem,
        state: &SolutionState,
        deltat: f64,
    ) -> KairosResult<StepAttempt> {
        let start = Instant::now();
        let layout = model.layout();
        state.check_layout(layout)?;
        if let Some(n) = self.n_dofs {
            if n != layout.n_dofs() {
                return Err(KairosError::dimension(self.name(), n, layout.n_dofs()));
            }
        }

        let n = state.len();
        let mut explicit = vec![0.0; n];
        if self.theta < 1.0 {
            model.rate(state.time, &state.values, &mut explicit)?;
            for f in &mut explicit {
                *f *= 1.0 - self.theta;
            }
        }

        // Forward Euler is solved by its own predictor.
        let guess = if self.theta == 0.0 {
            state
                .values
                .iter()
                .zip(&explicit)
                .map(|(u, f)| u + deltat * f)
                .collect()
        } else {
            state.values.clone()
        };

        let stage = ThetaStage {
            model,
            theta: self.theta,
            time: state.time,
            deltat,
            previous: &state.values,
            explicit,
        };
        let outcome = self.newton.solve(&stage, guess)?;
        let converged = outcome.converged();

        Ok(StepAttempt {
            requested_deltat: deltat,
            converged,
            iterations_used: outcome.iterations(),
            status: outcome.status,
            final_residual: outcome.final_residual(),
            resulting_state: SolutionState::new(state.time + deltat, outcome.solution),
            wall_time: start.elapsed().as_secs_f64(),
        })
    }

    fn error_order(&self) -> u32 {
        if self.theta == 0.5 {
            2
        } else {
            1
        }
    }

    fn name(&self) -> &str {
        if self.theta == 1.0 {
            "backward_euler"
        } else if self.theta == 0.5 {
            "trapezoidal"
        } else if self.theta == 0.0 {
            "forward_euler"
        } else {
            "theta"
        }
    }
}
