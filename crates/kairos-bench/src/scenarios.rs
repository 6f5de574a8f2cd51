//! Benchmark scenarios: reference model + initial state + controller setup.
//!
//! Four canonical scenarios for regression testing:
//! 1. **Exponential decay**: linear, exact solution, backward Euler
//! 2. **Logistic**: nonlinear scalar, exact solution, trapezoidal
//! 3. **Van der Pol**: nonlinear oscillator with fast transients
//! 4. **Heat rod**: stiff 1-D diffusion solved with BiCGSTAB

use serde::{Deserialize, Serialize};

use kairos_math::{BiCgStabSolver, FaerLuSolver, LinearSolver};
use kairos_solver::{ControllerConfig, DifferentialSystem, NewtonConfig, NewtonSolver, SolutionState, ThetaScheme};
use kairos_types::{KairosError, KairosResult};

use crate::models::{ExponentialDecay, HeatRod, Logistic, ReferenceModel, VanDerPol};

/// Which benchmark scenario to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Four independent exponentially decaying components.
    #[default]
    ExponentialDecay,
    /// Logistic growth from 10% of capacity.
    Logistic,
    /// Van der Pol oscillator with μ = 2.
    VanDerPol,
    /// Heat equation on 31 interior nodes, fundamental mode.
    HeatRod,
}

impl ScenarioKind {
    /// Returns all scenario kinds.
    pub fn all() -> &'static [ScenarioKind] {
        &[
            ScenarioKind::ExponentialDecay,
            ScenarioKind::Logistic,
            ScenarioKind::VanDerPol,
            ScenarioKind::HeatRod,
        ]
    }

    /// Returns a human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::ExponentialDecay => "exponential_decay",
            ScenarioKind::Logistic => "logistic",
            ScenarioKind::VanDerPol => "van_der_pol",
            ScenarioKind::HeatRod => "heat_rod",
        }
    }

    /// Looks a scenario up by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.name() == name)
    }
}

/// Member of the θ-family used to march a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    BackwardEuler,
    Trapezoidal,
    ForwardEuler,
    /// General θ; the value comes from [`Scenario::theta`].
    Theta,
}

/// Linear solver inside each Newton iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSolverKind {
    /// Sparse LU (faer).
    #[default]
    Lu,
    /// Jacobi-preconditioned BiCGSTAB.
    Bicgstab,
}

impl LinearSolverKind {
    fn build(self) -> Box<dyn LinearSolver> {
        match self {
            LinearSolverKind::Lu => Box::new(FaerLuSolver::new()),
            LinearSolverKind::Bicgstab => Box::new(BiCgStabSolver::new()),
        }
    }
}

/// A fully specified benchmark scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Scenario type.
    pub kind: ScenarioKind,
    /// The model being integrated.
    pub model: ReferenceModel,
    /// State at the start of the run.
    pub initial: SolutionState,
    /// Simulation time to march to.
    pub end_time: f64,
    /// Hint for the first step.
    pub initial_deltat: f64,
    pub scheme: SchemeKind,
    /// θ for [`SchemeKind::Theta`]; ignored otherwise.
    pub theta: Option<f64>,
    pub linear_solver: LinearSolverKind,
    pub controller: ControllerConfig,
    pub newton: NewtonConfig,
    /// Hard cap on accepted steps.
    pub max_steps: usize,
}

/// Default cap on accepted steps per run.
pub const DEFAULT_MAX_STEPS: usize = 100_000;

impl Scenario {
    /// Build a scenario from its kind with default parameters.
    pub fn from_kind(kind: ScenarioKind) -> KairosResult<Self> {
        match kind {
            ScenarioKind::ExponentialDecay => Ok(Self::exponential_decay()),
            ScenarioKind::Logistic => Ok(Self::logistic()),
            ScenarioKind::VanDerPol => Ok(Self::van_der_pol()),
            ScenarioKind::HeatRod => Self::heat_rod(),
        }
    }

    /// u' = -u on four components, backward Euler, default controller.
    pub fn exponential_decay() -> Self {
        let model = ExponentialDecay::new(1.0, 4);
        Self {
            kind: ScenarioKind::ExponentialDecay,
            model: ReferenceModel::Decay(model),
            initial: SolutionState::new(0.0, vec![1.0, 0.5, 0.25, 2.0]),
            end_time: 5.0,
            initial_deltat: 0.1,
            scheme: SchemeKind::BackwardEuler,
            theta: None,
            linear_solver: LinearSolverKind::Lu,
            controller: ControllerConfig::default(),
            newton: NewtonConfig::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Logistic growth, r = 2, K = 1, from u₀ = 0.1 with the trapezoidal rule.
    pub fn logistic() -> Self {
        Self {
            kind: ScenarioKind::Logistic,
            model: ReferenceModel::Logistic(Logistic::new(2.0, 1.0)),
            initial: SolutionState::new(0.0, vec![0.1]),
            end_time: 5.0,
            initial_deltat: 0.05,
            scheme: SchemeKind::Trapezoidal,
            theta: None,
            linear_solver: LinearSolverKind::Lu,
            controller: ControllerConfig::default(),
            newton: NewtonConfig::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Van der Pol, μ = 2, from (2, 0). Attempts above 5× target are redone.
    pub fn van_der_pol() -> Self {
        Self {
            kind: ScenarioKind::VanDerPol,
            model: ReferenceModel::VanDerPol(VanDerPol::new(2.0)),
            initial: SolutionState::new(0.0, vec![2.0, 0.0]),
            end_time: 10.0,
            initial_deltat: 0.01,
            scheme: SchemeKind::Trapezoidal,
            theta: None,
            linear_solver: LinearSolverKind::Lu,
            controller: ControllerConfig {
                upper_tolerance: 0.05,
                max_growth: 2.0,
                ..ControllerConfig::default()
            },
            newton: NewtonConfig::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Fundamental sine mode of a unit rod, backward Euler + BiCGSTAB.
    pub fn heat_rod() -> KairosResult<Self> {
        let rod = HeatRod::new(31, 1.0, 1.0)?;
        let initial = SolutionState::new(0.0, rod.fundamental_mode());
        Ok(Self {
            kind: ScenarioKind::HeatRod,
            model: ReferenceModel::HeatRod(rod),
            initial,
            end_time: 0.1,
            initial_deltat: 1.0e-3,
            scheme: SchemeKind::BackwardEuler,
            theta: None,
            linear_solver: LinearSolverKind::Bicgstab,
            controller: ControllerConfig {
                max_growth: 2.0,
                ..ControllerConfig::default()
            },
            newton: NewtonConfig::default(),
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    /// Number of degrees of freedom.
    pub fn dofs(&self) -> usize {
        self.initial.len()
    }

    /// Checks every run parameter before anything is integrated.
    pub fn validate(&self) -> KairosResult<()> {
        if !(self.end_time.is_finite() && self.end_time > self.initial.time) {
            return Err(KairosError::InvalidConfig(format!(
                "end_time must be finite and after the initial time {}, got {}",
                self.initial.time, self.end_time
            )));
        }
        if !(self.initial_deltat.is_finite() && self.initial_deltat > 0.0) {
            return Err(KairosError::InvalidConfig(format!(
                "initial_deltat must be finite and > 0, got {}",
                self.initial_deltat
            )));
        }
        if self.max_steps == 0 {
            return Err(KairosError::InvalidConfig("max_steps must be >= 1".into()));
        }
        if self.scheme == SchemeKind::Theta && self.theta.is_none() {
            return Err(KairosError::InvalidConfig(
                "scheme \"theta\" needs a theta value".into(),
            ));
        }
        let layout = self.model.layout();
        self.initial.check_layout(layout)?;
        self.controller.validate(layout)?;
        self.newton.validate()
    }

    /// The time scheme this scenario is marched with.
    pub fn build_scheme(&self) -> KairosResult<ThetaScheme> {
        let scheme = match self.scheme {
            SchemeKind::BackwardEuler => ThetaScheme::backward_euler(),
            SchemeKind::Trapezoidal => ThetaScheme::trapezoidal(),
            SchemeKind::ForwardEuler => ThetaScheme::forward_euler(),
            SchemeKind::Theta => {
                let theta = self.theta.ok_or_else(|| {
                    KairosError::InvalidConfig("scheme \"theta\" needs a theta value".into())
                })?;
                ThetaScheme::new(theta)?
            }
        };
        let newton = NewtonSolver::new(self.newton.clone(), self.linear_solver.build());
        Ok(scheme.with_solver(newton))
    }

    /// Exact solution at `time`, if the model has one.
    pub fn exact(&self, time: f64) -> Option<Vec<f64>> {
        self.model
            .exact(&self.initial.values, time - self.initial.time)
    }
}
