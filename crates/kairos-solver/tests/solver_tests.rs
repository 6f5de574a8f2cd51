//! Integration tests for kairos-solver.

use kairos_math::{
    BiCgStabSolver, ComponentWeights, CsrMatrix, FaerLuSolver, NormEvaluator, NormType,
    VariableLayout,
};
use kairos_solver::adaptive::{AdaptiveStepController, ControllerStats};
use kairos_solver::config::{ControllerConfig, NewtonConfig};
use kairos_solver::convergence::{ConvergenceMonitor, ConvergenceReason, ConvergenceStatus};
use kairos_solver::newton::{NewtonSolver, NonlinearProblem};
use kairos_solver::state::SolutionState;
use kairos_solver::strategy::{StepAttempt, TimeScheme};
use kairos_solver::system::{DifferentialSystem, TransientSystem};
use kairos_solver::theta::ThetaScheme;
use kairos_types::{KairosError, KairosResult};

// ─── Test Models ──────────────────────────────────────────────

/// du/dt = -λu on `n` uncoupled dofs.
struct Decay {
    lambda: f64,
    layout: VariableLayout,
}

impl Decay {
    fn new(lambda: f64, n: usize) -> Self {
        Self {
            lambda,
            layout: VariableLayout::uniform(n),
        }
    }
}

impl DifferentialSystem for Decay {
    fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    fn rate(&self, _time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        for (f, u) in out.iter_mut().zip(values) {
            *f = -self.lambda * u;
        }
        Ok(())
    }

    fn jacobian(&self, _time: f64, values: &[f64]) -> KairosResult<CsrMatrix> {
        let n = values.len();
        let triplets: Vec<_> = (0..n).map(|i| (i, i, -self.lambda)).collect();
        CsrMatrix::from_triplets(n, n, &triplets).map_err(KairosError::Model)
    }

    fn name(&self) -> &str {
        "decay"
    }
}

/// Scheme with a prescribed error: u ← u + a·dt + c·dt².
///
/// Two half steps differ from one full step by exactly c·dt²/2.
struct QuadraticDrift {
    a: f64,
    c: f64,
    /// Added to `c` for dof `i` (missing entries are 0).
    extra_c: Vec<f64>,
    /// Largest step whose "solve" converges.
    max_converged_dt: f64,
}

impl QuadraticDrift {
    fn new(a: f64, c: f64) -> Self {
        Self {
            a,
            c,
            extra_c: Vec::new(),
            max_converged_dt: f64::INFINITY,
        }
    }

    fn never_converging() -> Self {
        Self {
            max_converged_dt: 0.0,
            ..Self::new(1.0, 0.0)
        }
    }
}

impl TimeScheme for QuadraticDrift {
    fn reinit(&mut self, _layout: &VariableLayout) -> KairosResult<()> {
        Ok(())
    }

    fn step(
        &mut self,
        _model: &dyn DifferentialSystem,
        state: &SolutionState,
        deltat: f64,
    ) -> KairosResult<StepAttempt> {
        let converged = deltat <= self.max_converged_dt;
        let values = state
            .values
            .iter()
            .enumerate()
            .map(|(i, u)| {
                let c = self.c + self.extra_c.get(i).copied().unwrap_or(0.0);
                u + self.a * deltat + c * deltat * deltat
            })
            .collect();
        Ok(StepAttempt {
            requested_deltat: deltat,
            resulting_state: SolutionState::new(state.time + deltat, values),
            converged,
            iterations_used: if converged { 1 } else { 50 },
            status: if converged {
                ConvergenceStatus::Converged
            } else {
                ConvergenceStatus::IterationLimit
            },
            final_residual: 0.0,
            wall_time: 0.0,
        })
    }

    fn error_order(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        "quadratic_drift"
    }
}

/// R(u) = u^p - target for a single unknown.
struct Power {
    power: i32,
    target: f64,
    layout: VariableLayout,
}

impl Power {
    fn new(power: i32, target: f64) -> Self {
        Self {
            power,
            target,
            layout: VariableLayout::uniform(1),
        }
    }
}

impl NonlinearProblem for Power {
    fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    fn residual(&self, values: &[f64], out: &mut [f64]) -> KairosResult<()> {
        out[0] = values[0].powi(self.power) - self.target;
        Ok(())
    }

    fn jacobian(&self, values: &[f64]) -> KairosResult<CsrMatrix> {
        let d = self.power as f64 * values[0].powi(self.power - 1);
        CsrMatrix::from_triplets(1, 1, &[(0, 0, d)]).map_err(KairosError::Model)
    }
}

fn drift_controller(config: ControllerConfig, scheme: QuadraticDrift) -> AdaptiveStepController {
    let mut controller = AdaptiveStepController::new(config, Box::new(scheme));
    controller.init(&VariableLayout::uniform(1)).unwrap();
    controller
}

// ─── Config Tests ─────────────────────────────────────────────

#[test]
fn controller_config_default() {
    let config = ControllerConfig::default();
    assert!((config.target_tolerance - 1e-2).abs() < 1e-15);
    assert_eq!(config.upper_tolerance, 0.0);
    assert_eq!(config.max_deltat, 0.0);
    assert_eq!(config.min_deltat, 0.0);
    assert_eq!(config.max_growth, 0.0);
    assert!(config.global_tolerance);
    assert!(config.component_scale.is_empty());
    assert_eq!(config.norm_type, NormType::DiscreteL2);
    assert!(config.validate(&VariableLayout::uniform(3)).is_ok());
}

#[test]
fn controller_config_local() {
    let config = ControllerConfig::local();
    assert!(!config.global_tolerance);
    assert!(!config.relative_error);
}

#[test]
fn newton_config_tight() {
    let config = NewtonConfig::tight();
    assert_eq!(config.max_nonlinear_iterations, 100);
    assert!(config.relative_residual_tolerance < NewtonConfig::default().relative_residual_tolerance);
    assert!(config.validate().is_ok());
}

#[test]
fn config_serialization() {
    let config = ControllerConfig {
        component_scale: ComponentWeights::new(vec![1.0, 0.5]),
        norm_type: NormType::DiscreteLInf,
        ..Default::default()
    };
    let toml = toml::to_string(&config).unwrap();
    let recovered: ControllerConfig = toml::from_str(&toml).unwrap();
    assert_eq!(recovered, config);

    let newton = NewtonConfig::tight();
    let json = serde_json::to_string(&newton).unwrap();
    let recovered: NewtonConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(recovered, newton);
}

#[test]
fn config_partial_toml_uses_defaults() {
    let config: ControllerConfig = toml::from_str(
        r#"
        target_tolerance = 1e-3
        max_growth = 2.0
        norm_type = "discrete_l1"
        "#,
    )
    .unwrap();
    assert!((config.target_tolerance - 1e-3).abs() < 1e-18);
    assert_eq!(config.max_growth, 2.0);
    assert_eq!(config.norm_type, NormType::DiscreteL1);
    assert_eq!(config.max_rejections, ControllerConfig::default().max_rejections);
}

#[test]
fn config_rejects_non_positive_target() {
    let layout = VariableLayout::uniform(1);
    for target in [0.0, -1e-3] {
        let config = ControllerConfig {
            target_tolerance: target,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(&layout),
            Err(KairosError::InvalidConfig(_))
        ));
    }
}

#[test]
fn config_rejects_upper_below_target() {
    let config = ControllerConfig {
        target_tolerance: 1e-2,
        upper_tolerance: 1e-3,
        ..Default::default()
    };
    assert!(config.validate(&VariableLayout::uniform(1)).is_err());
}

#[test]
fn config_rejects_min_above_max() {
    let config = ControllerConfig {
        min_deltat: 1.0,
        max_deltat: 0.5,
        ..Default::default()
    };
    assert!(config.validate(&VariableLayout::uniform(1)).is_err());
}

// ─── Convergence Monitor Tests ────────────────────────────────

fn residual_only_config(abs_tol: f64, max_iterations: usize) -> NewtonConfig {
    NewtonConfig {
        max_nonlinear_iterations: max_iterations,
        absolute_residual_tolerance: abs_tol,
        relative_residual_tolerance: 0.0,
        absolute_step_tolerance: 0.0,
        relative_step_tolerance: 0.0,
        ..Default::default()
    }
}

#[test]
fn monitor_geometric_decrease_converges() {
    let mut monitor = ConvergenceMonitor::new(residual_only_config(1e-3, 50), NormEvaluator::default());
    assert_eq!(monitor.start(1.0), ConvergenceStatus::Iterating);

    let mut status = ConvergenceStatus::Iterating;
    let mut k = 0;
    while status == ConvergenceStatus::Iterating {
        k += 1;
        status = monitor.record(0.5_f64.powi(k), 1.0);
    }
    assert_eq!(status, ConvergenceStatus::Converged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::AbsoluteResidual));
    // 0.5^10 = 9.77e-4 is the first value below 1e-3
    assert_eq!(monitor.state().iteration, 10);
    assert!(monitor.state().iteration <= 50);
}

#[test]
fn monitor_relative_residual() {
    let config = NewtonConfig {
        relative_residual_tolerance: 1e-3,
        ..residual_only_config(0.0, 50)
    };
    let mut monitor = ConvergenceMonitor::new(config, NormEvaluator::default());
    monitor.start(100.0);
    assert_eq!(monitor.record(1.0, 1.0), ConvergenceStatus::Iterating);
    assert_eq!(monitor.record(0.05, 1.0), ConvergenceStatus::Converged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::RelativeResidual));
}

#[test]
fn monitor_step_criteria() {
    let config = NewtonConfig {
        absolute_step_tolerance: 1e-6,
        ..residual_only_config(0.0, 50)
    };
    let mut monitor = ConvergenceMonitor::new(config, NormEvaluator::default());
    monitor.start(1.0);
    assert_eq!(monitor.record(0.9, 1e-3), ConvergenceStatus::Iterating);
    assert_eq!(monitor.record(0.9, 1e-7), ConvergenceStatus::Converged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::AbsoluteStep));

    let config = NewtonConfig {
        relative_step_tolerance: 1e-2,
        ..residual_only_config(0.0, 50)
    };
    let mut monitor = ConvergenceMonitor::new(config, NormEvaluator::default());
    monitor.start(1.0);
    assert_eq!(monitor.record(0.9, 1.0), ConvergenceStatus::Iterating);
    assert_eq!(monitor.record(0.9, 0.5), ConvergenceStatus::Iterating);
    assert_eq!(monitor.record(0.9, 0.005), ConvergenceStatus::Converged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::RelativeStep));
    assert_eq!(monitor.state().max_step_seen, 1.0);
}

#[test]
fn monitor_iteration_limit() {
    let mut monitor = ConvergenceMonitor::new(residual_only_config(1e-12, 5), NormEvaluator::default());
    monitor.start(1.0);
    let mut last = ConvergenceStatus::Iterating;
    for _ in 0..5 {
        last = monitor.record(1.0, 1.0);
    }
    assert_eq!(last, ConvergenceStatus::IterationLimit);
    assert_eq!(monitor.state().iteration, 5);
    // Terminal states are sticky
    assert_eq!(monitor.record(0.0, 0.0), ConvergenceStatus::IterationLimit);
    assert_eq!(monitor.state().iteration, 5);
}

#[test]
fn monitor_divergence() {
    let mut monitor = ConvergenceMonitor::new(residual_only_config(1e-12, 50), NormEvaluator::default());
    monitor.start(1.0);
    assert_eq!(monitor.record(1e11, 1.0), ConvergenceStatus::Diverged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::ResidualGrowth));

    monitor.start(1.0);
    assert_eq!(monitor.record(f64::NAN, 1.0), ConvergenceStatus::Diverged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::NonFinite));

    assert_eq!(monitor.start(f64::INFINITY), ConvergenceStatus::Diverged);

    monitor.start(1.0);
    assert_eq!(monitor.record_linear_failure(), ConvergenceStatus::Diverged);
    assert_eq!(monitor.reason(), Some(ConvergenceReason::LinearSolveFailure));
}

#[test]
fn monitor_converges_immediately_on_zero_residual() {
    let mut monitor = ConvergenceMonitor::new(NewtonConfig::default(), NormEvaluator::default());
    assert_eq!(monitor.start(0.0), ConvergenceStatus::Converged);
    assert_eq!(monitor.state().iteration, 0);
}

#[test]
fn monitor_linear_tolerance_schedule() {
    let config = NewtonConfig {
        initial_linear_tolerance: 1e-2,
        linear_tolerance_multiplier: 1e-1,
        minimum_linear_tolerance: 1e-6,
        ..residual_only_config(0.0, 50)
    };
    let mut monitor = ConvergenceMonitor::new(config, NormEvaluator::default());
    monitor.start(1.0);
    assert!((monitor.linear_tolerance() - 1e-2).abs() < 1e-18);

    monitor.record(0.5, 1.0);
    assert!((monitor.linear_tolerance() - 1e-2).abs() < 1e-18);

    monitor.record(0.01, 1.0);
    assert!((monitor.linear_tolerance() - 1e-3).abs() < 1e-15);

    monitor.record(1e-8, 1.0);
    assert!((monitor.linear_tolerance() - 1e-6).abs() < 1e-18);

    // Never loosens
    monitor.record(0.9, 1.0);
    assert!((monitor.linear_tolerance() - 1e-6).abs() < 1e-18);

    // start() resets the schedule
    monitor.start(1.0);
    assert!((monitor.linear_tolerance() - 1e-2).abs() < 1e-18);
}

// ─── Newton Solver Tests ──────────────────────────────────────

#[test]
fn newton_finds_square_root() {
    let mut solver = NewtonSolver::default();
    let outcome = solver.solve(&Power::new(2, 2.0), vec![1.0]).unwrap();
    assert!(outcome.converged());
    assert!(outcome.iterations() <= 10);
    assert!((outcome.solution[0] - 2.0_f64.sqrt()).abs() < 1e-10);
}

#[test]
fn newton_with_bicgstab() {
    let mut solver = NewtonSolver::new(NewtonConfig::default(), Box::new(BiCgStabSolver::new()));
    assert_eq!(solver.linear_solver_name(), "bicgstab_jacobi");
    let outcome = solver.solve(&Power::new(2, 9.0), vec![1.0]).unwrap();
    assert!(outcome.converged());
    assert!((outcome.solution[0] - 3.0).abs() < 1e-10);
    assert!(outcome.linear_iterations >= outcome.iterations());
}

#[test]
fn newton_iteration_limit_returns_best_iterate() {
    let config = NewtonConfig {
        max_nonlinear_iterations: 5,
        ..Default::default()
    };
    let mut solver = NewtonSolver::new(config, Box::new(FaerLuSolver::new()));
    // u³ = 0: Newton contracts by 2/3 per iteration
    let outcome = solver.solve(&Power::new(3, 0.0), vec![1.0]).unwrap();
    assert_eq!(outcome.status, ConvergenceStatus::IterationLimit);
    assert_eq!(outcome.iterations(), 5);
    let expected = (2.0_f64 / 3.0).powi(5);
    assert!((outcome.solution[0] - expected).abs() < 1e-12);
}

#[test]
fn newton_linear_failure_is_divergence() {
    let mut solver = NewtonSolver::new(NewtonConfig::default(), Box::new(BiCgStabSolver::new()));
    // Jacobian 2u vanishes at u = 0
    let outcome = solver.solve(&Power::new(2, 1.0), vec![0.0]).unwrap();
    assert_eq!(outcome.status, ConvergenceStatus::Diverged);
    assert_eq!(outcome.reason, Some(ConvergenceReason::LinearSolveFailure));
}

#[test]
fn newton_rejects_wrong_guess_length() {
    let mut solver = NewtonSolver::default();
    let err = solver.solve(&Power::new(2, 2.0), vec![1.0, 1.0]).unwrap_err();
    assert!(matches!(err, KairosError::DimensionMismatch { .. }));
}

// ─── Theta Scheme Tests ───────────────────────────────────────

#[test]
fn theta_error_orders() {
    assert_eq!(ThetaScheme::backward_euler().error_order(), 1);
    assert_eq!(ThetaScheme::trapezoidal().error_order(), 2);
    assert_eq!(ThetaScheme::forward_euler().error_order(), 1);
    assert_eq!(ThetaScheme::new(0.75).unwrap().error_order(), 1);
    assert!(ThetaScheme::new(1.5).is_err());
}

#[test]
fn theta_names() {
    assert_eq!(ThetaScheme::backward_euler().name(), "backward_euler");
    assert_eq!(ThetaScheme::trapezoidal().name(), "trapezoidal");
    assert_eq!(ThetaScheme::forward_euler().name(), "forward_euler");
    assert_eq!(ThetaScheme::new(0.6).unwrap().name(), "theta");
}

#[test]
fn theta_steps_match_closed_forms() {
    let model = Decay::new(2.0, 1);
    let state = SolutionState::new(0.0, vec![1.0]);
    let dt = 0.1;

    let cases = [
        (ThetaScheme::backward_euler(), 1.0 / 1.2),
        (ThetaScheme::trapezoidal(), 0.9 / 1.1),
        (ThetaScheme::forward_euler(), 0.8),
    ];
    for (mut scheme, expected) in cases {
        scheme.reinit(model.layout()).unwrap();
        let attempt = scheme.step(&model, &state, dt).unwrap();
        assert!(attempt.converged, "{} did not converge", scheme.name());
        assert!(
            (attempt.resulting_state.values[0] - expected).abs() < 1e-12,
            "{}: got {}, expected {}",
            scheme.name(),
            attempt.resulting_state.values[0],
            expected
        );
        assert!((attempt.resulting_state.time - dt).abs() < 1e-15);
        assert!(attempt.iterations_used <= 2);
    }
    // The input state is untouched
    assert_eq!(state.values, vec![1.0]);
    assert_eq!(state.time, 0.0);
}

#[test]
fn theta_step_rejects_wrong_state_length() {
    let model = Decay::new(1.0, 2);
    let mut scheme = ThetaScheme::backward_euler();
    let state = SolutionState::new(0.0, vec![1.0]);
    let err = scheme.step(&model, &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::DimensionMismatch { .. }));
}

// ─── Adaptive Controller Tests ────────────────────────────────

#[test]
fn controller_shrinks_hint_toward_target() {
    // Order 1, error C·dt² with C = 10: raw error at dt = 0.1 is 0.05
    let mut controller = drift_controller(ControllerConfig::local(), QuadraticDrift::new(0.0, 10.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![0.0]);

    let outcome = controller.advance(&model, &state, 0.1).unwrap();
    assert!((outcome.estimate.raw_norm - 0.05).abs() < 1e-12);
    assert!((outcome.estimate.scaled_error - 0.05).abs() < 1e-12);
    // upper_tolerance = 0: accepted as is
    assert_eq!(outcome.accepted_deltat, 0.1);
    assert_eq!(outcome.attempts.len(), 1);
    // (0.01 / 0.05)^(1/2) ≈ 0.447
    assert!(outcome.next_deltat < 0.1);
    assert!((outcome.next_deltat - 0.1 * 0.2_f64.sqrt()).abs() < 1e-9);
    // The half-step result is kept
    assert!((outcome.state.values[0] - 0.05).abs() < 1e-12);
    assert!((outcome.state.time - 0.1).abs() < 1e-15);
    assert_eq!(controller.last_deltat(), Some(0.1));
}

#[test]
fn global_tolerance_scales_by_order_and_deltat() {
    let config = ControllerConfig {
        relative_error: false,
        ..Default::default()
    };
    let mut controller = drift_controller(config, QuadraticDrift::new(0.0, 10.0));
    let state = SolutionState::new(0.0, vec![0.0]);

    let outcome = controller.advance(&Decay::new(1.0, 1), &state, 0.1).unwrap();
    // 0.05 / ((2^1 - 1) · 0.1)
    assert!((outcome.estimate.raw_norm - 0.05).abs() < 1e-12);
    assert!((outcome.estimate.scaled_error - 0.5).abs() < 1e-12);
    // Exponent 1/p = 1: 0.1 · (0.01 / 0.5)
    assert!((outcome.next_deltat - 0.002).abs() < 1e-12);
}

#[test]
fn relative_error_divides_by_solution_norm() {
    let config = ControllerConfig {
        relative_error: true,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::new(0.0, 10.0));
    let state = SolutionState::new(0.0, vec![1.0]);

    let outcome = controller.advance(&Decay::new(1.0, 1), &state, 0.1).unwrap();
    // Full step 1.1, half steps 1.05: scale is the larger norm
    assert!((outcome.estimate.raw_norm - 0.05).abs() < 1e-12);
    let scaled = 0.05 / 1.1;
    assert!((outcome.estimate.scaled_error - scaled).abs() < 1e-12);
    let expected = 0.1 * (0.01 / scaled).sqrt();
    assert!((outcome.next_deltat - expected).abs() < 1e-12);
}

#[test]
fn zero_weight_variable_is_ignored() {
    let layout = VariableLayout::from_sizes(vec![1, 1]);
    let scheme = QuadraticDrift {
        extra_c: vec![0.0, 1.0e3],
        ..QuadraticDrift::new(0.0, 10.0)
    };
    let config = ControllerConfig {
        component_scale: ComponentWeights::new(vec![1.0, 0.0]),
        ..ControllerConfig::local()
    };
    let mut controller = AdaptiveStepController::new(config, Box::new(scheme));
    controller.init(&layout).unwrap();

    let model = Decay {
        lambda: 1.0,
        layout,
    };
    let state = SolutionState::new(0.0, vec![0.0, 0.0]);
    let outcome = controller.advance(&model, &state, 0.1).unwrap();
    // Only the first variable's c·dt²/2 counts
    assert!((outcome.estimate.raw_norm - 0.05).abs() < 1e-12);
    assert!((outcome.next_deltat - 0.1 * 0.2_f64.sqrt()).abs() < 1e-9);

    controller.config.component_scale = ComponentWeights::uniform();
    let outcome = controller.advance(&model, &state, 0.1).unwrap();
    assert!(outcome.estimate.raw_norm > 5.0);
}

#[test]
fn step_limit_overrides_min_deltat() {
    let config = ControllerConfig {
        min_deltat: 0.3,
        max_deltat: 0.4,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::new(1.0, 0.0));
    let mut system =
        TransientSystem::new(Decay::new(1.0, 1), SolutionState::new(0.8, vec![0.0]), 0.4).unwrap();

    let outcome = controller.advance_timestep_within(&mut system, 0.15).unwrap();
    assert_eq!(outcome.accepted_deltat, 0.15);
    assert!((system.time() - 0.95).abs() < 1e-15);
    // The next hint is clamped as usual
    assert_eq!(outcome.next_deltat, 0.4);

    // Without a limit the hint is lifted to min_deltat
    let outcome = controller.advance(&Decay::new(1.0, 1), system.state(), 0.1).unwrap();
    assert_eq!(outcome.accepted_deltat, 0.3);
}

#[test]
fn failed_advance_leaves_stats_untouched() {
    let config = ControllerConfig {
        upper_tolerance: 0.02,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::new(0.0, 10.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![0.0]);
    controller.advance(&model, &state, 0.1).unwrap();
    let before = *controller.stats();
    assert_eq!(before.rejected_steps, 1);

    controller.config.max_rejections = 1;
    let err = controller.advance(&model, &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::TimestepFailure { rejections: 1, .. }));
    assert_eq!(*controller.stats(), before);
}

#[test]
fn controller_rejects_above_upper_tolerance() {
    let config = ControllerConfig {
        upper_tolerance: 0.02,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::new(0.0, 10.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![0.0]);

    let outcome = controller.advance(&model, &state, 0.1).unwrap();
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.rejections(), 1);
    assert!(!outcome.attempts[0].accepted);
    assert!((outcome.attempts[0].scaled_error.unwrap() - 0.05).abs() < 1e-12);

    let retried = 0.1 * 0.2_f64.sqrt();
    assert!((outcome.accepted_deltat - retried).abs() < 1e-12);
    assert!(outcome.estimate.scaled_error <= 0.02);
    assert_eq!(controller.last_deltat(), Some(outcome.accepted_deltat));
    assert_eq!(controller.stats().rejected_steps, 1);
    assert_eq!(controller.stats().accepted_steps, 1);
}

#[test]
fn controller_zero_error_grows_to_max_growth() {
    let config = ControllerConfig {
        max_growth: 2.0,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::new(1.0, 0.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![1.0]);

    let outcome = controller.advance(&model, &state, 0.5).unwrap();
    assert_eq!(outcome.estimate.raw_norm, 0.0);
    assert_eq!(outcome.accepted_deltat, 0.5);
    assert_eq!(outcome.next_deltat, 1.0);
}

#[test]
fn controller_zero_error_unlimited_growth() {
    let mut controller = drift_controller(ControllerConfig::local(), QuadraticDrift::new(1.0, 0.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![1.0]);

    let outcome = controller.advance(&model, &state, 0.5).unwrap();
    assert_eq!(outcome.accepted_deltat, 0.5);
    assert!(outcome.next_deltat.is_finite());
    assert!(outcome.next_deltat > 1e5);
}

#[test]
fn controller_retries_after_failed_solve() {
    let scheme = QuadraticDrift {
        max_converged_dt: 0.06,
        ..QuadraticDrift::new(1.0, 0.0)
    };
    let mut controller = drift_controller(ControllerConfig::local(), scheme);
    let model = Decay::new(1.0, 1);
    let mut system = TransientSystem::new(model, SolutionState::new(0.0, vec![0.0]), 0.1).unwrap();

    let outcome = controller.advance_timestep(&mut system).unwrap();
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[0].scaled_error, None);
    assert_eq!(outcome.attempts[0].status, ConvergenceStatus::IterationLimit);
    assert!((outcome.accepted_deltat - 0.05).abs() < 1e-15);
    // Committed time follows the accepted size, not the hint
    assert!((system.time() - 0.05).abs() < 1e-15);
    assert_eq!(system.deltat(), outcome.next_deltat);
}

#[test]
fn iteration_limit_is_never_committed() {
    let config = ControllerConfig {
        min_deltat: 0.01,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::never_converging());
    let initial = SolutionState::new(0.0, vec![1.0]);
    let mut system = TransientSystem::new(Decay::new(1.0, 1), initial.clone(), 0.1).unwrap();

    let err = controller.advance_timestep(&mut system).unwrap_err();
    match err {
        KairosError::TimestepFailure {
            requested_deltat,
            attempted_deltat,
            min_deltat,
            last_scaled_error,
            nonlinear_iterations,
            rejections,
            ..
        } => {
            assert_eq!(requested_deltat, 0.1);
            assert_eq!(attempted_deltat, 0.01);
            assert_eq!(min_deltat, 0.01);
            assert!(last_scaled_error.is_infinite());
            // 0.1, 0.05, 0.025, 0.0125, then clamped to 0.01
            assert_eq!(rejections, 5);
            assert_eq!(nonlinear_iterations, 250);
        }
        other => panic!("Expected TimestepFailure, got {other:?}"),
    }

    assert_eq!(system.state(), &initial);
    assert_eq!(system.time(), 0.0);
    assert_eq!(system.deltat(), 0.1);
    assert_eq!(controller.last_deltat(), None);
    assert_eq!(controller.max_solution_norm(), 0.0);
    assert_eq!(*controller.stats(), ControllerStats::default());
}

#[test]
fn max_rejections_bounds_the_retry_loop() {
    let config = ControllerConfig {
        max_rejections: 3,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config, QuadraticDrift::never_converging());
    let state = SolutionState::new(0.0, vec![1.0]);
    let err = controller.advance(&Decay::new(1.0, 1), &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::TimestepFailure { rejections: 3, .. }));
}

#[test]
fn accepted_steps_respect_bounds() {
    let config = ControllerConfig {
        target_tolerance: 1e-3,
        upper_tolerance: 1e-2,
        max_deltat: 0.2,
        min_deltat: 1e-4,
        max_growth: 1.5,
        ..Default::default()
    };
    let mut controller = AdaptiveStepController::new(config, Box::new(ThetaScheme::backward_euler()));
    let model = Decay::new(5.0, 3);
    controller.init(model.layout()).unwrap();
    let mut system =
        TransientSystem::new(model, SolutionState::new(0.0, vec![1.0, 2.0, -1.0]), 0.001).unwrap();

    let mut previous: Option<f64> = None;
    for _ in 0..40 {
        let outcome = controller.advance_timestep(&mut system).unwrap();
        let dt = outcome.accepted_deltat;
        assert!(dt >= 1e-4 && dt <= 0.2, "dt {dt} out of bounds");
        assert!(outcome.estimate.scaled_error <= 1e-2);
        if let Some(prev) = previous {
            assert!(dt <= 1.5 * prev * (1.0 + 1e-12), "dt {dt} grew too fast from {prev}");
        }
        previous = Some(dt);
    }
    assert!(system.time() > 0.0);
    assert_eq!(controller.stats().accepted_steps, 40);
    assert!(controller.max_solution_norm() > 0.0);
    // Decay toward zero
    assert!(system.state().values.iter().all(|v| v.abs() < 2.0));
}

#[test]
fn controller_requires_init() {
    let mut controller =
        AdaptiveStepController::new(ControllerConfig::default(), Box::new(QuadraticDrift::new(1.0, 0.0)));
    let state = SolutionState::new(0.0, vec![1.0]);
    let err = controller.advance(&Decay::new(1.0, 1), &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::NotInitialized(_)));
}

#[test]
fn controller_validates_at_use() {
    let mut controller = drift_controller(ControllerConfig::local(), QuadraticDrift::new(1.0, 0.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![1.0]);

    // Assignment succeeds; the advance fails
    controller.config.target_tolerance = 0.0;
    let err = controller.advance(&model, &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::InvalidConfig(_)));

    controller.config.target_tolerance = 1e-2;
    controller.config.component_scale = ComponentWeights::new(vec![1.0, 1.0]);
    let err = controller.advance(&model, &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::DimensionMismatch { .. }));
    assert_eq!(controller.last_deltat(), None);
}

#[test]
fn controller_rejects_layout_change_without_reinit() {
    let mut controller = drift_controller(ControllerConfig::local(), QuadraticDrift::new(1.0, 0.0));
    let model = Decay::new(1.0, 2);
    let state = SolutionState::new(0.0, vec![1.0, 1.0]);
    let err = controller.advance(&model, &state, 0.1).unwrap_err();
    assert!(matches!(err, KairosError::DimensionMismatch { .. }));

    controller.reinit(model.layout()).unwrap();
    assert!(controller.advance(&model, &state, 0.1).is_ok());
}

#[test]
fn reinit_is_idempotent() {
    let config = ControllerConfig {
        max_growth: 3.0,
        upper_tolerance: 0.5,
        ..ControllerConfig::local()
    };
    let mut controller = drift_controller(config.clone(), QuadraticDrift::new(1.0, 1.0));
    let model = Decay::new(1.0, 1);
    let state = SolutionState::new(0.0, vec![1.0]);
    controller.advance(&model, &state, 0.1).unwrap();
    assert!(controller.last_deltat().is_some());

    let layout = VariableLayout::uniform(1);
    controller.reinit(&layout).unwrap();
    let after_first = (
        controller.config.clone(),
        controller.last_deltat(),
        *controller.stats(),
        controller.max_solution_norm(),
        controller.max_residual_norm(),
    );
    controller.reinit(&layout).unwrap();
    let after_second = (
        controller.config.clone(),
        controller.last_deltat(),
        *controller.stats(),
        controller.max_solution_norm(),
        controller.max_residual_norm(),
    );

    assert_eq!(after_first, after_second);
    assert_eq!(controller.config, config);
    assert_eq!(controller.last_deltat(), None);
    assert_eq!(controller.stats().accepted_steps, 0);
    assert_eq!(controller.max_solution_norm(), 0.0);
}

#[test]
fn stats_display() {
    let mut controller = drift_controller(ControllerConfig::local(), QuadraticDrift::new(1.0, 0.0));
    let state = SolutionState::new(0.0, vec![1.0]);
    controller.advance(&Decay::new(1.0, 1), &state, 0.5).unwrap();
    let text = controller.stats().to_string();
    assert!(text.contains("1 accepted"));
    assert!(text.contains("0 rejected"));
}
