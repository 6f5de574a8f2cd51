//! Benchmark runner: marches scenarios to their end time and collects metrics.

use std::time::Instant;

use kairos_math::{ComponentWeights, NormEvaluator, NormType};
use kairos_solver::{AdaptiveStepController, AdvanceOutcome, DifferentialSystem, TimeScheme, TransientSystem};
use kairos_telemetry::{EventBus, EventKind};
use kairos_types::KairosResult;
use tracing::{info, warn};

use crate::metrics::BenchmarkMetrics;
use crate::scenarios::{Scenario, ScenarioKind};

/// Remaining time below `END_TIME_SLACK * max(end_time, 1)` counts as done.
const END_TIME_SLACK: f64 = 1.0e-12;

/// Runs benchmark scenarios and collects metrics.
pub struct BenchmarkRunner;

impl BenchmarkRunner {
    /// Run a single scenario, emitting telemetry on `bus`.
    ///
    /// No step crosses `end_time`, so the run lands on it exactly even
    /// when the remaining time is below `min_deltat`.
    /// A controller failure aborts the run with its error.
    pub fn run(scenario: &Scenario, bus: &mut EventBus) -> KairosResult<BenchmarkMetrics> {
        scenario.validate()?;

        let scheme = scenario.build_scheme()?;
        let scheme_name = scheme.name().to_string();
        let linear_solver = scheme.newton().linear_solver_name().to_string();

        let mut controller =
            AdaptiveStepController::new(scenario.controller.clone(), Box::new(scheme));
        controller.init(scenario.model.layout())?;

        let mut system = TransientSystem::new(
            scenario.model.clone(),
            scenario.initial.clone(),
            scenario.initial_deltat,
        )?;

        let end_time = scenario.end_time;
        let slack = END_TIME_SLACK * end_time.abs().max(1.0);
        let mut steps = 0usize;
        let mut step_time_total = 0.0;

        bus.restart();
        let total_start = Instant::now();

        while end_time - system.time() > slack && steps < scenario.max_steps {
            let remaining = end_time - system.time();
            bus.record(EventKind::TimestepBegin {
                sim_time: system.time(),
                deltat_hint: system.deltat().min(remaining),
            });

            let step_start = Instant::now();
            let outcome = controller.advance_timestep_within(&mut system, remaining)?;
            let wall_time = step_start.elapsed().as_secs_f64();
            step_time_total += wall_time;

            record_outcome(bus, &outcome);
            bus.record(EventKind::TimestepEnd {
                wall_time,
                sim_time: system.time(),
            });
            bus.end_timestep();
            steps += 1;
        }

        let total_wall_time = total_start.elapsed().as_secs_f64();
        let reached_end = end_time - system.time() <= slack;
        if !reached_end {
            warn!(
                scenario = scenario.kind.name(),
                steps,
                time = system.time(),
                end_time,
                "max_steps reached before end_time"
            );
        }

        let final_error = match scenario.exact(system.time()) {
            Some(exact) => Some(NormEvaluator::new(NormType::DiscreteLInf).difference(
                &system.state().values,
                &exact,
                scenario.model.layout(),
                &ComponentWeights::uniform(),
            )?),
            None => None,
        };

        let stats = *controller.stats();
        info!(scenario = scenario.kind.name(), scheme = %scheme_name, "{stats}");

        Ok(BenchmarkMetrics {
            scenario: scenario.kind.name().to_string(),
            scheme: scheme_name,
            linear_solver,
            dofs: scenario.dofs(),
            accepted_steps: stats.accepted_steps,
            rejected_steps: stats.rejected_steps,
            nonlinear_iterations: stats.nonlinear_iterations,
            min_deltat: stats.min_accepted_deltat,
            max_deltat: stats.max_accepted_deltat,
            final_time: system.time(),
            reached_end,
            final_error,
            total_wall_time,
            avg_step_time: if steps > 0 {
                step_time_total / steps as f64
            } else {
                0.0
            },
        })
    }

    /// Run all scenarios with their default parameters.
    pub fn run_all(bus: &mut EventBus) -> KairosResult<Vec<BenchmarkMetrics>> {
        let mut results = Vec::new();
        for &kind in ScenarioKind::all() {
            let scenario = Scenario::from_kind(kind)?;
            results.push(Self::run(&scenario, bus)?);
        }
        Ok(results)
    }
}

/// Rejected attempts, the accepted step, and the convergence summary.
fn record_outcome(bus: &mut EventBus, outcome: &AdvanceOutcome) {
    for attempt in outcome.attempts.iter().filter(|a| !a.accepted) {
        bus.record(EventKind::StepRejected {
            deltat: attempt.deltat,
            scaled_error: attempt.scaled_error,
            converged: attempt.converged,
            nonlinear_iterations: attempt.iterations,
        });
    }
    bus.record(EventKind::StepAccepted {
        deltat: outcome.accepted_deltat,
        next_deltat: outcome.next_deltat,
        raw_error: outcome.estimate.raw_norm,
        scaled_error: outcome.estimate.scaled_error,
    });
    bus.record(EventKind::Convergence {
        iterations: outcome.nonlinear_iterations,
        final_residual: outcome.residual_norm,
        converged: true,
    });
}
