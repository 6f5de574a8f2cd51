//! CLI command implementations.

use std::fmt::Write as _;

use kairos_bench::metrics::BenchmarkMetrics;
use kairos_bench::runner::BenchmarkRunner;
use kairos_bench::scenarios::{Scenario, ScenarioKind};
use kairos_bench::RunConfig;
use kairos_solver::TimeScheme;
use kairos_telemetry::{EventBus, TracingSink, VecSink};
use tracing::Level;

/// Run a simulation from config file.
pub fn simulate(
    config_path: &str,
    events_path: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("kairos Simulation");
    println!("─────────────────");
    println!("Config: {config_path}");
    println!();

    let scenario = RunConfig::load(config_path)?.to_scenario()?;
    print_scenario(&scenario)?;

    let mut bus = EventBus::new();
    bus.add_sink(Box::new(TracingSink::new(Level::DEBUG)));
    let recorder = VecSink::new();
    let log = recorder.log();
    if events_path.is_some() {
        bus.add_sink(Box::new(recorder));
    }

    let metrics = BenchmarkRunner::run(&scenario, &mut bus)?;
    bus.finalize();
    print_metrics(&metrics);

    if let Some(path) = events_path {
        let mut lines = String::new();
        for event in log.snapshot() {
            writeln!(lines, "{}", serde_json::to_string(&event)?)?;
        }
        std::fs::write(path, lines)?;
        println!("Events written to: {path}");
    }

    Ok(())
}

/// Run benchmark suite.
pub fn benchmark(
    scenario_name: &str,
    output_path: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("kairos Benchmark Suite");
    println!("══════════════════════");
    println!();

    let scenarios: Vec<ScenarioKind> = if scenario_name == "all" {
        ScenarioKind::all().to_vec()
    } else {
        vec![parse_scenario(scenario_name)?]
    };

    let mut all_metrics = Vec::new();
    let mut bus = EventBus::new();
    bus.add_sink(Box::new(TracingSink::new(Level::TRACE)));

    for &kind in &scenarios {
        let scenario = Scenario::from_kind(kind)?;

        println!(
            "Running: {} ({} dofs, t = {} → {})",
            kind.name(),
            scenario.dofs(),
            scenario.initial.time,
            scenario.end_time,
        );

        let metrics = BenchmarkRunner::run(&scenario, &mut bus)
            .map_err(|e| format!("Benchmark failed: {e}"))?;
        print_metrics(&metrics);

        all_metrics.push(metrics);
    }
    bus.finalize();

    // Output CSV
    if let Some(path) = output_path {
        let csv = BenchmarkMetrics::to_csv(&all_metrics);
        std::fs::write(path, &csv)?;
        println!("Results written to: {path}");
    } else {
        println!("CSV Output:");
        println!("{}", BenchmarkMetrics::to_csv(&all_metrics));
    }

    Ok(())
}

/// Print the full run config of a scenario as TOML.
pub fn template(scenario_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::from_kind(parse_scenario(scenario_name)?)?;
    print!("{}", RunConfig::from_scenario(&scenario).to_toml_string()?);
    Ok(())
}

/// Validate a run config.
pub fn validate(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("kairos Validator");
    println!("────────────────");
    println!();

    if !path.ends_with(".toml") {
        println!("Unsupported file format. Use .toml (run config).");
        return Ok(());
    }

    println!("Validating config: {path}");
    match RunConfig::load(path).and_then(|c| c.to_scenario()) {
        Ok(scenario) => {
            print_scenario(&scenario)?;
            println!("✅ Config is valid.");
        }
        Err(e) => println!("❌ Config validation failed: {e}"),
    }

    Ok(())
}

fn parse_scenario(name: &str) -> Result<ScenarioKind, Box<dyn std::error::Error>> {
    ScenarioKind::from_name(name).ok_or_else(|| {
        let available: Vec<&str> = ScenarioKind::all().iter().map(|k| k.name()).collect();
        format!("Unknown scenario: '{name}'. Available: {}, all", available.join(", ")).into()
    })
}

fn print_scenario(scenario: &Scenario) -> Result<(), Box<dyn std::error::Error>> {
    let scheme = scenario.build_scheme()?;
    let c = &scenario.controller;
    println!("Scenario:   {} ({} dofs)", scenario.kind.name(), scenario.dofs());
    println!(
        "Scheme:     {} (order {}, {})",
        scheme.name(),
        scheme.error_order(),
        scheme.newton().linear_solver_name()
    );
    println!("Time:       {} → {}, first dt {}", scenario.initial.time, scenario.end_time, scenario.initial_deltat);
    println!(
        "Controller: target {:e}, upper {:e}, {} {:?}, {}",
        c.target_tolerance,
        c.upper_tolerance,
        if c.global_tolerance { "global" } else { "local" },
        c.norm_type,
        if c.relative_error { "relative" } else { "absolute" },
    );
    println!();
    Ok(())
}

fn print_metrics(metrics: &BenchmarkMetrics) {
    println!(
        "  Steps:         {} accepted, {} rejected ({:.1}%)",
        metrics.accepted_steps,
        metrics.rejected_steps,
        metrics.rejection_rate() * 100.0
    );
    println!("  Newton iters:  {}", metrics.nonlinear_iterations);
    println!("  dt range:      [{:.3e}, {:.3e}]", metrics.min_deltat, metrics.max_deltat);
    println!("  Final time:    {}{}", metrics.final_time, if metrics.reached_end { "" } else { " (max_steps hit)" });
    if let Some(error) = metrics.final_error {
        println!("  Final error:   {error:.3e}");
    }
    println!("  Wall time:     {:.3}s", metrics.total_wall_time);
    println!("  Avg step:      {:.3}ms", metrics.avg_step_time * 1000.0);
    println!();
}
