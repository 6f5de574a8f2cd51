//! # kairos-bench
//!
//! Reference problems and a benchmark runner for the kairos engine.
//!
//! Provides four scenarios (two with exact solutions to measure
//! against), TOML run configuration, metric collection and CSV export
//! for regression tracking.

pub mod config;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod scenarios;

pub use config::RunConfig;
pub use metrics::BenchmarkMetrics;
pub use models::ReferenceModel;
pub use runner::BenchmarkRunner;
pub use scenarios::{LinearSolverKind, Scenario, ScenarioKind, SchemeKind};
