//! Benchmark metrics: data collected during a benchmark run.

use serde::{Deserialize, Serialize};

/// Metrics collected from a benchmark scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Time scheme name.
    pub scheme: String,
    /// Linear solver name.
    pub linear_solver: String,
    /// Degrees of freedom.
    pub dofs: usize,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    /// Nonlinear iterations over every attempt, rejected ones included.
    pub nonlinear_iterations: usize,
    /// Smallest accepted step.
    pub min_deltat: f64,
    /// Largest accepted step.
    pub max_deltat: f64,
    /// Simulation time reached.
    pub final_time: f64,
    /// False if `max_steps` ran out before `end_time`.
    pub reached_end: bool,
    /// L∞ distance to the exact solution at `final_time`, when known.
    pub final_error: Option<f64>,
    /// Total wall-clock time (seconds).
    pub total_wall_time: f64,
    /// Average wall-clock time per accepted step (seconds).
    pub avg_step_time: f64,
}

impl BenchmarkMetrics {
    /// Fraction of attempts that were rejected.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.accepted_steps + self.rejected_steps;
        if total == 0 {
            0.0
        } else {
            self.rejected_steps as f64 / total as f64
        }
    }

    /// Format as a CSV row (header + data).
    pub fn to_csv_header() -> String {
        "scenario,scheme,linear_solver,dofs,accepted,rejected,nonlinear_iterations,min_dt,max_dt,final_time,reached_end,final_error,total_wall_time_s,avg_step_ms".to_string()
    }

    /// Format this metrics instance as a CSV data row.
    ///
    /// An unknown `final_error` is left empty.
    pub fn to_csv_row(&self) -> String {
        let final_error = self
            .final_error
            .map(|e| format!("{e:.6e}"))
            .unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{},{:.6e},{:.6e},{:.6},{},{},{:.6},{:.4}",
            self.scenario,
            self.scheme,
            self.linear_solver,
            self.dofs,
            self.accepted_steps,
            self.rejected_steps,
            self.nonlinear_iterations,
            self.min_deltat,
            self.max_deltat,
            self.final_time,
            self.reached_end,
            final_error,
            self.total_wall_time,
            self.avg_step_time * 1000.0,
        )
    }

    /// Format multiple metrics as a complete CSV string.
    pub fn to_csv(metrics: &[BenchmarkMetrics]) -> String {
        let mut csv = Self::to_csv_header();
        for m in metrics {
            csv.push('\n');
            csv.push_str(&m.to_csv_row());
        }
        csv
    }
}
