//! Time-marching event types.
//!
//! Structured events emitted around each controller advance: the
//! attempt(s) made, the accepted step, the nonlinear convergence of the
//! accepted attempt, and timing. Events are plain values and carry just
//! enough data for monitoring and post-run analysis.

use serde::{Deserialize, Serialize};

/// An event emitted while marching a system through time.
///
/// `timestep` is the index of the advance (0-indexed, accepted steps only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Advance number.
    pub timestep: u32,
    /// Event payload.
    pub kind: EventKind,
}

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// An advance started.
    TimestepBegin {
        /// Simulation time before the step.
        sim_time: f64,
        /// Step size the advance starts from.
        deltat_hint: f64,
    },

    /// An attempt was rejected and will be retried with a smaller step.
    StepRejected {
        /// Step size of the rejected attempt.
        deltat: f64,
        /// Scaled error, `None` if a nonlinear solve failed.
        scaled_error: Option<f64>,
        /// Whether all nonlinear solves converged.
        converged: bool,
        /// Nonlinear iterations spent on the attempt.
        nonlinear_iterations: usize,
    },

    /// An attempt was accepted and committed.
    StepAccepted {
        /// Step size actually taken.
        deltat: f64,
        /// Step size suggested for the next advance.
        next_deltat: f64,
        /// Unscaled step-doubling error norm.
        raw_error: f64,
        /// Error compared against the tolerances.
        scaled_error: f64,
    },

    /// Nonlinear convergence report for the advance.
    Convergence {
        /// Nonlinear iterations over all attempts.
        iterations: usize,
        /// Largest final residual of the accepted attempt.
        final_residual: f64,
        /// Whether the accepted attempt converged (always true once accepted).
        converged: bool,
    },

    /// An advance completed.
    TimestepEnd {
        /// Wall-clock time for the advance (seconds).
        wall_time: f64,
        /// Simulation time after the step.
        sim_time: f64,
    },

    /// Custom event for extensibility.
    Custom {
        /// Arbitrary label.
        label: String,
        /// JSON-encoded payload.
        payload: String,
    },
}

impl SimulationEvent {
    /// Creates a new event for the given advance.
    pub fn new(timestep: u32, kind: EventKind) -> Self {
        Self { timestep, kind }
    }

    /// Short name of the payload variant.
    pub fn label(&self) -> &str {
        match &self.kind {
            EventKind::TimestepBegin { .. } => "timestep_begin",
            EventKind::StepRejected { .. } => "step_rejected",
            EventKind::StepAccepted { .. } => "step_accepted",
            EventKind::Convergence { .. } => "convergence",
            EventKind::TimestepEnd { .. } => "timestep_end",
            EventKind::Custom { label, .. } => label,
        }
    }
}
