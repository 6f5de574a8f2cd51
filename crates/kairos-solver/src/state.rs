//! Solution state: the discretized solution vector at one instant.

use kairos_math::VariableLayout;
use kairos_types::KairosResult;
use serde::{Deserialize, Serialize};

/// Degrees of freedom plus the simulation time they belong to.
///
/// Step attempts always produce a fresh `SolutionState`; the committed
/// one is only replaced once an attempt is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionState {
    /// Simulation time.
    pub time: f64,
    /// Flat degree-of-freedom vector, laid out per [`VariableLayout`].
    pub values: Vec<f64>,
}

impl SolutionState {
    /// Creates a state at `time` with the given values.
    pub fn new(time: f64, values: Vec<f64>) -> Self {
        Self { time, values }
    }

    /// Creates a zero state with `n_dofs` entries.
    pub fn zeros(time: f64, n_dofs: usize) -> Self {
        Self {
            time,
            values: vec![0.0; n_dofs],
        }
    }

    /// Number of degrees of freedom.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the state holds no degrees of freedom.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True if every value is finite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Checks the vector length against `layout`.
    pub fn check_layout(&self, layout: &VariableLayout) -> KairosResult<()> {
        layout.check_len("solution state", self.values.len())
    }
}
