//! The model being integrated and the committed simulation it drives.
//!
//! A [`DifferentialSystem`] describes `du/dt = f(t, u)` for a
//! discretized model: its variable layout, the rate `f` and the
//! Jacobian `∂f/∂u`. A [`TransientSystem`] owns one model together with
//! the committed [`SolutionState`] and the step-size hint carried from
//! one advance to the next. Only an accepted controller step ever
//! writes to the committed state.

use kairos_math::{CsrMatrix, VariableLayout};
use kairos_types::{KairosError, KairosResult};

use crate::state::SolutionState;

/// A discretized, time-dependent model `du/dt = f(t, u)`.
pub trait DifferentialSystem: Send {
    /// Partition of the solution vector into variables.
    fn layout(&self) -> &VariableLayout;

    /// Evaluates `f(t, u)` into `out`.
    fn rate(&self, time: f64, values: &[f64], out: &mut [f64]) -> KairosResult<()>;

    /// Evaluates `∂f/∂u` at `(t, u)` as a square sparse matrix.
    fn jacobian(&self, time: f64, values: &[f64]) -> KairosResult<CsrMatrix>;

    /// Returns the model's name.
    fn name(&self) -> &str;
}

/// A model plus its committed solution and step-size hint.
pub struct TransientSystem<M: DifferentialSystem> {
    model: M,
    state: SolutionState,
    deltat: f64,
}

impl<M: DifferentialSystem> TransientSystem<M> {
    /// Wraps `model` starting from `initial`, with `deltat` as the first
    /// step-size hint.
    pub fn new(model: M, initial: SolutionState, deltat: f64) -> KairosResult<Self> {
        initial.check_layout(model.layout())?;
        if !(deltat > 0.0 && deltat.is_finite()) {
            return Err(KairosError::InvalidConfig(format!(
                "initial deltat must be finite and > 0, got {deltat}"
            )));
        }
        Ok(Self {
            model,
            state: initial,
            deltat,
        })
    }

    /// The model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the model (e.g. to change its parameters
    /// between steps).
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// The committed solution.
    pub fn state(&self) -> &SolutionState {
        &self.state
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.state.time
    }

    /// Step size to try on the next advance.
    pub fn deltat(&self) -> f64 {
        self.deltat
    }


    /// Commits an accepted step: the new solution and the next hint.
    pub(crate) fn commit(&mut self, state: SolutionState, next_deltat: f64) {
        self.state = state;
        self.deltat = next_deltat;
    }

    /// Consumes the system, returning the model and committed state.
    pub fn into_parts(self) -> (M, SolutionState) {
        (self.model, self.state)
    }
}
