//! Error types for the kairos engine.
//!
//! All crates return `KairosResult<T>` from fallible operations.

use thiserror::Error;

/// Unified error type for the kairos engine.
#[derive(Debug, Error)]
pub enum KairosError {
    /// Configuration value is invalid (e.g. non-positive target tolerance).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two vectors (or a vector and a weight mapping) disagree in size.
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Where the mismatch was detected.
        context: String,
        /// Size required by the receiving side.
        expected: usize,
        /// Size actually supplied.
        found: usize,
    },

    /// An operation was called before `init()`.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// The linear solver could not produce a solution.
    #[error("Linear solve failed: {0}")]
    LinearSolve(String),

    /// The physical model failed to evaluate its rate or Jacobian.
    #[error("Model evaluation failed: {0}")]
    Model(String),

    /// The adaptive controller could not find an acceptable step.
    #[error(
        "Timestep failure ({reason}): requested deltat {requested_deltat:.3e}, last attempted \
         {attempted_deltat:.3e}, min_deltat {min_deltat:.3e}, last scaled error \
         {last_scaled_error:.3e}, {nonlinear_iterations} nonlinear iterations over {rejections} rejected attempts"
    )]
    TimestepFailure {
        /// The deltat hint passed to `advance()`.
        requested_deltat: f64,
        /// The deltat of the last rejected attempt.
        attempted_deltat: f64,
        /// The lower bound that stopped the shrink loop.
        min_deltat: f64,
        /// Last computed scaled error (infinite if the solve never converged).
        last_scaled_error: f64,
        /// Nonlinear iterations spent on all attempts of this advance.
        nonlinear_iterations: usize,
        /// Number of rejected attempts.
        rejections: usize,
        /// Which bound was hit.
        reason: String,
    },

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl KairosError {
    /// Shorthand for a [`KairosError::DimensionMismatch`].
    pub fn dimension(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}

/// Convenience alias for `Result<T, KairosError>`.
pub type KairosResult<T> = Result<T, KairosError>;
