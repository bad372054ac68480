//! Error types for stochastic gradient samplers.

use thiserror::Error;

/// Result type alias for sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;

/// Errors raised while preparing or advancing a sampler.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// `step` was called without a prepared update plan.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Invalid hyperparameter, parameter list, cost, or input values.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Parameter shape differs from the auxiliary state allocated for its name.
    #[error("shape mismatch for `{name}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Cost or a next state value became non-finite; nothing was written.
    #[error("numeric divergence in `{name}` ({quantity})")]
    NumericDivergence { name: String, quantity: String },

    /// Candle tensor or autodiff error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl SamplerError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
