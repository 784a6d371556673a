//! Error types for spatial transformer operations.
//!
//! All failures here are programming or configuration errors surfaced
//! immediately; nothing is transient and nothing is retried. Source
//! coordinates falling outside the input image are a defined numeric case
//! handled by the kernels, not an error.

use thiserror::Error;

/// Main error type for spatial transformer operations.
#[derive(Error, Debug)]
pub enum TransformError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Affine parameter contract violation.
    #[error("Affine parameter error: {0}")]
    AffineParams(String),

    /// Dimension mismatch.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Backward called without the state saved by a forward call.
    #[error("Missing forward state: {0}")]
    MissingForwardState(String),
}

/// Result type for spatial transformer operations.
pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an affine parameter error.
    pub fn affine_params(msg: impl Into<String>) -> Self {
        Self::AffineParams(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create a missing forward state error.
    pub fn missing_forward_state(msg: impl Into<String>) -> Self {
        Self::MissingForwardState(msg.into())
    }
}
