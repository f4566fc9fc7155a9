//! Error types for the acoustic simulation core.

use thiserror::Error;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, WaveError>;

/// Errors that can occur in the simulation core.
///
/// Interactive operations (impulse injection, obstacle edits) never panic:
/// they either take effect or return one of these and leave state unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaveError {
    /// Damping or wall-reflection coefficient out of its documented range.
    #[error("invalid damping preset: {0}")]
    InvalidPreset(String),

    /// Empty PCM data or non-positive sample rate.
    #[error("invalid audio sample: {0}")]
    InvalidSample(String),

    /// Impulse amplitude or radius outside the documented range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Obstacle mask byte length does not match the grid.
    #[error("size mismatch: expected {expected} cells, got {actual}")]
    SizeMismatch {
        /// Number of cells the grid requires.
        expected: usize,
        /// Number of cells actually supplied.
        actual: usize,
    },

    /// GPU backend failed to initialize or execute; the solver continues on CPU.
    #[error("GPU backend unavailable: {0}")]
    GpuUnavailable(String),

    /// Audio device could not be opened or started.
    #[error("audio device error: {0}")]
    DeviceError(String),
}

impl WaveError {
    /// Create an invalid-preset error.
    pub fn invalid_preset(msg: impl Into<String>) -> Self {
        Self::InvalidPreset(msg.into())
    }

    /// Create an invalid-sample error.
    pub fn invalid_sample(msg: impl Into<String>) -> Self {
        Self::InvalidSample(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a GPU-unavailable error.
    pub fn gpu_unavailable(msg: impl Into<String>) -> Self {
        Self::GpuUnavailable(msg.into())
    }
}
