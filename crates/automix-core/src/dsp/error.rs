//! DSP error types

use thiserror::Error;

/// Misconfiguration of a spectral component
///
/// These are programmer errors: a frame size is fixed at construction and
/// every frame handed in afterwards has to match it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DspError {
    /// Transform size is not a power of two
    #[error("Invalid frame size {0}: must be a non-zero power of two")]
    NotPowerOfTwo(usize),

    /// Frame length differs from the configured transform size
    #[error("Invalid frame size: expected {expected} samples, found {found}")]
    InvalidFrameSize { expected: usize, found: usize },
}

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;
