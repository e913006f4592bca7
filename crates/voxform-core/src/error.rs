//! Error types for the core geometry and resampling operations.

use thiserror::Error;

use crate::dims::AxisKind;

/// Main error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Volume rank outside the supported set {3, 4}.
    #[error("unsupported volume rank {0}, expected 3 or 4 dimensions")]
    UnsupportedRank(usize),

    /// No dimension record carries the requested axis kind.
    #[error("missing {0:?} axis in dimension list")]
    MissingAxis(AxisKind),

    /// A transform chain violates an assumed topology.
    #[error("transform compose error: {0}")]
    Compose(String),

    /// The affine's linear block is singular; decomposition aborts rather
    /// than producing NaNs.
    #[error("affine decomposition failed: linear block is singular")]
    DegenerateAffine,

    /// Operation or argument outside what the engine supports.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Buffer shape does not match the dimension records.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a compose error.
    pub fn compose(msg: impl Into<String>) -> Self {
        Self::Compose(msg.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
