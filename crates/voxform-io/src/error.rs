//! Error types for store and transform-file operations.

use std::path::{Path, PathBuf};

use thiserror::Error;
use voxform_core::CoreError;

/// Main error type for I/O operations.
///
/// Failures are surfaced immediately, never retried, and carry the
/// operation name and path so callers can log without re-deriving state.
#[derive(Error, Debug)]
pub enum IoError {
    /// Native I/O failure against the volume store.
    #[error("I/O failure in {op} on {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unsupported or inconsistent numeric kind at a store boundary.
    #[error("numeric kind mismatch: {0}")]
    TypeMismatch(String),

    /// Hyperslab selection outside the volume extent.
    #[error("selection out of bounds on axis {axis}: start {start} count {count} exceeds length {length}")]
    OutOfBounds {
        axis: usize,
        start: usize,
        count: usize,
        length: usize,
    },

    /// Malformed volume header or transform file.
    #[error("malformed file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// Error from the core geometry layer.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    /// Wrap a native I/O error with its operation name and path.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Create a numeric kind mismatch error.
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Create a malformed-file error.
    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}
