//! Error types for the in-memory observation store.

use thiserror::Error;

use crate::dtype::ObsDtype;

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Primary error type for store operations.
///
/// Every variant that refers to a named object carries the offending name;
/// container-level errors format it as `variable @ group`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: '{name}'")]
    NotFound { name: String },

    #[error("already exists: '{name}'")]
    AlreadyExists { name: String },

    #[error("type mismatch for '{name}': requested {requested}, stored {stored}")]
    TypeMismatch {
        name: String,
        requested: ObsDtype,
        stored: ObsDtype,
    },

    #[error("shape mismatch for '{name}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("length mismatch for '{name}': expected {expected}, got {actual}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("selection out of range for '{name}': {detail}")]
    OutOfRange { name: String, detail: String },

    #[error("'{name}' is read-only")]
    ReadOnly { name: String },

    #[error("invalid name or path: '{name}'")]
    InvalidName { name: String },

    /// Internal consistency check failed. Not user-recoverable.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
