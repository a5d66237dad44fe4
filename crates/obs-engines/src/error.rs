//! Error types for the storage engines.

use thiserror::Error;

use obs_store::{ObsDtype, StoreError};

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// Primary error type for backend operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The underlying format library failed; carries the native message
    /// (which includes the library's error code where it has one).
    #[error("{backend} backend error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("variable not found: '{0}'")]
    VarNotFound(String),

    #[error("attribute not found: '{0}'")]
    AttrNotFound(String),

    #[error("group not found: '{0}'")]
    GroupNotFound(String),

    #[error("{backend} backend cannot represent {dtype} data ('{name}')")]
    UnsupportedDtype {
        backend: &'static str,
        name: String,
        dtype: ObsDtype,
    },

    /// The on-disk type of a variable falls outside the store's registry.
    #[error("'{name}' has a type outside the {backend} backend's registry")]
    UnsupportedSourceType {
        backend: &'static str,
        name: String,
    },

    #[error("operation not supported by {backend} backend: {op}")]
    Unsupported {
        backend: &'static str,
        op: &'static str,
    },

    #[error("unknown backend format: '{0}'")]
    UnknownFormat(String),

    #[error("backend is read-only")]
    ReadOnlyBackend,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<netcdf::Error> for EngineError {
    fn from(err: netcdf::Error) -> Self {
        EngineError::Backend {
            backend: "netcdf",
            message: err.to_string(),
        }
    }
}

impl From<hdf5::Error> for EngineError {
    fn from(err: hdf5::Error) -> Self {
        EngineError::Backend {
            backend: "hdf5",
            message: err.to_string(),
        }
    }
}
