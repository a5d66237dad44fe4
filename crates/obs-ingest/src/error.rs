//! Error types for the ingestion layer.

use thiserror::Error;

use obs_engines::EngineError;
use obs_store::StoreError;

/// Result type alias using IngestError.
pub type IngestResult<T> = Result<T, IngestError>;

/// Primary error type for ingest and ObsSpace operations.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Unknown obs type, unparseable window, unknown distribution, or a
    /// file whose axis sizes make no sense.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}
