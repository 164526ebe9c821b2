//! Registry errors.

use converge_core::CoreError;
use thiserror::Error;

/// Registry error types.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The resource failed validation.
    #[error("Invalid resource: {0}")]
    InvalidResource(#[from] CoreError),

    /// A resource was offered under a different scheme than declared.
    #[error("Resource {url} does not belong to scheme '{expected}'")]
    SchemeMismatch { url: String, expected: String },

    /// Snapshot was written by an unknown format version.
    #[error("Unsupported snapshot format version {0}")]
    UnsupportedFormat(u32),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
