//! Core error types.

use thiserror::Error;

/// Errors raised while validating or converting resources.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The URL has no usable scheme or location.
    #[error("Invalid resource url '{0}'")]
    InvalidUrl(String),

    /// A module was offered without a digest.
    #[error("Missing digest for module resource {0}")]
    MissingDigest(String),

    /// The resource carries both or neither of manifest and properties.
    #[error("Cannot infer resource kind for {0}")]
    AmbiguousContent(String),

    /// The module manifest could not be parsed.
    #[error("Invalid manifest for {url}: {reason}")]
    InvalidManifest { url: String, reason: String },

    /// A version string could not be parsed.
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),
}

/// Errors reported by the host container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// No module with this id is installed.
    #[error("Module not found: {0}")]
    ModuleNotFound(u64),

    /// No configuration record with this pid exists.
    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    /// A lifecycle operation failed.
    #[error("{operation} failed for {target}: {message}")]
    OperationFailed {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// A container service is not available right now.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ContainerError {
    /// Build an [`ContainerError::OperationFailed`].
    pub fn failed(
        operation: &'static str,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            operation,
            target: target.into(),
            message: message.into(),
        }
    }
}
