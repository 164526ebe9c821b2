//! Installer errors.

use converge_core::ContainerError;
use converge_registry::RegistryError;
use thiserror::Error;

/// Errors that end a task instance. They are logged and the task dropped.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The module or record the task operates on does not exist.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The task was built from a resource of the wrong kind.
    #[error("Invalid resource for task: {0}")]
    InvalidResource(String),

    /// A container operation failed.
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),
}

/// Installer lifecycle and intake errors.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// `start` called twice.
    #[error("Installer is already running")]
    AlreadyRunning,

    /// `stop` called on a stopped installer.
    #[error("Installer is not running")]
    NotRunning,

    /// The registry refused the resource.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type for installer operations.
pub type InstallerResult<T> = Result<T, InstallerError>;
