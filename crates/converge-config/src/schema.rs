//! Configuration schema definitions.

use std::path::PathBuf;

use converge_runloop::InstallerConfig;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub installer: InstallerConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub container: ContainerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the resource registry keeps its snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Snapshot file path.
    #[serde(default = "default_registry_path")]
    pub storage_path: PathBuf,

    /// Scheme used when a desired set is registered without one.
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            storage_path: default_registry_path(),
            scheme: default_scheme(),
        }
    }
}

fn converge_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".converge")
}

fn default_registry_path() -> PathBuf {
    converge_home().join("registry.json")
}

fn default_scheme() -> String {
    "file".to_string()
}

/// State file of the in-memory container used by the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_container_state_path")]
    pub state_path: PathBuf,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            state_path: default_container_state_path(),
        }
    }
}

fn default_container_state_path() -> PathBuf {
    converge_home().join("container.json")
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Number of rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
            max_files: default_max_files(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_max_files() -> usize {
    30
}
