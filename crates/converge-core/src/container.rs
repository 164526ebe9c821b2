//! Host container boundary.
//!
//! The installer drives a component container through these traits. The
//! container owns the real mechanics of loading, linking and running modules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ContainerError;
use crate::manifest::ModuleManifest;
use crate::resource::ConfigPid;
use crate::version::Version;

/// Key/value data of a configuration record.
pub type ConfigProperties = BTreeMap<String, serde_json::Value>;

/// Lifecycle state of an installed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
}

/// A module as seen in the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: u64,
    pub symbolic_name: String,
    pub version: Version,
    pub state: ModuleState,
    pub location: String,
    /// Digest of the content it was installed from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ModuleInfo {
    pub fn is_active(&self) -> bool {
        self.state == ModuleState::Active
    }
}

/// A stored configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub pid: ConfigPid,
    pub properties: ConfigProperties,
}

/// What happened to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleChange {
    Installed,
    Updated,
    Resolved,
    Started,
    Stopped,
    Uninstalled,
}

/// Lifecycle notification published by the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A module changed state.
    Module { id: u64, change: ModuleChange },
    /// A relink requested through [`RelinkControl`] finished.
    RelinkCompleted,
    /// A container service appeared or went away.
    ServiceChanged { name: String, available: bool },
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { id, change } => write!(f, "module {} {:?}", id, change),
            Self::RelinkCompleted => f.write_str("relink completed"),
            Self::ServiceChanged { name, available } => {
                write!(f, "service {} available={}", name, available)
            }
        }
    }
}

/// Module lifecycle operations of the host container.
#[async_trait]
pub trait Container: Send + Sync {
    /// All installed modules.
    async fn modules(&self) -> Vec<ModuleInfo>;

    /// Look up an installed module by id.
    async fn module(&self, id: u64) -> Option<ModuleInfo>;

    /// Install a module from `location`.
    async fn install_module(
        &self,
        location: &str,
        manifest: &ModuleManifest,
        digest: &str,
    ) -> Result<ModuleInfo, ContainerError>;

    /// Replace the content of an installed module.
    async fn update_module(
        &self,
        id: u64,
        location: &str,
        manifest: &ModuleManifest,
        digest: &str,
    ) -> Result<ModuleInfo, ContainerError>;

    async fn uninstall_module(&self, id: u64) -> Result<(), ContainerError>;

    async fn start_module(&self, id: u64) -> Result<(), ContainerError>;

    async fn stop_module(&self, id: u64) -> Result<(), ContainerError>;

    /// The configuration service, if currently available.
    fn config_admin(&self) -> Option<Arc<dyn ConfigAdmin>>;

    /// The relink control, if currently available.
    fn relink_control(&self) -> Option<Arc<dyn RelinkControl>>;

    /// Subscribe to lifecycle notifications.
    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent>;
}

/// Persisted configuration management.
#[async_trait]
pub trait ConfigAdmin: Send + Sync {
    async fn list(&self) -> Result<Vec<ConfigRecord>, ContainerError>;

    async fn get(&self, pid: &ConfigPid) -> Result<Option<ConfigRecord>, ContainerError>;

    /// Create a record; fails if it exists.
    async fn create(&self, pid: &ConfigPid, properties: ConfigProperties)
    -> Result<(), ContainerError>;

    /// Replace the data of an existing record.
    async fn update(&self, pid: &ConfigPid, properties: ConfigProperties)
    -> Result<(), ContainerError>;

    async fn delete(&self, pid: &ConfigPid) -> Result<(), ContainerError>;
}

/// Triggers a relink of module dependencies.
///
/// Completion is announced asynchronously through [`RuntimeEvent::RelinkCompleted`].
#[async_trait]
pub trait RelinkControl: Send + Sync {
    async fn refresh(&self) -> Result<(), ContainerError>;
}
