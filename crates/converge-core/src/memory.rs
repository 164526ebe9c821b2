//! In-memory container.
//!
//! Behaves like a small module container: modules move through
//! install/start/stop/uninstall, configuration records are kept in a map and
//! every state change is published as a [`RuntimeEvent`]. Services and
//! failures can be toggled to exercise the installer's retry paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::container::{
    ConfigAdmin, ConfigProperties, ConfigRecord, Container, ModuleChange, ModuleInfo, ModuleState,
    RelinkControl, RuntimeEvent,
};
use crate::error::ContainerError;
use crate::manifest::ModuleManifest;
use crate::resource::ConfigPid;

const EVENT_CAPACITY: usize = 1024;

/// Serializable contents of a [`MemoryContainer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
    #[serde(default)]
    pub configs: Vec<ConfigRecord>,
}

struct ModuleTable {
    modules: BTreeMap<u64, ModuleInfo>,
    next_id: u64,
}

struct Shared {
    modules: Mutex<ModuleTable>,
    configs: Mutex<BTreeMap<String, ConfigRecord>>,
    events: broadcast::Sender<RuntimeEvent>,
    config_admin_available: AtomicBool,
    relink_available: AtomicBool,
    relink_acknowledged: AtomicBool,
    relink_deactivates: AtomicBool,
    start_failures: Mutex<HashMap<String, u32>>,
    journal: Mutex<Vec<String>>,
}

impl Shared {
    fn publish(&self, event: RuntimeEvent) {
        trace!("Publishing {}", event);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn record(&self, entry: String) {
        debug!("Container: {}", entry);
        self.journal.lock().push(entry);
    }
}

/// A module container living entirely in memory.
#[derive(Clone)]
pub struct MemoryContainer {
    shared: Arc<Shared>,
}

impl MemoryContainer {
    /// Empty container with all services available.
    pub fn new() -> Self {
        Self::from_state(ContainerState::default())
    }

    /// Restore a container from saved state.
    pub fn from_state(state: ContainerState) -> Self {
        let next_id = state.modules.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let modules = state.modules.into_iter().map(|m| (m.id, m)).collect();
        let configs = state
            .configs
            .into_iter()
            .map(|c| (c.pid.composite(), c))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                modules: Mutex::new(ModuleTable { modules, next_id }),
                configs: Mutex::new(configs),
                events,
                config_admin_available: AtomicBool::new(true),
                relink_available: AtomicBool::new(true),
                relink_acknowledged: AtomicBool::new(true),
                relink_deactivates: AtomicBool::new(false),
                start_failures: Mutex::new(HashMap::new()),
                journal: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Snapshot the current contents.
    pub fn to_state(&self) -> ContainerState {
        ContainerState {
            modules: self.shared.modules.lock().modules.values().cloned().collect(),
            configs: self.shared.configs.lock().values().cloned().collect(),
        }
    }

    /// Make the configuration service appear or disappear.
    pub fn set_config_admin_available(&self, available: bool) {
        self.shared
            .config_admin_available
            .store(available, Ordering::SeqCst);
        self.shared.publish(RuntimeEvent::ServiceChanged {
            name: "config-admin".to_string(),
            available,
        });
    }

    /// Make the relink control appear or disappear.
    pub fn set_relink_available(&self, available: bool) {
        self.shared.relink_available.store(available, Ordering::SeqCst);
        self.shared.publish(RuntimeEvent::ServiceChanged {
            name: "relink".to_string(),
            available,
        });
    }

    /// Whether a relink publishes [`RuntimeEvent::RelinkCompleted`].
    pub fn set_relink_acknowledged(&self, acknowledged: bool) {
        self.shared
            .relink_acknowledged
            .store(acknowledged, Ordering::SeqCst);
    }

    /// Whether a relink stops all active modules.
    pub fn set_relink_deactivates(&self, deactivates: bool) {
        self.shared
            .relink_deactivates
            .store(deactivates, Ordering::SeqCst);
    }

    /// Let the next `times` start attempts of `symbolic_name` fail.
    pub fn fail_next_starts(&self, symbolic_name: &str, times: u32) {
        self.shared
            .start_failures
            .lock()
            .insert(symbolic_name.to_string(), times);
    }

    /// Publish an arbitrary event.
    pub fn publish(&self, event: RuntimeEvent) {
        self.shared.publish(event);
    }

    /// Operations performed so far, oldest first.
    pub fn journal(&self) -> Vec<String> {
        self.shared.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.shared.journal.lock().clear();
    }

    pub fn module_by_name(&self, symbolic_name: &str) -> Option<ModuleInfo> {
        self.shared
            .modules
            .lock()
            .modules
            .values()
            .find(|m| m.symbolic_name == symbolic_name)
            .cloned()
    }

    /// Look up a configuration record by composite pid.
    pub fn config(&self, composite_pid: &str) -> Option<ConfigRecord> {
        self.shared.configs.lock().get(composite_pid).cloned()
    }

    fn set_state(&self, id: u64, state: ModuleState) -> Result<ModuleInfo, ContainerError> {
        let mut table = self.shared.modules.lock();
        let module = table
            .modules
            .get_mut(&id)
            .ok_or(ContainerError::ModuleNotFound(id))?;
        module.state = state;
        Ok(module.clone())
    }
}

impl Default for MemoryContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Container for MemoryContainer {
    async fn modules(&self) -> Vec<ModuleInfo> {
        self.shared.modules.lock().modules.values().cloned().collect()
    }

    async fn module(&self, id: u64) -> Option<ModuleInfo> {
        self.shared.modules.lock().modules.get(&id).cloned()
    }

    async fn install_module(
        &self,
        location: &str,
        manifest: &ModuleManifest,
        digest: &str,
    ) -> Result<ModuleInfo, ContainerError> {
        let info = {
            let mut table = self.shared.modules.lock();
            if table.modules.values().any(|m| m.location == location) {
                return Err(ContainerError::failed(
                    "install",
                    location,
                    "location already installed",
                ));
            }
            let id = table.next_id;
            table.next_id += 1;
            let info = ModuleInfo {
                id,
                symbolic_name: manifest.symbolic_name.clone(),
                version: manifest.version.clone(),
                state: ModuleState::Installed,
                location: location.to_string(),
                digest: Some(digest.to_string()),
            };
            table.modules.insert(id, info.clone());
            info
        };
        self.shared
            .record(format!("install {} {}", info.symbolic_name, info.version));
        self.shared.publish(RuntimeEvent::Module {
            id: info.id,
            change: ModuleChange::Installed,
        });
        Ok(info)
    }

    async fn update_module(
        &self,
        id: u64,
        location: &str,
        manifest: &ModuleManifest,
        digest: &str,
    ) -> Result<ModuleInfo, ContainerError> {
        let info = {
            let mut table = self.shared.modules.lock();
            let module = table
                .modules
                .get_mut(&id)
                .ok_or(ContainerError::ModuleNotFound(id))?;
            module.version = manifest.version.clone();
            module.location = location.to_string();
            module.digest = Some(digest.to_string());
            module.state = ModuleState::Installed;
            module.clone()
        };
        self.shared
            .record(format!("update {} {}", info.symbolic_name, info.version));
        self.shared.publish(RuntimeEvent::Module {
            id,
            change: ModuleChange::Updated,
        });
        Ok(info)
    }

    async fn uninstall_module(&self, id: u64) -> Result<(), ContainerError> {
        let removed = self
            .shared
            .modules
            .lock()
            .modules
            .remove(&id)
            .ok_or(ContainerError::ModuleNotFound(id))?;
        self.shared.record(format!("uninstall {}", removed.symbolic_name));
        self.shared.publish(RuntimeEvent::Module {
            id,
            change: ModuleChange::Uninstalled,
        });
        Ok(())
    }

    async fn start_module(&self, id: u64) -> Result<(), ContainerError> {
        let name = self
            .shared
            .modules
            .lock()
            .modules
            .get(&id)
            .map(|m| m.symbolic_name.clone())
            .ok_or(ContainerError::ModuleNotFound(id))?;

        {
            let mut failures = self.shared.start_failures.lock();
            if let Some(remaining) = failures.get_mut(&name).filter(|n| **n > 0) {
                *remaining -= 1;
                drop(failures);
                self.shared.record(format!("start {} failed", name));
                return Err(ContainerError::failed("start", name, "activation failed"));
            }
        }

        self.set_state(id, ModuleState::Active)?;
        self.shared.record(format!("start {}", name));
        self.shared.publish(RuntimeEvent::Module {
            id,
            change: ModuleChange::Started,
        });
        Ok(())
    }

    async fn stop_module(&self, id: u64) -> Result<(), ContainerError> {
        let info = self.set_state(id, ModuleState::Resolved)?;
        self.shared.record(format!("stop {}", info.symbolic_name));
        self.shared.publish(RuntimeEvent::Module {
            id,
            change: ModuleChange::Stopped,
        });
        Ok(())
    }

    fn config_admin(&self) -> Option<Arc<dyn ConfigAdmin>> {
        if self.shared.config_admin_available.load(Ordering::SeqCst) {
            Some(Arc::new(MemoryConfigAdmin {
                shared: self.shared.clone(),
            }))
        } else {
            None
        }
    }

    fn relink_control(&self) -> Option<Arc<dyn RelinkControl>> {
        if self.shared.relink_available.load(Ordering::SeqCst) {
            Some(Arc::new(MemoryRelinkControl {
                shared: self.shared.clone(),
            }))
        } else {
            None
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.shared.events.subscribe()
    }
}

struct MemoryConfigAdmin {
    shared: Arc<Shared>,
}

#[async_trait]
impl ConfigAdmin for MemoryConfigAdmin {
    async fn list(&self) -> Result<Vec<ConfigRecord>, ContainerError> {
        Ok(self.shared.configs.lock().values().cloned().collect())
    }

    async fn get(&self, pid: &ConfigPid) -> Result<Option<ConfigRecord>, ContainerError> {
        Ok(self.shared.configs.lock().get(&pid.composite()).cloned())
    }

    async fn create(
        &self,
        pid: &ConfigPid,
        properties: ConfigProperties,
    ) -> Result<(), ContainerError> {
        let key = pid.composite();
        {
            let mut configs = self.shared.configs.lock();
            if configs.contains_key(&key) {
                return Err(ContainerError::failed("create", key, "already exists"));
            }
            configs.insert(
                key.clone(),
                ConfigRecord {
                    pid: pid.clone(),
                    properties,
                },
            );
        }
        self.shared.record(format!("config create {}", key));
        Ok(())
    }

    async fn update(
        &self,
        pid: &ConfigPid,
        properties: ConfigProperties,
    ) -> Result<(), ContainerError> {
        let key = pid.composite();
        {
            let mut configs = self.shared.configs.lock();
            let record = configs
                .get_mut(&key)
                .ok_or_else(|| ContainerError::ConfigNotFound(key.clone()))?;
            record.properties = properties;
        }
        self.shared.record(format!("config update {}", key));
        Ok(())
    }

    async fn delete(&self, pid: &ConfigPid) -> Result<(), ContainerError> {
        let key = pid.composite();
        self.shared
            .configs
            .lock()
            .remove(&key)
            .ok_or_else(|| ContainerError::ConfigNotFound(key.clone()))?;
        self.shared.record(format!("config delete {}", key));
        Ok(())
    }
}

struct MemoryRelinkControl {
    shared: Arc<Shared>,
}

#[async_trait]
impl RelinkControl for MemoryRelinkControl {
    async fn refresh(&self) -> Result<(), ContainerError> {
        self.shared.record("relink".to_string());

        if self.shared.relink_deactivates.load(Ordering::SeqCst) {
            let stopped: Vec<u64> = {
                let mut table = self.shared.modules.lock();
                table
                    .modules
                    .values_mut()
                    .filter(|m| m.state == ModuleState::Active)
                    .map(|m| {
                        m.state = ModuleState::Resolved;
                        m.id
                    })
                    .collect()
            };
            for id in stopped {
                self.shared.publish(RuntimeEvent::Module {
                    id,
                    change: ModuleChange::Stopped,
                });
            }
        }

        if self.shared.relink_acknowledged.load(Ordering::SeqCst) {
            self.shared.publish(RuntimeEvent::RelinkCompleted);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
