//! Task creators: diff one resource group against the live container.

mod config;
mod module;

use std::collections::BTreeMap;

use converge_core::{ConfigPid, ConfigRecord, ModuleInfo, ResourceKind};
use converge_registry::ResourceGroup;
use tracing::warn;

use crate::context::ExecutionContext;
use crate::task::InstallTask;

pub use config::ConfigTaskCreator;
pub use module::ModuleTaskCreator;

/// Produces the tasks that bring one group's entity to its desired state.
pub trait TaskCreator: Send + Sync {
    /// Kind of groups this creator handles.
    fn kind(&self) -> ResourceKind;

    /// Diff `group` against `runtime`. Must return nothing for a converged group.
    fn create_tasks(&self, group: &ResourceGroup, runtime: &RuntimeSnapshot) -> Vec<InstallTask>;
}

/// Read-only view of the container taken at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    modules: Vec<ModuleInfo>,
    configs: Option<BTreeMap<String, ConfigRecord>>,
}

impl RuntimeSnapshot {
    /// `configs` is `None` when the configuration service is unavailable.
    pub fn new(modules: Vec<ModuleInfo>, configs: Option<Vec<ConfigRecord>>) -> Self {
        Self {
            modules,
            configs: configs.map(|records| {
                records
                    .into_iter()
                    .map(|record| (record.pid.composite(), record))
                    .collect()
            }),
        }
    }

    /// Query the container. Digests it does not report are filled in from the
    /// ones this installer applied.
    pub async fn capture(ctx: &ExecutionContext) -> Self {
        let modules = ctx
            .container()
            .modules()
            .await
            .into_iter()
            .map(|mut module| {
                module.digest = ctx.known_digest(&module);
                module
            })
            .collect();
        let configs = match ctx.config_admin() {
            Some(admin) => match admin.list().await {
                Ok(records) => Some(records),
                Err(e) => {
                    warn!("Unable to list configurations: {}", e);
                    None
                }
            },
            None => None,
        };
        Self::new(modules, configs)
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// Installed module with this symbolic name.
    pub fn module(&self, symbolic_name: &str) -> Option<&ModuleInfo> {
        self.modules
            .iter()
            .find(|m| m.symbolic_name == symbolic_name)
    }

    /// Whether configuration records could be read.
    pub fn configs_available(&self) -> bool {
        self.configs.is_some()
    }

    pub fn config(&self, pid: &ConfigPid) -> Option<&ConfigRecord> {
        self.configs.as_ref()?.get(&pid.composite())
    }
}

#[cfg(test)]
#[path = "creator_tests.rs"]
mod tests;
