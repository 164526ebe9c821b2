use std::cmp::Ordering;

use converge_core::{RegisteredResource, ResourceKind};
use converge_registry::ResourceGroup;
use tracing::{debug, info};

use super::{RuntimeSnapshot, TaskCreator};
use crate::task::{InstallTask, ModuleInstallTask, ModuleRemoveTask, ModuleUpdateTask};

/// Diffs module groups against installed modules.
#[derive(Debug, Default)]
pub struct ModuleTaskCreator;

impl ModuleTaskCreator {
    pub fn new() -> Self {
        Self
    }
}

impl TaskCreator for ModuleTaskCreator {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Module
    }

    fn create_tasks(&self, group: &ResourceGroup, runtime: &RuntimeSnapshot) -> Vec<InstallTask> {
        let Some(name) = group
            .members()
            .iter()
            .find_map(RegisteredResource::manifest)
            .map(|m| m.symbolic_name.as_str())
        else {
            return Vec::new();
        };
        let installed = runtime.module(name);

        let task: Option<InstallTask> = match (group.desired(), installed) {
            (None, None) => None,
            (None, Some(module)) => {
                // Only remove what one of our candidates put there.
                match group
                    .members()
                    .iter()
                    .find(|r| r.version() == Some(&module.version))
                {
                    Some(owner) => Some(ModuleRemoveTask::new(owner.clone()).into()),
                    None => {
                        debug!(
                            "Module {} {} not registered here, leaving it installed",
                            name, module.version
                        );
                        None
                    }
                }
            }
            (Some(desired), None) => Some(ModuleInstallTask::new(desired.clone()).into()),
            (Some(desired), Some(module)) => {
                let wanted = desired.version().cloned().unwrap_or_default();
                match module.version.cmp(&wanted) {
                    Ordering::Less => Some(ModuleUpdateTask::new(desired.clone()).into()),
                    Ordering::Greater => {
                        let withdrawn = group
                            .members()
                            .iter()
                            .any(|r| !r.installable && r.version() == Some(&module.version));
                        if withdrawn {
                            info!(
                                "Downgrading {} from {} to {}",
                                name, module.version, wanted
                            );
                            Some(ModuleUpdateTask::new(desired.clone()).into())
                        } else {
                            info!(
                                "Module {} {} is newer than registered {}, ignoring",
                                name, module.version, wanted
                            );
                            None
                        }
                    }
                    Ordering::Equal if wanted.is_snapshot() => match module.digest.as_deref() {
                        Some(digest) if digest != desired.digest => {
                            debug!("Snapshot {} {} changed content", name, wanted);
                            Some(ModuleUpdateTask::new(desired.clone()).into())
                        }
                        Some(_) => None,
                        None => {
                            debug!(
                                "Content of snapshot {} {} unknown, leaving it installed",
                                name, wanted
                            );
                            None
                        }
                    },
                    Ordering::Equal => None,
                }
            }
        };

        task.into_iter().collect()
    }
}
