use converge_core::ResourceKind;
use converge_registry::ResourceGroup;

use super::{RuntimeSnapshot, TaskCreator};
use crate::task::{ConfigInstallTask, ConfigRemoveTask, InstallTask, record_matches};

/// Diffs configuration groups against stored records.
///
/// While the configuration service is unavailable the desired state cannot
/// be compared, so an install or remove task is produced and left to defer.
#[derive(Debug, Default)]
pub struct ConfigTaskCreator;

impl ConfigTaskCreator {
    pub fn new() -> Self {
        Self
    }
}

impl TaskCreator for ConfigTaskCreator {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Config
    }

    fn create_tasks(&self, group: &ResourceGroup, runtime: &RuntimeSnapshot) -> Vec<InstallTask> {
        let Some(pid) = group.members().iter().find_map(|r| r.config_pid()) else {
            return Vec::new();
        };
        let stored = runtime.config(pid);

        let task: Option<InstallTask> = match group.desired() {
            Some(desired) => match stored {
                Some(record) if record_matches(&record.properties, desired) => None,
                _ => Some(ConfigInstallTask::new(desired.clone()).into()),
            },
            None => {
                let unknown = !runtime.configs_available();
                match group.members().first() {
                    Some(member) if unknown || stored.is_some() => {
                        Some(ConfigRemoveTask::new(member.clone()).into())
                    }
                    _ => None,
                }
            }
        };

        task.into_iter().collect()
    }
}
