//! Convergence tasks.
//!
//! Every task has a sort key `<order>-<stable id>`; the order prefix fixes the
//! phase within a cycle (config removal first, module starts last) and the
//! stable id makes the order total. Tasks never touch the queues. They return
//! a [`TaskResult`] describing their outcome and any follow-up tasks.

mod config_install;
mod config_remove;
mod module_install;
mod module_remove;
mod module_start;
mod module_update;
mod relink;
mod set;

use std::fmt;

use converge_core::{ModuleInfo, ModuleManifest, RegisteredResource};

use crate::context::ExecutionContext;
use crate::error::TaskError;

pub use config_install::{ConfigInstallTask, DIGEST_PROPERTY, URL_PROPERTY, record_matches};
pub use config_remove::ConfigRemoveTask;
pub use module_install::ModuleInstallTask;
pub use module_remove::ModuleRemoveTask;
pub use module_start::{ModuleStartTask, SYSTEM_MODULE_ID};
pub use module_update::ModuleUpdateTask;
pub use relink::RelinkTask;
pub use set::TaskSet;

/// Sort key prefixes, lowest runs first.
pub mod order {
    pub const CONFIG_REMOVE: &str = "10";
    pub const CONFIG_INSTALL: &str = "20";
    pub const MODULE_REMOVE: &str = "30";
    pub const MODULE_UPDATE: &str = "40";
    pub const MODULE_INSTALL: &str = "50";
    pub const RELINK: &str = "60";
    pub const MODULE_START: &str = "70";
}

/// Which queue a task goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Later in the cycle being executed.
    Current,
    /// The following cycle.
    Next,
}

/// How a task execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The container was changed.
    Success,
    /// Nothing needed doing.
    NoAction,
    /// Run this task again in the given cycle.
    Retry(Cycle),
}

/// Outcome plus follow-up tasks for the driver to schedule.
#[derive(Debug)]
pub struct TaskResult {
    pub outcome: TaskOutcome,
    pub follow_ups: Vec<(Cycle, InstallTask)>,
}

impl TaskResult {
    fn with_outcome(outcome: TaskOutcome) -> Self {
        Self {
            outcome,
            follow_ups: Vec::new(),
        }
    }

    pub fn success() -> Self {
        Self::with_outcome(TaskOutcome::Success)
    }

    pub fn no_action() -> Self {
        Self::with_outcome(TaskOutcome::NoAction)
    }

    pub fn retry(cycle: Cycle) -> Self {
        Self::with_outcome(TaskOutcome::Retry(cycle))
    }

    /// Schedule `task` later in the current cycle.
    pub fn with_current_cycle(mut self, task: impl Into<InstallTask>) -> Self {
        self.follow_ups.push((Cycle::Current, task.into()));
        self
    }

    /// Schedule `task` for the next cycle.
    pub fn with_next_cycle(mut self, task: impl Into<InstallTask>) -> Self {
        self.follow_ups.push((Cycle::Next, task.into()));
        self
    }
}

/// A unit of convergence work.
#[derive(Debug, Clone)]
pub enum InstallTask {
    ModuleInstall(ModuleInstallTask),
    ModuleUpdate(ModuleUpdateTask),
    ModuleRemove(ModuleRemoveTask),
    ModuleStart(ModuleStartTask),
    Relink(RelinkTask),
    ConfigInstall(ConfigInstallTask),
    ConfigRemove(ConfigRemoveTask),
}

impl InstallTask {
    /// Key that totally orders tasks within a cycle.
    pub fn sort_key(&self) -> String {
        match self {
            Self::ModuleInstall(t) => format!("{}-{}", order::MODULE_INSTALL, t.resource.entity_id),
            Self::ModuleUpdate(t) => format!("{}-{}", order::MODULE_UPDATE, t.resource.entity_id),
            Self::ModuleRemove(t) => format!("{}-{}", order::MODULE_REMOVE, t.resource.entity_id),
            Self::ModuleStart(t) => format!("{}-{:020}", order::MODULE_START, t.module_id()),
            Self::Relink(_) => format!("{}-relink", order::RELINK),
            Self::ConfigInstall(t) => {
                format!("{}-{}", order::CONFIG_INSTALL, t.resource.entity_id)
            }
            Self::ConfigRemove(t) => format!("{}-{}", order::CONFIG_REMOVE, t.resource.entity_id),
        }
    }

    /// Entity the task was derived from; `None` for container-level tasks.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::ModuleInstall(t) => Some(&t.resource.entity_id),
            Self::ModuleUpdate(t) => Some(&t.resource.entity_id),
            Self::ModuleRemove(t) => Some(&t.resource.entity_id),
            Self::ConfigInstall(t) => Some(&t.resource.entity_id),
            Self::ConfigRemove(t) => Some(&t.resource.entity_id),
            Self::ModuleStart(_) | Self::Relink(_) => None,
        }
    }

    /// Whether the task may run now. Only start retries are gated.
    pub fn is_executable(&self, ctx: &ExecutionContext) -> bool {
        match self {
            Self::ModuleStart(t) => t.is_executable(ctx),
            _ => true,
        }
    }

    pub async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        match self {
            Self::ModuleInstall(t) => t.execute(ctx).await,
            Self::ModuleUpdate(t) => t.execute(ctx).await,
            Self::ModuleRemove(t) => t.execute(ctx).await,
            Self::ModuleStart(t) => t.execute(ctx).await,
            Self::Relink(t) => t.execute(ctx).await,
            Self::ConfigInstall(t) => t.execute(ctx).await,
            Self::ConfigRemove(t) => t.execute(ctx).await,
        }
    }
}

impl fmt::Display for InstallTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleInstall(t) => write!(f, "ModuleInstall({})", t.resource),
            Self::ModuleUpdate(t) => write!(f, "ModuleUpdate({})", t.resource),
            Self::ModuleRemove(t) => write!(f, "ModuleRemove({})", t.resource),
            Self::ModuleStart(t) => write!(f, "ModuleStart({})", t.module_id()),
            Self::Relink(_) => f.write_str("Relink"),
            Self::ConfigInstall(t) => write!(f, "ConfigInstall({})", t.resource),
            Self::ConfigRemove(t) => write!(f, "ConfigRemove({})", t.resource),
        }
    }
}

macro_rules! impl_from_task {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for InstallTask {
                fn from(task: $ty) -> Self {
                    Self::$variant(task)
                }
            }
        )*
    };
}

impl_from_task! {
    ModuleInstall => ModuleInstallTask,
    ModuleUpdate => ModuleUpdateTask,
    ModuleRemove => ModuleRemoveTask,
    ModuleStart => ModuleStartTask,
    Relink => RelinkTask,
    ConfigInstall => ConfigInstallTask,
    ConfigRemove => ConfigRemoveTask,
}

fn module_manifest(resource: &RegisteredResource) -> Result<&ModuleManifest, TaskError> {
    resource
        .manifest()
        .ok_or_else(|| TaskError::InvalidResource(resource.url.clone()))
}

async fn find_module(ctx: &ExecutionContext, symbolic_name: &str) -> Option<ModuleInfo> {
    ctx.container()
        .modules()
        .await
        .into_iter()
        .find(|m| m.symbolic_name == symbolic_name)
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
