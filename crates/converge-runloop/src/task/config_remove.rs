use converge_core::RegisteredResource;
use tracing::{debug, info, warn};

use super::config_install::config_payload;
use super::{Cycle, TaskResult};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Deletes a configuration record whose entity has no desired state.
///
/// Defers to the next cycle for as long as the configuration service is
/// missing.
#[derive(Debug, Clone)]
pub struct ConfigRemoveTask {
    pub(crate) resource: RegisteredResource,
}

impl ConfigRemoveTask {
    pub fn new(resource: RegisteredResource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &RegisteredResource {
        &self.resource
    }

    pub(crate) async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        let (pid, _) = config_payload(&self.resource)?;

        let Some(admin) = ctx.config_admin() else {
            debug!("Configuration service unavailable, deferring removal of {}", pid);
            return Ok(TaskResult::retry(Cycle::Next));
        };

        match admin.get(pid).await {
            Ok(None) => {
                debug!("Configuration {} not found, ignored", pid);
                Ok(TaskResult::no_action())
            }
            Ok(Some(_)) => match admin.delete(pid).await {
                Ok(()) => {
                    ctx.record_operation();
                    info!("Deleted configuration {}", pid);
                    Ok(TaskResult::success())
                }
                Err(e) => {
                    warn!("Failed to delete configuration {}, retrying: {}", pid, e);
                    Ok(TaskResult::retry(Cycle::Next))
                }
            },
            Err(e) => {
                warn!("Failed to look up configuration {}, retrying: {}", pid, e);
                Ok(TaskResult::retry(Cycle::Next))
            }
        }
    }
}
