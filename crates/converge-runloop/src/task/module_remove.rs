use converge_core::RegisteredResource;
use tracing::info;

use super::{RelinkTask, TaskResult, find_module, module_manifest};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Stops and uninstalls a module whose entity has no desired state.
#[derive(Debug, Clone)]
pub struct ModuleRemoveTask {
    pub(crate) resource: RegisteredResource,
}

impl ModuleRemoveTask {
    pub fn new(resource: RegisteredResource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &RegisteredResource {
        &self.resource
    }

    pub(crate) async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        let manifest = module_manifest(&self.resource)?;
        let module = find_module(ctx, &manifest.symbolic_name)
            .await
            .ok_or_else(|| TaskError::TargetNotFound(self.resource.entity_id.clone()))?;

        if module.is_active() {
            ctx.container().stop_module(module.id).await?;
            ctx.record_operation();
        }
        ctx.container().uninstall_module(module.id).await?;
        ctx.record_operation();
        ctx.forget_digest(module.id);
        info!(
            "Removed module {} {} (id {})",
            module.symbolic_name, module.version, module.id
        );

        Ok(TaskResult::success().with_current_cycle(RelinkTask::new()))
    }
}
