use converge_core::RegisteredResource;
use tracing::{debug, info};

use super::{ModuleStartTask, RelinkTask, TaskResult, find_module, module_manifest};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Replaces an installed module with the desired version.
///
/// The module is stopped first and restarted after a relink, both scheduled
/// in the current cycle.
#[derive(Debug, Clone)]
pub struct ModuleUpdateTask {
    pub(crate) resource: RegisteredResource,
}

impl ModuleUpdateTask {
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

        if module.version == manifest.version
            && ctx.known_digest(&module).as_deref() == Some(self.resource.digest.as_str())
        {
            debug!("Module {} already at {}", module.symbolic_name, module.version);
            return Ok(TaskResult::no_action());
        }

        if module.is_active() {
            ctx.container().stop_module(module.id).await?;
            ctx.record_operation();
        }
        let updated = ctx
            .container()
            .update_module(module.id, &self.resource.url, manifest, &self.resource.digest)
            .await?;
        ctx.record_operation();
        ctx.remember_digest(&updated, &self.resource.digest);
        info!(
            "Updated module {} from {} to {}",
            module.symbolic_name, module.version, manifest.version
        );

        Ok(TaskResult::success()
            .with_current_cycle(RelinkTask::new())
            .with_current_cycle(ModuleStartTask::new(module.id)))
    }
}
