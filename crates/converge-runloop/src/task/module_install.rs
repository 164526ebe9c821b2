use converge_core::RegisteredResource;
use tracing::{debug, info};

use super::{ModuleStartTask, TaskResult, find_module, module_manifest};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Installs a module that is not present yet, then starts it.
#[derive(Debug, Clone)]
pub struct ModuleInstallTask {
    pub(crate) resource: RegisteredResource,
}

impl ModuleInstallTask {
    pub fn new(resource: RegisteredResource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &RegisteredResource {
        &self.resource
    }

    pub(crate) async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        let manifest = module_manifest(&self.resource)?;

        if let Some(existing) = find_module(ctx, &manifest.symbolic_name).await {
            if existing.version != manifest.version {
                debug!(
                    "Module {} appeared at {} before install, leaving it to the next diff",
                    existing.symbolic_name, existing.version
                );
            }
            return Ok(TaskResult::no_action());
        }

        let module = ctx
            .container()
            .install_module(&self.resource.url, manifest, &self.resource.digest)
            .await?;
        ctx.record_operation();
        ctx.remember_digest(&module, &self.resource.digest);
        info!(
            "Installed module {} {} (id {})",
            module.symbolic_name, module.version, module.id
        );

        Ok(TaskResult::success().with_current_cycle(ModuleStartTask::new(module.id)))
    }
}
