use tracing::{debug, info};

use super::{Cycle, TaskResult};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Id of the container's own module, which is never started by the installer.
pub const SYSTEM_MODULE_ID: u64 = 0;

/// Activates an installed module.
///
/// A failed start is retried in the next cycle. The first retry may run
/// right away; every later one waits until at least one runtime event has
/// arrived since the previous attempt.
#[derive(Debug, Clone)]
pub struct ModuleStartTask {
    module_id: u64,
    retry_count: u32,
    event_threshold: u64,
}

impl ModuleStartTask {
    pub fn new(module_id: u64) -> Self {
        Self {
            module_id,
            retry_count: 0,
            event_threshold: 0,
        }
    }

    pub fn module_id(&self) -> u64 {
        self.module_id
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub(crate) fn is_executable(&self, ctx: &ExecutionContext) -> bool {
        ctx.event_count() >= self.event_threshold
    }

    pub(crate) async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        if self.module_id == SYSTEM_MODULE_ID {
            return Ok(TaskResult::no_action());
        }

        let Some(module) = ctx.container().module(self.module_id).await else {
            info!("Cannot start module {}, it is not installed", self.module_id);
            return Ok(TaskResult::no_action());
        };

        if module.is_active() {
            debug!("Module {} already active", module.symbolic_name);
            return Ok(TaskResult::no_action());
        }

        match ctx.container().start_module(module.id).await {
            Ok(()) => {
                ctx.record_operation();
                info!("Started module {} (id {})", module.symbolic_name, module.id);
                Ok(TaskResult::success())
            }
            Err(e) => {
                let events = ctx.event_count();
                self.event_threshold = if self.retry_count == 0 { events } else { events + 1 };
                self.retry_count += 1;
                info!(
                    "Could not start module {} (attempt {}), retry gated on event {}: {}",
                    module.symbolic_name, self.retry_count, self.event_threshold, e
                );
                Ok(TaskResult::retry(Cycle::Next))
            }
        }
    }
}
