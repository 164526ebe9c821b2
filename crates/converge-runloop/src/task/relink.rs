use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

use converge_core::RuntimeEvent;

use super::{Cycle, ModuleStartTask, TaskResult};
use crate::context::ExecutionContext;
use crate::error::TaskError;

/// Relinks module dependencies and waits for the container to finish.
///
/// Relinking may stop modules, so a start task is scheduled for every module
/// active beforehand. The wait is bounded; without an acknowledgement the
/// task still succeeds.
#[derive(Debug, Clone, Default)]
pub struct RelinkTask;

impl RelinkTask {
    pub fn new() -> Self {
        Self
    }

    pub(crate) async fn execute(&mut self, ctx: &ExecutionContext) -> Result<TaskResult, TaskError> {
        let Some(control) = ctx.relink_control() else {
            debug!("Relink control unavailable, deferring relink");
            return Ok(TaskResult::retry(Cycle::Next));
        };

        let mut result = TaskResult::success();
        let active = ctx.container().modules().await;
        for module in active.iter().filter(|m| m.is_active()) {
            result = result.with_current_cycle(ModuleStartTask::new(module.id));
        }

        let mut events = ctx.container().subscribe();
        control.refresh().await?;
        ctx.record_operation();

        let started = Instant::now();
        let timeout = ctx.config().relink_timeout();
        let interval = ctx.config().relink_poll_interval();
        loop {
            if relink_completed(&mut events) {
                debug!("Relink completed after {:?}", started.elapsed());
                break;
            }
            if started.elapsed() >= timeout {
                warn!("Relink not acknowledged within {:?}, continuing", timeout);
                break;
            }
            tokio::time::sleep(interval).await;
        }

        Ok(result)
    }
}

fn relink_completed(events: &mut broadcast::Receiver<RuntimeEvent>) -> bool {
    loop {
        match events.try_recv() {
            Ok(RuntimeEvent::RelinkCompleted) => return true,
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return false,
        }
    }
}
