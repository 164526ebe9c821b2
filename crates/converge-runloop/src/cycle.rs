//! Cycle execution.
//!
//! A cycle diffs the groups with pending changes, merges in the tasks carried
//! over from the previous cycle and runs everything in sort-key order.

use std::sync::Arc;

use converge_core::ResourceKind;
use converge_registry::ResourceRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::context::ExecutionContext;
use crate::creator::{ConfigTaskCreator, ModuleTaskCreator, RuntimeSnapshot, TaskCreator};
use crate::task::{Cycle, TaskOutcome, TaskSet};

/// What happened during one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Groups diffed.
    pub groups: usize,
    /// Tasks taken from creators this cycle.
    pub created: usize,
    pub succeeded: usize,
    pub no_action: usize,
    /// Requeued by the task itself.
    pub deferred: usize,
    /// Not executable yet, moved to the next cycle.
    pub skipped: usize,
    pub failed: usize,
    /// Stopped before the queue was drained.
    pub interrupted: bool,
}

impl CycleReport {
    /// Tasks that ran.
    pub fn executed(&self) -> usize {
        self.succeeded + self.no_action + self.deferred + self.failed
    }

    /// Whether the container changed.
    pub fn made_progress(&self) -> bool {
        self.succeeded > 0
    }
}

/// Runs convergence cycles against one registry and container.
pub struct CycleDriver {
    registry: Arc<ResourceRegistry>,
    creators: Vec<Arc<dyn TaskCreator>>,
    ctx: ExecutionContext,
    next_cycle: TaskSet,
}

impl CycleDriver {
    /// Driver with the module and config creators.
    pub fn new(registry: Arc<ResourceRegistry>, ctx: ExecutionContext) -> Self {
        Self {
            registry,
            creators: vec![
                Arc::new(ModuleTaskCreator::new()),
                Arc::new(ConfigTaskCreator::new()),
            ],
            ctx,
            next_cycle: TaskSet::new(),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Tasks waiting for the next cycle.
    pub fn pending(&self) -> &TaskSet {
        &self.next_cycle
    }

    /// Whether another cycle has anything to do.
    pub fn has_work(&self) -> bool {
        !self.next_cycle.is_empty() || self.registry.has_dirty()
    }

    /// Forget carried-over tasks.
    pub fn clear_pending(&mut self) {
        self.next_cycle = TaskSet::new();
    }

    fn creator_for(&self, kind: ResourceKind) -> Option<&Arc<dyn TaskCreator>> {
        self.creators.iter().find(|c| c.kind() == kind)
    }

    /// Diff dirty groups into a task set, merged with carried-over tasks.
    pub async fn compute_tasks(&mut self, report: &mut CycleReport) -> TaskSet {
        let groups = self.registry.take_dirty_groups();
        let mut tasks = std::mem::take(&mut self.next_cycle);
        if groups.is_empty() {
            return tasks;
        }

        let runtime = RuntimeSnapshot::capture(&self.ctx).await;
        report.groups = groups.len();

        for group in &groups {
            let Some(creator) = group.kind().and_then(|kind| self.creator_for(kind)) else {
                continue;
            };
            // Fresh diffs supersede whatever an earlier cycle planned for the entity.
            tasks.remove_entity(group.entity_id());
            let created = creator.create_tasks(group, &runtime);
            if created.is_empty() {
                self.registry.collect_garbage(group.entity_id());
                continue;
            }
            self.registry.mark_dirty(group.entity_id());
            report.created += created.len();
            for task in created {
                trace!("Created {} for {}", task, group.entity_id());
                tasks.insert(task);
            }
        }
        tasks
    }

    /// Run one cycle. Stops between tasks once `cancel` fires.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();
        let mut current = self.compute_tasks(&mut report).await;
        if current.is_empty() {
            return report;
        }

        self.ctx.counters().mark_busy();
        debug!("Cycle with {} tasks", current.len());

        while let Some(mut task) = current.pop_first() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            if !task.is_executable(&self.ctx) {
                trace!("{} not executable yet", task);
                report.skipped += 1;
                self.ctx.counters().record_task_deferred();
                self.next_cycle.insert_if_absent(task);
                continue;
            }

            debug!("Executing {}", task);
            match task.execute(&self.ctx).await {
                Ok(result) => {
                    match result.outcome {
                        TaskOutcome::Success => {
                            report.succeeded += 1;
                            self.ctx.counters().record_task_completed();
                        }
                        TaskOutcome::NoAction => report.no_action += 1,
                        TaskOutcome::Retry(cycle) => {
                            report.deferred += 1;
                            self.ctx.counters().record_task_deferred();
                            match cycle {
                                Cycle::Current => {
                                    current.insert_if_absent(task);
                                }
                                Cycle::Next => {
                                    self.next_cycle.insert_if_absent(task);
                                }
                            }
                        }
                    }
                    for (cycle, follow_up) in result.follow_ups {
                        let queue = match cycle {
                            Cycle::Current => &mut current,
                            Cycle::Next => &mut self.next_cycle,
                        };
                        queue.insert_if_absent(follow_up);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    self.ctx.counters().record_task_failed();
                    error!("Task {} failed: {}", task, e);
                }
            }
        }

        info!(
            "Cycle done: {} succeeded, {} unchanged, {} deferred, {} skipped, {} failed",
            report.succeeded, report.no_action, report.deferred, report.skipped, report.failed
        );
        report
    }
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;
