//! Installer counters.
//!
//! Read-only from the outside. Test harnesses poll them to synchronize with
//! asynchronous convergence instead of sleeping.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Installer counters.
#[derive(Debug, Default)]
pub struct InstallerCounters {
    /// Tasks that completed with an effect on the container.
    pub tasks_completed: AtomicU64,

    /// Tasks that ended with an error and were dropped.
    pub tasks_failed: AtomicU64,

    /// Tasks requeued for the next cycle, including gated ones.
    pub tasks_deferred: AtomicU64,

    /// Times the worker went from busy to idle.
    pub idle_transitions: AtomicU64,

    /// Registration calls received.
    pub registrations: AtomicU64,

    /// Cycles run.
    pub cycles: AtomicU64,

    /// Container operations issued by tasks.
    pub operations: AtomicU64,

    /// Registrations fully converged by the last idle cycle.
    pub settled_registrations: AtomicU64,

    idle: AtomicBool,
}

impl InstallerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_task_deferred(&self) {
        self.tasks_deferred.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one container operation, returning the new total.
    pub fn record_operation(&self) -> u64 {
        self.operations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The worker has work again.
    pub fn mark_busy(&self) {
        self.idle.store(false, Ordering::SeqCst);
    }

    /// The worker ran out of work. Counts only the busy to idle transition.
    pub fn mark_idle(&self) -> bool {
        let transitioned = self
            .idle
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if transitioned {
            self.idle_transitions.fetch_add(1, Ordering::SeqCst);
        }
        transitioned
    }

    /// Record that all registrations up to `seen` have converged.
    pub fn settle(&self, seen: u64) {
        self.settled_registrations.fetch_max(seen, Ordering::SeqCst);
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            timestamp: Utc::now(),
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
            tasks_deferred: self.tasks_deferred.load(Ordering::SeqCst),
            idle_transitions: self.idle_transitions.load(Ordering::SeqCst),
            registrations: self.registrations.load(Ordering::SeqCst),
            cycles: self.cycles.load(Ordering::SeqCst),
            operations: self.operations.load(Ordering::SeqCst),
            settled_registrations: self.settled_registrations.load(Ordering::SeqCst),
            is_idle: self.is_idle(),
        }
    }
}

/// Counters at a point in time.
#[derive(Debug, Clone)]
pub struct CountersSnapshot {
    pub timestamp: DateTime<Utc>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_deferred: u64,
    pub idle_transitions: u64,
    pub registrations: u64,
    pub cycles: u64,
    pub operations: u64,
    pub settled_registrations: u64,
    pub is_idle: bool,
}

impl CountersSnapshot {
    /// Idle with every registration up to `registrations` converged.
    pub fn is_settled(&self, registrations: u64) -> bool {
        self.is_idle && self.settled_registrations >= registrations
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
