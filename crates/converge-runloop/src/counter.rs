//! Runtime event counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts container lifecycle notifications.
///
/// Only used to gate retries: a task that failed waits until the count moves
/// past the value it remembered.
#[derive(Debug, Default)]
pub struct EventCounter {
    count: AtomicU64,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event, returning the new count.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record several events at once (e.g. after the listener lagged).
    pub fn add(&self, events: u64) -> u64 {
        self.count.fetch_add(events, Ordering::SeqCst) + events
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}
