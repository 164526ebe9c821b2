//! Sorted, de-duplicated task queue.

use std::collections::BTreeMap;

use super::InstallTask;

/// Tasks keyed by sort key; at most one task per key.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: BTreeMap<String, InstallTask>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing a task with the same key.
    pub fn insert(&mut self, task: InstallTask) -> Option<InstallTask> {
        self.tasks.insert(task.sort_key(), task)
    }

    /// Insert unless a task with the same key is queued. Returns true if inserted.
    pub fn insert_if_absent(&mut self, task: InstallTask) -> bool {
        let key = task.sort_key();
        if self.tasks.contains_key(&key) {
            return false;
        }
        self.tasks.insert(key, task);
        true
    }

    /// Remove and return the task with the smallest key.
    pub fn pop_first(&mut self) -> Option<InstallTask> {
        self.tasks.pop_first().map(|(_, task)| task)
    }

    /// Drop every task derived from `entity_id`.
    pub fn remove_entity(&mut self, entity_id: &str) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| task.entity_id() != Some(entity_id));
        before - self.tasks.len()
    }

    /// Move all tasks of `other` in, keeping existing keys.
    pub fn merge(&mut self, other: TaskSet) {
        for (key, task) in other.tasks {
            self.tasks.entry(key).or_insert(task);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstallTask> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
