//! Registry snapshot storage.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use converge_core::RegisteredResource;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistryError;

/// Current on-disk format.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Serialized registry contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub next_serial: u64,
    pub groups: BTreeMap<String, Vec<RegisteredResource>>,
}

impl RegistrySnapshot {
    pub fn new(next_serial: u64, groups: BTreeMap<String, Vec<RegisteredResource>>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            next_serial,
            groups,
        }
    }
}

#[derive(Deserialize)]
struct FormatProbe {
    format_version: u32,
}

/// Where registry snapshots live.
///
/// Calls happen while the registry lock is held, so implementations should
/// return promptly.
pub trait SnapshotStore: Send + Sync {
    /// Load the last snapshot, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<RegistrySnapshot>, RegistryError>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError>;
}

/// Snapshot kept in a single JSON file.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>, RegistryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let probe: FormatProbe = serde_json::from_str(&content)?;
        if probe.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RegistryError::UnsupportedFormat(probe.format_version));
        }
        let snapshot: RegistrySnapshot = serde_json::from_str(&content)?;
        debug!(
            "Loaded registry snapshot from {:?} ({} groups)",
            self.path,
            snapshot.groups.len()
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        let temp = self.temp_path();
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        debug!("Saved registry snapshot to {:?}", self.path);
        Ok(())
    }
}

/// In-memory snapshot store for testing.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<RegistrySnapshot>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        let store = Self::default();
        *store.snapshot.lock() = Some(snapshot);
        store
    }

    /// Make every following save fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Option<RegistrySnapshot> {
        self.snapshot.lock().clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>, RegistryError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RegistryError::Io(std::io::Error::other("save disabled")));
        }
        *self.snapshot.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
