//! Execution context handed to every task.

use std::collections::HashMap;
use std::sync::Arc;

use converge_core::{ConfigAdmin, Container, ModuleInfo, RelinkControl, Version};
use parking_lot::Mutex;

use crate::config::InstallerConfig;
use crate::counter::EventCounter;
use crate::metrics::InstallerCounters;

/// Access to the container and shared installer state.
///
/// Holds no logic; tasks are unit-testable by building one around a
/// [`converge_core::MemoryContainer`].
#[derive(Clone)]
pub struct ExecutionContext {
    container: Arc<dyn Container>,
    events: Arc<EventCounter>,
    counters: Arc<InstallerCounters>,
    config: InstallerConfig,
    /// Content digest applied per module id, for containers that do not report one.
    digests: Arc<Mutex<HashMap<u64, (Version, String)>>>,
}

impl ExecutionContext {
    pub fn new(
        container: Arc<dyn Container>,
        events: Arc<EventCounter>,
        counters: Arc<InstallerCounters>,
        config: InstallerConfig,
    ) -> Self {
        Self {
            container,
            events,
            counters,
            config,
            digests: Arc::default(),
        }
    }

    /// Context with fresh counters and default configuration.
    pub fn with_container(container: Arc<dyn Container>) -> Self {
        Self::new(
            container,
            Arc::new(EventCounter::new()),
            Arc::new(InstallerCounters::new()),
            InstallerConfig::default(),
        )
    }

    pub fn container(&self) -> &dyn Container {
        self.container.as_ref()
    }

    /// Configuration service, absent while the container has none.
    pub fn config_admin(&self) -> Option<Arc<dyn ConfigAdmin>> {
        self.container.config_admin()
    }

    /// Relink control, absent while the container has none.
    pub fn relink_control(&self) -> Option<Arc<dyn RelinkControl>> {
        self.container.relink_control()
    }

    pub fn events(&self) -> &Arc<EventCounter> {
        &self.events
    }

    /// Current runtime event count.
    pub fn event_count(&self) -> u64 {
        self.events.get()
    }

    pub fn counters(&self) -> &Arc<InstallerCounters> {
        &self.counters
    }

    /// Count one container operation.
    pub fn record_operation(&self) -> u64 {
        self.counters.record_operation()
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Remember the digest this installer applied to `module`.
    pub fn remember_digest(&self, module: &ModuleInfo, digest: &str) {
        self.digests
            .lock()
            .insert(module.id, (module.version.clone(), digest.to_string()));
    }

    pub fn forget_digest(&self, module_id: u64) {
        self.digests.lock().remove(&module_id);
    }

    /// Digest of `module`: the container's, else the one applied at the same version.
    pub fn known_digest(&self, module: &ModuleInfo) -> Option<String> {
        if module.digest.is_some() {
            return module.digest.clone();
        }
        let digests = self.digests.lock();
        let (version, digest) = digests.get(&module.id)?;
        (*version == module.version).then(|| digest.clone())
    }
}
