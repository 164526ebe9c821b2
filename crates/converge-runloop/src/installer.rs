//! The installer: lifecycle, intake and the worker loop.

use std::sync::Arc;
use std::time::Duration;

use converge_core::{Container, InstallableResource, RegisteredResource, RuntimeEvent};
use converge_registry::{RegistrationReport, ResourceRegistry};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::InstallerConfig;
use crate::context::ExecutionContext;
use crate::counter::EventCounter;
use crate::cycle::CycleDriver;
use crate::error::{InstallerError, InstallerResult};
use crate::metrics::InstallerCounters;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct WorkerHandles {
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    listener: JoinHandle<()>,
}

/// Drives a container towards the registered resources.
///
/// Intake methods only update the registry and wake the worker; all tasks run
/// on the single worker spawned by [`Installer::start`].
pub struct Installer {
    config: InstallerConfig,
    registry: Arc<ResourceRegistry>,
    container: Arc<dyn Container>,
    events: Arc<EventCounter>,
    counters: Arc<InstallerCounters>,
    wakeup: Arc<Notify>,
    worker: Mutex<Option<WorkerHandles>>,
}

impl Installer {
    pub fn new(
        container: Arc<dyn Container>,
        registry: Arc<ResourceRegistry>,
        config: InstallerConfig,
    ) -> Self {
        Self {
            config,
            registry,
            container,
            events: Arc::new(EventCounter::new()),
            counters: Arc::new(InstallerCounters::new()),
            wakeup: Arc::new(Notify::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventCounter> {
        &self.events
    }

    pub fn counters(&self) -> &Arc<InstallerCounters> {
        &self.counters
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Subscribe to container events and spawn the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> InstallerResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(InstallerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let listener = tokio::spawn(forward_events(
            self.container.subscribe(),
            self.events.clone(),
            self.wakeup.clone(),
            cancel.clone(),
        ));

        self.registry.mark_all_dirty();
        self.counters.mark_busy();

        let ctx = ExecutionContext::new(
            self.container.clone(),
            self.events.clone(),
            self.counters.clone(),
            self.config.clone(),
        );
        let driver = CycleDriver::new(self.registry.clone(), ctx);
        let handle = tokio::spawn(run_worker(
            driver,
            self.registry.clone(),
            self.wakeup.clone(),
            cancel.clone(),
            self.config.clone(),
        ));

        *worker = Some(WorkerHandles {
            cancel,
            worker: handle,
            listener,
        });
        info!("Installer started with {} resources", self.registry.len());
        Ok(())
    }

    /// Stop after the task in progress and wait for the background tasks.
    pub async fn stop(&self) -> InstallerResult<()> {
        let handles = self.worker.lock().take().ok_or(InstallerError::NotRunning)?;
        handles.cancel.cancel();
        if let Err(e) = handles.worker.await {
            warn!("Installer worker ended abnormally: {}", e);
        }
        if let Err(e) = handles.listener.await {
            warn!("Event listener ended abnormally: {}", e);
        }
        info!("Installer stopped");
        Ok(())
    }

    /// Declare the complete desired set for `scheme`.
    pub fn register_resources(
        &self,
        resources: &[InstallableResource],
        scheme: &str,
    ) -> RegistrationReport {
        let report = self.registry.register_resources(resources, scheme);
        self.notify_registration();
        report
    }

    pub fn add_resource(
        &self,
        resource: &InstallableResource,
    ) -> InstallerResult<RegisteredResource> {
        let registered = self.registry.add_resource(resource)?;
        self.notify_registration();
        Ok(registered)
    }

    /// Withdraw a resource. Returns false if the URL is unknown.
    pub fn remove_resource(&self, url: &str) -> bool {
        let known = self.registry.remove_resource(url);
        self.notify_registration();
        known
    }

    fn notify_registration(&self) {
        self.counters.record_registration();
        self.counters.mark_busy();
        self.wakeup.notify_one();
    }

    /// Wait until every registration made so far has converged.
    ///
    /// Returns false on timeout, e.g. while a module keeps failing to start.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let target = self.counters.snapshot().registrations;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.counters.snapshot().is_settled(target) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }
}

async fn run_worker(
    mut driver: CycleDriver,
    registry: Arc<ResourceRegistry>,
    wakeup: Arc<Notify>,
    cancel: CancellationToken,
    config: InstallerConfig,
) {
    let counters = driver.context().counters().clone();
    debug!("Installer worker running");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let seen = counters.snapshot().registrations;
        let report = driver.run_cycle(&cancel).await;
        counters.record_cycle();
        if report.interrupted {
            break;
        }

        if driver.has_work() {
            if report.made_progress() {
                continue;
            }
        } else {
            if counters.mark_idle() {
                debug!("Installer idle");
            }
            counters.settle(seen);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = wakeup.notified() => trace!("Worker woken"),
            _ = tokio::time::sleep(config.idle_timeout()) => {
                if config.resync_on_idle {
                    trace!("Idle timeout, resyncing all groups");
                    registry.mark_all_dirty();
                }
            }
        }
    }

    driver.clear_pending();
    debug!("Installer worker exited");
}

async fn forward_events(
    mut receiver: broadcast::Receiver<RuntimeEvent>,
    events: Arc<EventCounter>,
    wakeup: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(event) => {
                    let count = events.increment();
                    trace!("Runtime event #{}: {}", count, event);
                    wakeup.notify_one();
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event listener lagged, {} events missed", missed);
                    events.add(missed);
                    wakeup.notify_one();
                }
                Err(RecvError::Closed) => {
                    debug!("Container event stream closed");
                    break;
                }
            }
        }
    }
}
