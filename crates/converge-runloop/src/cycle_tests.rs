use super::*;
use async_trait::async_trait;
use converge_core::{
    ConfigAdmin, ConfigProperties, Container, ContainerError, InstallableResource,
    MemoryContainer, ModuleInfo, ModuleManifest, ModuleState, RelinkControl, RuntimeEvent,
};
use serde_json::json;
use tokio::sync::broadcast;

fn module(name: &str, version: &str) -> InstallableResource {
    InstallableResource::module(
        format!("test:/{}-{}.jar", name, version),
        format!("Module-SymbolicName: {}\nModule-Version: {}\n", name, version),
        format!("{}-{}", name, version),
    )
}

fn config(pid: &str) -> InstallableResource {
    let mut props = ConfigProperties::new();
    props.insert("port".to_string(), json!(8080));
    InstallableResource::config(format!("test:/etc/{}.cfg", pid), props)
}

struct Harness {
    container: MemoryContainer,
    registry: Arc<ResourceRegistry>,
    driver: CycleDriver,
    cancel: CancellationToken,
}

/// A container that never reports module digests.
struct DigestlessContainer(MemoryContainer);

fn without_digest(mut module: ModuleInfo) -> ModuleInfo {
    module.digest = None;
    module
}

#[async_trait]
impl Container for DigestlessContainer {
    async fn modules(&self) -> Vec<ModuleInfo> {
        self.0.modules().await.into_iter().map(without_digest).collect()
    }

    async fn module(&self, id: u64) -> Option<ModuleInfo> {
        self.0.module(id).await.map(without_digest)
    }

    async fn install_module(
        &self,
        location: &str,
        manifest: &ModuleManifest,
        digest: &str,
    ) -> Result<ModuleInfo, ContainerError> {
        self.0
            .install_module(location, manifest, digest)
            .await
            .map(without_digest)
    }

    async fn update_module(
        &self,
        id: u64,
        location: &str,
        manifest: &ModuleManifest,
        digest: &str,
    ) -> Result<ModuleInfo, ContainerError> {
        self.0
            .update_module(id, location, manifest, digest)
            .await
            .map(without_digest)
    }

    async fn uninstall_module(&self, id: u64) -> Result<(), ContainerError> {
        self.0.uninstall_module(id).await
    }

    async fn start_module(&self, id: u64) -> Result<(), ContainerError> {
        self.0.start_module(id).await
    }

    async fn stop_module(&self, id: u64) -> Result<(), ContainerError> {
        self.0.stop_module(id).await
    }

    fn config_admin(&self) -> Option<Arc<dyn ConfigAdmin>> {
        self.0.config_admin()
    }

    fn relink_control(&self) -> Option<Arc<dyn RelinkControl>> {
        self.0.relink_control()
    }

    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.0.subscribe()
    }
}

impl Harness {
    fn new() -> Self {
        let container = MemoryContainer::new();
        Self::with_view(container.clone(), Arc::new(container))
    }

    /// Drive `container` through `view`.
    fn with_view(container: MemoryContainer, view: Arc<dyn Container>) -> Self {
        let registry = Arc::new(ResourceRegistry::in_memory());
        let ctx = ExecutionContext::with_container(view);
        let driver = CycleDriver::new(registry.clone(), ctx);
        Self {
            container,
            registry,
            driver,
            cancel: CancellationToken::new(),
        }
    }

    async fn cycle(&mut self) -> CycleReport {
        self.driver.run_cycle(&self.cancel).await
    }

    /// Run cycles until nothing is left to do.
    async fn converge(&mut self) -> Vec<CycleReport> {
        let mut reports = Vec::new();
        for _ in 0..10 {
            reports.push(self.cycle().await);
            if !self.driver.has_work() {
                return reports;
            }
        }
        panic!("no convergence after 10 cycles: {:?}", reports);
    }

    fn version_of(&self, name: &str) -> Option<String> {
        self.container
            .module_by_name(name)
            .map(|m| m.version.to_string())
    }
}

#[tokio::test]
async fn test_install_scenario() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();

    let reports = h.converge().await;
    assert_eq!(reports[0].created, 1);
    assert_eq!(reports[0].succeeded, 2);
    assert_eq!(h.version_of("a").as_deref(), Some("1.0.0"));
    assert!(h.container.module_by_name("a").unwrap().is_active());
    assert_eq!(reports.last().unwrap().created, 0);
}

#[tokio::test]
async fn test_reregistering_converged_resource_creates_nothing() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.converge().await;

    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.registry.mark_all_dirty();
    let report = h.cycle().await;
    assert_eq!(report.groups, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.executed(), 0);
}

#[tokio::test]
async fn test_update_scenario() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.converge().await;

    h.registry.add_resource(&module("a", "1.1")).unwrap();
    let reports = h.converge().await;
    assert_eq!(reports[0].created, 1);
    assert_eq!(h.version_of("a").as_deref(), Some("1.1.0"));
    assert!(h.container.module_by_name("a").unwrap().is_active());

    // The superseded candidate stays until it is withdrawn.
    assert_eq!(h.registry.group("module:a").unwrap().len(), 2);
}

#[tokio::test]
async fn test_remove_scenario() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.converge().await;

    h.registry.remove_resource("test:/a-1.0.jar");
    let reports = h.converge().await;
    assert_eq!(reports[0].created, 1);
    assert!(h.version_of("a").is_none());
    assert!(h.registry.group("module:a").is_none());
}

#[tokio::test]
async fn test_downgrade_law() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.registry.add_resource(&module("a", "1.1")).unwrap();
    h.converge().await;
    assert_eq!(h.version_of("a").as_deref(), Some("1.1.0"));

    h.registry.remove_resource("test:/a-1.1.jar");
    let report = h.cycle().await;
    assert_eq!(report.created, 1);
    h.converge().await;
    assert_eq!(h.version_of("a").as_deref(), Some("1.0.0"));
    assert_eq!(h.registry.group("module:a").unwrap().len(), 1);
}

#[tokio::test]
async fn test_url_moved_to_another_entity() {
    let mut h = Harness::new();
    let resource = |name: &str| {
        InstallableResource::module(
            "test:/bundle.jar",
            format!("Module-SymbolicName: {}\nModule-Version: 1.0\n", name),
            name.to_string(),
        )
    };
    h.registry.add_resource(&resource("a")).unwrap();
    h.converge().await;
    h.container.clear_journal();

    h.registry.add_resource(&resource("b")).unwrap();
    let reports = h.converge().await;
    assert_eq!(reports[0].created, 2);
    assert_eq!(reports[0].failed, 0);
    assert_eq!(
        h.container.journal(),
        vec!["stop a", "uninstall a", "install b 1.0.0", "relink", "start b"]
    );
    assert!(h.version_of("a").is_none());
    assert!(h.container.module_by_name("b").unwrap().is_active());

    // The retired member is collected; the URL stays with the new entity.
    assert!(h.registry.group("module:a").is_none());
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.registry.group("module:b").unwrap().len(), 1);
}

#[tokio::test]
async fn test_snapshot_settles_without_container_digests() {
    let container = MemoryContainer::new();
    let view = Arc::new(DigestlessContainer(container.clone()));
    let mut h = Harness::with_view(container, view);
    h.registry.add_resource(&module("s", "1.0.0.SNAPSHOT")).unwrap();
    h.converge().await;

    // Repeated resyncs of a converged snapshot create nothing.
    for _ in 0..4 {
        h.registry.mark_all_dirty();
        let report = h.cycle().await;
        assert_eq!(report.created, 0);
        assert!(!h.driver.has_work());
    }

    // New content for the same snapshot is still picked up.
    let rebuilt = InstallableResource::module(
        "test:/s-1.0.0.SNAPSHOT.jar",
        "Module-SymbolicName: s\nModule-Version: 1.0.0.SNAPSHOT\n",
        "rebuilt",
    );
    h.registry.add_resource(&rebuilt).unwrap();
    let reports = h.converge().await;
    assert_eq!(reports[0].created, 1);
    assert_eq!(
        h.container.module_by_name("s").unwrap().digest.as_deref(),
        Some("rebuilt")
    );
    assert_eq!(reports.last().unwrap().created, 0);
}

#[tokio::test]
async fn test_tasks_run_in_phase_order() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("old", "1.0")).unwrap();
    h.converge().await;
    h.container.clear_journal();

    h.registry.remove_resource("test:/old-1.0.jar");
    h.registry.add_resource(&module("new", "1.0")).unwrap();
    h.registry.add_resource(&config("svc")).unwrap();
    h.cycle().await;

    assert_eq!(
        h.container.journal(),
        vec![
            "config create svc",
            "stop old",
            "uninstall old",
            "install new 1.0.0",
            "relink",
            "start new",
        ]
    );
}

#[tokio::test]
async fn test_failed_start_waits_for_events() {
    let mut h = Harness::new();
    h.container.fail_next_starts("a", 2);
    h.registry.add_resource(&module("a", "1.0")).unwrap();

    // Install succeeds, first start fails.
    let first = h.cycle().await;
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.deferred, 1);

    // Immediate retry allowed, fails again.
    let second = h.cycle().await;
    assert_eq!(second.deferred, 1);

    // Gated until the event count moves.
    let third = h.cycle().await;
    assert_eq!(third.skipped, 1);
    assert_eq!(third.executed(), 0);
    assert!(h.driver.has_work());

    h.driver.context().events().increment();
    let fourth = h.cycle().await;
    assert_eq!(fourth.succeeded, 1);
    assert_eq!(
        h.container.module_by_name("a").unwrap().state,
        ModuleState::Active
    );
}

#[tokio::test]
async fn test_config_removal_defers_until_service_returns() {
    let mut h = Harness::new();
    h.registry.add_resource(&config("svc")).unwrap();
    h.converge().await;
    assert!(h.container.config("svc").is_some());

    h.container.set_config_admin_available(false);
    h.registry.remove_resource("test:/etc/svc.cfg");
    for _ in 0..3 {
        let report = h.cycle().await;
        assert_eq!(report.deferred, 1);
        assert!(h.driver.has_work());
    }

    h.container.set_config_admin_available(true);
    h.converge().await;
    assert!(h.container.config("svc").is_none());
    assert!(h.registry.group("config:svc").is_none());
}

#[tokio::test]
async fn test_logic_error_is_dropped() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.converge().await;

    // Someone else uninstalls the module between diff and execution.
    h.registry.remove_resource("test:/a-1.0.jar");
    let mut report = CycleReport::default();
    let mut tasks = h.driver.compute_tasks(&mut report).await;
    let id = h.container.module_by_name("a").unwrap().id;
    h.container.uninstall_module(id).await.unwrap();

    let mut task = tasks.pop_first().unwrap();
    assert!(task.execute(h.driver.context()).await.is_err());

    // Next diff sees nothing installed and collects the withdrawn candidate.
    h.converge().await;
    assert!(h.registry.group("module:a").is_none());
}

#[tokio::test]
async fn test_cancelled_cycle_is_interrupted() {
    let mut h = Harness::new();
    h.registry.add_resource(&module("a", "1.0")).unwrap();
    h.cancel.cancel();
    let report = h.cycle().await;
    assert!(report.interrupted);
    assert_eq!(report.executed(), 0);
    assert!(h.version_of("a").is_none());
}
