use super::*;
use crate::version::Version;

fn manifest(name: &str, version: &str) -> ModuleManifest {
    ModuleManifest::new(name, Version::parse(version).unwrap())
}

#[tokio::test]
async fn test_module_lifecycle_publishes_events() {
    let container = MemoryContainer::new();
    let mut events = container.subscribe();

    let info = container
        .install_module("test:/a.jar", &manifest("a", "1.0"), "d1")
        .await
        .unwrap();
    assert_eq!(info.id, 1);
    assert_eq!(info.state, ModuleState::Installed);

    container.start_module(info.id).await.unwrap();
    assert!(container.module(info.id).await.unwrap().is_active());

    container.stop_module(info.id).await.unwrap();
    container.uninstall_module(info.id).await.unwrap();
    assert!(container.modules().await.is_empty());

    let mut changes = Vec::new();
    while let Ok(RuntimeEvent::Module { change, .. }) = events.try_recv() {
        changes.push(change);
    }
    assert_eq!(
        changes,
        vec![
            ModuleChange::Installed,
            ModuleChange::Started,
            ModuleChange::Stopped,
            ModuleChange::Uninstalled
        ]
    );
}

#[tokio::test]
async fn test_duplicate_location_is_rejected() {
    let container = MemoryContainer::new();
    container
        .install_module("test:/a.jar", &manifest("a", "1.0"), "d1")
        .await
        .unwrap();
    let err = container
        .install_module("test:/a.jar", &manifest("a", "1.0"), "d1")
        .await
        .unwrap_err();
    assert!(matches!(err, ContainerError::OperationFailed { .. }));
}

#[tokio::test]
async fn test_start_failures_are_consumed() {
    let container = MemoryContainer::new();
    let info = container
        .install_module("test:/b.jar", &manifest("b", "1.0"), "d")
        .await
        .unwrap();
    container.fail_next_starts("b", 2);

    assert!(container.start_module(info.id).await.is_err());
    assert!(container.start_module(info.id).await.is_err());
    assert!(container.start_module(info.id).await.is_ok());
}

#[tokio::test]
async fn test_config_admin_availability() {
    let container = MemoryContainer::new();
    let pid = ConfigPid::new("org.example.Service");
    let admin = container.config_admin().unwrap();

    admin.create(&pid, ConfigProperties::new()).await.unwrap();
    assert!(admin.create(&pid, ConfigProperties::new()).await.is_err());
    assert!(admin.get(&pid).await.unwrap().is_some());

    container.set_config_admin_available(false);
    assert!(container.config_admin().is_none());

    admin.delete(&pid).await.unwrap();
    assert!(matches!(
        admin.delete(&pid).await,
        Err(ContainerError::ConfigNotFound(_))
    ));
}

#[tokio::test]
async fn test_relink_acknowledgement_and_deactivation() {
    let container = MemoryContainer::new();
    let info = container
        .install_module("test:/c.jar", &manifest("c", "1.0"), "d")
        .await
        .unwrap();
    container.start_module(info.id).await.unwrap();
    container.set_relink_deactivates(true);

    let mut events = container.subscribe();
    container.relink_control().unwrap().refresh().await.unwrap();

    assert_eq!(
        container.module(info.id).await.unwrap().state,
        ModuleState::Resolved
    );
    let mut saw_completion = false;
    while let Ok(event) = events.try_recv() {
        saw_completion |= event == RuntimeEvent::RelinkCompleted;
    }
    assert!(saw_completion);

    container.set_relink_acknowledged(false);
    let mut events = container.subscribe();
    container.relink_control().unwrap().refresh().await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_state_round_trip() {
    let container = MemoryContainer::new();
    container
        .install_module("test:/d.jar", &manifest("d", "2.1"), "digest")
        .await
        .unwrap();
    let admin = container.config_admin().unwrap();
    admin
        .create(&ConfigPid::factory("pool", "main"), ConfigProperties::new())
        .await
        .unwrap();

    let restored = MemoryContainer::from_state(container.to_state());
    assert_eq!(restored.to_state(), container.to_state());
    assert!(restored.config("pool-main").is_some());

    let next = restored
        .install_module("test:/e.jar", &manifest("e", "1.0"), "x")
        .await
        .unwrap();
    assert_eq!(next.id, 2);
}
