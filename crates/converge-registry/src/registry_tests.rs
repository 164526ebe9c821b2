use super::*;
use crate::snapshot::FileSnapshotStore;
use converge_core::ConfigProperties;
use tempfile::TempDir;

fn module(url: &str, name: &str, version: &str, digest: &str) -> InstallableResource {
    InstallableResource::module(
        url,
        format!("Module-SymbolicName: {}\nModule-Version: {}\n", name, version),
        digest,
    )
}

fn config(url: &str) -> InstallableResource {
    let mut props = ConfigProperties::new();
    props.insert("enabled".to_string(), serde_json::json!(true));
    InstallableResource::config(url, props)
}

#[test]
fn test_add_groups_by_entity() {
    let registry = ResourceRegistry::in_memory();
    registry.add_resource(&module("t:/a-1.0", "a", "1.0", "d1")).unwrap();
    registry.add_resource(&module("t:/a-1.1", "a", "1.1", "d2")).unwrap();
    registry.add_resource(&config("t:/etc/a.cfg")).unwrap();

    let groups = registry.resources(None);
    assert_eq!(groups.len(), 2);
    let group = &groups["module:a"];
    assert_eq!(group.len(), 2);
    assert_eq!(group.desired().unwrap().url, "t:/a-1.1");
    assert!(groups.contains_key("config:a"));
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_add_rejects_invalid_resource() {
    let registry = ResourceRegistry::in_memory();
    let mut r = module("t:/a", "a", "1.0", "d");
    r.digest = None;
    assert!(matches!(
        registry.add_resource(&r),
        Err(RegistryError::InvalidResource(_))
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_unchanged_registration_is_not_persisted_twice() {
    let store = Arc::new(MemorySnapshotStore::new());
    let registry = ResourceRegistry::open(store.clone());
    let first = registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
    let second = registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
    assert_eq!(first.serial_number, second.serial_number);
    assert_eq!(store.save_count(), 1);

    let third = registry.add_resource(&module("t:/a", "a", "1.0", "changed")).unwrap();
    assert!(third.serial_number > first.serial_number);
    assert_eq!(store.save_count(), 2);
}

#[test]
fn test_remove_resource_keeps_bookkeeping() {
    let registry = ResourceRegistry::in_memory();
    registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
    registry.take_dirty_groups();

    assert!(registry.remove_resource("t:/a"));
    assert!(!registry.remove_resource("t:/unknown"));

    let group = registry.group("module:a").unwrap();
    assert!(!group.members()[0].installable);
    assert!(group.desired().is_none());
    assert!(registry.has_dirty());
}

#[test]
fn test_register_resources_marks_missing_as_removal_candidates() {
    let registry = ResourceRegistry::in_memory();
    registry.register_resources(
        &[
            module("t:/a", "a", "1.0", "d"),
            module("t:/b", "b", "1.0", "d"),
        ],
        "t",
    );
    registry.add_resource(&module("other:/c", "c", "1.0", "d")).unwrap();

    let report = registry.register_resources(&[module("t:/a", "a", "1.0", "d")], "t");
    assert_eq!(report.accepted, vec!["t:/a".to_string()]);
    assert_eq!(report.removed, vec!["t:/b".to_string()]);

    assert!(registry.group("module:b").unwrap().desired().is_none());
    assert!(registry.group("module:c").unwrap().desired().is_some());
}

#[test]
fn test_register_resources_rejects_foreign_scheme() {
    let registry = ResourceRegistry::in_memory();
    let report = registry.register_resources(
        &[module("t:/a", "a", "1.0", "d"), module("x:/b", "b", "1.0", "d")],
        "t",
    );
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, "x:/b");
}

#[test]
fn test_resources_filters_by_scheme() {
    let registry = ResourceRegistry::in_memory();
    registry.add_resource(&module("t:/a-1", "a", "1.0", "d")).unwrap();
    registry.add_resource(&module("u:/a-2", "a", "2.0", "d")).unwrap();

    let t_only = registry.resources(Some("t"));
    assert_eq!(t_only["module:a"].len(), 1);
    assert!(registry.resources(Some("v")).is_empty());
}

#[test]
fn test_dirty_tracking() {
    let registry = ResourceRegistry::in_memory();
    registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
    registry.add_resource(&module("t:/b", "b", "1.0", "d")).unwrap();

    let dirty = registry.take_dirty_groups();
    assert_eq!(dirty.len(), 2);
    assert!(!registry.has_dirty());

    registry.mark_dirty("module:a");
    registry.mark_dirty("module:unknown");
    assert_eq!(registry.take_dirty_groups().len(), 1);

    registry.mark_all_dirty();
    assert_eq!(registry.take_dirty_groups().len(), 2);
}

#[test]
fn test_collect_garbage() {
    let registry = ResourceRegistry::in_memory();
    registry.add_resource(&module("t:/a-1.0", "a", "1.0", "d")).unwrap();
    registry.add_resource(&module("t:/a-1.1", "a", "1.1", "d")).unwrap();
    registry.remove_resource("t:/a-1.1");

    // Pending changes block collection.
    assert_eq!(registry.collect_garbage("module:a"), 0);

    registry.take_dirty_groups();
    assert_eq!(registry.collect_garbage("module:a"), 1);
    assert_eq!(registry.group("module:a").unwrap().len(), 1);

    registry.remove_resource("t:/a-1.0");
    registry.take_dirty_groups();
    assert_eq!(registry.collect_garbage("module:a"), 1);
    assert!(registry.group("module:a").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_moved_url_retires_old_member() {
    let registry = ResourceRegistry::in_memory();
    registry.add_resource(&module("t:/x", "a", "1.0", "d1")).unwrap();
    registry.take_dirty_groups();
    registry.add_resource(&module("t:/x", "b", "1.0", "d2")).unwrap();

    let old = registry.group("module:a").unwrap();
    assert_eq!(old.len(), 1);
    assert!(old.desired().is_none());
    assert_eq!(registry.group("module:b").unwrap().desired().unwrap().url, "t:/x");
    assert_eq!(registry.take_dirty_groups().len(), 2);
    assert_eq!(registry.len(), 1);

    // Collecting the old group keeps the URL registered under its new entity.
    assert_eq!(registry.collect_garbage("module:a"), 1);
    assert!(registry.group("module:a").is_none());
    assert_eq!(registry.len(), 1);
    assert!(registry.remove_resource("t:/x"));
    assert!(registry.group("module:b").unwrap().desired().is_none());
}

#[test]
fn test_moved_url_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    {
        let registry = ResourceRegistry::open(Arc::new(FileSnapshotStore::new(&path)));
        registry.add_resource(&module("t:/x", "a", "1.0", "d1")).unwrap();
        registry.add_resource(&module("t:/x", "b", "1.0", "d2")).unwrap();
    }

    let registry = ResourceRegistry::open(Arc::new(FileSnapshotStore::new(&path)));
    assert_eq!(registry.len(), 1);
    assert!(registry.group("module:a").unwrap().desired().is_none());
    registry.take_dirty_groups();
    registry.collect_garbage("module:a");

    // The URL still resolves to the newer registration.
    assert!(registry.remove_resource("t:/x"));
    assert!(registry.group("module:b").unwrap().desired().is_none());
}

#[test]
fn test_persistence_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    {
        let registry = ResourceRegistry::open(Arc::new(FileSnapshotStore::new(&path)));
        registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
        registry.add_resource(&config("t:/etc/svc.cfg")).unwrap();
        registry.remove_resource("t:/etc/svc.cfg");
    }

    let registry = ResourceRegistry::open(Arc::new(FileSnapshotStore::new(&path)));
    assert_eq!(registry.len(), 2);
    assert!(registry.group("config:svc").unwrap().desired().is_none());
    assert_eq!(registry.take_dirty_groups().len(), 2);

    let next = registry.add_resource(&module("t:/b", "b", "1.0", "d")).unwrap();
    assert!(next.serial_number >= 2);
}

#[test]
fn test_corrupt_snapshot_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, "garbage").unwrap();

    let registry = ResourceRegistry::open(Arc::new(FileSnapshotStore::new(&path)));
    assert!(registry.is_empty());

    registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
    let reopened = ResourceRegistry::open(Arc::new(FileSnapshotStore::new(&path)));
    assert_eq!(reopened.len(), 1);
}

#[test]
fn test_persist_failure_keeps_memory_state() {
    let store = Arc::new(MemorySnapshotStore::new());
    store.set_fail_saves(true);
    let registry = ResourceRegistry::open(store.clone());

    registry.add_resource(&module("t:/a", "a", "1.0", "d")).unwrap();
    assert_eq!(registry.len(), 1);
    assert!(store.snapshot().is_none());
}
