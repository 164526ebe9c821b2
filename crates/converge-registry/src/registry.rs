//! The resource registry.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use converge_core::{InstallableResource, RegisteredResource};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::group::ResourceGroup;
use crate::snapshot::{MemorySnapshotStore, RegistrySnapshot, SnapshotStore};

/// Outcome of a full-set registration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationReport {
    /// URLs registered or confirmed.
    pub accepted: Vec<String>,
    /// URLs refused, with the reason.
    pub rejected: Vec<(String, String)>,
    /// Previously registered URLs that became removal candidates.
    pub removed: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    groups: BTreeMap<String, ResourceGroup>,
    urls: HashMap<String, String>,
    next_serial: u64,
    dirty: BTreeSet<String>,
}

impl RegistryState {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut state = Self::default();
        let mut max_serial = 0;
        // A moved URL appears in several groups; the newest registration owns it.
        let mut owners: HashMap<String, (u64, String)> = HashMap::new();
        for (entity_id, members) in snapshot.groups {
            if members.is_empty() {
                continue;
            }
            for member in &members {
                max_serial = max_serial.max(member.serial_number);
                let owner = owners
                    .entry(member.url.clone())
                    .or_insert((member.serial_number, entity_id.clone()));
                if member.serial_number > owner.0 {
                    *owner = (member.serial_number, entity_id.clone());
                }
            }
            state.dirty.insert(entity_id.clone());
            state
                .groups
                .insert(entity_id.clone(), ResourceGroup::from_members(entity_id, members));
        }
        state.urls = owners
            .into_iter()
            .map(|(url, (_, entity_id))| (url, entity_id))
            .collect();
        state.next_serial = snapshot.next_serial.max(max_serial + 1);
        state
    }

    fn to_snapshot(&self) -> RegistrySnapshot {
        let groups = self
            .groups
            .iter()
            .map(|(id, group)| (id.clone(), group.members().to_vec()))
            .collect();
        RegistrySnapshot::new(self.next_serial, groups)
    }

    fn member(&self, url: &str) -> Option<&RegisteredResource> {
        let entity_id = self.urls.get(url)?;
        self.groups.get(entity_id)?.get(url)
    }

    /// Returns the registered resource and whether anything changed.
    fn add(
        &mut self,
        resource: &InstallableResource,
    ) -> Result<(RegisteredResource, bool), RegistryError> {
        let candidate = RegisteredResource::from_installable(resource, self.next_serial)?;

        if let Some(existing) = self.member(&resource.url) {
            if existing.installable
                && existing.entity_id == candidate.entity_id
                && existing.digest == candidate.digest
                && existing.priority == candidate.priority
            {
                debug!("Resource {} unchanged", resource.url);
                return Ok((existing.clone(), false));
            }
        }
        self.next_serial += 1;

        if let Some(previous) = self.urls.get(&resource.url).cloned() {
            if previous != candidate.entity_id {
                warn!(
                    "Resource {} moved from {} to {}",
                    resource.url, previous, candidate.entity_id
                );
                self.retire(&previous, &resource.url);
            }
        }

        self.groups
            .entry(candidate.entity_id.clone())
            .or_insert_with(|| ResourceGroup::new(candidate.entity_id.clone()))
            .upsert(candidate.clone());
        self.urls
            .insert(candidate.url.clone(), candidate.entity_id.clone());
        self.dirty.insert(candidate.entity_id.clone());
        debug!("Registered {}", candidate);
        Ok((candidate, true))
    }

    /// Leave a moved URL behind in its old group as a non-installable member.
    ///
    /// The old group keeps ownership of whatever that member installed until
    /// it converges and is collected.
    fn retire(&mut self, entity_id: &str, url: &str) {
        if let Some(group) = self.groups.get_mut(entity_id) {
            group.set_installable(url, false);
        }
        self.dirty.insert(entity_id.to_string());
    }

    /// Returns true if the resource is known and was installable.
    fn mark_uninstallable(&mut self, url: &str) -> bool {
        let Some(entity_id) = self.urls.get(url).cloned() else {
            return false;
        };
        let changed = self
            .groups
            .get_mut(&entity_id)
            .is_some_and(|group| group.set_installable(url, false));
        if changed {
            debug!("Resource {} is no longer installable", url);
            self.dirty.insert(entity_id);
        }
        changed
    }
}

/// Tracks every candidate resource, grouped by entity id.
///
/// All mutations are serialized by one lock and persisted before the lock is
/// released. Persistence failures are logged; the in-memory state stays
/// authoritative for the running process.
pub struct ResourceRegistry {
    state: Mutex<RegistryState>,
    store: Arc<dyn SnapshotStore>,
}

impl ResourceRegistry {
    /// Open the registry from its snapshot store.
    ///
    /// A missing, unreadable or incompatible snapshot yields an empty registry.
    /// Every loaded group starts with pending changes.
    pub fn open(store: Arc<dyn SnapshotStore>) -> Self {
        let state = match store.load() {
            Ok(Some(snapshot)) => {
                let state = RegistryState::from_snapshot(snapshot);
                info!(
                    "Registry loaded with {} groups, {} resources",
                    state.groups.len(),
                    state.urls.len()
                );
                state
            }
            Ok(None) => {
                info!("No registry snapshot found, starting empty");
                RegistryState::default()
            }
            Err(e) => {
                warn!("Unable to restore registry snapshot, starting empty: {}", e);
                RegistryState::default()
            }
        };

        Self {
            state: Mutex::new(state),
            store,
        }
    }

    /// Registry backed by a memory store.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemorySnapshotStore::new()))
    }

    /// Register or replace one resource.
    pub fn add_resource(
        &self,
        resource: &InstallableResource,
    ) -> Result<RegisteredResource, RegistryError> {
        let mut state = self.state.lock();
        let (registered, changed) = state.add(resource)?;
        if changed {
            self.persist(&state);
        }
        Ok(registered)
    }

    /// Mark a resource as no longer installable. Returns false for unknown URLs.
    pub fn remove_resource(&self, url: &str) -> bool {
        let mut state = self.state.lock();
        if !state.urls.contains_key(url) {
            debug!("Ignoring removal of unknown resource {}", url);
            return false;
        }
        if state.mark_uninstallable(url) {
            self.persist(&state);
        }
        true
    }

    /// Declare the complete desired set for one URL scheme.
    ///
    /// Every previously registered URL of the scheme that is not offered again
    /// becomes non-installable. Offered URLs that fail validation are reported
    /// and keep their previous registration.
    pub fn register_resources(
        &self,
        resources: &[InstallableResource],
        scheme: &str,
    ) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        let mut offered = HashSet::new();
        let mut state = self.state.lock();
        let mut changed = false;

        for resource in resources {
            offered.insert(resource.url.clone());
            let result = match resource.scheme() {
                Ok(s) if s == scheme => state.add(resource),
                Ok(_) => Err(RegistryError::SchemeMismatch {
                    url: resource.url.clone(),
                    expected: scheme.to_string(),
                }),
                Err(e) => Err(e.into()),
            };
            match result {
                Ok((_, added)) => {
                    changed |= added;
                    report.accepted.push(resource.url.clone());
                }
                Err(e) => {
                    warn!("Rejected resource {}: {}", resource.url, e);
                    report.rejected.push((resource.url.clone(), e.to_string()));
                }
            }
        }

        let mut stale: Vec<String> = state
            .urls
            .keys()
            .filter(|url| scheme_of(url) == scheme && !offered.contains(*url))
            .cloned()
            .collect();
        stale.sort();
        for url in stale {
            if state.mark_uninstallable(&url) {
                changed = true;
                report.removed.push(url);
            }
        }

        if changed {
            self.persist(&state);
        }
        info!(
            "Registered {} resources for scheme '{}' ({} rejected, {} removed)",
            report.accepted.len(),
            scheme,
            report.rejected.len(),
            report.removed.len()
        );
        report
    }

    /// Grouped view, restricted to one scheme when given.
    pub fn resources(&self, scheme: Option<&str>) -> BTreeMap<String, ResourceGroup> {
        let state = self.state.lock();
        state
            .groups
            .iter()
            .filter_map(|(id, group)| {
                let members: Vec<RegisteredResource> = group
                    .members()
                    .iter()
                    .filter(|r| scheme.is_none_or(|s| r.scheme() == s))
                    .cloned()
                    .collect();
                (!members.is_empty())
                    .then(|| (id.clone(), ResourceGroup::from_members(id.clone(), members)))
            })
            .collect()
    }

    pub fn group(&self, entity_id: &str) -> Option<ResourceGroup> {
        self.state.lock().groups.get(entity_id).cloned()
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.state.lock().urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the groups with pending changes, clearing their marks.
    pub fn take_dirty_groups(&self) -> Vec<ResourceGroup> {
        let mut state = self.state.lock();
        let dirty = std::mem::take(&mut state.dirty);
        dirty
            .into_iter()
            .filter_map(|id| state.groups.get(&id).cloned())
            .collect()
    }

    pub fn mark_dirty(&self, entity_id: &str) {
        let mut state = self.state.lock();
        if state.groups.contains_key(entity_id) {
            state.dirty.insert(entity_id.to_string());
        }
    }

    pub fn mark_all_dirty(&self) {
        let mut state = self.state.lock();
        let ids: Vec<String> = state.groups.keys().cloned().collect();
        state.dirty.extend(ids);
    }

    pub fn has_dirty(&self) -> bool {
        !self.state.lock().dirty.is_empty()
    }

    /// Drop the non-installable members of a converged group.
    ///
    /// Skipped when the group changed again since it was taken. Returns the
    /// number of purged resources.
    pub fn collect_garbage(&self, entity_id: &str) -> usize {
        let mut state = self.state.lock();
        if state.dirty.contains(entity_id) {
            return 0;
        }
        let Some(group) = state.groups.get_mut(entity_id) else {
            return 0;
        };
        let purged = group.purge_uninstallable();
        if purged.is_empty() {
            return 0;
        }
        if group.is_empty() {
            state.groups.remove(entity_id);
        }
        for url in &purged {
            // A moved URL stays registered under its new entity.
            if state.urls.get(url).is_some_and(|owner| owner == entity_id) {
                state.urls.remove(url);
            }
        }
        debug!("Purged {} resources from {}", purged.len(), entity_id);
        self.persist(&state);
        purged.len()
    }

    fn persist(&self, state: &RegistryState) {
        if let Err(e) = self.store.save(&state.to_snapshot()) {
            warn!("Failed to persist registry snapshot: {}", e);
        }
    }
}

fn scheme_of(url: &str) -> &str {
    url.split_once(':').map(|(s, _)| s).unwrap_or_default()
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
