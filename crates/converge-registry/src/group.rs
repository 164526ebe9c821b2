//! Resource groups.

use std::cmp::Ordering;

use converge_core::{RegisteredResource, ResourceKind};

/// All candidates sharing one entity id, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGroup {
    entity_id: String,
    members: Vec<RegisteredResource>,
}

/// Candidate order: priority desc, then version desc, then serial number desc.
pub fn rank(a: &RegisteredResource, b: &RegisteredResource) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.version().cmp(&a.version()))
        .then_with(|| b.serial_number.cmp(&a.serial_number))
}

impl ResourceGroup {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            members: Vec::new(),
        }
    }

    /// Build a group from unordered members.
    pub fn from_members(entity_id: impl Into<String>, mut members: Vec<RegisteredResource>) -> Self {
        members.sort_by(rank);
        Self {
            entity_id: entity_id.into(),
            members,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Kind of the group's members.
    pub fn kind(&self) -> Option<ResourceKind> {
        self.members.first().map(RegisteredResource::kind)
    }

    /// Members in rank order.
    pub fn members(&self) -> &[RegisteredResource] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Desired state: the first installable member.
    pub fn desired(&self) -> Option<&RegisteredResource> {
        self.members.iter().find(|r| r.installable)
    }

    pub fn get(&self, url: &str) -> Option<&RegisteredResource> {
        self.members.iter().find(|r| r.url == url)
    }

    /// Insert or replace the member with the same URL.
    pub(crate) fn upsert(&mut self, resource: RegisteredResource) {
        self.members.retain(|r| r.url != resource.url);
        let position = self
            .members
            .binary_search_by(|probe| rank(probe, &resource))
            .unwrap_or_else(|pos| pos);
        self.members.insert(position, resource);
    }

    /// Returns true if the flag changed.
    pub(crate) fn set_installable(&mut self, url: &str, installable: bool) -> bool {
        match self.members.iter_mut().find(|r| r.url == url) {
            Some(member) if member.installable != installable => {
                member.installable = installable;
                true
            }
            _ => false,
        }
    }

    /// Drop non-installable members, returning their URLs.
    pub(crate) fn purge_uninstallable(&mut self) -> Vec<String> {
        let (keep, purged): (Vec<_>, Vec<_>) =
            self.members.drain(..).partition(|r| r.installable);
        self.members = keep;
        purged.into_iter().map(|r| r.url).collect()
    }
}
