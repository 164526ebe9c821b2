//! Installable and registered resources.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::container::ConfigProperties;
use crate::error::CoreError;
use crate::manifest::ModuleManifest;
use crate::version::Version;

/// Priority assigned when the caller gives none.
pub const DEFAULT_PRIORITY: i32 = 100;

const CONFIG_EXTENSIONS: [&str; 2] = [".cfg", ".properties"];

/// Resource kind, inferred from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Module,
    Config,
}

impl ResourceKind {
    /// Entity id prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A resource as offered by a caller.
///
/// Exactly one of `manifest` or `properties` must be set. Modules must carry a
/// digest; configs get one computed from URL and data when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallableResource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ConfigProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl InstallableResource {
    /// A module resource.
    pub fn module(
        url: impl Into<String>,
        manifest: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            manifest: Some(manifest.into()),
            properties: None,
            digest: Some(digest.into()),
            priority: None,
        }
    }

    /// A configuration resource.
    pub fn config(url: impl Into<String>, properties: ConfigProperties) -> Self {
        Self {
            url: url.into(),
            manifest: None,
            properties: Some(properties),
            digest: None,
            priority: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the digest.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Infer the kind from the payload.
    pub fn kind(&self) -> Result<ResourceKind, CoreError> {
        match (&self.manifest, &self.properties) {
            (Some(_), None) => Ok(ResourceKind::Module),
            (None, Some(_)) => Ok(ResourceKind::Config),
            _ => Err(CoreError::AmbiguousContent(self.url.clone())),
        }
    }

    /// URL scheme, validated.
    pub fn scheme(&self) -> Result<&str, CoreError> {
        split_url(&self.url).map(|(scheme, _)| scheme)
    }
}

/// Split `scheme:location`, rejecting an empty scheme or location.
pub fn split_url(url: &str) -> Result<(&str, &str), CoreError> {
    match url.split_once(':') {
        Some((scheme, location)) if !scheme.is_empty() && !location.is_empty() => {
            Ok((scheme, location))
        }
        _ => Err(CoreError::InvalidUrl(url.to_string())),
    }
}

/// Identity of a configuration record.
///
/// A file named `factory-alias.cfg` denotes a factory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigPid {
    pub pid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_pid: Option<String>,
}

impl ConfigPid {
    /// A plain configuration pid.
    pub fn new(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            factory_pid: None,
        }
    }

    /// A factory configuration instance.
    pub fn factory(factory_pid: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            pid: alias.into(),
            factory_pid: Some(factory_pid.into()),
        }
    }

    /// Derive the pid from the last path segment of a resource URL.
    pub fn from_url(url: &str) -> Result<Self, CoreError> {
        let (_, location) = split_url(url)?;
        let segment = location.rsplit(['/', '\\', ':']).next().unwrap_or(location);
        let name = CONFIG_EXTENSIONS
            .iter()
            .find_map(|ext| segment.strip_suffix(ext))
            .unwrap_or(segment);
        if name.is_empty() {
            return Err(CoreError::InvalidUrl(url.to_string()));
        }
        Ok(match name.split_once('-') {
            Some((factory, alias)) if !factory.is_empty() && !alias.is_empty() => {
                Self::factory(factory, alias)
            }
            _ => Self::new(name),
        })
    }

    /// `factory-alias` for factory configurations, the pid otherwise.
    pub fn composite(&self) -> String {
        match &self.factory_pid {
            Some(factory) => format!("{}-{}", factory, self.pid),
            None => self.pid.clone(),
        }
    }
}

impl fmt::Display for ConfigPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite())
    }
}

/// Kind-specific content of a registered resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourcePayload {
    Module { manifest: ModuleManifest },
    Config { pid: ConfigPid, properties: ConfigProperties },
}

/// One candidate version of an entity, as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredResource {
    pub entity_id: String,
    pub url: String,
    pub digest: String,
    pub priority: i32,
    pub serial_number: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub installable: bool,
    pub payload: ResourcePayload,
}

impl RegisteredResource {
    /// Validate an installable resource and convert it.
    pub fn from_installable(
        resource: &InstallableResource,
        serial_number: u64,
    ) -> Result<Self, CoreError> {
        split_url(&resource.url)?;
        let kind = resource.kind()?;
        let priority = resource.priority.unwrap_or(DEFAULT_PRIORITY);
        let mut attributes = BTreeMap::new();

        let (entity_id, digest, payload) = match kind {
            ResourceKind::Module => {
                let digest = resource
                    .digest
                    .clone()
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| CoreError::MissingDigest(resource.url.clone()))?;
                let text = resource.manifest.as_deref().unwrap_or_default();
                let manifest = ModuleManifest::parse(&resource.url, text)?;
                attributes.insert("symbolic-name".to_string(), manifest.symbolic_name.clone());
                attributes.insert("version".to_string(), manifest.version.to_string());
                (
                    Self::module_entity_id(&manifest.symbolic_name),
                    digest,
                    ResourcePayload::Module { manifest },
                )
            }
            ResourceKind::Config => {
                let properties = resource.properties.clone().unwrap_or_default();
                let pid = ConfigPid::from_url(&resource.url)?;
                let digest = resource
                    .digest
                    .clone()
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| config_digest(&resource.url, &properties));
                attributes.insert("pid".to_string(), pid.pid.clone());
                if let Some(factory) = &pid.factory_pid {
                    attributes.insert("factory-pid".to_string(), factory.clone());
                }
                (
                    Self::config_entity_id(&pid),
                    digest,
                    ResourcePayload::Config { pid, properties },
                )
            }
        };

        Ok(Self {
            entity_id,
            url: resource.url.clone(),
            digest,
            priority,
            serial_number,
            attributes,
            installable: true,
            payload,
        })
    }

    /// Entity id of a module.
    pub fn module_entity_id(symbolic_name: &str) -> String {
        format!("{}:{}", ResourceKind::Module.prefix(), symbolic_name)
    }

    /// Entity id of a configuration.
    pub fn config_entity_id(pid: &ConfigPid) -> String {
        format!("{}:{}", ResourceKind::Config.prefix(), pid.composite())
    }

    pub fn kind(&self) -> ResourceKind {
        match self.payload {
            ResourcePayload::Module { .. } => ResourceKind::Module,
            ResourcePayload::Config { .. } => ResourceKind::Config,
        }
    }

    /// URL scheme. Registered URLs are validated on intake.
    pub fn scheme(&self) -> &str {
        self.url.split_once(':').map(|(s, _)| s).unwrap_or_default()
    }

    pub fn manifest(&self) -> Option<&ModuleManifest> {
        match &self.payload {
            ResourcePayload::Module { manifest } => Some(manifest),
            ResourcePayload::Config { .. } => None,
        }
    }

    /// Module version; configs have none.
    pub fn version(&self) -> Option<&Version> {
        self.manifest().map(|m| &m.version)
    }

    pub fn config_pid(&self) -> Option<&ConfigPid> {
        match &self.payload {
            ResourcePayload::Config { pid, .. } => Some(pid),
            ResourcePayload::Module { .. } => None,
        }
    }

    pub fn properties(&self) -> Option<&ConfigProperties> {
        match &self.payload {
            ResourcePayload::Config { properties, .. } => Some(properties),
            ResourcePayload::Module { .. } => None,
        }
    }
}

impl fmt::Display for RegisteredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            Some(version) => write!(f, "{}@{} ({})", self.entity_id, version, self.url),
            None => write!(f, "{} ({})", self.entity_id, self.url),
        }
    }
}

/// SHA-256 over the URL and the sorted properties, hex encoded.
pub fn config_digest(url: &str, properties: &ConfigProperties) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    for (key, value) in properties {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
