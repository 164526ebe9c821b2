//! Desired-set files.
//!
//! ```toml
//! [[module]]
//! url = "file:/repo/http-1.2.0.jar"
//! symbolic_name = "http"
//! version = "1.2.0"
//! digest = "3f2a..."
//!
//! [[config]]
//! url = "file:/etc/http.cfg"
//! [config.properties]
//! port = 8080
//! ```

use std::path::Path;

use converge_core::{ConfigProperties, InstallableResource};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DesiredSet {
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleEntry>,

    #[serde(default, rename = "config")]
    pub configs: Vec<ConfigEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleEntry {
    pub url: String,
    /// Full manifest text. Takes precedence over `symbolic_name`/`version`.
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub symbolic_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfigEntry {
    pub url: String,
    #[serde(default)]
    pub properties: ConfigProperties,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl ModuleEntry {
    fn manifest_text(&self) -> String {
        if let Some(manifest) = &self.manifest {
            return manifest.clone();
        }
        let mut text = String::new();
        if let Some(name) = &self.symbolic_name {
            text.push_str(&format!("Module-SymbolicName: {}\n", name));
        }
        if let Some(version) = &self.version {
            text.push_str(&format!("Module-Version: {}\n", version));
        }
        text
    }

    fn to_resource(&self) -> InstallableResource {
        InstallableResource {
            url: self.url.clone(),
            manifest: Some(self.manifest_text()),
            properties: None,
            digest: self.digest.clone(),
            priority: self.priority,
        }
    }
}

impl ConfigEntry {
    fn to_resource(&self) -> InstallableResource {
        let resource = InstallableResource::config(self.url.clone(), self.properties.clone());
        match self.priority {
            Some(priority) => resource.with_priority(priority),
            None => resource,
        }
    }
}

impl DesiredSet {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Ok(Self::parse(&content)?)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn resources(&self) -> Vec<InstallableResource> {
        self.modules
            .iter()
            .map(ModuleEntry::to_resource)
            .chain(self.configs.iter().map(ConfigEntry::to_resource))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::ResourceKind;
    use serde_json::json;

    const SAMPLE: &str = r#"
        [[module]]
        url = "file:/repo/http-1.2.0.jar"
        symbolic_name = "http"
        version = "1.2.0"
        digest = "abc"
        priority = 200

        [[module]]
        url = "file:/repo/log.jar"
        manifest = """
Module-SymbolicName: log;singleton:=true
Module-Version: 2.0
"""
        digest = "def"

        [[config]]
        url = "file:/etc/http.cfg"
        [config.properties]
        port = 8080
        hosts = ["a", "b"]
    "#;

    #[test]
    fn test_parse_sample() {
        let desired = DesiredSet::parse(SAMPLE).unwrap();
        assert_eq!(desired.modules.len(), 2);
        assert_eq!(desired.configs.len(), 1);

        let resources = desired.resources();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].kind().unwrap(), ResourceKind::Module);
        assert_eq!(resources[0].priority, Some(200));
        assert!(resources[0]
            .manifest
            .as_deref()
            .unwrap()
            .contains("Module-SymbolicName: http"));
        assert!(resources[1].manifest.as_deref().unwrap().contains("singleton"));
        assert_eq!(resources[2].kind().unwrap(), ResourceKind::Config);
        let props = resources[2].properties.as_ref().unwrap();
        assert_eq!(props["port"], json!(8080));
        assert_eq!(props["hosts"], json!(["a", "b"]));
    }

    #[test]
    fn test_empty_file() {
        let desired = DesiredSet::parse("").unwrap();
        assert!(desired.resources().is_empty());
    }

    #[test]
    fn test_missing_url_is_rejected() {
        assert!(DesiredSet::parse("[[module]]\ndigest = \"x\"\n").is_err());
    }
}
