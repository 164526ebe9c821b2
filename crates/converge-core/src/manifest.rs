//! Module manifest parsing.
//!
//! Manifests are `Name: value` header blocks. A line starting with a single
//! space continues the previous header's value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::version::Version;

/// Header carrying the module's symbolic name.
pub const SYMBOLIC_NAME_HEADER: &str = "Module-SymbolicName";

/// Header carrying the module's version.
pub const VERSION_HEADER: &str = "Module-Version";

/// Identity and headers of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub symbolic_name: String,
    pub version: Version,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ModuleManifest {
    /// Build a manifest from name and version only.
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        let symbolic_name = symbolic_name.into();
        let mut headers = BTreeMap::new();
        headers.insert(SYMBOLIC_NAME_HEADER.to_string(), symbolic_name.clone());
        headers.insert(VERSION_HEADER.to_string(), version.to_string());
        Self {
            symbolic_name,
            version,
            headers,
        }
    }

    /// Parse a manifest blob. `origin` is only used in error messages.
    pub fn parse(origin: &str, text: &str) -> Result<Self, CoreError> {
        let invalid = |reason: String| CoreError::InvalidManifest {
            url: origin.to_string(),
            reason,
        };

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        let mut last: Option<String> = None;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                let name = last
                    .as_ref()
                    .ok_or_else(|| invalid(format!("continuation without header at line {}", number + 1)))?;
                if let Some(value) = headers.get_mut(name) {
                    value.push_str(continuation);
                }
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| invalid(format!("expected 'Name: value' at line {}", number + 1)))?;
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(invalid(format!("empty header name at line {}", number + 1)));
            }
            headers.insert(name.clone(), value.trim().to_string());
            last = Some(name);
        }

        let symbolic_name = headers
            .get(SYMBOLIC_NAME_HEADER)
            .map(|raw| raw.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid(format!("missing {} header", SYMBOLIC_NAME_HEADER)))?;

        let version = match headers.get(VERSION_HEADER) {
            Some(raw) => Version::parse(raw)?,
            None => Version::default(),
        };

        Ok(Self {
            symbolic_name,
            version,
            headers,
        })
    }

    /// Render back to header text.
    pub fn to_text(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| format!("{}: {}\n", name, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_manifest() {
        let text = "Module-SymbolicName: org.example.alpha\nModule-Version: 1.2.0\nVendor: Example\n";
        let manifest = ModuleManifest::parse("file:alpha.jar", text).unwrap();
        assert_eq!(manifest.symbolic_name, "org.example.alpha");
        assert_eq!(manifest.version, Version::new(1, 2, 0));
        assert_eq!(manifest.headers.get("Vendor").map(String::as_str), Some("Example"));
    }

    #[test]
    fn test_directives_are_stripped() {
        let text = "Module-SymbolicName: org.example.beta; singleton:=true\n";
        let manifest = ModuleManifest::parse("file:beta.jar", text).unwrap();
        assert_eq!(manifest.symbolic_name, "org.example.beta");
        assert_eq!(manifest.version, Version::default());
    }

    #[test]
    fn test_continuation_lines() {
        let text = "Module-SymbolicName: org.example.\n gamma\nModule-Version: 2.0\n";
        let manifest = ModuleManifest::parse("file:gamma.jar", text).unwrap();
        assert_eq!(manifest.symbolic_name, "org.example.gamma");
    }

    #[test]
    fn test_missing_symbolic_name() {
        let err = ModuleManifest::parse("file:x.jar", "Module-Version: 1.0\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidManifest { .. }));
    }

    #[test]
    fn test_round_trip_text() {
        let manifest = ModuleManifest::new("org.example.delta", Version::new(0, 9, 1));
        let parsed = ModuleManifest::parse("mem:delta", &manifest.to_text()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
