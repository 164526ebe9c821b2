//! # Converge Core
//!
//! Resource model and host container boundary for the Converge installer.
//!
//! ## Contents
//!
//! - [`InstallableResource`] / [`RegisteredResource`] - intake and registry resource types
//! - [`Version`] and [`ModuleManifest`] - module identity
//! - [`Container`], [`ConfigAdmin`], [`RelinkControl`] - services provided by the host
//! - [`MemoryContainer`] - in-process container used by tests and the CLI

pub mod container;
pub mod error;
pub mod manifest;
pub mod memory;
pub mod resource;
pub mod version;

pub use container::{
    ConfigAdmin, ConfigProperties, ConfigRecord, Container, ModuleChange, ModuleInfo, ModuleState,
    RelinkControl, RuntimeEvent,
};
pub use error::{ContainerError, CoreError};
pub use manifest::ModuleManifest;
pub use memory::{ContainerState, MemoryContainer};
pub use resource::{
    ConfigPid, InstallableResource, RegisteredResource, ResourceKind, ResourcePayload,
    DEFAULT_PRIORITY,
};
pub use version::Version;
