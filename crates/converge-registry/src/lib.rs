//! # Converge Registry
//!
//! Durable store of every candidate resource, grouped by entity id.
//!
//! ## Features
//!
//! - Deterministic ordering of competing candidates (priority, version, serial)
//! - Full-set registration per URL scheme with removal candidates
//! - Pending-change tracking consumed by the cycle driver
//! - Versioned JSON snapshot rewritten after every mutation

pub mod error;
pub mod group;
pub mod registry;
pub mod snapshot;

pub use error::RegistryError;
pub use group::ResourceGroup;
pub use registry::{RegistrationReport, ResourceRegistry};
pub use snapshot::{
    FileSnapshotStore, MemorySnapshotStore, RegistrySnapshot, SnapshotStore,
    SNAPSHOT_FORMAT_VERSION,
};
