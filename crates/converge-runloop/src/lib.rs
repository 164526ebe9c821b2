//! # Converge RunLoop
//!
//! The convergence engine: diffs desired resources against the live
//! container and drives the resulting tasks to completion, cycle by cycle.
//!
//! ## Architecture
//!
//! ```text
//!   register/remove ──► ResourceRegistry ──► dirty groups
//!                                               │
//!                                    TaskCreator (module / config)
//!                                               │
//!                                               ▼
//!   container events ──► EventCounter     TaskSet (sorted by key)
//!          │                  │                 │
//!          └── wakeup ──► CycleDriver ◄─────────┘
//!                             │
//!                             ▼
//!                    ExecutionContext ──► Container
//! ```
//!
//! One worker executes tasks strictly in sort-key order. Tasks report
//! follow-up work through [`TaskResult`] instead of touching the queues.

pub mod config;
pub mod context;
pub mod counter;
pub mod creator;
pub mod cycle;
pub mod error;
pub mod installer;
pub mod metrics;
pub mod task;

pub use config::InstallerConfig;
pub use context::ExecutionContext;
pub use counter::EventCounter;
pub use creator::{ConfigTaskCreator, ModuleTaskCreator, RuntimeSnapshot, TaskCreator};
pub use cycle::{CycleDriver, CycleReport};
pub use error::{InstallerError, InstallerResult, TaskError};
pub use installer::Installer;
pub use metrics::{CountersSnapshot, InstallerCounters};
pub use task::{Cycle, InstallTask, TaskOutcome, TaskResult, TaskSet};
