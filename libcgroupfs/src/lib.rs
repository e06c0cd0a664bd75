//! Container-aware cgroup hierarchy resolution, proc-view synthesis, and
//! device-cgroup eBPF assembly.
//!
//! Layered as: [`hierarchy`] (C1, bootstrap + PID resolution) → [`parse`]
//! (C2) → [`constraints`] + [`accounting`] (C3) → [`procview`] (C4,
//! pure renderers). [`devices`] (C6) is an independent path invoked
//! directly by a container manager, not through the proc-view layer.

pub mod accounting;
pub mod common;
pub mod constraints;
#[cfg(feature = "cgroup_devices")]
pub mod devices;
pub mod error;
pub mod hierarchy;
pub mod parse;
pub mod procview;

pub use accounting::CpuAccountingCache;
pub use constraints::ConstraintSet;
pub use error::CoreError;
pub use hierarchy::{CgroupPath, Hierarchy, HierarchySnapshot};
