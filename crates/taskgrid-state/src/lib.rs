//! taskgrid-state — domain model for the TaskGrid task executor.
//!
//! Holds the value types every reconcile cycle is built from: the ordered
//! algorithm request backlog, raw worker/job/pod records from the discovery
//! feed, the canonical merged [`Worker`], algorithm templates, and the
//! per-node resource picture.
//!
//! # Units
//!
//! CPU and GPU are fractional cores/devices. Memory is carried as MiB in
//! [`Resources`]; templates and configs express it as Kubernetes-style
//! quantities (`"512Mi"`, `"2Gi"`) which [`parse_memory_mib`] converts.

pub mod error;
pub mod job;
pub mod resources;
pub mod types;

pub use error::{StateError, StateResult};
pub use job::{ClusterOptions, JobSpec};
pub use resources::{ClusterResources, NodeResources, PressureRatio, Resources, parse_memory_mib};
pub use types::*;
