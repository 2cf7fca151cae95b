//! taskgrid-executor — the periodic worker reconcile cycle.
//!
//! Every tick the executor compares the pending algorithm requests with the
//! workers that exist, and decides which workers to reuse, resume, create or
//! stop.
//!
//! # Algorithm
//!
//! ```text
//! expire ledger ─▶ normalize ─▶ capacity ─▶ window + fair share
//!       ─▶ assign (idle, pending, ledger, paused, new)
//!       ─▶ match new jobs to nodes ─▶ track unscheduled
//!       ─▶ reclaim for skipped ─▶ cancel stop/resume
//!       ─▶ dispatch (concurrent, best-effort) ─▶ publish discovery
//! ```
//!
//! # Components
//!
//! - **`reconciler`** — owns cross-cycle state and runs cycles
//! - **`normalize`** — raw records to canonical workers, version-mismatch
//!   exits, hot-worker demand
//! - **`assign`** — assignment engine over the per-cycle supply pools
//! - **`ledger`** — jobs submitted but not yet visible in the cluster
//! - **`tracker`** — algorithms that cannot be scheduled, and their alerts
//! - **`job_spec`** — image resolution and job-spec construction
//! - **`commands`** — outbound queue and its concurrent dispatch
//! - **`discovery`** — result map and published snapshot
//! - **`backend`** — traits for the cluster, workers, alerts and discovery

pub mod assign;
pub mod backend;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod job_spec;
pub mod ledger;
pub mod normalize;
pub mod reconciler;
pub mod tracker;

pub use backend::{
    Backends, BoxFuture, ClusterClient, DiscoveryPublisher, EventStore, SnapshotSource,
    WorkerChannel,
};
pub use commands::{CommandKind, DispatchReport, Outbound, WorkerCommand, dispatch};
pub use config::{ExecutorConfig, PressureThresholds, Versions};
pub use discovery::{AlgorithmResult, DiscoverySnapshot, ReconcileResult};
pub use error::{ExecutorError, ExecutorResult};
pub use reconciler::{CycleInput, CyclePlan, Reconciler};
pub use tracker::{RemovedEvent, TrackerDelta, UnscheduledEntry, UnscheduledTracker};
