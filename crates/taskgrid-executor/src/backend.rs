//! Seams to the systems the executor talks to.
//!
//! The reconcile cycle never reaches the cluster, the coordination store or
//! the alert stream directly; it goes through these traits so cycles can
//! run against recording fakes in tests. All calls are best-effort: a failed
//! call is logged by the caller and re-decided on the next cycle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use taskgrid_state::JobSpec;

use crate::commands::WorkerCommand;
use crate::discovery::DiscoverySnapshot;
use crate::reconciler::CycleInput;
use crate::tracker::{RemovedEvent, UnscheduledEntry};

/// Boxed future alias for backend calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Creates worker jobs on the cluster.
pub trait ClusterClient: Send + Sync {
    /// Submit a job. Success means the API accepted it, not that a pod runs.
    fn create_job<'a>(&'a self, spec: &'a JobSpec) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Delivers lifecycle commands to workers.
pub trait WorkerChannel: Send + Sync {
    fn send_command<'a>(&'a self, command: &'a WorkerCommand) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Alert stream for algorithms that cannot be scheduled.
pub trait EventStore: Send + Sync {
    /// Publish an alert and return its id.
    fn add_event<'a>(&'a self, entry: &'a UnscheduledEntry) -> BoxFuture<'a, anyhow::Result<String>>;

    fn remove_event<'a>(&'a self, event: &'a RemovedEvent) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Upserts the per-cycle discovery snapshot.
pub trait DiscoveryPublisher: Send + Sync {
    fn update_discovery<'a>(
        &'a self,
        snapshot: &'a DiscoverySnapshot,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Produces the cluster picture a cycle is computed from.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<CycleInput>>;
}

/// The outbound collaborators of a reconciler.
#[derive(Clone)]
pub struct Backends {
    pub cluster: Arc<dyn ClusterClient>,
    pub workers: Arc<dyn WorkerChannel>,
    pub events: Arc<dyn EventStore>,
    pub discovery: Arc<dyn DiscoveryPublisher>,
}
