//! Standalone implementations of the executor's backend traits.
//!
//! The daemon runs without a cluster API: the cycle input is read from a
//! JSON file, job creation and worker commands are logged, alert events are
//! kept in memory and the discovery snapshot is written to a file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use tracing::{debug, info};

use taskgrid_executor::{
    BoxFuture, ClusterClient, CycleInput, DiscoveryPublisher, DiscoverySnapshot, EventStore,
    RemovedEvent, SnapshotSource, UnscheduledEntry, WorkerChannel, WorkerCommand,
};
use taskgrid_state::JobSpec;

/// Reads a [`CycleInput`] from a JSON file on every fetch.
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn load(&self) -> anyhow::Result<CycleInput> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading snapshot {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot {}", self.path.display()))
    }
}

impl SnapshotSource for FileSnapshotSource {
    fn fetch(&self) -> BoxFuture<'_, anyhow::Result<CycleInput>> {
        Box::pin(self.load())
    }
}

/// Logs job creations instead of submitting them.
pub struct LoggingCluster;

impl ClusterClient for LoggingCluster {
    fn create_job<'a>(&'a self, spec: &'a JobSpec) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(
                job = %spec.name,
                algorithm = %spec.algorithm_name,
                image = %spec.algorithm_image,
                namespace = %spec.cluster.namespace,
                hot = spec.hot_worker,
                "create job"
            );
            Ok(())
        })
    }
}

/// Logs worker commands instead of delivering them.
pub struct LoggingWorkers;

impl WorkerChannel for LoggingWorkers {
    fn send_command<'a>(&'a self, command: &'a WorkerCommand) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!(
                worker = %command.worker_id,
                algorithm = %command.algorithm_name,
                command = command.command.as_str(),
                message = command.message.as_deref().unwrap_or(""),
                "worker command"
            );
            Ok(())
        })
    }
}

/// Alert events held in process memory.
#[derive(Default)]
pub struct InMemoryEvents {
    next_id: AtomicU64,
    events: Mutex<HashMap<String, UnscheduledEntry>>,
}

impl InMemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl EventStore for InMemoryEvents {
    fn add_event<'a>(&'a self, entry: &'a UnscheduledEntry) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let id = format!("event-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            self.events
                .lock()
                .map_err(|_| anyhow::anyhow!("event store lock poisoned"))?
                .insert(id.clone(), entry.clone());
            info!(
                event = %id,
                algorithm = %entry.algorithm_name,
                message = %entry.warning.message,
                "unscheduled algorithm event"
            );
            Ok(id)
        })
    }

    fn remove_event<'a>(&'a self, event: &'a RemovedEvent) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.events
                .lock()
                .map_err(|_| anyhow::anyhow!("event store lock poisoned"))?
                .remove(&event.event_id);
            info!(event = %event.event_id, algorithm = %event.algorithm_name, "event removed");
            Ok(())
        })
    }
}

/// Writes each discovery snapshot to a JSON file, or only logs it.
pub struct DiscoveryWriter {
    path: Option<PathBuf>,
}

impl DiscoveryWriter {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl DiscoveryPublisher for DiscoveryWriter {
    fn update_discovery<'a>(
        &'a self,
        snapshot: &'a DiscoverySnapshot,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let Some(path) = &self.path else {
                debug!(
                    capacity = snapshot.capacity,
                    workers = snapshot.actual.total,
                    "discovery snapshot"
                );
                return Ok(());
            };
            let json = serde_json::to_vec_pretty(snapshot)?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("writing discovery {}", path.display()))?;
            Ok(())
        })
    }
}
