//! Outbound command queue and its concurrent dispatch.
//!
//! Planning a cycle produces a flat queue of [`Outbound`] items. Dispatch
//! sends all of them at once: there is no ordering between items, and a
//! failed item is logged without affecting its siblings.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskgrid_state::{AlgorithmName, JobSpec, Worker, WorkerId};

use crate::backend::Backends;
use crate::error::ExecutorError;

/// Lifecycle commands understood by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    StopProcessing,
    StartProcessing,
    CoolDown,
    WarmUp,
    Exit,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::StopProcessing => "stopProcessing",
            CommandKind::StartProcessing => "startProcessing",
            CommandKind::CoolDown => "coolDown",
            CommandKind::WarmUp => "warmUp",
            CommandKind::Exit => "exit",
        }
    }
}

/// A command addressed to one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub worker_id: WorkerId,
    pub algorithm_name: AlgorithmName,
    pub pod_name: Option<String>,
    pub command: CommandKind,
    pub message: Option<String>,
}

impl WorkerCommand {
    pub fn for_worker(worker: &Worker, command: CommandKind) -> Self {
        Self {
            worker_id: worker.id.clone(),
            algorithm_name: worker.algorithm_name.clone(),
            pod_name: worker.pod_name.clone(),
            command,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One item of the outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    CreateJob(JobSpec),
    Command(WorkerCommand),
}

impl Outbound {
    pub fn algorithm_name(&self) -> &str {
        match self {
            Outbound::CreateJob(spec) => &spec.algorithm_name,
            Outbound::Command(cmd) => &cmd.algorithm_name,
        }
    }

    /// Short description used in logs: `createJob green-1a2b-0`, `warmUp w-3`.
    pub fn describe(&self) -> String {
        match self {
            Outbound::CreateJob(spec) => format!("createJob {}", spec.name),
            Outbound::Command(cmd) => format!("{} {}", cmd.command.as_str(), cmd.worker_id),
        }
    }
}

/// Outcome of dispatching one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Send every queued item concurrently and wait for all of them.
pub async fn dispatch(queue: Vec<Outbound>, backends: &Backends) -> DispatchReport {
    let results = join_all(queue.iter().map(|item| send(item, backends))).await;

    let mut report = DispatchReport::default();
    for (item, result) in queue.iter().zip(results) {
        match result {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                report.failed += 1;
                warn!(
                    algorithm = %item.algorithm_name(),
                    error = %e,
                    "outbound item failed"
                );
            }
        }
    }

    if !queue.is_empty() {
        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            "outbound queue dispatched"
        );
    }
    report
}

async fn send(item: &Outbound, backends: &Backends) -> Result<(), ExecutorError> {
    let outcome = match item {
        Outbound::CreateJob(spec) => backends.cluster.create_job(spec).await,
        Outbound::Command(cmd) => backends.workers.send_command(cmd).await,
    };
    outcome.map_err(|source| ExecutorError::Dispatch {
        target: item.describe(),
        source,
    })
}
