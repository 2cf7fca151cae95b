//! Assignment engine — match admitted requests to existing supply.
//!
//! Each request takes the first supply item available, in this order:
//!
//! ```text
//! 1. idle worker of the algorithm          (reused as-is)
//! 2. pending worker (job without a worker)  (already on its way)
//! 3. created-jobs ledger entry              (submitted last cycles)
//! 4. paused worker                          (staged to resume)
//! 5. nothing left                           (stage a new job)
//! ```
//!
//! Matched items are removed from their pool so nothing serves two
//! requests in one cycle.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use taskgrid_state::{AlgorithmName, AlgorithmRequest, JobSpec, TemplateMap, Worker, WorkerId};

use crate::config::ExecutorConfig;
use crate::job_spec::JobSpecFactory;
use crate::ledger::CreatedJobRecord;

/// Where a request found its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Supply {
    Idle,
    Pending,
    Ledger,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledRequest {
    pub algorithm_name: AlgorithmName,
    /// Worker id, or the job name for pending and ledger supply.
    pub worker_id: WorkerId,
    pub supply: Supply,
}

/// Per-cycle working copies of the supply pools.
#[derive(Debug, Clone, Default)]
pub struct WorkerPools {
    pub idle: Vec<Worker>,
    pub active: Vec<Worker>,
    pub paused: Vec<Worker>,
    pub pending: Vec<Worker>,
    pub ledger: Vec<CreatedJobRecord>,
}

impl WorkerPools {
    /// Split `workers` into idle/active/paused. Workers that are paused but
    /// not ready fit no pool and are left out.
    pub fn new(workers: &[Worker], pending: Vec<Worker>, ledger: &[CreatedJobRecord]) -> Self {
        Self {
            idle: workers.iter().filter(|w| w.is_idle()).cloned().collect(),
            active: workers.iter().filter(|w| w.is_active()).cloned().collect(),
            paused: workers.iter().filter(|w| w.is_paused()).cloned().collect(),
            pending,
            ledger: ledger.to_vec(),
        }
    }
}

/// Outcome of assigning one cycle's admitted requests.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub scheduled: Vec<ScheduledRequest>,
    pub to_resume: Vec<Worker>,
    /// New jobs in request order.
    pub to_create: Vec<JobSpec>,
    /// Requests whose algorithm has no usable template.
    pub unschedulable: Vec<AlgorithmRequest>,
    /// New jobs staged per algorithm.
    pub required: BTreeMap<AlgorithmName, u32>,
}

pub fn assign_requests(
    requests: &[AlgorithmRequest],
    pools: &mut WorkerPools,
    templates: &TemplateMap,
    config: &ExecutorConfig,
    jobs: &mut JobSpecFactory,
    now_ms: u64,
) -> Assignment {
    let mut out = Assignment::default();

    for request in requests {
        let name = &request.algorithm_name;

        if let Some(w) = take_worker(&mut pools.idle, name) {
            out.scheduled.push(scheduled(name, w.id, Supply::Idle));
            continue;
        }
        if let Some(w) = take_worker(&mut pools.pending, name) {
            out.scheduled.push(scheduled(name, w.id, Supply::Pending));
            continue;
        }
        if let Some(pos) = pools.ledger.iter().position(|e| e.algorithm_name == *name) {
            let entry = pools.ledger.remove(pos);
            out.scheduled.push(scheduled(name, entry.job_name, Supply::Ledger));
            continue;
        }
        if let Some(w) = take_worker(&mut pools.paused, name) {
            out.scheduled
                .push(scheduled(name, w.id.clone(), Supply::Paused));
            out.to_resume.push(w);
            continue;
        }

        let Some(template) = templates.get(name) else {
            warn!(algorithm = %name, "no template for requested algorithm");
            out.unschedulable.push(request.clone());
            continue;
        };
        match jobs.build(template, request, config, now_ms) {
            Ok(spec) => {
                debug!(algorithm = %name, job = %spec.name, hot = spec.hot_worker, "staged new job");
                *out.required.entry(name.clone()).or_default() += 1;
                out.to_create.push(spec);
            }
            Err(e) => {
                warn!(algorithm = %name, error = %e, "cannot build job spec");
                out.unschedulable.push(request.clone());
            }
        }
    }

    out
}

fn take_worker(pool: &mut Vec<Worker>, algorithm: &str) -> Option<Worker> {
    let pos = pool.iter().position(|w| w.algorithm_name == algorithm)?;
    Some(pool.remove(pos))
}

fn scheduled(algorithm: &str, worker_id: WorkerId, supply: Supply) -> ScheduledRequest {
    ScheduledRequest {
        algorithm_name: algorithm.to_string(),
        worker_id,
        supply,
    }
}
