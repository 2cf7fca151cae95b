//! Cycle orchestrator.
//!
//! A [`Reconciler`] owns the state that outlives a cycle (capacity
//! estimate, created-jobs ledger, unscheduled tracker) and runs one cycle
//! per call. Planning is synchronous and only touches that state and
//! per-cycle working copies of the input; the outbound calls happen after
//! all decisions are made.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use taskgrid_autoscale::{CapacityEstimator, limit_requests, slice_window};
use taskgrid_placement::{
    CreatedJob, SkippedJob, StopCandidate, cancel_against_resumes, find_workers_to_stop,
    match_jobs_to_resources, resources_to_free, trim_to_budget,
};
use taskgrid_state::{
    AlgorithmRequest, ClusterResources, JobRecord, PodRecord, PressureRatio, Resources,
    TemplateMap, Worker, WorkerRecord,
};

use crate::assign::{ScheduledRequest, WorkerPools, assign_requests};
use crate::backend::{Backends, SnapshotSource};
use crate::commands::{CommandKind, DispatchReport, Outbound, WorkerCommand, dispatch};
use crate::config::ExecutorConfig;
use crate::discovery::{
    DiscoverySnapshot, NodeStats, ReconcileResult, WorkerStats, node_stats, worker_stats,
};
use crate::error::ExecutorError;
use crate::job_spec::{ImageResolver, JobSpecFactory};
use crate::ledger::CreatedJobsLedger;
use crate::normalize::{
    ExitWorker, cool_down_workers, hot_requests, merge_workers, normalize_jobs,
    normalize_workers, version_mismatches, warm_up_workers,
};
use crate::tracker::{TrackerDelta, UnscheduledTracker};

/// Everything one cycle is computed from. Captured fresh per cycle and
/// never modified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleInput {
    pub templates: TemplateMap,
    /// Pending requests, highest priority first.
    pub requests: Vec<AlgorithmRequest>,
    pub workers: Vec<WorkerRecord>,
    pub jobs: Vec<JobRecord>,
    pub pods: Vec<PodRecord>,
    pub resources: ClusterResources,
}

/// Decisions of one cycle, before anything is sent.
#[derive(Debug, Clone, Default)]
pub struct CyclePlan {
    pub result: ReconcileResult,
    pub capacity: f64,
    pub pressure: PressureRatio,
    pub admitted: Vec<AlgorithmRequest>,
    pub scheduled: Vec<ScheduledRequest>,
    pub created: Vec<CreatedJob>,
    pub skipped: Vec<SkippedJob>,
    pub resources_to_free: Resources,
    pub stops: Vec<StopCandidate>,
    pub resumes: Vec<Worker>,
    pub exits: Vec<ExitWorker>,
    pub warm_up: Vec<Worker>,
    pub cool_down: Vec<Worker>,
    pub unscheduled: TrackerDelta,
    pub outbound: Vec<Outbound>,
    pub actual: WorkerStats,
    pub nodes: Vec<NodeStats>,
}

pub struct Reconciler {
    config: ExecutorConfig,
    capacity: CapacityEstimator,
    ledger: CreatedJobsLedger,
    tracker: UnscheduledTracker,
    jobs: JobSpecFactory,
    backends: Backends,
}

impl Reconciler {
    pub fn new(config: ExecutorConfig, backends: Backends) -> Self {
        Self {
            capacity: CapacityEstimator::new(config.capacity.clone()),
            ledger: CreatedJobsLedger::new(config.created_jobs_ttl_ms),
            tracker: UnscheduledTracker::new(config.scheduling_warning_timeout_ms),
            jobs: JobSpecFactory::new(),
            config,
            backends,
        }
    }

    /// Start from a given capacity estimate instead of the configured seed.
    pub fn with_capacity(mut self, value: f64) -> Self {
        self.capacity = CapacityEstimator::with_value(self.config.capacity.clone(), value);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn capacity(&self) -> f64 {
        self.capacity.current()
    }

    pub fn ledger(&self) -> &CreatedJobsLedger {
        &self.ledger
    }

    pub fn tracker(&self) -> &UnscheduledTracker {
        &self.tracker
    }

    /// Make every decision of one cycle without talking to any backend.
    pub fn plan(&mut self, input: &CycleInput, now_ms: u64) -> CyclePlan {
        let templates = &input.templates;
        self.ledger.expire(now_ms);

        // Normalize.
        let discovered = normalize_workers(&input.workers);
        let merged = merge_workers(
            discovered.clone(),
            normalize_jobs(&input.jobs, &input.pods),
        );
        let images = ImageResolver::new(&self.config);
        let exits = version_mismatches(&merged.workers, templates, &images);
        let exiting: HashSet<&str> = exits.iter().map(|e| e.worker.id.as_str()).collect();
        let mut live: Vec<Worker> = merged
            .workers
            .iter()
            .filter(|w| !exiting.contains(w.id.as_str()))
            .cloned()
            .collect();

        let warm_up = warm_up_workers(&live, templates);
        let cool_down = cool_down_workers(&live, templates);
        apply_hot_flags(&mut live, &warm_up, &cool_down);

        // Pressure is reported, never acted on.
        let pressure = input.resources.ratio();
        let thresholds = &self.config.pressure;
        let cpu_pressure = pressure.cpu > thresholds.cpu;
        let memory_pressure = pressure.memory > thresholds.memory;
        if cpu_pressure || memory_pressure {
            info!(
                cpu = pressure.cpu,
                memory = pressure.memory,
                cpu_pressure,
                memory_pressure,
                "cluster under resource pressure"
            );
        }

        // Capacity and fair share.
        let mut pools = WorkerPools::new(&live, merged.pending, self.ledger.entries());
        let idle_observed = count_by_algorithm(&pools.idle);
        let capacity = self
            .capacity
            .update(pools.idle.len() + pools.active.len() + self.ledger.len());

        let window = slice_window(&input.requests, capacity, self.capacity.config().window_factor);
        let mut candidates = hot_requests(templates);
        candidates.extend_from_slice(window);
        let cut = limit_requests(&candidates, capacity);
        debug!(
            capacity,
            window = candidates.len(),
            admitted = cut.admitted.len(),
            dropped = cut.dropped,
            "requests cut to fair share"
        );

        // Assign and match.
        let assignment = assign_requests(
            &cut.admitted,
            &mut pools,
            templates,
            &self.config,
            &mut self.jobs,
            now_ms,
        );
        let matched = match_jobs_to_resources(assignment.to_create, &input.resources, now_ms);
        self.ledger.record(&matched.created, now_ms);

        let unscheduled = self.tracker.update(
            &matched.created,
            &matched.skipped,
            &input.requests,
            templates,
            now_ms,
        );

        // Reclaim.
        let budget = resources_to_free(&matched.skipped);
        let stops = find_workers_to_stop(
            &matched.skipped,
            &pools.idle,
            &pools.active,
            templates,
            &self.config.defaults,
            &self.config.reclaim,
            now_ms,
        );
        let stops = trim_to_budget(stops, budget);
        let mut resumes = assignment.to_resume;
        let stops = cancel_against_resumes(stops, &mut resumes);

        let mut outbound: Vec<Outbound> = matched
            .created
            .iter()
            .map(|c| Outbound::CreateJob(c.spec.clone()))
            .collect();
        outbound.extend(exits.iter().map(|e| {
            Outbound::Command(
                WorkerCommand::for_worker(&e.worker, CommandKind::Exit).with_message(e.message.clone()),
            )
        }));
        let commands = [
            (CommandKind::WarmUp, warm_up.iter().collect::<Vec<_>>()),
            (CommandKind::CoolDown, cool_down.iter().collect()),
            (CommandKind::StopProcessing, stops.iter().map(|s| &s.worker).collect()),
            (CommandKind::StartProcessing, resumes.iter().collect()),
        ];
        for (kind, workers) in commands {
            outbound.extend(
                workers
                    .into_iter()
                    .map(|w| Outbound::Command(WorkerCommand::for_worker(w, kind))),
            );
        }

        // Results.
        let actual = worker_stats(&discovered);
        let mut result = ReconcileResult::new();
        for (name, n) in &assignment.required {
            result.entry(name.clone()).or_default().required = *n;
        }
        for (name, n) in &idle_observed {
            result.entry(name.clone()).or_default().idle = *n;
        }
        for c in &matched.created {
            result.entry(c.spec.algorithm_name.clone()).or_default().created += 1;
        }
        for s in &matched.skipped {
            result.entry(s.algorithm_name().to_string()).or_default().skipped += 1;
        }
        for r in &assignment.unschedulable {
            result.entry(r.algorithm_name.clone()).or_default().skipped += 1;
        }
        for s in &stops {
            result.entry(s.worker.algorithm_name.clone()).or_default().paused += 1;
        }
        for w in &resumes {
            result.entry(w.algorithm_name.clone()).or_default().resumed += 1;
        }
        for s in &actual.stats {
            result.entry(s.algorithm_name.clone()).or_default().active = s.count;
        }

        CyclePlan {
            result,
            capacity,
            pressure,
            admitted: cut.admitted,
            scheduled: assignment.scheduled,
            nodes: node_stats(&input.resources, &merged.workers),
            created: matched.created,
            skipped: matched.skipped,
            resources_to_free: budget,
            stops,
            resumes,
            exits,
            warm_up,
            cool_down,
            unscheduled,
            outbound,
            actual,
        }
    }

    /// Run one full cycle at `now_ms`: plan, sync alert events, dispatch,
    /// publish discovery.
    pub async fn reconcile_at(&mut self, input: &CycleInput, now_ms: u64) -> ReconcileResult {
        let plan = self.plan(input, now_ms);
        let unscheduled = self.sync_events(plan.unscheduled).await;

        if !plan.created.is_empty() {
            info!(count = plan.created.len(), "creating jobs");
        }
        let report = dispatch(plan.outbound, &self.backends).await;

        let snapshot = DiscoverySnapshot {
            reconcile_result: plan.result.clone(),
            actual: plan.actual,
            resource_pressure: self.config.pressure,
            nodes: plan.nodes,
            unscheduled,
            capacity: plan.capacity,
            resources_to_free: plan.resources_to_free,
            timestamp: now_ms,
        };
        if let Err(e) = self.backends.discovery.update_discovery(&snapshot).await {
            warn!(error = %e, "failed to publish discovery snapshot");
        }

        log_cycle(&plan.result, report);
        plan.result
    }

    pub async fn reconcile(&mut self, input: &CycleInput) -> ReconcileResult {
        self.reconcile_at(input, epoch_millis()).await
    }

    /// Reconcile every `interval_ms` until `shutdown` changes.
    pub async fn run(
        &mut self,
        source: Arc<dyn SnapshotSource>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let interval = self.config.interval();
        info!(interval_ms = self.config.interval_ms, "reconciler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match source.fetch().await {
                        Ok(input) => {
                            self.reconcile(&input).await;
                        }
                        Err(e) => {
                            let e = ExecutorError::Snapshot(e);
                            error!(error = %e, "skipping cycle");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    /// Delete events of resolved entries and create events for newly
    /// notified ones. Returns the delta with the ids that were assigned.
    async fn sync_events(&mut self, mut delta: TrackerDelta) -> TrackerDelta {
        let events = Arc::clone(&self.backends.events);

        let removals = join_all(delta.removed.iter().map(|r| events.remove_event(r))).await;
        for (removed, result) in delta.removed.iter().zip(removals) {
            if let Err(e) = result {
                warn!(algorithm = %removed.algorithm_name, event = %removed.event_id, error = %e, "failed to remove event");
            }
        }

        let additions = join_all(delta.added.iter().map(|a| events.add_event(a))).await;
        for (added, result) in delta.added.iter_mut().zip(additions) {
            match result {
                Ok(event_id) => {
                    self.tracker.record_event_id(&added.algorithm_name, event_id.clone());
                    added.event_id = Some(event_id);
                }
                Err(e) => {
                    warn!(algorithm = %added.algorithm_name, error = %e, "failed to add event");
                    self.tracker.reset_notification(&added.algorithm_name);
                }
            }
        }
        delta
    }
}

fn apply_hot_flags(workers: &mut [Worker], warm_up: &[Worker], cool_down: &[Worker]) {
    let warm: HashSet<&str> = warm_up.iter().map(|w| w.id.as_str()).collect();
    let cool: HashSet<&str> = cool_down.iter().map(|w| w.id.as_str()).collect();
    for w in workers {
        if warm.contains(w.id.as_str()) {
            w.hot = true;
        } else if cool.contains(w.id.as_str()) {
            w.hot = false;
        }
    }
}

fn count_by_algorithm(workers: &[Worker]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for w in workers {
        *counts.entry(w.algorithm_name.clone()).or_default() += 1;
    }
    counts
}

fn log_cycle(result: &ReconcileResult, report: DispatchReport) {
    for (algorithm, r) in result {
        if r.required + r.created + r.skipped + r.paused + r.resumed == 0 {
            continue;
        }
        debug!(
            algorithm = %algorithm,
            required = r.required,
            idle = r.idle,
            created = r.created,
            skipped = r.skipped,
            paused = r.paused,
            resumed = r.resumed,
            active = r.active,
            "cycle result"
        );
    }
    if report.failed > 0 {
        warn!(failed = report.failed, succeeded = report.succeeded, "some outbound items failed");
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
