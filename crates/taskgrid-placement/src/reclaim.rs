//! Worker reclaimer — choose workers to stop so skipped jobs can fit later.
//!
//! Runs only when the matcher skipped something. Each skipped algorithm gets
//! a weight from the positions of its skips: a skip at `index` out of `N`
//! contributes `(N - index)^exponent`, so algorithms with many or early
//! skips are served first while the sub-linear exponent keeps one starved
//! algorithm from taking every reclaimed worker.
//!
//! Candidates come from one shared pool, in this order:
//!
//! ```text
//! idle workers
//! active workers of algorithms that were not skipped
//! active workers of skipped algorithms
//! ```
//!
//! Hot workers, debug algorithms and workers younger than the minimum stop
//! age never enter the pool.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use taskgrid_state::{AlgorithmName, ResourceSpec, Resources, TemplateMap, Worker};

use crate::matcher::SkippedJob;

/// Tuning for reclamation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReclaimConfig {
    /// Exponent applied to skip positions when weighting algorithms.
    pub weight_exponent: f64,
    /// Workers younger than this are never stopped.
    pub min_age_for_stop_ms: u64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            weight_exponent: 0.7,
            min_age_for_stop_ms: 10_000,
        }
    }
}

/// Outstanding resource need of one skipped algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Deficit {
    pub algorithm_name: AlgorithmName,
    pub weight: f64,
    pub resources: Resources,
    /// Position of the algorithm's first skip.
    pub first_index: usize,
}

/// A worker picked to stop processing.
#[derive(Debug, Clone, PartialEq)]
pub struct StopCandidate {
    pub worker: Worker,
    /// Requests freed by stopping the worker.
    pub resources: Resources,
    /// The skipped algorithm this worker is reclaimed for.
    pub reclaimed_for: AlgorithmName,
}

/// Aggregate resources the skipped jobs are missing.
pub fn resources_to_free(skipped: &[SkippedJob]) -> Resources {
    skipped.iter().map(SkippedJob::resources).sum()
}

/// Per-algorithm deficits, heaviest first. Ties keep first-skip order.
pub fn deficits(skipped: &[SkippedJob], exponent: f64) -> Vec<Deficit> {
    let n = skipped.len();
    let mut out: Vec<Deficit> = Vec::new();

    for (index, s) in skipped.iter().enumerate() {
        let contribution = ((n - index) as f64).powf(exponent);
        match out.iter_mut().find(|d| d.algorithm_name == s.algorithm_name()) {
            Some(d) => {
                d.weight += contribution;
                d.resources += s.resources();
            }
            None => out.push(Deficit {
                algorithm_name: s.algorithm_name().to_string(),
                weight: contribution,
                resources: s.resources(),
                first_index: index,
            }),
        }
    }

    out.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_index.cmp(&b.first_index))
    });
    out
}

/// Whether `worker` may be stopped automatically.
///
/// Idle workers need a known age; active workers without job info are
/// allowed through.
pub fn is_stop_eligible(worker: &Worker, now_ms: u64, min_age_ms: u64) -> bool {
    if worker.hot {
        return false;
    }
    match worker.age_ms(now_ms) {
        Some(age) => age >= min_age_ms,
        None => !worker.is_idle(),
    }
}

/// Pick workers to stop so the skipped jobs can be placed next cycle.
pub fn find_workers_to_stop(
    skipped: &[SkippedJob],
    idle: &[Worker],
    active: &[Worker],
    templates: &TemplateMap,
    defaults: &ResourceSpec,
    config: &ReclaimConfig,
    now_ms: u64,
) -> Vec<StopCandidate> {
    if skipped.is_empty() {
        return Vec::new();
    }

    let deficits = deficits(skipped, config.weight_exponent);
    let is_skipped = |w: &Worker| deficits.iter().any(|d| d.algorithm_name == w.algorithm_name);
    let eligible = |w: &&Worker| {
        is_stop_eligible(w, now_ms, config.min_age_for_stop_ms)
            && !templates
                .get(&w.algorithm_name)
                .is_some_and(|t| t.options.debug)
    };

    let mut pool: VecDeque<(Worker, Resources)> = idle
        .iter()
        .filter(eligible)
        .chain(active.iter().filter(eligible).filter(|w| !is_skipped(*w)))
        .chain(active.iter().filter(eligible).filter(|w| is_skipped(*w)))
        .filter_map(|w| footprint(w, templates, defaults).map(|r| (w.clone(), r)))
        .collect();

    let mut stops = Vec::new();
    for deficit in &deficits {
        let mut outstanding = deficit.resources;
        while outstanding.is_positive() {
            let Some(pos) = pool.iter().position(|(_, r)| frees_needed(r, &outstanding)) else {
                break;
            };
            let Some((worker, resources)) = pool.remove(pos) else {
                break;
            };
            outstanding -= resources;
            debug!(
                worker = %worker.id,
                algorithm = %worker.algorithm_name,
                reclaimed_for = %deficit.algorithm_name,
                weight = deficit.weight,
                "selected worker to stop"
            );
            stops.push(StopCandidate {
                worker,
                resources,
                reclaimed_for: deficit.algorithm_name.clone(),
            });
        }
    }

    if !stops.is_empty() {
        info!(
            skipped = skipped.len(),
            stopping = stops.len(),
            "reclaiming workers for skipped algorithms"
        );
    }
    stops
}

/// Keep stops only until `budget` is covered.
pub fn trim_to_budget(stops: Vec<StopCandidate>, budget: Resources) -> Vec<StopCandidate> {
    let mut remaining = budget;
    let mut out = Vec::with_capacity(stops.len());
    for stop in stops {
        if !remaining.is_positive() {
            break;
        }
        remaining -= stop.resources;
        out.push(stop);
    }
    out
}

/// Drop stops that a resume of the same algorithm makes pointless.
///
/// For every stop whose algorithm also has a pending resume, both the stop
/// and one matching resume are removed.
pub fn cancel_against_resumes(
    stops: Vec<StopCandidate>,
    resumes: &mut Vec<Worker>,
) -> Vec<StopCandidate> {
    let mut kept = Vec::with_capacity(stops.len());
    for stop in stops {
        match resumes
            .iter()
            .position(|r| r.algorithm_name == stop.worker.algorithm_name)
        {
            Some(i) => {
                let resumed = resumes.remove(i);
                debug!(
                    algorithm = %stop.worker.algorithm_name,
                    stop = %stop.worker.id,
                    resume = %resumed.id,
                    "stop and resume cancel out"
                );
            }
            None => kept.push(stop),
        }
    }
    kept
}

fn footprint(worker: &Worker, templates: &TemplateMap, defaults: &ResourceSpec) -> Option<Resources> {
    let resolved = match templates.get(&worker.algorithm_name) {
        Some(t) => t.resources(defaults),
        None => ResourceSpec::default().resolve(defaults),
    };
    resolved.ok()
}

/// True if `freed` reduces a dimension that is still outstanding.
fn frees_needed(freed: &Resources, outstanding: &Resources) -> bool {
    (outstanding.cpu > 0.0 && freed.cpu > 0.0)
        || (outstanding.gpu > 0.0 && freed.gpu > 0.0)
        || (outstanding.mem > 0.0 && freed.mem > 0.0)
}
