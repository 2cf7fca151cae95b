//! Normalization of raw discovery and cluster records.
//!
//! Turns the per-cycle raw snapshot into canonical workers, finds workers
//! that must exit because their images are stale, and derives hot-worker
//! demand and warm-up/cool-down sets from templates.

use std::collections::{BTreeMap, HashMap};

use taskgrid_state::{
    AlgorithmName, AlgorithmRequest, JobRecord, JobRef, PodRecord, TemplateMap, Worker,
    WorkerRecord, WorkerStatus,
};

use crate::job_spec::ImageResolver;

/// A live cluster job joined with its pod.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveJob {
    pub algorithm_name: AlgorithmName,
    pub job: JobRef,
}

/// Workers after merging discovery records with cluster jobs.
#[derive(Debug, Clone, Default)]
pub struct MergedWorkers {
    /// Workers with a discovery record (job attached when known).
    pub workers: Vec<Worker>,
    /// Jobs with no discovery record yet.
    pub pending: Vec<Worker>,
}

/// A worker that must exit, with the reason sent along.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitWorker {
    pub worker: Worker,
    pub message: String,
}

pub fn normalize_workers(records: &[WorkerRecord]) -> Vec<Worker> {
    records.iter().cloned().map(Worker::from).collect()
}

/// Keep jobs that neither succeeded nor failed, joined to their pod.
pub fn normalize_jobs(jobs: &[JobRecord], pods: &[PodRecord]) -> Vec<LiveJob> {
    let pods_by_job: HashMap<&str, &PodRecord> =
        pods.iter().map(|p| (p.job_name.as_str(), p)).collect();

    jobs.iter()
        .filter(|j| !j.succeeded && !j.failed)
        .map(|j| {
            let pod = pods_by_job.get(j.name.as_str());
            LiveJob {
                algorithm_name: j.algorithm_name.clone(),
                job: JobRef {
                    job_name: j.name.clone(),
                    pod_name: pod.map(|p| p.name.clone()),
                    node_name: pod.and_then(|p| p.node_name.clone()),
                    start_time: j.start_time,
                },
            }
        })
        .collect()
}

/// Attach jobs to workers by pod name; leftover jobs become pending workers.
pub fn merge_workers(workers: Vec<Worker>, jobs: Vec<LiveJob>) -> MergedWorkers {
    let mut jobs: Vec<Option<LiveJob>> = jobs.into_iter().map(Some).collect();

    let workers = workers
        .into_iter()
        .map(|mut w| {
            let matched = jobs.iter_mut().find(|slot| {
                slot.as_ref().is_some_and(|j| {
                    j.job.pod_name.is_some() && j.job.pod_name == w.pod_name
                })
            });
            if let Some(slot) = matched {
                w.job = slot.take().map(|j| j.job);
            }
            w
        })
        .collect();

    let pending = jobs
        .into_iter()
        .flatten()
        .map(|j| Worker {
            id: j.job.job_name.clone(),
            algorithm_name: j.algorithm_name,
            status: WorkerStatus::Init,
            paused: false,
            hot: false,
            pod_name: j.job.pod_name.clone(),
            job: Some(j.job),
            algorithm_image: None,
            worker_image: None,
        })
        .collect();

    MergedWorkers { workers, pending }
}

/// Workers running an image other than the one their template resolves to.
pub fn version_mismatches(
    workers: &[Worker],
    templates: &TemplateMap,
    images: &ImageResolver<'_>,
) -> Vec<ExitWorker> {
    workers
        .iter()
        .filter_map(|w| {
            let template = templates.get(&w.algorithm_name)?;
            let message = if w
                .algorithm_image
                .as_ref()
                .is_some_and(|img| *img != images.algorithm_image(template))
            {
                "algorithm image changed"
            } else if w
                .worker_image
                .as_ref()
                .is_some_and(|img| *img != images.worker_image(template))
            {
                "worker image changed"
            } else {
                return None;
            };
            Some(ExitWorker {
                worker: w.clone(),
                message: message.to_string(),
            })
        })
        .collect()
}

/// Synthetic requests that keep `min_hot_workers` per algorithm alive.
///
/// Returned in algorithm-name order; callers place them ahead of the
/// regular backlog.
pub fn hot_requests(templates: &TemplateMap) -> Vec<AlgorithmRequest> {
    let ordered: BTreeMap<&str, u32> = templates
        .values()
        .filter(|t| t.min_hot_workers > 0)
        .map(|t| (t.name.as_str(), t.min_hot_workers))
        .collect();

    ordered
        .into_iter()
        .flat_map(|(name, n)| std::iter::repeat_n(AlgorithmRequest::hot(name), n as usize))
        .collect()
}

/// Non-hot workers to promote so each algorithm reaches `min_hot_workers`.
pub fn warm_up_workers(workers: &[Worker], templates: &TemplateMap) -> Vec<Worker> {
    let mut out = Vec::new();
    for (name, group) in by_algorithm(workers) {
        let Some(template) = templates.get(name) else {
            continue;
        };
        let hot = group.iter().filter(|w| w.hot).count();
        let missing = (template.min_hot_workers as usize).saturating_sub(hot);
        out.extend(
            group
                .into_iter()
                .filter(|w| !w.hot)
                .take(missing)
                .cloned(),
        );
    }
    out
}

/// Hot workers beyond what the template asks for.
pub fn cool_down_workers(workers: &[Worker], templates: &TemplateMap) -> Vec<Worker> {
    let mut out = Vec::new();
    for (name, group) in by_algorithm(workers) {
        let wanted = templates
            .get(name)
            .map_or(0, |t| t.min_hot_workers as usize);
        let hot = group.iter().filter(|w| w.hot).count();
        let excess = hot.saturating_sub(wanted);
        out.extend(group.into_iter().filter(|w| w.hot).take(excess).cloned());
    }
    out
}

fn by_algorithm(workers: &[Worker]) -> BTreeMap<&str, Vec<&Worker>> {
    let mut groups: BTreeMap<&str, Vec<&Worker>> = BTreeMap::new();
    for w in workers {
        groups.entry(w.algorithm_name.as_str()).or_default().push(w);
    }
    groups
}
