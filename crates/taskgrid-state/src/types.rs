//! Domain types for the TaskGrid task executor.
//!
//! Raw records (`WorkerRecord`, `JobRecord`, `PodRecord`) mirror what the
//! discovery feed and the cluster API report. `Worker` is the canonical view
//! the reconciler derives from them each cycle. Everything is serializable
//! to/from JSON so cycle inputs can be captured and replayed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::resources::{Resources, parse_memory_mib};

/// Name of an algorithm (the key of its template).
pub type AlgorithmName = String;

/// Unique identifier of a worker.
pub type WorkerId = String;

/// Algorithm templates keyed by algorithm name.
pub type TemplateMap = HashMap<AlgorithmName, AlgorithmTemplate>;

// ── Requests ──────────────────────────────────────────────────────

/// A pending algorithm-execution request.
///
/// Requests always travel as an ordered sequence: earlier entries have
/// priority over later ones, and no stage may reorder them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmRequest {
    pub algorithm_name: AlgorithmName,
    #[serde(default)]
    pub hot_worker: bool,
    /// Unix timestamp (ms) when the request entered the queue.
    #[serde(default)]
    pub enqueued_at: u64,
}

impl AlgorithmRequest {
    pub fn new(algorithm_name: &str) -> Self {
        Self {
            algorithm_name: algorithm_name.to_string(),
            hot_worker: false,
            enqueued_at: 0,
        }
    }

    /// A synthetic request that keeps a hot worker alive.
    pub fn hot(algorithm_name: &str) -> Self {
        Self {
            hot_worker: true,
            ..Self::new(algorithm_name)
        }
    }
}

// ── Raw records ───────────────────────────────────────────────────

/// Lifecycle status a worker reports through discovery.
///
/// Workers may report statuses this crate does not know about (`busy`,
/// `bootstrap`, ...). Those are kept verbatim in `Other` and count as not
/// ready.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkerStatus {
    Init,
    Ready,
    Working,
    Exit,
    Other(String),
}

impl WorkerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkerStatus::Init => "init",
            WorkerStatus::Ready => "ready",
            WorkerStatus::Working => "working",
            WorkerStatus::Exit => "exit",
            WorkerStatus::Other(status) => status,
        }
    }
}

impl From<String> for WorkerStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "init" => WorkerStatus::Init,
            "ready" => WorkerStatus::Ready,
            "working" => WorkerStatus::Working,
            "exit" => WorkerStatus::Exit,
            _ => WorkerStatus::Other(status),
        }
    }
}

impl From<WorkerStatus> for String {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

/// A worker as published by the worker itself in the discovery store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRecord {
    pub worker_id: WorkerId,
    pub algorithm_name: AlgorithmName,
    pub pod_name: String,
    pub worker_status: WorkerStatus,
    #[serde(default)]
    pub worker_paused: bool,
    #[serde(default)]
    pub hot_worker: bool,
    /// Algorithm image the worker was started with.
    #[serde(default)]
    pub algorithm_image: Option<String>,
    /// Worker image the worker was started with.
    #[serde(default)]
    pub worker_image: Option<String>,
}

/// A cluster job as listed by the cluster API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub name: String,
    pub algorithm_name: AlgorithmName,
    /// Unix timestamp (ms) when the job started.
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub failed: bool,
}

/// A pod as listed by the cluster API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodRecord {
    pub name: String,
    pub job_name: String,
    #[serde(default)]
    pub node_name: Option<String>,
}

// ── Canonical worker ──────────────────────────────────────────────

/// The cluster job backing a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRef {
    pub job_name: String,
    pub pod_name: Option<String>,
    pub node_name: Option<String>,
    /// Unix timestamp (ms) when the job started.
    pub start_time: u64,
}

/// Canonical worker, merged from discovery and cluster records.
///
/// A job without a discovery record becomes a worker in `Init` status with
/// the job name as id (a *pending* worker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: WorkerId,
    pub algorithm_name: AlgorithmName,
    pub status: WorkerStatus,
    pub paused: bool,
    pub hot: bool,
    pub job: Option<JobRef>,
    pub pod_name: Option<String>,
    pub algorithm_image: Option<String>,
    pub worker_image: Option<String>,
}

impl Worker {
    /// Ready and accepting work.
    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Ready && !self.paused
    }

    /// Doing (or preparing to do) work.
    pub fn is_active(&self) -> bool {
        self.status != WorkerStatus::Ready && !self.paused
    }

    /// Ready but told to stop processing.
    pub fn is_paused(&self) -> bool {
        self.status == WorkerStatus::Ready && self.paused
    }

    /// Milliseconds since the backing job started, if known.
    pub fn age_ms(&self, now_ms: u64) -> Option<u64> {
        self.job.as_ref().map(|j| now_ms.saturating_sub(j.start_time))
    }

    pub fn node_name(&self) -> Option<&str> {
        self.job.as_ref().and_then(|j| j.node_name.as_deref())
    }
}

impl From<WorkerRecord> for Worker {
    fn from(r: WorkerRecord) -> Self {
        Worker {
            id: r.worker_id,
            algorithm_name: r.algorithm_name,
            status: r.worker_status,
            paused: r.worker_paused,
            hot: r.hot_worker,
            job: None,
            pod_name: Some(r.pod_name),
            algorithm_image: r.algorithm_image,
            worker_image: r.worker_image,
        }
    }
}

// ── Templates ─────────────────────────────────────────────────────

/// Resource requests as written in templates and config. Unset fields fall
/// back to a default spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: Option<f64>,
    #[serde(default)]
    pub gpu: Option<f64>,
    /// Memory quantity, e.g. `"256Mi"`.
    #[serde(default)]
    pub mem: Option<String>,
}

impl ResourceSpec {
    pub fn new(cpu: f64, gpu: f64, mem: &str) -> Self {
        Self {
            cpu: Some(cpu),
            gpu: Some(gpu),
            mem: Some(mem.to_string()),
        }
    }

    /// Resolve into concrete quantities, filling gaps from `fallback`.
    pub fn resolve(&self, fallback: &ResourceSpec) -> StateResult<Resources> {
        let cpu = self.cpu.or(fallback.cpu).unwrap_or(0.0);
        let gpu = self.gpu.or(fallback.gpu).unwrap_or(0.0);
        let mem = match self.mem.as_deref().or(fallback.mem.as_deref()) {
            Some(q) => parse_memory_mib(q)?,
            None => 0.0,
        };

        for (field, value) in [("cpu", cpu), ("gpu", gpu), ("mem", mem)] {
            if value < 0.0 || !value.is_finite() {
                return Err(StateError::InvalidResource { field, value });
            }
        }
        Ok(Resources { cpu, gpu, mem })
    }
}

/// A volume mounted into the algorithm container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mount {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AlgorithmOptions {
    /// Debug algorithms are run by hand and never reclaimed.
    #[serde(default)]
    pub debug: bool,
}

/// How to run an algorithm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AlgorithmTemplate {
    pub name: AlgorithmName,
    pub algorithm_image: String,
    /// Overrides the default worker image.
    #[serde(default)]
    pub worker_image: Option<String>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub algorithm_env: HashMap<String, String>,
    #[serde(default)]
    pub worker_env: HashMap<String, String>,
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub options: AlgorithmOptions,
    /// Number of workers kept warm even without demand.
    #[serde(default)]
    pub min_hot_workers: u32,
}

impl AlgorithmTemplate {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            algorithm_image: image.to_string(),
            ..Default::default()
        }
    }

    /// Resource footprint of one algorithm container.
    pub fn resources(&self, defaults: &ResourceSpec) -> StateResult<Resources> {
        self.resources.resolve(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: WorkerStatus, paused: bool) -> WorkerRecord {
        WorkerRecord {
            worker_id: id.to_string(),
            algorithm_name: "green".to_string(),
            pod_name: format!("pod-{id}"),
            worker_status: status,
            worker_paused: paused,
            hot_worker: false,
            algorithm_image: None,
            worker_image: None,
        }
    }

    #[test]
    fn worker_pools_are_mutually_exclusive() {
        let cases = [
            (WorkerStatus::Ready, false),
            (WorkerStatus::Ready, true),
            (WorkerStatus::Working, false),
            (WorkerStatus::Init, false),
            (WorkerStatus::Exit, false),
            (WorkerStatus::Other("busy".to_string()), false),
        ];
        for (status, paused) in cases {
            let w = Worker::from(record("w1", status.clone(), paused));
            let hits = [w.is_idle(), w.is_active(), w.is_paused()]
                .iter()
                .filter(|b| **b)
                .count();
            assert_eq!(hits, 1, "{status:?} paused={paused}");
        }
    }

    #[test]
    fn unknown_status_is_kept_and_counts_as_active() {
        for raw in ["busy", "exited", "stop", "bootstrap"] {
            let rec: WorkerRecord = serde_json::from_value(serde_json::json!({
                "worker_id": "w1",
                "algorithm_name": "green",
                "pod_name": "pod-w1",
                "worker_status": raw,
            }))
            .unwrap();
            assert_eq!(rec.worker_status, WorkerStatus::Other(raw.to_string()));
            assert_eq!(rec.worker_status.as_str(), raw);

            let w = Worker::from(rec);
            assert!(w.is_active() && !w.is_idle() && !w.is_paused());
        }
    }

    #[test]
    fn known_status_round_trips_as_plain_string() {
        let json = serde_json::to_value(WorkerStatus::Working).unwrap();
        assert_eq!(json, serde_json::json!("working"));
        let back: WorkerStatus = serde_json::from_value(serde_json::json!("ready")).unwrap();
        assert_eq!(back, WorkerStatus::Ready);
    }

    #[test]
    fn paused_and_not_ready_belongs_nowhere() {
        let w = Worker::from(record("w1", WorkerStatus::Working, true));
        assert!(!w.is_idle() && !w.is_active() && !w.is_paused());
    }

    #[test]
    fn age_requires_job() {
        let mut w = Worker::from(record("w1", WorkerStatus::Ready, false));
        assert_eq!(w.age_ms(10_000), None);

        w.job = Some(JobRef {
            job_name: "job-1".to_string(),
            pod_name: None,
            node_name: Some("node-a".to_string()),
            start_time: 4_000,
        });
        assert_eq!(w.age_ms(10_000), Some(6_000));
        assert_eq!(w.node_name(), Some("node-a"));
    }

    #[test]
    fn template_resources_fall_back_to_defaults() {
        let mut t = AlgorithmTemplate::new("green", "green-alg");
        t.resources.cpu = Some(2.0);

        let defaults = ResourceSpec::new(0.5, 0.0, "256Mi");
        let r = t.resources(&defaults).unwrap();
        assert_eq!(r, Resources::new(2.0, 0.0, 256.0));
    }

    #[test]
    fn negative_resources_are_rejected() {
        let spec = ResourceSpec {
            cpu: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            spec.resolve(&ResourceSpec::default()),
            Err(StateError::InvalidResource { field: "cpu", .. })
        ));
    }

    #[test]
    fn template_deserializes_with_defaults() {
        let json = r#"{"name":"green","algorithm_image":"green-alg"}"#;
        let t: AlgorithmTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(t.min_hot_workers, 0);
        assert!(!t.options.debug);
        assert!(t.node_selector.is_empty());
    }
}
