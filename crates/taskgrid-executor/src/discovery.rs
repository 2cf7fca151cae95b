//! Per-cycle result map and the discovery snapshot published after dispatch.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use taskgrid_state::{AlgorithmName, ClusterResources, Resources, Worker};

use crate::config::PressureThresholds;
use crate::tracker::TrackerDelta;

/// What one cycle decided for one algorithm.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlgorithmResult {
    /// New jobs staged.
    pub required: u32,
    /// Idle workers observed at the start of the cycle.
    pub idle: u32,
    /// Stop-processing commands issued.
    pub paused: u32,
    pub created: u32,
    pub skipped: u32,
    pub resumed: u32,
    /// Live workers reported through discovery.
    pub active: u32,
}

/// Per-algorithm results of one cycle, rebuilt every cycle.
pub type ReconcileResult = BTreeMap<AlgorithmName, AlgorithmResult>;

/// Worker counts of one algorithm.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmStats {
    pub algorithm_name: AlgorithmName,
    pub count: u32,
    /// Count per status (`ready`, `working`, ...).
    pub by_status: BTreeMap<String, u32>,
    pub hot: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerStats {
    pub stats: Vec<AlgorithmStats>,
    pub total: u32,
}

pub fn worker_stats<'a>(workers: impl IntoIterator<Item = &'a Worker>) -> WorkerStats {
    let mut per_algorithm: BTreeMap<&str, AlgorithmStats> = BTreeMap::new();
    let mut total = 0;
    for w in workers {
        total += 1;
        let s = per_algorithm
            .entry(w.algorithm_name.as_str())
            .or_insert_with(|| AlgorithmStats {
                algorithm_name: w.algorithm_name.clone(),
                ..Default::default()
            });
        s.count += 1;
        *s.by_status.entry(w.status.as_str().to_string()).or_default() += 1;
        if w.hot {
            s.hot += 1;
        }
    }
    WorkerStats {
        stats: per_algorithm.into_values().collect(),
        total,
    }
}

/// Resource picture of one node plus the workers running on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStats {
    pub name: String,
    pub total: Resources,
    pub requests: Resources,
    pub other: Resources,
    pub workers_total: Resources,
    pub labels: HashMap<String, String>,
    pub workers: WorkerStats,
}

pub fn node_stats(cluster: &ClusterResources, workers: &[Worker]) -> Vec<NodeStats> {
    cluster
        .nodes
        .iter()
        .map(|n| NodeStats {
            name: n.name.clone(),
            total: n.total,
            requests: n.requests,
            other: n.other,
            workers_total: n.workers_total,
            labels: n.labels.clone(),
            workers: worker_stats(workers.iter().filter(|w| w.node_name() == Some(n.name.as_str()))),
        })
        .collect()
}

/// Everything the executor publishes after a cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySnapshot {
    pub reconcile_result: ReconcileResult,
    pub actual: WorkerStats,
    pub resource_pressure: PressureThresholds,
    pub nodes: Vec<NodeStats>,
    pub unscheduled: TrackerDelta,
    pub capacity: f64,
    pub resources_to_free: Resources,
    /// Unix timestamp (ms) of the cycle.
    pub timestamp: u64,
}
