//! Resource matcher — first-fit of staged jobs against node headroom.
//!
//! Jobs are processed in the order they were staged, which is the order of
//! the admitted requests. Each job goes to the first node (in snapshot
//! order) whose labels satisfy its node selector and whose free cpu, gpu
//! and memory cover the algorithm's requests. The node's requests are bumped
//! immediately so later jobs see the reduced headroom.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskgrid_state::{AlgorithmName, ClusterResources, JobSpec, NodeResources, Resources};

/// Why a staged job could not be placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkipWarning {
    pub algorithm_name: AlgorithmName,
    /// Always `failedScheduling`.
    pub reason: String,
    pub message: String,
    /// Unix timestamp (ms) of the first skip.
    pub timestamp: u64,
    /// The job would not fit even on an otherwise idle cluster.
    pub has_max_capacity: bool,
    pub required: Resources,
    /// Nodes whose labels satisfy the selector.
    pub candidate_nodes: usize,
}

/// A staged job with a reservation on `node_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedJob {
    pub spec: JobSpec,
    pub node_name: String,
}

/// A staged job that found no headroom.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedJob {
    pub spec: JobSpec,
    pub warning: SkipWarning,
}

impl SkippedJob {
    pub fn algorithm_name(&self) -> &str {
        &self.spec.algorithm_name
    }

    pub fn resources(&self) -> Resources {
        self.spec.algorithm_resources
    }
}

/// Staged jobs partitioned by whether they fit.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub created: Vec<CreatedJob>,
    pub skipped: Vec<SkippedJob>,
    /// Node picture after provisional reservations.
    pub nodes: Vec<NodeResources>,
}

/// Partition `jobs` into those that fit current headroom and those that
/// do not. `cluster` is not modified; reservations land on a working copy
/// returned in [`MatchOutcome::nodes`].
pub fn match_jobs_to_resources(
    jobs: Vec<JobSpec>,
    cluster: &ClusterResources,
    now_ms: u64,
) -> MatchOutcome {
    let mut nodes = cluster.nodes.clone();
    let mut created = Vec::new();
    let mut skipped = Vec::new();

    for spec in jobs {
        let required = spec.algorithm_resources;
        let slot = nodes
            .iter_mut()
            .find(|n| n.matches_selector(&spec.node_selector) && required.fits_within(&n.free()));

        match slot {
            Some(node) => {
                node.reserve(&required);
                debug!(
                    algorithm = %spec.algorithm_name,
                    node = %node.name,
                    cpu = required.cpu,
                    mem = required.mem,
                    gpu = required.gpu,
                    "reserved headroom"
                );
                created.push(CreatedJob {
                    node_name: node.name.clone(),
                    spec,
                });
            }
            None => {
                let warning = build_warning(&spec, &nodes, now_ms);
                warn!(
                    algorithm = %spec.algorithm_name,
                    has_max_capacity = warning.has_max_capacity,
                    message = %warning.message,
                    "no node has headroom for job"
                );
                skipped.push(SkippedJob { spec, warning });
            }
        }
    }

    MatchOutcome {
        created,
        skipped,
        nodes,
    }
}

fn build_warning(spec: &JobSpec, nodes: &[NodeResources], now_ms: u64) -> SkipWarning {
    let required = spec.algorithm_resources;
    let candidates: Vec<&NodeResources> = nodes
        .iter()
        .filter(|n| n.matches_selector(&spec.node_selector))
        .collect();

    let (has_max_capacity, message) = if candidates.is_empty() {
        (
            true,
            format!(
                "no nodes match node selector {}",
                describe_selector(spec)
            ),
        )
    } else {
        let never_fits = candidates
            .iter()
            .all(|n| !required.fits_within(&n.max_for_workers()));
        if never_fits {
            let short = tally(candidates.iter().map(|n| required.lacking(&n.max_for_workers())));
            (true, format!("maximum capacity exceeded {short}"))
        } else {
            let short = tally(candidates.iter().map(|n| required.lacking(&n.free())));
            (false, format!("insufficient {short}"))
        }
    };

    SkipWarning {
        algorithm_name: spec.algorithm_name.clone(),
        reason: "failedScheduling".to_string(),
        message,
        timestamp: now_ms,
        has_max_capacity,
        required,
        candidate_nodes: candidates.len(),
    }
}

/// `cpu (2), mem (1)` — how many nodes lack each resource.
fn tally<I>(per_node: I) -> String
where
    I: Iterator<Item = Vec<&'static str>>,
{
    let mut counts = [("cpu", 0usize), ("gpu", 0), ("mem", 0)];
    for lacking in per_node {
        for dim in lacking {
            if let Some(entry) = counts.iter_mut().find(|(name, _)| *name == dim) {
                entry.1 += 1;
            }
        }
    }
    counts
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(name, n)| format!("{name} ({n})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_selector(spec: &JobSpec) -> String {
    let mut pairs: Vec<String> = spec
        .node_selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort();
    pairs.join(",")
}
