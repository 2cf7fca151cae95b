//! Resource quantities and the per-node resource picture.

use std::collections::HashMap;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

const MIB: f64 = 1024.0 * 1024.0;

/// A cpu/gpu/memory triple. Memory is in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub gpu: f64,
    #[serde(default)]
    pub mem: f64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        cpu: 0.0,
        gpu: 0.0,
        mem: 0.0,
    };

    pub fn new(cpu: f64, gpu: f64, mem: f64) -> Self {
        Self { cpu, gpu, mem }
    }

    /// True if every dimension of `self` fits inside `available`.
    pub fn fits_within(&self, available: &Resources) -> bool {
        self.cpu <= available.cpu && self.gpu <= available.gpu && self.mem <= available.mem
    }

    /// True if any dimension is still above zero.
    pub fn is_positive(&self) -> bool {
        self.cpu > 0.0 || self.gpu > 0.0 || self.mem > 0.0
    }

    /// Subtract, flooring every dimension at zero.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu: (self.cpu - other.cpu).max(0.0),
            gpu: (self.gpu - other.gpu).max(0.0),
            mem: (self.mem - other.mem).max(0.0),
        }
    }

    /// Names of the dimensions where `self` exceeds `available`.
    pub fn lacking(&self, available: &Resources) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.cpu > available.cpu {
            out.push("cpu");
        }
        if self.gpu > available.gpu {
            out.push("gpu");
        }
        if self.mem > available.mem {
            out.push("mem");
        }
        out
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpu: self.cpu + rhs.cpu,
            gpu: self.gpu + rhs.gpu,
            mem: self.mem + rhs.mem,
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpu: self.cpu - rhs.cpu,
            gpu: self.gpu - rhs.gpu,
            mem: self.mem - rhs.mem,
        }
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Resources) {
        *self = *self - rhs;
    }
}

impl std::iter::Sum for Resources {
    fn sum<I: Iterator<Item = Resources>>(iter: I) -> Resources {
        iter.fold(Resources::ZERO, |acc, r| acc + r)
    }
}

/// Parse a Kubernetes-style memory quantity into MiB.
///
/// Binary suffixes (`Ki`, `Mi`, `Gi`, `Ti`), decimal suffixes (`K`, `M`,
/// `G`, `T`) and bare byte counts are accepted.
pub fn parse_memory_mib(s: &str) -> StateResult<f64> {
    let s = s.trim();
    let invalid = || StateError::InvalidMemory(s.to_string());

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let value: f64 = number.parse().map_err(|_| invalid())?;

    let bytes_per_unit = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => MIB,
        "Gi" => MIB * 1024.0,
        "Ti" => MIB * 1024.0 * 1024.0,
        "K" | "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => return Err(invalid()),
    };

    Ok(value * bytes_per_unit / MIB)
}

// ── Nodes ─────────────────────────────────────────────────────────

/// Resource picture of a single cluster node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NodeResources {
    pub name: String,
    /// Allocatable capacity.
    pub total: Resources,
    /// Sum of requests of everything scheduled on the node.
    #[serde(default)]
    pub requests: Resources,
    /// Requests of pods that are not task workers.
    #[serde(default)]
    pub other: Resources,
    /// Requests of task workers.
    #[serde(default)]
    pub workers_total: Resources,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl NodeResources {
    /// Headroom left on the node right now.
    pub fn free(&self) -> Resources {
        self.total.saturating_sub(&self.requests)
    }

    /// Headroom the node would have if no task worker were running on it.
    pub fn max_for_workers(&self) -> Resources {
        self.total.saturating_sub(&self.other)
    }

    /// True if every selector entry is present in the node labels.
    pub fn matches_selector(&self, selector: &HashMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|nv| nv == v))
    }

    /// Provisionally reserve resources on this node.
    pub fn reserve(&mut self, r: &Resources) {
        self.requests += *r;
        self.workers_total += *r;
    }
}

/// Cluster-wide requested/total ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureRatio {
    pub cpu: f64,
    pub gpu: f64,
    pub memory: f64,
}

/// All nodes of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClusterResources {
    pub nodes: Vec<NodeResources>,
}

impl ClusterResources {
    pub fn new(nodes: Vec<NodeResources>) -> Self {
        Self { nodes }
    }

    /// Aggregate `requests / total` over every node.
    pub fn ratio(&self) -> PressureRatio {
        let total: Resources = self.nodes.iter().map(|n| n.total).sum();
        let requests: Resources = self.nodes.iter().map(|n| n.requests).sum();
        let ratio = |used: f64, cap: f64| if cap > 0.0 { used / cap } else { 0.0 };
        PressureRatio {
            cpu: ratio(requests.cpu, total.cpu),
            gpu: ratio(requests.gpu, total.gpu),
            memory: ratio(requests.mem, total.mem),
        }
    }
}
