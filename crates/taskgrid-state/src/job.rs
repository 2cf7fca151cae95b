//! Fully resolved job specification handed to the cluster API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resources::Resources;
use crate::types::{AlgorithmName, Mount};

/// Cluster-level options copied into every job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterOptions {
    pub namespace: String,
    pub image_pull_secret: Option<String>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            image_pull_secret: None,
        }
    }
}

/// Everything needed to create one worker job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    /// Unique job name.
    pub name: String,
    pub algorithm_name: AlgorithmName,
    pub algorithm_image: String,
    pub worker_image: String,
    pub algorithm_env: HashMap<String, String>,
    pub worker_env: HashMap<String, String>,
    pub entry_point: Option<String>,
    pub node_selector: HashMap<String, String>,
    pub mounts: Vec<Mount>,
    /// Requests of the algorithm container; this is what node headroom is
    /// matched against.
    pub algorithm_resources: Resources,
    /// Requests of the worker sidecar.
    pub worker_resources: Resources,
    pub hot_worker: bool,
    pub debug: bool,
    pub cluster: ClusterOptions,
}
