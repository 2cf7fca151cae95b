//! Executor configuration (`taskexec.toml`).
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! interval_ms = 1000
//! created_jobs_ttl_ms = 15000
//! scheduling_warning_timeout_ms = 20000
//! registry = "registry.local:5000"
//!
//! [capacity]
//! seed = 10.0
//! alpha = 0.9
//! min = 2.0
//! max = 50.0
//! window_factor = 3.0
//!
//! [reclaim]
//! weight_exponent = 0.7
//! min_age_for_stop_ms = 10000
//!
//! [pressure]
//! cpu = 0.8
//! memory = 0.8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use taskgrid_autoscale::CapacityConfig;
use taskgrid_placement::ReclaimConfig;
use taskgrid_state::{ClusterOptions, ResourceSpec};

use crate::error::ExecutorResult;

/// Cluster-wide requested/total ratios above which resource pressure is
/// reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PressureThresholds {
    pub cpu: f64,
    pub gpu: f64,
    pub memory: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            cpu: 0.8,
            gpu: 0.8,
            memory: 0.8,
        }
    }
}

/// Image tags used when a template does not pin one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Versions {
    pub worker: String,
}

impl Default for Versions {
    fn default() -> Self {
        Self {
            worker: "latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Reconcile period.
    pub interval_ms: u64,
    /// How long a just-created job is counted as supply before it must
    /// show up in the cluster snapshot.
    pub created_jobs_ttl_ms: u64,
    /// How long an algorithm may stay unschedulable before an alert event.
    pub scheduling_warning_timeout_ms: u64,
    pub capacity: CapacityConfig,
    pub reclaim: ReclaimConfig,
    pub pressure: PressureThresholds,
    /// Registry prefix for images that do not name one.
    pub registry: Option<String>,
    pub versions: Versions,
    /// Requests of the worker sidecar container.
    pub worker_resources: ResourceSpec,
    /// Algorithm requests used when a template leaves them out.
    pub defaults: ResourceSpec,
    pub cluster: ClusterOptions,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            created_jobs_ttl_ms: 15_000,
            scheduling_warning_timeout_ms: 20_000,
            capacity: CapacityConfig::default(),
            reclaim: ReclaimConfig::default(),
            pressure: PressureThresholds::default(),
            registry: None,
            versions: Versions::default(),
            worker_resources: ResourceSpec::new(0.1, 0.0, "512Mi"),
            defaults: ResourceSpec::new(0.1, 0.0, "256Mi"),
            cluster: ClusterOptions::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_file(path: &Path) -> ExecutorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> ExecutorResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ExecutorConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.capacity.max, 50.0);
        assert_eq!(config.reclaim.min_age_for_stop_ms, 10_000);
        assert_eq!(config.interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ExecutorConfig::from_toml_str(
            r#"
registry = "registry.local:5000"

[capacity]
max = 20.0

[reclaim]
weight_exponent = 0.5
"#,
        )
        .unwrap();

        assert_eq!(config.registry.as_deref(), Some("registry.local:5000"));
        assert_eq!(config.capacity.max, 20.0);
        assert_eq!(config.capacity.alpha, 0.9);
        assert_eq!(config.reclaim.weight_exponent, 0.5);
        assert_eq!(config.reclaim.min_age_for_stop_ms, 10_000);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(ExecutorConfig::from_toml_str("interval_ms = \"soon\"").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "created_jobs_ttl_ms = 500").unwrap();

        let config = ExecutorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.created_jobs_ttl_ms, 500);
    }
}
