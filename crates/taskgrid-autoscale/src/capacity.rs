//! Capacity estimator — exponentially smoothed worker target.
//!
//! The estimate lives as long as the process and is updated once per
//! reconcile cycle from the number of workers observed (idle + active +
//! just-created). It is the only demand signal the fair-share limiter uses.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tuning for the capacity estimator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapacityConfig {
    /// Estimate a fresh process starts from.
    pub seed: f64,
    /// Weight of the previous estimate (0.0..1.0).
    pub alpha: f64,
    pub min: f64,
    pub max: f64,
    /// Over-provisioning multiplier for the request window.
    pub window_factor: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            seed: 10.0,
            alpha: 0.9,
            min: 2.0,
            max: 50.0,
            window_factor: 3.0,
        }
    }
}

/// Smoothed estimate of how many concurrent workers to target.
#[derive(Debug, Clone)]
pub struct CapacityEstimator {
    config: CapacityConfig,
    value: f64,
}

impl CapacityEstimator {
    pub fn new(config: CapacityConfig) -> Self {
        let value = config.seed.clamp(config.min, config.max);
        Self { config, value }
    }

    /// Start from an explicit estimate instead of the configured seed.
    pub fn with_value(config: CapacityConfig, value: f64) -> Self {
        let value = value.clamp(config.min, config.max);
        Self { config, value }
    }

    /// Fold one cycle's observed worker count into the estimate.
    pub fn update(&mut self, observed_workers: usize) -> f64 {
        let alpha = self.config.alpha;
        let previous = self.value;
        let next = previous * alpha + observed_workers as f64 * (1.0 - alpha);
        self.value = next.clamp(self.config.min, self.config.max);

        debug!(
            previous,
            observed = observed_workers,
            capacity = self.value,
            "capacity updated"
        );
        self.value
    }

    pub fn current(&self) -> f64 {
        self.value
    }

    pub fn config(&self) -> &CapacityConfig {
        &self.config
    }
}

impl Default for CapacityEstimator {
    fn default() -> Self {
        Self::new(CapacityConfig::default())
    }
}
