//! Created-jobs ledger.
//!
//! Jobs submitted in one cycle take a while to appear in the cluster
//! snapshot. Until they do, the ledger counts them as supply so the same
//! request does not stage a second job. Entries expire after a TTL in case
//! the job never materializes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use taskgrid_placement::CreatedJob;
use taskgrid_state::AlgorithmName;

/// One just-submitted job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedJobRecord {
    pub job_name: String,
    pub algorithm_name: AlgorithmName,
    /// Unix timestamp (ms) of submission.
    pub created_time: u64,
}

#[derive(Debug, Clone)]
pub struct CreatedJobsLedger {
    entries: Vec<CreatedJobRecord>,
    ttl_ms: u64,
}

impl CreatedJobsLedger {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            entries: Vec::new(),
            ttl_ms,
        }
    }

    /// Drop entries at least `ttl_ms` old. Returns how many were removed.
    pub fn expire(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl_ms;
        self.entries
            .retain(|e| now_ms.saturating_sub(e.created_time) < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "expired created-jobs entries");
        }
        removed
    }

    pub fn record(&mut self, created: &[CreatedJob], now_ms: u64) {
        self.entries.extend(created.iter().map(|c| CreatedJobRecord {
            job_name: c.spec.name.clone(),
            algorithm_name: c.spec.algorithm_name.clone(),
            created_time: now_ms,
        }));
    }

    pub fn entries(&self) -> &[CreatedJobRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
