//! Unscheduled-algorithm tracker.
//!
//! Remembers algorithms whose staged jobs found no headroom and raises one
//! alert event per algorithm once it has been stuck for longer than the
//! warning timeout, or straight away when it can never fit.
//!
//! ```text
//!   absent ──first skip──▶ tracked ──timeout / max capacity──▶ notified
//!                             │                                   │
//!                             └──── created / not requested / ────┘
//!                                   template gone ──▶ removed
//! ```
//!
//! The tracker only computes transitions; the caller talks to the event
//! store and reports back the ids it got.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use taskgrid_placement::{CreatedJob, SkipWarning, SkippedJob};
use taskgrid_state::{AlgorithmName, AlgorithmRequest, TemplateMap};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnscheduledEntry {
    pub algorithm_name: AlgorithmName,
    /// Unix timestamp (ms) of the first skip.
    pub first_seen_at: u64,
    pub is_notified: bool,
    pub has_max_capacity: bool,
    /// Id of the alert event, once one has been created.
    pub event_id: Option<String>,
    pub warning: SkipWarning,
}

/// An alert event to delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemovedEvent {
    pub algorithm_name: AlgorithmName,
    pub event_id: String,
}

/// Alert events to create and delete after one update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackerDelta {
    pub added: Vec<UnscheduledEntry>,
    pub removed: Vec<RemovedEvent>,
}

impl TrackerDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UnscheduledTracker {
    entries: BTreeMap<AlgorithmName, UnscheduledEntry>,
    warning_timeout_ms: u64,
}

impl UnscheduledTracker {
    pub fn new(warning_timeout_ms: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            warning_timeout_ms,
        }
    }

    /// Apply one cycle's outcome.
    ///
    /// `requests` is the full backlog, not just the admitted part: an
    /// algorithm cut by fair share is still wanted.
    pub fn update(
        &mut self,
        created: &[CreatedJob],
        skipped: &[SkippedJob],
        requests: &[AlgorithmRequest],
        templates: &TemplateMap,
        now_ms: u64,
    ) -> TrackerDelta {
        for s in skipped {
            self.entries
                .entry(s.algorithm_name().to_string())
                .or_insert_with(|| {
                    debug!(algorithm = %s.algorithm_name(), "tracking unscheduled algorithm");
                    UnscheduledEntry {
                        algorithm_name: s.algorithm_name().to_string(),
                        first_seen_at: s.warning.timestamp,
                        is_notified: false,
                        has_max_capacity: s.warning.has_max_capacity,
                        event_id: None,
                        warning: s.warning.clone(),
                    }
                });
        }

        let created: HashSet<&str> = created.iter().map(|c| c.spec.algorithm_name.as_str()).collect();
        let requested: HashSet<&str> = requests.iter().map(|r| r.algorithm_name.as_str()).collect();

        let mut delta = TrackerDelta::default();
        let timeout = self.warning_timeout_ms;
        self.entries.retain(|name, entry| {
            let resolved = created.contains(name.as_str())
                || !requested.contains(name.as_str())
                || !templates.contains_key(name);
            if resolved {
                debug!(algorithm = %name, "unscheduled algorithm resolved");
                if let Some(event_id) = entry.event_id.take() {
                    delta.removed.push(RemovedEvent {
                        algorithm_name: name.clone(),
                        event_id,
                    });
                }
                return false;
            }

            let overdue = now_ms.saturating_sub(entry.first_seen_at) > timeout;
            if !entry.is_notified && (overdue || entry.has_max_capacity) {
                entry.is_notified = true;
                info!(
                    algorithm = %name,
                    has_max_capacity = entry.has_max_capacity,
                    message = %entry.warning.message,
                    "algorithm cannot be scheduled"
                );
                delta.added.push(entry.clone());
            }
            true
        });

        delta
    }

    /// Remember the id of the event created for `algorithm`.
    pub fn record_event_id(&mut self, algorithm: &str, event_id: String) {
        if let Some(entry) = self.entries.get_mut(algorithm) {
            entry.event_id = Some(event_id);
        }
    }

    /// Event creation failed; make the entry eligible again next cycle.
    pub fn reset_notification(&mut self, algorithm: &str) {
        if let Some(entry) = self.entries.get_mut(algorithm) {
            entry.is_notified = false;
        }
    }

    pub fn get(&self, algorithm: &str) -> Option<&UnscheduledEntry> {
        self.entries.get(algorithm)
    }

    pub fn entries(&self) -> impl Iterator<Item = &UnscheduledEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
