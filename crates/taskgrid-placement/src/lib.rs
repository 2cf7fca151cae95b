//! taskgrid-placement — fitting new workers onto nodes, and making room.
//!
//! This crate does NOT schedule containers inside a node (the cluster does
//! that). It decides, per reconcile cycle, which staged jobs have headroom
//! somewhere in the cluster and which existing workers to stop so that the
//! rest can fit on a later cycle.
//!
//! # Components
//!
//! - **`matcher`** — first-fit of staged jobs against per-node headroom,
//!   producing `created` and `skipped` (with a scheduling warning)
//! - **`reclaim`** — starvation-weighted selection of workers to stop, and
//!   the stop/resume reconciliation that avoids churn

pub mod matcher;
pub mod reclaim;

pub use matcher::{CreatedJob, MatchOutcome, SkipWarning, SkippedJob, match_jobs_to_resources};
pub use reclaim::{
    Deficit, ReclaimConfig, StopCandidate, cancel_against_resumes, deficits,
    find_workers_to_stop, resources_to_free, trim_to_budget,
};
