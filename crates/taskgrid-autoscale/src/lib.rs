//! taskgrid-autoscale — how many workers to aim for, and who gets them.
//!
//! Two pieces run at the top of every reconcile cycle:
//!
//! - **`capacity`** — an exponentially smoothed estimate of how many
//!   concurrent workers the system should target.
//! - **`fair_share`** — caps, per algorithm, how many pending requests are
//!   admitted this cycle, proportionally to the estimate.
//!
//! # Algorithm
//!
//! ```text
//! capacity' = clamp(capacity * alpha + observed * (1 - alpha), min, max)
//!
//! window    = requests[..round(capacity * window_factor)]
//! required  = count_in_window(algo) / len(window) * capacity
//! admit r   iff admitted_so_far(r.algo) < required(r.algo)
//! ```
//!
//! A single spike in observed workers moves the estimate by at most
//! `(1 - alpha)` of the gap, so the cluster is not flooded or drained in one
//! cycle.

pub mod capacity;
pub mod fair_share;

pub use capacity::{CapacityConfig, CapacityEstimator};
pub use fair_share::{AlgorithmShare, FairShareCut, limit_requests, slice_window};
