//! Fair-share request limiter.
//!
//! A greedy water-filling allocator over the ordered request backlog. Each
//! algorithm may have at most `ratio * capacity` requests admitted, where
//! `ratio` is its share of the request window. Requests are walked in
//! queue order, so ties and rounding favor earlier requests. Dropped
//! requests stay in the upstream queue and are reconsidered next cycle.

use std::collections::BTreeMap;

use tracing::debug;

use taskgrid_state::{AlgorithmName, AlgorithmRequest};

/// Per-algorithm accounting for one cut.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmShare {
    /// Requests of this algorithm in the window.
    pub count: usize,
    /// `count / window_total`.
    pub ratio: f64,
    /// `ratio * capacity`; admission stops once reached.
    pub required: f64,
    pub admitted: usize,
}

/// Result of applying the fair-share cut.
#[derive(Debug, Clone, Default)]
pub struct FairShareCut {
    /// Admitted requests, in their original relative order.
    pub admitted: Vec<AlgorithmRequest>,
    /// Number of window requests left for a later cycle.
    pub dropped: usize,
    pub shares: BTreeMap<AlgorithmName, AlgorithmShare>,
}

/// The head of the backlog considered this cycle: `round(capacity * factor)`.
pub fn slice_window(
    requests: &[AlgorithmRequest],
    capacity: f64,
    window_factor: f64,
) -> &[AlgorithmRequest] {
    let size = (capacity * window_factor).round().max(0.0) as usize;
    &requests[..size.min(requests.len())]
}

/// Admit requests from `window` up to each algorithm's fair share of
/// `capacity`.
pub fn limit_requests(window: &[AlgorithmRequest], capacity: f64) -> FairShareCut {
    let total = window.len();
    let mut shares: BTreeMap<AlgorithmName, AlgorithmShare> = BTreeMap::new();

    for r in window {
        shares
            .entry(r.algorithm_name.clone())
            .or_insert(AlgorithmShare {
                count: 0,
                ratio: 0.0,
                required: 0.0,
                admitted: 0,
            })
            .count += 1;
    }
    for share in shares.values_mut() {
        share.ratio = share.count as f64 / total as f64;
        share.required = share.ratio * capacity;
    }

    let mut admitted = Vec::with_capacity(total);
    for r in window {
        let Some(share) = shares.get_mut(&r.algorithm_name) else {
            continue;
        };
        if (share.admitted as f64) < share.required {
            share.admitted += 1;
            admitted.push(r.clone());
        }
    }

    let dropped = total - admitted.len();
    debug!(
        window = total,
        admitted = admitted.len(),
        dropped,
        capacity,
        "fair-share cut applied"
    );

    FairShareCut {
        admitted,
        dropped,
        shares,
    }
}
