//! Worst-case probability redistribution within interval bounds.
//!
//! For a source region with interval column [P̲, P̅] and per-target values
//! v (barrier values; the unsafe tail counts as 1), the adversary's
//! problem is
//!
//!   max Σ p_i·v_i   s.t.   P̲ ≤ p ≤ P̅,  Σ p = 1.
//!
//! The feasible set is a box cut by one simplex equality, so the optimum
//! is the greedy fill: start every entry at its lower bound and spend the
//! remaining mass on the most valuable entries first. This one routine
//! serves both the iterative synthesis inner step and the post-solve β
//! refinement.

use crate::scratch::with_scratch;
use mart_prob::SparseColumn;

/// Numerical slack for interval and mass fix-ups.
const ACCURACY_THRESHOLD: f64 = 1e-9;

/// The adversary's distribution and its achieved expectation.
#[derive(Debug, Clone)]
pub struct WorstCase {
    pub expectation: f64,
    /// Chosen probability per stored column entry, as (logical index, p).
    pub probs: Vec<(usize, f64)>,
}

/// Exact greedy solution of the worst-case redistribution.
///
/// `values[i]` is the barrier value of region `i`; the tail entry (logical
/// index N) is valued at 1. Intervals inverted by numerical noise are
/// repaired within `ACCURACY_THRESHOLD` before the fill.
pub fn worst_case_distribution(column: &SparseColumn, values: &[f64]) -> WorstCase {
    let tail_index = column.len() - 1;
    debug_assert_eq!(values.len(), tail_index);

    with_scratch(|scratch| {
        for (idx, bound) in column.iter() {
            let lo = bound.lower.clamp(0.0, 1.0);
            let hi = bound.upper.clamp(lo, 1.0);
            debug_assert!(
                bound.upper >= bound.lower - ACCURACY_THRESHOLD,
                "interval inverted beyond the accuracy threshold"
            );
            scratch.idx.push(idx);
            scratch.lo.push(lo);
            scratch.hi.push(hi);
            scratch
                .val
                .push(if idx == tail_index { 1.0 } else { values[idx] });
        }

        let base: f64 = scratch.lo.iter().sum();
        let mut remaining = (1.0 - base).max(0.0);

        // Most valuable entries absorb the free mass first; ties resolve
        // by logical index so the result is deterministic.
        scratch.order.extend(0..scratch.idx.len());
        let val = &scratch.val;
        let idx = &scratch.idx;
        scratch.order.sort_by(|&a, &b| {
            val[b]
                .partial_cmp(&val[a])
                .expect("barrier values are finite")
                .then(idx[a].cmp(&idx[b]))
        });

        let mut probs: Vec<(usize, f64)> = scratch
            .idx
            .iter()
            .zip(scratch.lo.iter())
            .map(|(&i, &l)| (i, l))
            .collect();
        for &k in &scratch.order {
            if remaining <= 0.0 {
                break;
            }
            let add = (scratch.hi[k] - scratch.lo[k]).min(remaining);
            probs[k].1 += add;
            remaining -= add;
        }

        let expectation = probs
            .iter()
            .enumerate()
            .map(|(k, &(_, p))| p * scratch.val[k])
            .sum();
        WorstCase { expectation, probs }
    })
}
