//! The transition-probability engine: one certified bound column per
//! source region, swept in parallel.

use crate::bounds::{max_prob_over_polytope, min_prob_at_vertices};
use crate::kernel::{inverse_normal_cdf, TransitionKernel};
use crate::matrix::TransitionMatrices;
use crate::system::StochasticSystem;
use mart_core::{MartError, ProbBound, ProbabilityConfig, Result, PROB_TOLERANCE};
use mart_geom::Hyperrectangle;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Compute the sparse (N+1) × N lower/upper transition-probability
/// matrices of a system over a region partition.
///
/// Column j is fully determined by source region j alone, so the sweep is
/// parallel over sources; the result is independent of the thread
/// schedule.
pub fn transition_probabilities(
    system: &StochasticSystem,
    regions: &[Hyperrectangle],
    config: &ProbabilityConfig,
) -> Result<TransitionMatrices> {
    let n = regions.len();
    if n == 0 {
        return Err(MartError::InvalidRegion("empty region partition".to_string()));
    }
    let dim = system.dimensionality();
    for (j, r) in regions.iter().enumerate() {
        if r.dim() != dim {
            return Err(MartError::InvalidRegion(format!(
                "region {j} has dimension {}, system has {dim}",
                r.dim()
            )));
        }
    }
    if let Some(expected) = system.expected_region_count() {
        if expected != n {
            return Err(MartError::shape_mismatch(vec![expected], vec![n]));
        }
    }
    if !(config.sparsity_eps > 0.0 && config.sparsity_eps < 0.5) {
        return Err(MartError::InvalidSystem(format!(
            "sparsity_eps must lie in (0, 0.5), got {}",
            config.sparsity_eps
        )));
    }

    // Search radius: a Gaussian coordinate exceeds n_sigma·σ with
    // probability sparsity_eps.
    let n_sigma = -inverse_normal_cdf(config.sparsity_eps);
    let sigma = system.noise_sigma().clone();
    let pad = sigma.mapv(|s| s * n_sigma);

    info!(
        regions = n,
        dim,
        n_sigma,
        method = ?config.upper_bound_method,
        "computing transition-probability bounds"
    );

    let progress = AtomicUsize::new(0);
    let report = config.report_progress;

    let compute_column = |j: usize| -> Result<Vec<(usize, ProbBound)>> {
        let column = bound_column(system, regions, j, &pad, config)?;
        if report {
            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 16 == 0 || done == n {
                debug!("progress: {done}/{n} source regions");
            }
        }
        Ok(column)
    };

    let columns: Result<Vec<Vec<(usize, ProbBound)>>> =
        if n >= config.min_regions_for_parallel {
            if let Some(threads) = config.max_threads {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| {
                        MartError::InvalidSystem(format!("failed to build thread pool: {e}"))
                    })?;
                pool.install(|| (0..n).into_par_iter().map(compute_column).collect())
            } else {
                (0..n).into_par_iter().map(compute_column).collect()
            }
        } else {
            (0..n).map(compute_column).collect()
        };

    TransitionMatrices::from_bound_columns(n, &columns?)
}

/// One certified bound column for source region `j`.
fn bound_column(
    system: &StochasticSystem,
    regions: &[Hyperrectangle],
    j: usize,
    pad: &ndarray::Array1<f64>,
    config: &ProbabilityConfig,
) -> Result<Vec<(usize, ProbBound)>> {
    let n = regions.len();
    let sigma = system.noise_sigma();
    let image = system.post(j, &regions[j])?;
    let search_box = image.bounding_box.minkowski_pad(pad);

    let mut entries: Vec<(usize, ProbBound)> = Vec::new();
    let mut kept = 0usize;
    for (i, target) in regions.iter().enumerate() {
        // Regions outside the padded image box carry less than
        // sparsity_eps mass and are pruned.
        if search_box.is_disjoint(target) {
            continue;
        }
        let kernel = TransitionKernel::new(target, sigma);
        let upper = max_prob_over_polytope(&kernel, &image, &config.upper_bound_method);
        if upper < config.sparsity_eps {
            continue;
        }
        let lower = min_prob_at_vertices(&kernel, &image);
        let bound = ProbBound::new(lower.min(upper), upper).clamp_unit();
        entries.push((i, bound));
        kept += 1;
    }

    // Tail column: bound the mass staying inside the safe set, then
    // complement. The pruned-pair slack keeps the upper tail sound.
    let safe_kernel = TransitionKernel::new(system.safe_set(), sigma);
    let safe_upper = max_prob_over_polytope(&safe_kernel, &image, &config.upper_bound_method);
    let safe_lower = min_prob_at_vertices(&safe_kernel, &image).min(safe_upper);
    let tail_lower = (1.0 - safe_upper).max(0.0);
    let tail_upper = ((1.0 - safe_lower) + (n - kept) as f64 * config.sparsity_eps)
        .clamp(tail_lower, 1.0);
    entries.push((n, ProbBound::new(tail_lower, tail_upper)));

    // Consistency: no upper bound may exceed what the other lower bounds
    // leave over. Required after box-approximation upper bounds, valid
    // always.
    let sum_lower: f64 = entries.iter().map(|(_, b)| b.lower).sum();
    if sum_lower > 1.0 + PROB_TOLERANCE {
        return Err(MartError::InvariantViolation(format!(
            "source region {j}: joint lower bound {sum_lower} exceeds 1"
        )));
    }
    let headroom = (1.0 - sum_lower).max(0.0);
    for (_, b) in entries.iter_mut() {
        *b = ProbBound::new(b.lower, b.upper.min(b.lower + headroom)).clamp_unit();
    }

    let tail = entries.last().expect("tail entry present").1;
    if tail.upper > 1.0 + PROB_TOLERANCE {
        return Err(MartError::InvariantViolation(format!(
            "source region {j}: unsafe upper bound {} exceeds 1",
            tail.upper
        )));
    }
    let sum_upper: f64 = entries.iter().map(|(_, b)| b.upper).sum();
    if sum_upper < 1.0 - PROB_TOLERANCE {
        return Err(MartError::InvariantViolation(format!(
            "source region {j}: joint upper bound {sum_upper} below 1; \
             sparsity_eps may be too loose"
        )));
    }

    Ok(entries)
}
