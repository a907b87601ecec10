//! Piecewise-constant barrier synthesis: the primal linear program.
//!
//! Variables, for N regions: barrier values b_0..b_{N−1}, per-region
//! slacks β_0..β_{N−1}, the global slack β, and the initial bound η.
//! Objective: minimize η + N_horizon·β. Per non-obstacle source region j
//! the martingale constraint binds the values through the upper
//! transition bounds:
//!
//!   Σ_i P̅_ij·b_i + P̅_uj ≤ b_j + β_j,       β_j ≤ β,
//!
//! with b_j ∈ [ε, 1] (obstacle regions pinned at 1), β_j ∈ [ε, 1−ε], and
//! η ≥ b_k for every region k meeting the initial set.

use crate::certificate::BarrierCertificate;
use crate::lp::{Cmp, LinearProgram};
use mart_core::{MartError, Result, SynthesisConfig};
use mart_geom::Hyperrectangle;
use mart_prob::RegionWithProbabilities;
use ndarray::Array1;
use tracing::{debug, info};

/// Variable layout of the barrier LP.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BarrierLayout {
    pub n: usize,
}

impl BarrierLayout {
    #[inline]
    pub fn value(&self, j: usize) -> usize {
        j
    }

    #[inline]
    pub fn slack(&self, j: usize) -> usize {
        self.n + j
    }

    #[inline]
    pub fn beta(&self) -> usize {
        2 * self.n
    }

    #[inline]
    pub fn eta(&self) -> usize {
        2 * self.n + 1
    }

    #[inline]
    pub fn num_vars(&self) -> usize {
        2 * self.n + 2
    }
}

/// Indices of partition cells meeting a query set.
pub(crate) fn find_intersecting_cells(
    regions: &[RegionWithProbabilities],
    set: &Hyperrectangle,
) -> Vec<usize> {
    regions
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.region().is_disjoint(set))
        .map(|(j, _)| j)
        .collect()
}

/// Resolve the initial and obstacle cell index sets, validating the
/// initial set against the partition.
pub(crate) fn resolve_cells(
    regions: &[RegionWithProbabilities],
    initial_region: &Hyperrectangle,
    obstacle_region: Option<&Hyperrectangle>,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if let Some(first) = regions.first() {
        let dim = first.region().dim();
        if initial_region.dim() != dim {
            return Err(MartError::shape_mismatch(
                vec![dim],
                vec![initial_region.dim()],
            ));
        }
        if let Some(obstacle) = obstacle_region {
            if obstacle.dim() != dim {
                return Err(MartError::shape_mismatch(vec![dim], vec![obstacle.dim()]));
            }
        }
    }
    let initial_cells = find_intersecting_cells(regions, initial_region);
    if initial_cells.is_empty() {
        return Err(MartError::InvalidRegion(
            "initial region meets no partition cell".to_string(),
        ));
    }
    let obstacle_cells = obstacle_region
        .map(|o| find_intersecting_cells(regions, o))
        .unwrap_or_default();
    Ok((initial_cells, obstacle_cells))
}

/// Build the barrier LP. `column_coeffs(j)` yields the transition
/// coefficients of source region j over logical indices 0..=N (index N is
/// the unsafe tail): the upper bounds for the primal program, or a fixed
/// distribution for the iterative refinements.
pub(crate) fn build_barrier_lp(
    layout: BarrierLayout,
    initial_cells: &[usize],
    obstacle_cells: &[usize],
    config: &SynthesisConfig,
    column_coeffs: impl Fn(usize) -> Vec<(usize, f64)>,
) -> LinearProgram {
    let n = layout.n;
    let eps = config.decision_floor;
    let mut lp = LinearProgram::new(layout.num_vars());

    lp.set_objective(layout.eta(), 1.0);
    lp.set_objective(layout.beta(), config.time_horizon as f64);

    for j in 0..n {
        lp.set_bounds(layout.value(j), eps, 1.0);
        lp.set_bounds(layout.slack(j), eps, 1.0 - eps);
    }
    for &k in obstacle_cells {
        lp.set_bounds(layout.value(k), 1.0, 1.0);
    }
    lp.set_bounds(layout.beta(), eps, 1.0);
    lp.set_bounds(layout.eta(), eps, 1.0);

    // Martingale rows. The expected next-step barrier may exceed the
    // current value by at most β_j; unsafe mass counts with barrier 1.
    // Obstacle regions carry no martingale obligation.
    for j in 0..n {
        if obstacle_cells.contains(&j) {
            continue;
        }
        let mut coeffs: Vec<(usize, f64)> = Vec::new();
        let mut tail_mass = 0.0;
        let mut own_coeff = -1.0;
        for (i, p) in column_coeffs(j) {
            if i == n {
                tail_mass = p;
            } else if i == j {
                own_coeff += p;
            } else if p != 0.0 {
                coeffs.push((layout.value(i), p));
            }
        }
        coeffs.push((layout.value(j), own_coeff));
        coeffs.push((layout.slack(j), -1.0));
        lp.add_row(coeffs, Cmp::Le, -tail_mass);
    }

    for j in 0..n {
        lp.add_row(vec![(layout.slack(j), 1.0), (layout.beta(), -1.0)], Cmp::Le, 0.0);
    }
    for &k in initial_cells {
        lp.add_row(vec![(layout.value(k), 1.0), (layout.eta(), -1.0)], Cmp::Le, 0.0);
    }

    lp
}

/// Raw upper transition bounds of region j as LP coefficients.
pub(crate) fn upper_coeffs(regions: &[RegionWithProbabilities], j: usize) -> Vec<(usize, f64)> {
    regions[j]
        .probabilities()
        .iter()
        .map(|(i, bound)| (i, bound.upper))
        .collect()
}

/// Assemble a certificate from an LP solution point, re-deriving the
/// per-region slacks from the martingale residuals so the reported
/// certificate satisfies its own invariants exactly.
pub(crate) fn extract_certificate(
    x: &[f64],
    layout: BarrierLayout,
    regions: &[RegionWithProbabilities],
    obstacle_cells: &[usize],
    config: &SynthesisConfig,
) -> Result<BarrierCertificate> {
    let n = layout.n;
    let eps = config.decision_floor;
    let values = Array1::from_iter((0..n).map(|j| x[layout.value(j)].clamp(eps, 1.0)));

    let mut certificate = BarrierCertificate {
        values,
        eta: x[layout.eta()].clamp(eps, 1.0),
        beta: x[layout.beta()].clamp(eps, 1.0),
        beta_per_region: Array1::from_elem(n, eps),
    };
    let residuals = certificate.martingale_residuals(regions)?;
    let mut beta = certificate.beta;
    for j in 0..n {
        let slack = if obstacle_cells.contains(&j) {
            // Not bound by a martingale row; report its LP value.
            x[layout.slack(j)]
        } else {
            residuals[j].max(x[layout.slack(j)])
        };
        let slack = slack.clamp(eps, 1.0 - eps);
        certificate.beta_per_region[j] = slack;
        beta = beta.max(slack);
    }
    certificate.beta = beta;
    Ok(certificate)
}

/// Synthesize a piecewise-constant barrier by solving the primal LP over
/// the upper transition-probability bounds.
pub fn constant_barrier(
    regions: &[RegionWithProbabilities],
    initial_region: &Hyperrectangle,
    obstacle_region: Option<&Hyperrectangle>,
    config: &SynthesisConfig,
) -> Result<BarrierCertificate> {
    let n = regions.len();
    let (initial_cells, obstacle_cells) =
        resolve_cells(regions, initial_region, obstacle_region)?;
    info!(
        regions = n,
        initial_cells = initial_cells.len(),
        obstacle_cells = obstacle_cells.len(),
        "solving primal barrier LP"
    );

    let layout = BarrierLayout { n };
    let lp = build_barrier_lp(layout, &initial_cells, &obstacle_cells, config, |j| {
        upper_coeffs(regions, j)
    });
    let solution = lp.solve()?;
    debug!(objective = solution.objective, "primal barrier LP solved");

    let certificate =
        extract_certificate(&solution.x, layout, regions, &obstacle_cells, config)?;
    certificate.validate(regions, &obstacle_cells, config.decision_floor, 1e-6)?;
    Ok(certificate)
}
