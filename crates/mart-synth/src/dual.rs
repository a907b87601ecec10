//! Dual barrier synthesis: solve the explicit LP dual of the primal
//! program and read the certificate back off the dual prices.
//!
//! The primal is canonicalized to `min c·x̂, G·x̂ ≥ h, x̂ ≥ 0` and
//! transposed mechanically. The dual has one variable per primal row
//! (per source region that is a martingale multiplier plus one
//! multiplier per stored transition bound) and only 2N+2 rows, so it is
//! the smaller program whenever the probability matrices are dense in
//! the column direction. Strong duality makes its optimum coincide with the primal
//! objective, and the multipliers of the dual's own rows are exactly the
//! primal variables, which is how (b, β) is recovered.

use crate::certificate::BarrierCertificate;
use crate::constant::{
    build_barrier_lp, extract_certificate, resolve_cells, upper_coeffs, BarrierLayout,
};
use crate::lp::dual_of_canonical;
use mart_core::{Result, SynthesisConfig};
use mart_geom::Hyperrectangle;
use mart_prob::RegionWithProbabilities;
use tracing::{debug, info};

/// Synthesize a piecewise-constant barrier through the dual program.
///
/// Returns the same certificate shape as [`crate::constant_barrier`]; the
/// two objectives agree to solver tolerance by strong duality.
pub fn dual_constant_barrier(
    regions: &[RegionWithProbabilities],
    initial_region: &Hyperrectangle,
    obstacle_region: Option<&Hyperrectangle>,
    config: &SynthesisConfig,
) -> Result<BarrierCertificate> {
    let n = regions.len();
    let (initial_cells, obstacle_cells) =
        resolve_cells(regions, initial_region, obstacle_region)?;

    let layout = BarrierLayout { n };
    let primal = build_barrier_lp(layout, &initial_cells, &obstacle_cells, config, |j| {
        upper_coeffs(regions, j)
    });
    let canonical = primal.to_canonical();
    let dual = dual_of_canonical(&canonical);
    info!(
        regions = n,
        dual_vars = canonical.g_rows.len(),
        dual_rows = canonical.num_vars,
        "solving dual barrier LP"
    );

    let solution = dual.solve()?;
    let dual_objective = -solution.objective + canonical.const_term;
    debug!(objective = dual_objective, "dual barrier LP solved");

    // The multipliers on the dual's rows are the primal solution:
    // x̂ = −(row duals), x = shift + x̂.
    let x: Vec<f64> = (0..canonical.num_vars)
        .map(|j| canonical.shift[j] - solution.row_duals[j])
        .collect();

    let certificate = extract_certificate(&x, layout, regions, &obstacle_cells, config)?;
    certificate.validate(regions, &obstacle_cells, config.decision_floor, 1e-6)?;
    Ok(certificate)
}
