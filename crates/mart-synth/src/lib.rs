//! Barrier synthesis for σ-MART.
//!
//! Consumes the interval transition-probability matrices produced by
//! `mart-prob` and synthesizes a piecewise-constant stochastic barrier:
//! per-region values b with b ≥ ε and b = 1 on the obstacle, a martingale
//! slack β, and an initial bound η, minimizing η + N·β. The finite-horizon
//! probability of reaching the unsafe set from the initial set is then at
//! most η + N·β.
//!
//! Backends: the primal LP (`constant_barrier`), its explicit dual
//! (`dual_constant_barrier`), the alternating worst-case refinement
//! (`iterative_barrier`) and a projected-subgradient variant
//! (`gradient_descent_barrier`), all behind [`synthesize_barrier`].
//! After any solve, [`post_compute_beta`] re-optimizes β per region with
//! the probabilities free inside their interval bounds.

pub mod certificate;
pub mod constant;
pub mod dual;
pub mod iterative;
pub mod knapsack;
pub mod lp;
pub mod post_beta;
pub mod scratch;

#[cfg(test)]
mod tests;

pub use certificate::BarrierCertificate;
pub use constant::constant_barrier;
pub use dual::dual_constant_barrier;
pub use iterative::{gradient_descent_barrier, iterative_barrier};
pub use knapsack::{worst_case_distribution, WorstCase};
pub use post_beta::post_compute_beta;

use mart_core::{BarrierAlgorithm, MartError, Result, SynthesisConfig};
use mart_geom::Hyperrectangle;
use mart_prob::RegionWithProbabilities;

/// Synthesize a barrier certificate with the backend selected in the
/// configuration.
pub fn synthesize_barrier(
    regions: &[RegionWithProbabilities],
    initial_region: &Hyperrectangle,
    obstacle_region: Option<&Hyperrectangle>,
    config: &SynthesisConfig,
) -> Result<BarrierCertificate> {
    match config.algorithm {
        BarrierAlgorithm::Constant => {
            constant_barrier(regions, initial_region, obstacle_region, config)
        }
        BarrierAlgorithm::DualConstant => {
            dual_constant_barrier(regions, initial_region, obstacle_region, config)
        }
        BarrierAlgorithm::Iterative | BarrierAlgorithm::FrankWolfe => {
            iterative_barrier(regions, initial_region, obstacle_region, config)
        }
        BarrierAlgorithm::GradientDescent => {
            gradient_descent_barrier(regions, initial_region, obstacle_region, config)
        }
        BarrierAlgorithm::Sos => Err(MartError::NotSupported(
            "sum-of-squares synthesis is a separate backend; select a \
             piecewise-constant algorithm"
                .to_string(),
        )),
    }
}
