//! Transition-probability bounding for σ-MART.
//!
//! Given a stochastic system (affine or uncertain piecewise-affine
//! dynamics with additive per-coordinate Gaussian noise) and a
//! hyperrectangular partition of its safe set, this crate computes, for
//! every ordered region pair (source, target), certified lower and upper
//! bounds on the one-step transition probability
//!
//!   P(f(x) + w ∈ target | x ∈ source),   w ~ N(0, diag(σ²)),
//!
//! plus a tail column collecting the mass that leaves the safe set. The
//! bounds come from minimizing / maximizing a log-concave Gaussian
//! cumulative-product kernel over the polytopic post-image of the source
//! region: the minimum of a log-concave function over a polytope sits at
//! a vertex, and the maximum is certified through a conditional-gradient
//! dual gap or the box relaxation.
//!
//! The sweep over source regions is embarrassingly parallel; each worker
//! owns exactly one output column.

pub mod bounds;
pub mod engine;
pub mod kernel;
pub mod matrix;
pub mod region;
pub mod system;

#[cfg(test)]
mod tests;

pub use engine::transition_probabilities;
pub use kernel::{inverse_normal_cdf, TransitionKernel};
pub use matrix::{CscMatrix, TransitionMatrices};
pub use region::{attach_probabilities, update_regions, RegionWithProbabilities, SparseColumn};
pub use system::{AffineMap, LinearGaussian, PostImage, PwaPiece, StochasticSystem, UncertainPwa};
