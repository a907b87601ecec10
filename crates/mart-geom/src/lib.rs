//! Geometry kit for σ-MART: axis-aligned hyperrectangles and convex
//! polytopes in vertex and halfspace representation.
//!
//! The transition-probability engine works with post-images of region
//! cells under affine maps. Those images are born as vertex sets; this
//! crate supplies the conversions (vertex enumeration, facet enumeration,
//! box approximation), the pruning predicates, and the small dense linear
//! algebra and QP routines everything else leans on.
//!
//! All routines favor correctness over numerical robustness and are
//! intended for the low state dimensions this system operates in.

pub mod hyperrect;
pub mod linalg;
pub mod polytope;
pub mod qp;

pub use hyperrect::Hyperrectangle;
pub use polytope::{HPolytope, VPolytope};

/// Feasibility slack for halfspace membership tests.
pub const FEASIBILITY_TOL: f64 = 1e-9;

/// Distance below which two enumerated vertices are considered identical.
pub const DEDUP_TOL: f64 = 1e-9;
