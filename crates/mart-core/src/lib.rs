//! Core types and configuration for σ-MART stochastic barrier synthesis.
//!
//! This crate provides the foundational abstractions shared by the
//! transition-probability engine and the barrier synthesis backends:
//! interval probability bounds, the workspace-wide error type, and the
//! flat configuration records that drive both stages.

use serde::{Deserialize, Serialize};

/// Tolerance for probability-sum invariants (column sums, tail clipping).
pub const PROB_TOLERANCE: f64 = 1e-6;

/// An interval bound on a transition probability: [lower, upper].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbBound {
    pub lower: f64,
    pub upper: f64,
}

impl ProbBound {
    /// Create a new probability bound.
    #[inline]
    pub fn new(lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper, "Invalid bound: {lower} > {upper}");
        Self { lower, upper }
    }

    /// A point bound (lower == upper).
    #[inline]
    pub fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// The zero bound, used for pruned region pairs.
    #[inline]
    pub fn zero() -> Self {
        Self::point(0.0)
    }

    /// Width of the interval.
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Check if this bound contains a value.
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Whether the interval is a valid probability interval within `tol`.
    #[inline]
    pub fn is_valid_probability(&self, tol: f64) -> bool {
        self.lower >= -tol && self.upper <= 1.0 + tol && self.lower <= self.upper + tol
    }

    /// Intersect two bounds; `None` if disjoint.
    #[inline]
    pub fn intersect(&self, other: &ProbBound) -> Option<ProbBound> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        if lower <= upper {
            Some(ProbBound { lower, upper })
        } else {
            None
        }
    }

    /// Clamp both endpoints into [0, 1], repairing roundoff spill.
    #[inline]
    pub fn clamp_unit(&self) -> ProbBound {
        let lower = self.lower.clamp(0.0, 1.0);
        ProbBound {
            lower,
            upper: self.upper.clamp(lower, 1.0),
        }
    }
}

/// Method for the lower transition-probability bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LowerBoundMethod {
    /// Minimum of the kernel over the vertices of the image polytope.
    /// Exact for log-concave kernels (the minimum over a polytope is
    /// attained at a vertex).
    #[default]
    VertexEnumeration,
}

/// Method for the upper transition-probability bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpperBoundMethod {
    /// Evaluate the kernel at the target center clamped onto the bounding
    /// box of the image set. Fast, loose.
    BoxApproximation,
    /// Maximize the log-kernel over the image polytope to convergence.
    /// Tight, slow.
    GlobalSolver,
    /// Conditional-gradient iterations with a vertex oracle; moderate cost,
    /// tight on most instances.
    FrankWolfe {
        num_iter: usize,
        term_eps: f64,
    },
}

impl Default for UpperBoundMethod {
    fn default() -> Self {
        UpperBoundMethod::GlobalSolver
    }
}

impl UpperBoundMethod {
    /// Default Frank–Wolfe parameters.
    pub fn frank_wolfe() -> Self {
        UpperBoundMethod::FrankWolfe {
            num_iter: 400,
            term_eps: 1e-9,
        }
    }
}

/// Barrier synthesis backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierAlgorithm {
    /// Primal linear program over piecewise-constant barrier values.
    #[default]
    Constant,
    /// Explicit LP dual of the primal program.
    DualConstant,
    /// Alternating LP / worst-case probability redistribution.
    Iterative,
    /// Alias of the iterative scheme with its conditional-gradient inner step.
    FrankWolfe,
    /// Projected subgradient descent on the barrier values.
    GradientDescent,
    /// Sum-of-squares polynomial backend (not provided by this workspace).
    Sos,
}

/// Configuration for the transition-probability engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityConfig {
    /// Lower-bound strategy.
    pub lower_bound_method: LowerBoundMethod,

    /// Upper-bound strategy.
    pub upper_bound_method: UpperBoundMethod,

    /// Pairs contributing below this probability are pruned to zero.
    pub sparsity_eps: f64,

    /// Maximum worker threads. `None` uses rayon's default pool.
    pub max_threads: Option<usize>,

    /// Minimum number of source regions before the parallel sweep is used.
    pub min_regions_for_parallel: usize,

    /// Emit a progress line every few completed columns.
    pub report_progress: bool,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            lower_bound_method: LowerBoundMethod::VertexEnumeration,
            upper_bound_method: UpperBoundMethod::default(),
            sparsity_eps: 1e-12,
            max_threads: None,
            min_regions_for_parallel: 4,
            report_progress: false,
        }
    }
}

/// Configuration for barrier synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Synthesis backend.
    pub algorithm: BarrierAlgorithm,

    /// Time horizon N in the certificate objective η + N·β.
    pub time_horizon: usize,

    /// Floor ε for decision variables (barrier values and slacks).
    pub decision_floor: f64,

    /// Outer iteration cap for the iterative backends.
    pub max_outer_iterations: usize,

    /// Objective-improvement tolerance terminating the iterative backends.
    pub iteration_tol: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            algorithm: BarrierAlgorithm::Constant,
            time_horizon: 1,
            decision_floor: 1e-6,
            max_outer_iterations: 50,
            iteration_tol: 1e-8,
        }
    }
}

/// Error type for σ-MART operations.
#[derive(Debug)]
pub enum MartError {
    /// System description rejected before any work (σ ≤ 0, singular shapes).
    InvalidSystem(String),

    /// Region description rejected (inverted bounds, dimension mismatch).
    InvalidRegion(String),

    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Dataset missing, corrupt, or failing shape validation.
    DatasetParse(String),

    /// A computed quantity violated a certification invariant; the inputs
    /// are inherently unsafe or the sparsity threshold is too loose.
    InvariantViolation(String),

    /// The barrier LP admits no feasible certificate.
    SolverInfeasible(String),

    /// The LP is unbounded below; indicates a malformed program.
    SolverUnbounded(String),

    /// An iterative solver exhausted its budget where no fallback exists.
    NonConvergence {
        context: String,
    },

    NumericalInstability(String),

    NotSupported(String),
}

impl MartError {
    /// Create a ShapeMismatch error, panicking if the shapes are identical
    /// (identical shapes mean the caller raised the wrong error).
    #[track_caller]
    pub fn shape_mismatch(expected: Vec<usize>, got: Vec<usize>) -> Self {
        if expected == got {
            let loc = std::panic::Location::caller();
            panic!(
                "BUG at {}:{}:{}: ShapeMismatch created with identical shapes: {:?}",
                loc.file(),
                loc.line(),
                loc.column(),
                expected
            );
        }
        MartError::ShapeMismatch { expected, got }
    }
}

impl std::fmt::Display for MartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MartError::InvalidSystem(s) => write!(f, "Invalid system: {}", s),
            MartError::InvalidRegion(s) => write!(f, "Invalid region: {}", s),
            MartError::ShapeMismatch { expected, got } => {
                write!(f, "Shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            MartError::DatasetParse(s) => write!(f, "Dataset parse failed: {}", s),
            MartError::InvariantViolation(s) => {
                write!(f, "Certification invariant violated: {}", s)
            }
            MartError::SolverInfeasible(s) => write!(f, "Solver infeasible: {}", s),
            MartError::SolverUnbounded(s) => write!(f, "Solver unbounded: {}", s),
            MartError::NonConvergence { context } => {
                write!(f, "Solver failed to converge: {}", context)
            }
            MartError::NumericalInstability(s) => write!(f, "Numerical instability: {}", s),
            MartError::NotSupported(s) => write!(f, "Not supported: {}", s),
        }
    }
}

impl std::error::Error for MartError {}

pub type Result<T> = std::result::Result<T, MartError>;
