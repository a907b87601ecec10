//! Lower and upper bounds of the transition kernel over a post-image.
//!
//! The lower bound is exact vertex enumeration: a log-concave function
//! attains its minimum over a polytope at a vertex. The upper bound is a
//! tagged strategy (box relaxation, conditional gradient, or projected
//! gradient run to convergence), all certified the same way: concavity of
//! log T gives, for any point x and vertex set V of the image,
//!
//!   max_{y ∈ conv(V)} log T(y) ≤ log T(x) + max_{v ∈ V} ⟨∇log T(x), v − x⟩,
//!
//! so a feasible iterate plus its vertex dual gap is a sound bound even
//! when the solver stopped early. The box relaxation caps every method.

use crate::kernel::TransitionKernel;
use crate::system::PostImage;
use mart_core::UpperBoundMethod;
use mart_geom::FEASIBILITY_TOL;
use ndarray::Array1;
use tracing::{trace, warn};

/// Iteration budget for the projected-gradient global solver.
const GLOBAL_MAX_ITER: usize = 500;

/// Objective-improvement tolerance declaring the global solver converged.
const GLOBAL_IMPROVEMENT_TOL: f64 = 1e-12;

/// Armijo sufficient-increase coefficient.
const ARMIJO_C: f64 = 1e-4;

/// Slack added to the box fallback after a non-converged solve.
const NONCONVERGENCE_SLACK: f64 = 1e-9;

/// Minimum of T over the image vertices: the exact lower bound over the
/// polytope for a log-concave kernel.
pub fn min_prob_at_vertices(kernel: &TransitionKernel, image: &PostImage) -> f64 {
    image
        .vertices
        .vertices()
        .iter()
        .map(|v| kernel.prob(v))
        .fold(f64::INFINITY, f64::min)
}

/// Upper bound of T over the image, dispatched over the configured method.
pub fn max_prob_over_polytope(
    kernel: &TransitionKernel,
    image: &PostImage,
    method: &UpperBoundMethod,
) -> f64 {
    let center = kernel.global_max_point();
    let box_bound = box_upper_bound(kernel, image, &center);

    // The global maximizer inside the image: T(center) is the exact max.
    if image.halfspaces.contains(&center, FEASIBILITY_TOL) {
        return kernel.prob(&center).min(box_bound);
    }

    match *method {
        UpperBoundMethod::BoxApproximation => box_bound,
        UpperBoundMethod::FrankWolfe { num_iter, term_eps } => {
            frank_wolfe_upper(kernel, image, &center, num_iter, term_eps).min(box_bound)
        }
        UpperBoundMethod::GlobalSolver => {
            global_upper(kernel, image, &center, box_bound).min(box_bound)
        }
    }
}

/// Box relaxation: T factorizes per coordinate and each factor peaks at
/// the target's center coordinate, so clamping the center onto the image
/// bounding box maximizes every factor over the box independently.
fn box_upper_bound(
    kernel: &TransitionKernel,
    image: &PostImage,
    center: &Array1<f64>,
) -> f64 {
    kernel.prob(&image.bounding_box.clamp(center))
}

/// Vertex dual gap of log T at `x`: max over vertices of
/// ⟨∇log T(x), v − x⟩. Nonnegative for feasible x; bounds the remaining
/// ascent by concavity.
fn vertex_gap(kernel: &TransitionKernel, image: &PostImage, x: &Array1<f64>) -> (f64, usize) {
    let grad = kernel.grad_log_prob(x);
    let mut best = f64::NEG_INFINITY;
    let mut best_idx = 0;
    for (i, v) in image.vertices.vertices().iter().enumerate() {
        let s = grad.dot(&(v - x));
        if s > best {
            best = s;
            best_idx = i;
        }
    }
    (best, best_idx)
}

/// Conditional-gradient maximization of log T over the vertex hull.
///
/// Starts at the L2-closest point of the image to the target center and
/// takes the open-loop step 8/(k+8) toward the best vertex until the dual
/// gap drops below `term_eps`. Returns `exp(log T(x) + gap)`.
fn frank_wolfe_upper(
    kernel: &TransitionKernel,
    image: &PostImage,
    center: &Array1<f64>,
    num_iter: usize,
    term_eps: f64,
) -> f64 {
    let mut x = image.halfspaces.l2_closest_point(center);
    if !x.iter().all(|v| v.is_finite()) {
        x = image.vertices.vertices()[0].clone();
    }

    let mut gap = f64::INFINITY;
    for k in 0..num_iter {
        let (g, best_idx) = vertex_gap(kernel, image, &x);
        gap = g;
        if gap < term_eps {
            break;
        }
        let step = 8.0 / (k as f64 + 8.0);
        let target = &image.vertices.vertices()[best_idx];
        x = &x + &((target - &x).mapv(|d| d * step));
    }

    let (final_gap, _) = vertex_gap(kernel, image, &x);
    // A negative gap can only mean x drifted infeasible; the certificate
    // needs the one-sided bound.
    let certified = kernel.log_prob(&x) + final_gap.max(gap).max(0.0);
    certified.exp()
}

/// Projected-gradient ascent on log T over the halfspace form, run to
/// convergence, certified by the final vertex gap. Non-convergence
/// degrades to the box bound plus tolerance slack.
fn global_upper(
    kernel: &TransitionKernel,
    image: &PostImage,
    center: &Array1<f64>,
    box_bound: f64,
) -> f64 {
    let mut x = image.halfspaces.l2_closest_point(center);
    if !x.iter().all(|v| v.is_finite()) {
        x = image.vertices.vertices()[0].clone();
    }
    let mut fx = kernel.log_prob(&x);

    let mut converged = false;
    for iter in 0..GLOBAL_MAX_ITER {
        let grad = kernel.grad_log_prob(&x);
        let mut step = 1.0;
        let mut improved = false;
        while step > 1e-14 {
            let trial_raw = &x + &grad.mapv(|g| g * step);
            let trial = image.halfspaces.l2_closest_point(&trial_raw);
            let ft = kernel.log_prob(&trial);
            let ascent = grad.dot(&(&trial - &x));
            if ft > fx + ARMIJO_C * step.min(1.0) * ascent.max(0.0) && ft > fx {
                let gain = ft - fx;
                x = trial;
                fx = ft;
                improved = true;
                if gain < GLOBAL_IMPROVEMENT_TOL {
                    converged = true;
                }
                break;
            }
            step *= 0.5;
        }
        if !improved {
            // No ascent direction survives the backtracking: stationary.
            converged = true;
        }
        if converged {
            trace!(iterations = iter, "global upper-bound solver converged");
            break;
        }
    }

    if !converged {
        warn!(
            budget = GLOBAL_MAX_ITER,
            "upper-bound solver exhausted its budget; using box fallback"
        );
        return (box_bound + NONCONVERGENCE_SLACK).min(1.0);
    }

    let (gap, _) = vertex_gap(kernel, image, &x);
    (fx + gap.max(0.0)).exp()
}
