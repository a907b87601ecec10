//! L2 projection onto a halfspace polytope.
//!
//! Solves min ‖x − p‖² s.t. Ax ≤ b through projected-gradient ascent on
//! the Lagrangian dual: with multipliers λ ≥ 0 the stationarity condition
//! gives x = p − Aᵀλ and the dual objective
//!
//!   g(λ) = −½ λᵀAAᵀλ + λᵀ(Ap − b),
//!
//! concave with gradient Lipschitz constant ‖AAᵀ‖. A fixed iteration
//! budget with step 1/L is enough for the small systems this crate sees;
//! the result is used as a warm start for downstream solvers, which carry
//! their own certification, so approximate convergence is acceptable.

use crate::linalg;
use ndarray::{Array1, Array2};

/// Dual ascent iteration budget.
const MAX_ITER: usize = 600;

/// Early-exit threshold on the projected gradient norm.
const GRAD_TOL: f64 = 1e-12;

/// Closest point of `{x : a·x <= b}` to `p` in the Euclidean norm.
///
/// If `p` is already feasible it is returned unchanged.
pub fn l2_closest_point(a: &Array2<f64>, b: &Array1<f64>, p: &Array1<f64>) -> Array1<f64> {
    debug_assert_eq!(a.nrows(), b.len());
    debug_assert_eq!(a.ncols(), p.len());

    let residual = a.dot(p) - b;
    if residual.iter().all(|&r| r <= 0.0) {
        return p.clone();
    }

    let gram = a.dot(&a.t());
    let lipschitz = linalg::inf_norm(&gram).max(1e-12);
    let step = 1.0 / lipschitz;

    let mut lambda = Array1::<f64>::zeros(a.nrows());
    for _ in 0..MAX_ITER {
        // ∇g(λ) = (Ap − b) − AAᵀλ
        let grad = &residual - &gram.dot(&lambda);
        let mut max_proj_grad = 0.0f64;
        for i in 0..lambda.len() {
            let g = grad[i];
            // Projected gradient: at the boundary λ_i = 0 only ascent
            // directions count.
            let pg = if lambda[i] > 0.0 { g } else { g.max(0.0) };
            max_proj_grad = max_proj_grad.max(pg.abs());
            lambda[i] = (lambda[i] + step * g).max(0.0);
        }
        if max_proj_grad < GRAD_TOL {
            break;
        }
    }

    p - &a.t().dot(&lambda)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};

    fn unit_box_rows() -> (Array2<f64>, Array1<f64>) {
        (
            arr2(&[[1.0, 0.0], [-1.0, 0.0], [0.0, 1.0], [0.0, -1.0]]),
            arr1(&[1.0, 0.0, 1.0, 0.0]),
        )
    }

    #[test]
    fn test_feasible_point_unchanged() {
        let (a, b) = unit_box_rows();
        let p = arr1(&[0.3, 0.7]);
        let x = l2_closest_point(&a, &b, &p);
        assert_relative_eq!(x[0], 0.3);
        assert_relative_eq!(x[1], 0.7);
    }

    #[test]
    fn test_projection_onto_face() {
        let (a, b) = unit_box_rows();
        let p = arr1(&[0.5, 2.0]);
        let x = l2_closest_point(&a, &b, &p);
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_onto_corner() {
        let (a, b) = unit_box_rows();
        let p = arr1(&[3.0, -2.0]);
        let x = l2_closest_point(&a, &b, &p);
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_projection_onto_slanted_halfspace() {
        // x + y <= 1; project (1, 1) -> (0.5, 0.5).
        let a = arr2(&[[1.0, 1.0]]);
        let b = arr1(&[1.0]);
        let p = arr1(&[1.0, 1.0]);
        let x = l2_closest_point(&a, &b, &p);
        assert_relative_eq!(x[0], 0.5, epsilon = 1e-8);
        assert_relative_eq!(x[1], 0.5, epsilon = 1e-8);
    }

    #[test]
    fn test_projected_point_is_feasible() {
        let a = arr2(&[[1.0, 1.0], [-1.0, 0.0], [0.0, -1.0]]);
        let b = arr1(&[1.0, 0.0, 0.0]);
        for p in [arr1(&[2.0, 2.0]), arr1(&[-1.0, 3.0]), arr1(&[0.9, 0.9])] {
            let x = l2_closest_point(&a, &b, &p);
            let slack = a.dot(&x) - &b;
            assert!(
                slack.iter().all(|&s| s <= 1e-6),
                "projection infeasible: {:?}",
                slack
            );
        }
    }
}
