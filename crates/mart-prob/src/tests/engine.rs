//! Engine-level tests: column invariants, pruning, determinism.

use crate::engine::transition_probabilities;
use crate::region::attach_probabilities;
use crate::system::{AffineMap, LinearGaussian, PwaPiece, StochasticSystem, UncertainPwa};
use mart_core::{ProbabilityConfig, UpperBoundMethod, PROB_TOLERANCE};
use mart_geom::Hyperrectangle;
use ndarray::{arr1, arr2};

/// Uniform 1-D partition of [lo, hi] into n cells.
fn uniform_partition(lo: f64, hi: f64, n: usize) -> Vec<Hyperrectangle> {
    let width = (hi - lo) / n as f64;
    (0..n)
        .map(|k| {
            Hyperrectangle::new(
                arr1(&[lo + k as f64 * width]),
                arr1(&[lo + (k + 1) as f64 * width]),
            )
            .unwrap()
        })
        .collect()
}

fn contraction_1d(a: f64, sigma: f64) -> StochasticSystem {
    let safe = Hyperrectangle::new(arr1(&[-1.0]), arr1(&[1.0])).unwrap();
    StochasticSystem::Linear(
        LinearGaussian::new(arr2(&[[a]]), arr1(&[0.0]), arr1(&[sigma]), safe).unwrap(),
    )
}

fn grid_partition_2d(lo: f64, hi: f64, per_axis: usize) -> Vec<Hyperrectangle> {
    let width = (hi - lo) / per_axis as f64;
    let mut cells = Vec::with_capacity(per_axis * per_axis);
    for ix in 0..per_axis {
        for iy in 0..per_axis {
            cells.push(
                Hyperrectangle::new(
                    arr1(&[lo + ix as f64 * width, lo + iy as f64 * width]),
                    arr1(&[lo + (ix + 1) as f64 * width, lo + (iy + 1) as f64 * width]),
                )
                .unwrap(),
            );
        }
    }
    cells
}

#[test]
fn test_column_invariants_hold() {
    let sys = contraction_1d(0.9, 0.1);
    let regions = uniform_partition(-1.0, 1.0, 8);
    let config = ProbabilityConfig::default();
    let t = transition_probabilities(&sys, &regions, &config).unwrap();

    assert_eq!(t.num_regions(), 8);
    assert_eq!(t.unsafe_row(), 8);
    for j in 0..8 {
        let sum_lower = t.lower.column_sum(j);
        let sum_upper = t.upper.column_sum(j);
        assert!(sum_lower <= 1.0 + PROB_TOLERANCE, "col {j}: {sum_lower}");
        assert!(sum_upper >= 1.0 - PROB_TOLERANCE, "col {j}: {sum_upper}");
        for row in 0..9 {
            let b = t.bound(row, j);
            assert!(b.lower >= 0.0 && b.upper <= 1.0 + 1e-12);
            assert!(b.lower <= b.upper + 1e-12);
        }
    }
}

#[test]
fn test_attach_probabilities_round_trip() {
    let sys = contraction_1d(0.9, 0.1);
    let regions = uniform_partition(-1.0, 1.0, 5);
    let t = transition_probabilities(&sys, &regions, &ProbabilityConfig::default()).unwrap();
    let with_probs = attach_probabilities(&regions, &t).unwrap();
    assert_eq!(with_probs.len(), 5);
    for (j, r) in with_probs.iter().enumerate() {
        assert!(r.probabilities().validate(PROB_TOLERANCE).is_ok(), "col {j}");
    }
}

#[test]
fn test_self_loop_dominates_for_contraction() {
    // Strong contraction, tiny noise: the center cell maps into itself.
    let sys = contraction_1d(0.5, 0.01);
    let regions = uniform_partition(-1.0, 1.0, 5);
    let t = transition_probabilities(&sys, &regions, &ProbabilityConfig::default()).unwrap();
    // Center cell is index 2 ([-0.2, 0.2]); its image is [-0.1, 0.1].
    let self_bound = t.bound(2, 2);
    assert!(self_bound.lower > 0.99, "lower {}", self_bound.lower);
    assert!(t.bound(8, 2).upper < 1e-9, "unsafe mass from center");
}

#[test]
fn test_unsafe_tail_grows_at_the_edge() {
    // Wide noise: edge cells leak out of the safe set.
    let sys = contraction_1d(1.0, 0.5);
    let regions = uniform_partition(-1.0, 1.0, 3);
    let t = transition_probabilities(&sys, &regions, &ProbabilityConfig::default()).unwrap();
    let edge_tail = t.bound(3, 0);
    let center_tail = t.bound(3, 1);
    assert!(
        edge_tail.upper >= 0.3,
        "edge unsafe upper too small: {}",
        edge_tail.upper
    );
    assert!(edge_tail.upper > center_tail.upper);
}

#[test]
fn test_sparsity_cutoff_density() {
    // With sparsity_eps = 1e-6 the search radius is ~4.75σ; only region
    // pairs within that box overlap survive.
    let config = ProbabilityConfig {
        sparsity_eps: 1e-6,
        upper_bound_method: UpperBoundMethod::BoxApproximation,
        ..Default::default()
    };
    let regions = uniform_partition(-1.0, 1.0, 20);

    let coarse = transition_probabilities(&contraction_1d(1.0, 0.1), &regions, &config).unwrap();
    let fine = transition_probabilities(&contraction_1d(1.0, 0.05), &regions, &config).unwrap();

    // Halving sigma strictly shrinks the reachable band.
    assert!(
        fine.upper.density() < coarse.upper.density(),
        "density did not shrink: {} vs {}",
        fine.upper.density(),
        coarse.upper.density()
    );
}

#[test]
fn test_sigma_monotone_against_box_limit() {
    // Shrinking sigma concentrates mass but can never push an upper bound
    // past the box limit of its target.
    let regions = uniform_partition(-1.0, 1.0, 6);
    for &sigma in &[0.4, 0.2, 0.1, 0.05] {
        let sys = contraction_1d(0.9, sigma);
        let t =
            transition_probabilities(&sys, &regions, &ProbabilityConfig::default()).unwrap();
        for j in 0..6 {
            for row in 0..7 {
                assert!(t.bound(row, j).upper <= 1.0 + 1e-12);
            }
        }
    }
}

#[test]
fn test_deterministic_across_thread_counts() {
    let sys = contraction_1d(0.8, 0.15);
    let regions = uniform_partition(-1.0, 1.0, 10);

    let serial_config = ProbabilityConfig {
        max_threads: Some(1),
        min_regions_for_parallel: 1,
        ..Default::default()
    };
    let parallel_config = ProbabilityConfig {
        max_threads: Some(4),
        min_regions_for_parallel: 1,
        ..Default::default()
    };

    let a = transition_probabilities(&sys, &regions, &serial_config).unwrap();
    let b = transition_probabilities(&sys, &regions, &parallel_config).unwrap();

    // Columns are computed independently of the schedule: bitwise equal.
    assert_eq!(a, b);
}

#[test]
fn test_methods_are_ordered_by_tightness() {
    let sys = contraction_1d(0.9, 0.1);
    let regions = uniform_partition(-1.0, 1.0, 6);

    let run = |method: UpperBoundMethod| {
        let config = ProbabilityConfig {
            upper_bound_method: method,
            ..Default::default()
        };
        transition_probabilities(&sys, &regions, &config).unwrap()
    };

    let boxed = run(UpperBoundMethod::BoxApproximation);
    let global = run(UpperBoundMethod::GlobalSolver);
    let fw = run(UpperBoundMethod::frank_wolfe());

    for j in 0..6 {
        for row in 0..7 {
            let b = boxed.bound(row, j).upper;
            assert!(global.bound(row, j).upper <= b + 1e-9);
            assert!(fw.bound(row, j).upper <= b + 1e-9);
            // All methods share the exact vertex lower bound; pairs near
            // the pruning threshold may differ by at most that threshold.
            assert!((global.bound(row, j).lower - boxed.bound(row, j).lower).abs() < 1e-9);
        }
    }
}

#[test]
fn test_pwa_engine_two_pieces() {
    // Two cells with different contraction rates and an uncertain offset
    // on the second.
    let cells = vec![
        Hyperrectangle::new(arr1(&[-1.0]), arr1(&[0.0])).unwrap(),
        Hyperrectangle::new(arr1(&[0.0]), arr1(&[1.0])).unwrap(),
    ];
    let pieces = vec![
        PwaPiece::new(
            cells[0].clone(),
            vec![AffineMap::new(arr2(&[[0.5]]), arr1(&[0.0])).unwrap()],
        )
        .unwrap(),
        PwaPiece::new(
            cells[1].clone(),
            vec![
                AffineMap::new(arr2(&[[0.8]]), arr1(&[-0.05])).unwrap(),
                AffineMap::new(arr2(&[[0.8]]), arr1(&[0.05])).unwrap(),
            ],
        )
        .unwrap(),
    ];
    let safe = Hyperrectangle::new(arr1(&[-1.0]), arr1(&[1.0])).unwrap();
    let sys =
        StochasticSystem::Pwa(UncertainPwa::new(pieces, arr1(&[0.1]), safe).unwrap());

    let t = transition_probabilities(&sys, &cells, &ProbabilityConfig::default()).unwrap();
    for j in 0..2 {
        assert!(t.lower.column_sum(j) <= 1.0 + PROB_TOLERANCE);
        assert!(t.upper.column_sum(j) >= 1.0 - PROB_TOLERANCE);
    }
}

#[test]
fn test_region_count_mismatch_rejected() {
    let cells = uniform_partition(-1.0, 1.0, 3);
    let piece = PwaPiece::new(
        cells[0].clone(),
        vec![AffineMap::new(arr2(&[[0.5]]), arr1(&[0.0])).unwrap()],
    )
    .unwrap();
    let safe = Hyperrectangle::new(arr1(&[-1.0]), arr1(&[1.0])).unwrap();
    let sys = StochasticSystem::Pwa(
        UncertainPwa::new(vec![piece], arr1(&[0.1]), safe).unwrap(),
    );
    assert!(
        transition_probabilities(&sys, &cells, &ProbabilityConfig::default()).is_err()
    );
}

#[test]
fn test_bad_sparsity_eps_rejected() {
    let sys = contraction_1d(0.9, 0.1);
    let regions = uniform_partition(-1.0, 1.0, 3);
    for eps in [0.0, 0.5, 1.0, -1e-3] {
        let config = ProbabilityConfig {
            sparsity_eps: eps,
            ..Default::default()
        };
        assert!(transition_probabilities(&sys, &regions, &config).is_err());
    }
}

#[test]
fn test_2d_engine_invariants() {
    let safe = Hyperrectangle::new(arr1(&[-1.0, -1.0]), arr1(&[1.0, 1.0])).unwrap();
    let sys = StochasticSystem::Linear(
        LinearGaussian::new(
            arr2(&[[0.9, 0.05], [-0.05, 0.9]]),
            arr1(&[0.0, 0.0]),
            arr1(&[0.1, 0.1]),
            safe,
        )
        .unwrap(),
    );
    let regions = grid_partition_2d(-1.0, 1.0, 4);
    let config = ProbabilityConfig {
        upper_bound_method: UpperBoundMethod::frank_wolfe(),
        ..Default::default()
    };
    let t = transition_probabilities(&sys, &regions, &config).unwrap();
    for j in 0..regions.len() {
        assert!(t.lower.column_sum(j) <= 1.0 + PROB_TOLERANCE, "col {j}");
        assert!(t.upper.column_sum(j) >= 1.0 - PROB_TOLERANCE, "col {j}");
    }
}
