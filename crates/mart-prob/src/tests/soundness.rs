//! Property tests: the bound bracket must hold for arbitrary geometry.

use crate::bounds::{max_prob_over_polytope, min_prob_at_vertices};
use crate::kernel::{log_erf_diff, TransitionKernel};
use crate::system::{LinearGaussian, StochasticSystem};
use mart_core::UpperBoundMethod;
use mart_geom::Hyperrectangle;
use ndarray::{arr1, arr2};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Sampled kernel values inside the image must respect the bracket,
    /// whatever the geometry.
    #[test]
    fn prop_bounds_bracket_sampled_points(
        src_lo in -2.0f64..0.0,
        src_width in 0.05f64..1.5,
        tgt_lo in -2.0f64..2.0,
        tgt_width in 0.05f64..1.5,
        a in -1.2f64..1.2,
        b in -0.5f64..0.5,
        sigma in 0.02f64..0.8,
        t in 0.0f64..1.0,
    ) {
        let safe = Hyperrectangle::new(arr1(&[-10.0]), arr1(&[10.0])).unwrap();
        let sys = StochasticSystem::Linear(
            LinearGaussian::new(arr2(&[[a]]), arr1(&[b]), arr1(&[sigma]), safe).unwrap(),
        );
        let source =
            Hyperrectangle::new(arr1(&[src_lo]), arr1(&[src_lo + src_width])).unwrap();
        let image = sys.post(0, &source).unwrap();

        let target =
            Hyperrectangle::new(arr1(&[tgt_lo]), arr1(&[tgt_lo + tgt_width])).unwrap();
        let kernel = TransitionKernel::new(&target, &arr1(&[sigma]));

        let lower = min_prob_at_vertices(&kernel, &image);
        for method in [
            UpperBoundMethod::BoxApproximation,
            UpperBoundMethod::GlobalSolver,
            UpperBoundMethod::frank_wolfe(),
        ] {
            let upper = max_prob_over_polytope(&kernel, &image, &method);
            prop_assert!(upper + 1e-12 >= lower);
            prop_assert!(upper <= 1.0 + 1e-12);

            // A point of the image segment, by interpolation.
            let lo = image.bounding_box.low()[0];
            let hi = image.bounding_box.high()[0];
            let y = arr1(&[lo + t * (hi - lo)]);
            let p = kernel.prob(&y);
            prop_assert!(p <= upper + 1e-12, "{method:?}: {p} > {upper}");
            prop_assert!(p >= lower - 1e-12, "{method:?}: {p} < {lower}");
        }
    }

    /// log_erf_diff must agree with the naive difference whenever the
    /// naive difference has any precision at all.
    #[test]
    fn prop_log_erf_diff_consistent(center in -4.0f64..4.0, width in 1e-3f64..3.0) {
        let b = center - 0.5 * width;
        let a = center + 0.5 * width;
        let naive = libm::erf(a) - libm::erf(b);
        prop_assume!(naive > 1e-12);
        let stable = log_erf_diff(a, b);
        let rel = (stable - naive.ln()).abs() / naive.ln().abs().max(1.0);
        prop_assert!(rel < 1e-8, "a={a}, b={b}: {stable} vs {}", naive.ln());
    }

    /// The stable form is monotone when the window slides away from the
    /// evaluation point, deep past where the naive form flatlines.
    #[test]
    fn prop_log_erf_diff_tail_monotone(start in 3.0f64..20.0, step in 0.1f64..2.0) {
        let first = log_erf_diff(start + 1.0, start);
        let second = log_erf_diff(start + step + 1.0, start + step);
        prop_assert!(second < first);
    }
}
