//! Transition-probability sweep benchmark across upper-bound methods.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mart_core::{ProbabilityConfig, UpperBoundMethod};
use mart_geom::Hyperrectangle;
use mart_prob::{transition_probabilities, LinearGaussian, StochasticSystem};
use ndarray::{arr1, arr2};

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

fn bench_methods(c: &mut Criterion) {
    let safe = Hyperrectangle::new(arr1(&[-1.0]), arr1(&[1.0])).unwrap();
    let sys = StochasticSystem::Linear(
        LinearGaussian::new(arr2(&[[0.9]]), arr1(&[0.0]), arr1(&[0.1]), safe).unwrap(),
    );
    let regions = uniform_partition(-1.0, 1.0, 40);

    let mut group = c.benchmark_group("transition_probabilities");
    for (name, method) in [
        ("box", UpperBoundMethod::BoxApproximation),
        ("global", UpperBoundMethod::GlobalSolver),
        ("frank_wolfe", UpperBoundMethod::frank_wolfe()),
    ] {
        let config = ProbabilityConfig {
            upper_bound_method: method,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(name), &config, |b, config| {
            b.iter(|| transition_probabilities(&sys, &regions, config).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_methods);
criterion_main!(benches);
