use criterion::BatchSize;
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};
use dpmoe::prelude::*;
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn mixture(k: usize, n: usize) -> MixtureOfLinearGaussians<StickBreaking> {
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);
    let components = (0..k)
        .map(|_| {
            let basis = NormalWishart::new(
                DVector::zeros(1),
                1e-2,
                DMatrix::identity(1, 1),
                2.0,
            )
            .unwrap();
            let model = MatrixNormalWishart::new(
                DMatrix::zeros(1, 2),
                DMatrix::identity(2, 2) * 1e-3,
                DMatrix::identity(1, 1),
                2.0,
                true,
            )
            .unwrap();
            Component::new(basis, model, &mut rng)
        })
        .collect();
    let gating = StickBreaking::dirichlet_process(k, 10.0).unwrap();
    let mut mixture = Mixture::new(gating, components, &mut rng).unwrap();
    let inputs: Vec<DVector<f64>> = (0..n)
        .map(|i| DVector::from_element(1, -5.0 + 10.0 * i as f64 / n as f64))
        .collect();
    let targets: Vec<DVector<f64>> = inputs
        .iter()
        .map(|x| DVector::from_element(1, x[0].sin()))
        .collect();
    mixture
        .add_data(&targets, &inputs, true, None, None, &mut rng)
        .unwrap();
    mixture
}

fn bench_gibbs_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("Gibbs sweep, 1000 points");
    for k in [5, 20, 50] {
        group.bench_function(format!("K = {}", k), |b| {
            b.iter_batched_ref(
                || (mixture(k, 1000), Xoshiro256Plus::seed_from_u64(7)),
                |(mixture, rng)| mixture.resample(1, rng).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
}

fn bench_meanfield_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("Meanfield iteration, 1000 points");
    for k in [5, 20, 50] {
        group.bench_function(format!("K = {}", k), |b| {
            b.iter_batched_ref(
                || mixture(k, 1000),
                |mixture| mixture.meanfield_coordinate_descent(0.0, 1, false).unwrap(),
                BatchSize::LargeInput,
            )
        });
    }
}

criterion_group!(gibbs_benches, bench_gibbs_sweep, bench_meanfield_iteration);
criterion_main!(gibbs_benches);
