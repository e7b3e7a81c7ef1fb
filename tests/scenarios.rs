use dpmoe::prelude::*;
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256Plus;

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let px = std::f64::consts::PI * x;
        px.sin() / px
    }
}

fn noise_scale(x: f64) -> f64 {
    0.05 + 0.2 * (1.0 + (2.0 * x).sin()) / (1.0 + (-0.2 * x).exp())
}

#[test]
fn tied_mixture_recovers_two_generators() {
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);
    let centers = [[1.0, 1.0], [-1.0, -1.0]];
    let xs: Vec<DVector<f64>> = (0..500)
        .map(|i| {
            let c = centers[i % 2];
            let e0: f64 = StandardNormal.sample(&mut rng);
            let e1: f64 = StandardNormal.sample(&mut rng);
            DVector::from_row_slice(&[c[0] + 0.3 * e0, c[1] + 0.3 * e1])
        })
        .collect();

    let tied = TiedNormalWisharts::symmetric(
        2,
        DVector::zeros(2),
        0.01,
        DMatrix::identity(2, 2),
        3.0,
    )
    .unwrap();
    let gating = Dirichlet::symmetric(1.0, 2).unwrap();
    let mut mixture = TiedMixture::new(gating, tied, &mut rng).unwrap();
    mixture.add_data(&xs, &mut rng).unwrap();
    mixture.resample(2500, &mut rng).unwrap();

    assert_eq!(mixture.used_labels(), vec![0, 1]);
    for center in centers.iter() {
        let target = DVector::from_row_slice(center);
        let closest = mixture
            .means()
            .iter()
            .map(|mu| (mu - &target).norm())
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 0.3, "no mean within 0.3 of {:?}", center);
    }
}

#[test]
fn dirichlet_process_experts_fit_noisy_sinc() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);
    let n = 10_000;
    let k = 50;

    let inputs: Vec<DVector<f64>> = (0..n)
        .map(|i| DVector::from_element(1, -10.0 + 20.0 * i as f64 / (n - 1) as f64))
        .collect();
    let means: Vec<DVector<f64>> = inputs
        .iter()
        .map(|x| DVector::from_element(1, sinc(x[0])))
        .collect();
    let targets: Vec<DVector<f64>> = inputs
        .iter()
        .zip(means.iter())
        .map(|(x, m)| {
            let e: f64 = StandardNormal.sample(&mut rng);
            DVector::from_element(1, m[0] + noise_scale(x[0]) * e)
        })
        .collect();

    let components = (0..k)
        .map(|_| {
            let basis = NormalWishart::new(
                DVector::zeros(1),
                1e-2,
                DMatrix::identity(1, 1) * 1e2,
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
    let gating = StickBreaking::dirichlet_process(k, 100.0).unwrap();
    let mut mixture: MixtureOfLinearGaussians<_> =
        Mixture::new(gating, components, &mut rng).unwrap();

    mixture
        .add_data(&targets, &inputs, true, None, None, &mut rng)
        .unwrap();
    mixture.resample(25, &mut rng).unwrap();
    let elbos = mixture
        .meanfield_coordinate_descent(1e-2, 250, true)
        .unwrap();
    assert!(elbos.iter().all(|e| e.is_finite()));

    let pred = mixture
        .parallel_meanfield_prediction(&inputs, Some(&targets), true, PredictionKind::Average)
        .unwrap();
    assert!(pred.mse(&means) < 2e-2, "mse = {}", pred.mse(&means));
    assert!(pred.nlpd.unwrap().iter().all(|v| v.is_finite()));

    let used = mixture.used_labels();
    assert!(!used.is_empty());
    assert!(used.len() < k);
    assert!(used.iter().all(|&z| z < k));
}
