use dpmoe::prelude::*;
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256Plus;

const TOL: f64 = 1E-9;

fn piecewise(n: usize, rng: &mut Xoshiro256Plus) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
    let inputs: Vec<DVector<f64>> = (0..n)
        .map(|i| {
            let x = -3.0 + 6.0 * i as f64 / (n - 1) as f64;
            DVector::from_row_slice(&[x, (i as f64 * 0.37).sin()])
        })
        .collect();
    let targets = inputs
        .iter()
        .map(|x| {
            let e: f64 = StandardNormal.sample(rng);
            let y = if x[0] < 0.0 { -x[0] } else { 2.0 * x[0] };
            DVector::from_element(1, y + 0.05 * e)
        })
        .collect();
    (targets, inputs)
}

fn diagonal_mixture(
    k: usize,
    rng: &mut Xoshiro256Plus,
) -> MixtureOfDiagonalLinearGaussians<Dirichlet> {
    let components = (0..k)
        .map(|_| {
            let basis = NormalGamma::new(
                DVector::zeros(2),
                DVector::from_element(2, 0.05),
                DVector::from_element(2, 2.0),
                DVector::from_element(2, 1.0),
            )
            .unwrap();
            let model = MatrixNormalGamma::new(
                DMatrix::zeros(1, 3),
                DMatrix::identity(3, 3) * 0.01,
                DVector::from_element(1, 2.0),
                DVector::from_element(1, 1.0),
                true,
            )
            .unwrap();
            Component::new(basis, model, rng)
        })
        .collect();
    Mixture::new(Dirichlet::symmetric(1.0, k).unwrap(), components, rng).unwrap()
}

fn assert_rows_normalized<G, E>(mixture: &Mixture<G, E>)
where
    G: GatingPrior + Sampleable<Categorical> + std::fmt::Debug + Send + Sync,
    E: Expert,
{
    for (labels, resp) in mixture.labels().iter().zip(mixture.responsibilities()) {
        for (n, row) in resp.row_iter().enumerate() {
            assert::close(row.sum(), 1.0, TOL);
            assert!(labels[n] < mixture.size());
        }
    }
}

#[test]
fn elbo_never_decreases_on_diagonal_experts() {
    let mut rng = Xoshiro256Plus::seed_from_u64(11);
    let (targets, inputs) = piecewise(300, &mut rng);
    let mut mixture = diagonal_mixture(6, &mut rng);
    mixture
        .add_data(&targets, &inputs, false, None, None, &mut rng)
        .unwrap();
    mixture.resample(10, &mut rng).unwrap();
    assert_rows_normalized(&mixture);

    let elbos = mixture.meanfield_coordinate_descent(1e-10, 100, false).unwrap();
    assert!(elbos.len() > 1);
    for w in elbos.windows(2) {
        assert!(w[1] >= w[0] - 1e-8 * (1.0 + w[0].abs()), "{} -> {}", w[0], w[1]);
    }
    assert_rows_normalized(&mixture);
}

#[test]
fn split_batches_are_fitted_jointly() {
    let mut rng = Xoshiro256Plus::seed_from_u64(12);
    let (targets, inputs) = piecewise(200, &mut rng);
    let mut mixture = diagonal_mixture(4, &mut rng);
    for (ys, xs) in targets.chunks(50).zip(inputs.chunks(50)) {
        mixture.add_data(ys, xs, false, None, None, &mut rng).unwrap();
    }
    assert_eq!(mixture.nb_batches(), 4);
    assert_eq!(mixture.nb_data(), 200);

    mixture.meanfield_coordinate_descent(1e-10, 300, false).unwrap();
    assert_rows_normalized(&mixture);
    let pred = mixture
        .meanfield_prediction(&inputs, Some(&targets), PredictionKind::Average)
        .unwrap();
    assert!(pred.mse(&targets) < 0.1);
}

#[test]
fn stochastic_descent_keeps_responsibilities_normalized() {
    let mut rng = Xoshiro256Plus::seed_from_u64(13);
    let (targets, inputs) = piecewise(200, &mut rng);
    let mut mixture = diagonal_mixture(4, &mut rng);
    mixture
        .add_data(&targets, &inputs, true, None, None, &mut rng)
        .unwrap();
    mixture.resample(5, &mut rng).unwrap();
    mixture
        .meanfield_stochastic_descent(0.1, 32, 50, &mut rng)
        .unwrap();
    assert_rows_normalized(&mixture);
    assert!(mixture.variational_lowerbound().is_finite());
}

#[test]
fn empirical_bayes_epoch_zeroes_the_prior_penalty() {
    let mut rng = Xoshiro256Plus::seed_from_u64(14);
    let (targets, inputs) = piecewise(100, &mut rng);
    let mut mixture = diagonal_mixture(3, &mut rng);
    mixture
        .add_data(&targets, &inputs, false, None, None, &mut rng)
        .unwrap();
    mixture.meanfield_coordinate_descent(1e-8, 20, false).unwrap();
    mixture.advance_epoch();
    for component in mixture.components() {
        assert::close(component.variational_lowerbound(), 0.0, 1e-8);
    }
    assert::close(mixture.gating().variational_lowerbound(), 0.0, 1e-8);
}

#[test]
fn density_mixture_separates_clusters_under_meanfield() {
    let mut rng = Xoshiro256Plus::seed_from_u64(15);
    let xs: Vec<DVector<f64>> = (0..200)
        .map(|i| {
            let c = if i % 2 == 0 { 3.0 } else { -3.0 };
            let e0: f64 = StandardNormal.sample(&mut rng);
            let e1: f64 = StandardNormal.sample(&mut rng);
            DVector::from_row_slice(&[c + 0.3 * e0, -c + 0.3 * e1])
        })
        .collect();
    let experts = (0..5)
        .map(|_| {
            let prior = NormalGamma::new(
                DVector::zeros(2),
                DVector::from_element(2, 0.05),
                DVector::from_element(2, 2.0),
                DVector::from_element(2, 1.0),
            )
            .unwrap();
            Bayesian::new(prior, &mut rng)
        })
        .collect();
    let gating = StickBreaking::dirichlet_process(5, 1.0).unwrap();
    let mut mixture: MixtureOfDiagonalGaussians<_> =
        Mixture::new(gating, experts, &mut rng).unwrap();
    mixture.add_data(&xs, false, None, &mut rng).unwrap();
    mixture.resample(20, &mut rng).unwrap();
    let elbos = mixture.meanfield_coordinate_descent(1e-8, 100, false).unwrap();
    for w in elbos.windows(2) {
        assert!(w[1] >= w[0] - 1e-8 * (1.0 + w[0].abs()));
    }
    assert_rows_normalized(&mixture);

    let labels = mixture.labels()[0];
    let even: Vec<usize> = labels.iter().step_by(2).copied().collect();
    let odd: Vec<usize> = labels.iter().skip(1).step_by(2).copied().collect();
    assert!(even.iter().all(|z| !odd.contains(z)));
}
