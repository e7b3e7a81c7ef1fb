//! Fit a Dirichlet-process mixture of linear experts to heteroscedastic
//! sinc data over several seeds in parallel, then report the predictive
//! fit of each.
//!
//! RUST_LOG=info cargo run --release --example sinc
use dpmoe::prelude::*;
use log::info;
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

// Input-dependent noise level
fn noise(x: f64) -> f64 {
    0.05 + 0.2 * (1.0 + (2.0 * x).sin()) / (1.0 + (-0.2 * x).exp())
}

fn main() {
    env_logger::init();

    let n = 10_000;
    let k = 50;
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);

    let inputs: Vec<DVector<f64>> = (0..n)
        .map(|i| DVector::from_element(1, -10.0 + 20.0 * i as f64 / (n - 1) as f64))
        .collect();
    let targets: Vec<DVector<f64>> = inputs
        .iter()
        .map(|x| {
            let e: f64 = StandardNormal.sample(&mut rng);
            DVector::from_element(1, sinc(x[0]) + noise(x[0]) * e)
        })
        .collect();

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

    let schedule = Schedule {
        gibbs_iters: 25,
        super_iters: 3,
        meanfield: Some(MeanfieldSchedule {
            tol: 1e-2,
            maxiter: 500,
        }),
        stochastic: None,
        empirical_bayes: true,
    };

    let jobs: Vec<_> = (0..4)
        .map(|seed| Job {
            seed,
            gating: StickBreaking::dirichlet_process(k, 100.0).unwrap(),
            bases: vec![basis.clone(); k],
            models: vec![model.clone(); k],
            targets: targets.clone(),
            inputs: inputs.clone(),
            whiten: true,
            schedule: schedule.clone(),
        })
        .collect();

    for (seed, fit) in run_jobs(jobs).into_iter().enumerate() {
        let mixture = match fit {
            Ok(mixture) => mixture,
            Err(err) => {
                eprintln!("seed {}: fit failed: {}", seed, err);
                continue;
            }
        };
        let pred = mixture
            .parallel_meanfield_prediction(
                &inputs,
                Some(&targets),
                true,
                PredictionKind::Average,
            )
            .unwrap();
        let nlpd = pred.nlpd.as_ref().map_or(f64::NAN, |v| {
            v.iter().sum::<f64>() / v.len() as f64
        });
        info!("seed {} done", seed);
        println!(
            "seed {}: mse = {:.5}, mean nlpd = {:.4}, {} used components",
            seed,
            pred.mse(&targets),
            nlpd,
            mixture.used_labels().len()
        );
    }
}
