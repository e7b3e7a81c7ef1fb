//! Gibbs sampling of a two-component mixture of Gaussians that share one
//! covariance.
//!
//! RUST_LOG=debug cargo run --release --example tied_gmm
use dpmoe::prelude::*;
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    env_logger::init();
    let mut rng = Xoshiro256Plus::seed_from_u64(1337);

    // the generating model
    let generator = TiedNormalWisharts::new(
        vec![
            DVector::from_row_slice(&[1.0, 1.0]),
            DVector::from_row_slice(&[-1.0, -1.0]),
        ],
        DVector::from_element(2, 1e6),
        DMatrix::identity(2, 2),
        10.0,
    )
    .unwrap();
    let truth: TiedGaussians = generator.draw(&mut rng);
    let xs: Vec<DVector<f64>> = (0..500)
        .map(|i| truth.components()[i % 2].draw(&mut rng))
        .collect();

    let prior = TiedNormalWisharts::symmetric(
        2,
        DVector::zeros(2),
        0.01,
        DMatrix::identity(2, 2),
        3.0,
    )
    .unwrap();
    let gating = Dirichlet::symmetric(1.0, 2).unwrap();
    let mut mixture = TiedMixture::new(gating, prior, &mut rng).unwrap();
    mixture.add_data(&xs, &mut rng).unwrap();

    for round in 0..5 {
        mixture.resample(500, &mut rng).unwrap();
        println!(
            "after {} sweeps: used labels {:?}",
            500 * (round + 1),
            mixture.used_labels()
        );
    }

    for (k, (fitted, generated)) in
        mixture.means().iter().zip(truth.mus()).enumerate()
    {
        println!(
            "component {}: posterior mean {:?}, generator {:?}",
            k,
            fitted.as_slice(),
            generated.as_slice()
        );
    }
}
