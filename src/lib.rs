//! Bayesian nonparametric mixtures of linear-Gaussian experts
//!
//! `dpmoe` fits infinite-capacity mixture-of-experts regression and density
//! models built from conjugate exponential families. Every family exposes
//! its natural-parameter algebra, so conjugate updates, mean-field updates
//! and natural-gradient steps are the same few vector-space operations on
//! the family's statistics tuple.
//!
//! The crate is organized bottom-up:
//!
//! - [`dist`]: conjugate priors (normal-Wishart, matrix-normal-Wishart,
//!   stick-breaking, ...), the likelihoods they are conjugate to and their
//!   Student-t posterior predictives;
//! - [`model`]: [`Bayesian`](model::Bayesian), a prior, a posterior and a
//!   current likelihood sample;
//! - [`mixture`]: gated mixtures fitted by Gibbs sampling, batch mean-field
//!   coordinate ascent or stochastic natural-gradient descent, and their
//!   predictions.
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use dpmoe::prelude::*;
//! use rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//!
//! let mut rng = Xoshiro256Plus::seed_from_u64(1337);
//!
//! // five piecewise-linear experts gated in input space
//! let gating = StickBreaking::dirichlet_process(5, 1.0).unwrap();
//! let experts = (0..5)
//!     .map(|_| {
//!         let basis = NormalWishart::new(
//!             DVector::zeros(1),
//!             0.01,
//!             DMatrix::identity(1, 1),
//!             3.0,
//!         ).unwrap();
//!         let model = MatrixNormalWishart::new(
//!             DMatrix::zeros(1, 2),
//!             DMatrix::identity(2, 2) * 0.01,
//!             DMatrix::identity(1, 1),
//!             3.0,
//!             true,
//!         ).unwrap();
//!         Component::new(basis, model, &mut rng)
//!     })
//!     .collect();
//! let mut dpglm: MixtureOfLinearGaussians<_> =
//!     Mixture::new(gating, experts, &mut rng).unwrap();
//!
//! let inputs: Vec<DVector<f64>> = (0..100)
//!     .map(|i| DVector::from_element(1, i as f64 / 50.0 - 1.0))
//!     .collect();
//! let targets: Vec<DVector<f64>> = inputs
//!     .iter()
//!     .map(|x| DVector::from_element(1, x[0].abs()))
//!     .collect();
//! dpglm.add_data(&targets, &inputs, false, None, None, &mut rng).unwrap();
//!
//! dpglm.resample(20, &mut rng).unwrap();
//! let elbos = dpglm.meanfield_coordinate_descent(1e-6, 50, false).unwrap();
//! assert!(!elbos.is_empty());
//!
//! let pred = dpglm
//!     .meanfield_prediction(&inputs, None, PredictionKind::Average)
//!     .unwrap();
//! assert_eq!(pred.mean.nrows(), 100);
//! ```
pub mod consts;
pub mod data;
pub mod dist;
pub mod error;
pub mod misc;
pub mod mixture;
pub mod model;
pub mod prelude;
pub(crate) mod stats;
pub mod traits;

#[cfg(test)]
mod test;

pub use error::{Error, Result};

#[macro_export]
macro_rules! impl_display {
    ($kind: ty) => {
        impl ::std::fmt::Display for $kind {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", String::from(self))
            }
        }
    };
}

doc_comment::doctest!("../README.md", readme);
