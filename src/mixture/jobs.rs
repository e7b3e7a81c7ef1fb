//! Independent fits as plain job values, run in parallel
//!
//! Each [`Job`] carries everything a fit needs: priors, data, a schedule
//! and a seed. Jobs share nothing mutable, so [`run_jobs`] hands them to the
//! rayon pool as they are.
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::{Component, Mixture};
use crate::dist::Categorical;
use crate::error::{Error, Result};
use crate::traits::{BasisPredictive, GatingPrior, RegressionPredictive, Sampleable};
use log::info;
use nalgebra::DVector;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::fmt;

/// Batch coordinate-ascent settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct MeanfieldSchedule {
    pub tol: f64,
    pub maxiter: usize,
}

/// Stochastic natural-gradient settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct StochasticSchedule {
    pub stepsize: f64,
    pub batchsize: usize,
    pub maxiter: usize,
}

/// How a fit proceeds
///
/// Each of the `super_iters` rounds runs `gibbs_iters` Gibbs sweeps, then
/// the stochastic steps, then batch mean-field. With `empirical_bayes` the
/// posteriors become the priors between rounds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct Schedule {
    pub gibbs_iters: usize,
    pub super_iters: usize,
    pub meanfield: Option<MeanfieldSchedule>,
    pub stochastic: Option<StochasticSchedule>,
    pub empirical_bayes: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            gibbs_iters: 100,
            super_iters: 1,
            meanfield: Some(MeanfieldSchedule {
                tol: 1e-8,
                maxiter: 500,
            }),
            stochastic: None,
            empirical_bayes: false,
        }
    }
}

impl Schedule {
    /// Run the schedule on a mixture that already holds its data
    pub fn fit<G, B, M, R>(
        &self,
        mixture: &mut Mixture<G, Component<B, M>>,
        rng: &mut R,
    ) -> Result<()>
    where
        G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
        B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
        M: RegressionPredictive + Sampleable<M::Likelihood> + fmt::Debug + Send + Sync,
        R: Rng,
    {
        for round in 0..self.super_iters {
            if self.gibbs_iters > 0 {
                mixture.resample(self.gibbs_iters, rng)?;
            }
            if let Some(sgd) = self.stochastic {
                mixture.meanfield_stochastic_descent(sgd.stepsize, sgd.batchsize, sgd.maxiter, rng)?;
            }
            if let Some(mf) = self.meanfield {
                mixture.meanfield_coordinate_descent(mf.tol, mf.maxiter, false)?;
            }
            if self.empirical_bayes && round + 1 < self.super_iters {
                mixture.advance_epoch();
            }
        }
        Ok(())
    }
}

/// One fit from scratch of a mixture of linear-Gaussian experts
#[derive(Debug, Clone)]
pub struct Job<G, B, M> {
    pub seed: u64,
    pub gating: G,
    pub bases: Vec<B>,
    pub models: Vec<M>,
    pub targets: Vec<DVector<f64>>,
    pub inputs: Vec<DVector<f64>>,
    pub whiten: bool,
    pub schedule: Schedule,
}

impl<G, B, M> Job<G, B, M>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
    M: RegressionPredictive + Sampleable<M::Likelihood> + fmt::Debug + Send + Sync,
{
    /// Build the mixture on this job's own random stream and fit it
    ///
    /// Fails with [`Error::DimensionMismatch`] unless there is exactly one
    /// model prior per basis prior.
    pub fn run(self) -> Result<Mixture<G, Component<B, M>>> {
        if self.bases.len() != self.models.len() {
            return Err(Error::DimensionMismatch {
                what: "number of model priors",
                expected: self.bases.len(),
                found: self.models.len(),
            });
        }
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        info!(
            "job {}: fitting {} experts to {} points",
            self.seed,
            self.bases.len(),
            self.inputs.len()
        );
        let components = self
            .bases
            .into_iter()
            .zip(self.models)
            .map(|(basis, model)| Component::new(basis, model, &mut rng))
            .collect();
        let mut mixture = Mixture::new(self.gating, components, &mut rng)?;
        mixture.add_data(&self.targets, &self.inputs, self.whiten, None, None, &mut rng)?;
        self.schedule.fit(&mut mixture, &mut rng)?;
        info!(
            "job {}: done, {} used labels",
            self.seed,
            mixture.used_labels().len()
        );
        Ok(mixture)
    }
}

/// Run every job on the rayon pool. Results keep the order of `jobs`.
pub fn run_jobs<G, B, M>(jobs: Vec<Job<G, B, M>>) -> Vec<Result<Mixture<G, Component<B, M>>>>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
    M: RegressionPredictive + Sampleable<M::Likelihood> + fmt::Debug + Send + Sync,
{
    jobs.into_par_iter().map(Job::run).collect()
}
