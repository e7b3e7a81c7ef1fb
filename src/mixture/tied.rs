use super::{check_elbo, label_counts, normalize_logits, occupation_counts, used_labels, Batch};
use crate::dist::{Categorical, TiedNormalWisharts, TiedNormalWishartsStat};
use crate::error::{Error, Result};
use crate::misc::ln_pflip;
use crate::model::Bayesian;
use crate::traits::{ConjugateModel, GatingPrior, HasDensity, Sampleable, Statistics};
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::fmt;

/// A mixture of Gaussians that share one precision matrix
///
/// The K means and the precision have a single joint
/// [`TiedNormalWisharts`] prior, so the component update is exactly
/// conjugate.
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
/// use rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256Plus;
///
/// let mut rng = Xoshiro256Plus::seed_from_u64(1337);
/// let tied = TiedNormalWisharts::symmetric(
///     2,
///     DVector::zeros(2),
///     0.05,
///     DMatrix::identity(2, 2),
///     4.0,
/// ).unwrap();
/// let gating = Dirichlet::symmetric(1.0, 2).unwrap();
/// let mut mixture = TiedMixture::new(gating, tied, &mut rng).unwrap();
///
/// let xs: Vec<DVector<f64>> = (0..40)
///     .map(|i| {
///         let s = if i % 2 == 0 { 3.0 } else { -3.0 };
///         DVector::from_row_slice(&[s, s])
///     })
///     .collect();
/// mixture.add_data(&xs, &mut rng).unwrap();
/// mixture.resample(25, &mut rng).unwrap();
///
/// assert_eq!(mixture.used_labels().len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct TiedMixture<G>
where
    G: GatingPrior + Sampleable<Categorical>,
{
    gating: Bayesian<G>,
    tied: Bayesian<TiedNormalWisharts>,
    batches: Vec<Batch<DVector<f64>>>,
}

impl<G> TiedMixture<G>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
{
    pub fn new<R: Rng>(
        gating_prior: G,
        tied_prior: TiedNormalWisharts,
        rng: &mut R,
    ) -> Result<Self> {
        if gating_prior.k() != tied_prior.k() {
            return Err(Error::DimensionMismatch {
                what: "number of tied components",
                expected: gating_prior.k(),
                found: tied_prior.k(),
            });
        }
        Ok(TiedMixture {
            gating: Bayesian::new(gating_prior, rng),
            tied: Bayesian::new(tied_prior, rng),
            batches: Vec::new(),
        })
    }

    /// The number of components, K
    #[inline]
    pub fn size(&self) -> usize {
        self.tied.prior().k()
    }

    #[inline]
    pub fn gating(&self) -> &Bayesian<G> {
        &self.gating
    }

    #[inline]
    pub fn tied(&self) -> &Bayesian<TiedNormalWisharts> {
        &self.tied
    }

    pub fn nb_data(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    pub fn labels(&self) -> Vec<&[usize]> {
        self.batches.iter().map(|b| b.labels.as_slice()).collect()
    }

    pub fn responsibilities(&self) -> Vec<&DMatrix<f64>> {
        self.batches.iter().map(|b| &b.resp).collect()
    }

    pub fn used_labels(&self) -> Vec<usize> {
        used_labels(&self.batches, self.size())
    }

    /// Posterior means of the K components
    pub fn means(&self) -> &[DVector<f64>] {
        self.tied.posterior().mus()
    }

    pub fn add_data<R: Rng>(&mut self, xs: &[DVector<f64>], rng: &mut R) -> Result<()> {
        if xs.is_empty() {
            return Err(Error::NoData);
        }
        let d = self.tied.prior().ndims();
        if let Some(x) = xs.iter().find(|x| x.len() != d) {
            return Err(Error::DimensionMismatch {
                what: "Gaussian observation",
                expected: d,
                found: x.len(),
            });
        }
        let batch = Batch::new(xs.to_vec(), self.gating.likelihood(), rng);
        self.batches.push(batch);
        Ok(())
    }

    pub fn clear_data(&mut self) -> Result<()> {
        if self.batches.is_empty() {
            Err(Error::NoData)
        } else {
            self.batches.clear();
            Ok(())
        }
    }

    /// Statistics of every batch at its stored responsibilities
    fn suffstat(&self) -> TiedNormalWishartsStat {
        let prior = self.tied.prior();
        self.batches
            .iter()
            .fold(prior.empty_suffstat(), |mut stat, batch| {
                stat.axpy(1.0, &prior.responsibility_suffstat(&batch.data, &batch.resp));
                stat
            })
    }

    fn gating_suffstat(&self, counts: &[f64]) -> G::Stat {
        self.gating.prior().count_suffstat(counts)
    }

    /// Responsibilities collapsed onto the hard labels
    fn harden(&mut self) {
        for batch in self.batches.iter_mut() {
            for n in 0..batch.len() {
                let z = batch.labels[n];
                batch.set_label(n, z);
            }
        }
    }

    /// `maxiter` Gibbs sweeps of the tied components, gating and labels
    pub fn resample<R: Rng>(&mut self, maxiter: usize, rng: &mut R) -> Result<()> {
        if self.batches.is_empty() {
            return Err(Error::NoData);
        }
        self.harden();
        for iter in 0..maxiter {
            let stat = self.suffstat();
            self.tied.resample_from_suffstat(&stat, rng)?;
            let stat = self.gating_suffstat(&label_counts(&self.batches, self.size()));
            self.gating.resample_from_suffstat(&stat, rng)?;

            let ln_weights = self.gating.likelihood().ln_weights();
            let components = self.tied.likelihood().components();
            for batch in self.batches.iter_mut() {
                for n in 0..batch.len() {
                    let x = &batch.data[n];
                    let logits: Vec<f64> = components
                        .iter()
                        .zip(ln_weights.iter())
                        .map(|(g, ln_w)| ln_w + g.ln_f(x))
                        .collect();
                    let z = ln_pflip(&logits, 1, false, rng)[0];
                    batch.set_label(n, z);
                }
            }
            debug!(
                "tied gibbs sweep {}: {} used labels",
                iter,
                self.used_labels().len()
            );
        }
        Ok(())
    }

    fn meanfield_estep(&mut self) -> f64 {
        let ln_weights = self.gating.posterior().expected_ln_weights();
        let posterior = self.tied.posterior();
        let mut bound = 0.0;
        for batch in self.batches.iter_mut() {
            let mut logits = posterior.expected_log_likelihoods(&batch.data);
            for mut row in logits.row_iter_mut() {
                row.iter_mut()
                    .zip(ln_weights.iter())
                    .for_each(|(l, ln_w)| *l += ln_w);
            }
            let estep = normalize_logits(logits);
            bound += estep.bound;
            batch.set_responsibilities(estep);
        }
        bound
    }

    fn meanfield_mstep(&mut self) -> Result<()> {
        let stat = self.suffstat();
        self.tied.meanfield_update_from_suffstat(&stat)?;
        let stat = self.gating_suffstat(&occupation_counts(&self.batches, self.size()));
        self.gating.meanfield_update_from_suffstat(&stat)
    }

    /// Batch coordinate ascent from the stored responsibilities, returning
    /// the ELBO trace
    pub fn meanfield_coordinate_descent(
        &mut self,
        tol: f64,
        maxiter: usize,
        progress: bool,
    ) -> Result<Vec<f64>> {
        if self.batches.is_empty() {
            return Err(Error::NoData);
        }
        self.meanfield_mstep()?;
        let mut elbos = Vec::with_capacity(maxiter);
        for iter in 0..maxiter {
            let elbo = self.meanfield_estep()
                + self.tied.variational_lowerbound()
                + self.gating.variational_lowerbound();
            if !elbo.is_finite() {
                return Err(Error::Degenerate {
                    what: "evidence lower bound",
                });
            }
            self.meanfield_mstep()?;
            elbos.push(elbo);
            debug!("tied meanfield iteration {}: elbo = {}", iter, elbo);
            if progress {
                info!("tied meanfield iteration {}/{}: elbo = {:.4}", iter + 1, maxiter, elbo);
            }
            if check_elbo(&elbos, tol) {
                break;
            }
        }
        Ok(elbos)
    }

    pub fn advance_epoch(&mut self) {
        self.gating.advance_epoch();
        self.tied.advance_epoch();
    }
}
