use crate::error::Result;
use crate::traits::{
    ConjugateModel, ConjugatePrior, HasDensity, Sampleable, Statistics,
};
use rand::Rng;

/// A conjugate family with its prior, its current posterior and a current
/// sample of the likelihood parameters
///
/// # Parameters
///
/// `P`: The prior family. The posterior has the same type and the
/// likelihood sample is a `P::Likelihood`.
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
/// let prior = NormalWishart::new(
///     DVector::zeros(2),
///     0.01,
///     DMatrix::identity(2, 2),
///     3.0,
/// ).unwrap();
///
/// let mut model = Bayesian::new(prior, &mut rng);
///
/// let xs = vec![DVector::from_row_slice(&[3.0, -3.0]); 50];
/// model.meanfield_update(xs.iter().map(|x| (x, 1.0))).unwrap();
///
/// assert!((model.posterior().mu()[0] - 3.0).abs() < 1e-3);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Bayesian<P: ConjugatePrior> {
    prior: P,
    posterior: P,
    likelihood: P::Likelihood,
}

impl<P> Bayesian<P>
where
    P: ConjugatePrior + Sampleable<P::Likelihood>,
{
    /// The posterior starts at the prior and the likelihood is a prior draw
    pub fn new<R: Rng>(prior: P, rng: &mut R) -> Self {
        let likelihood = prior.draw(rng);
        Bayesian {
            posterior: prior.clone(),
            prior,
            likelihood,
        }
    }

    #[inline]
    pub fn prior(&self) -> &P {
        &self.prior
    }

    #[inline]
    pub fn posterior(&self) -> &P {
        &self.posterior
    }

    /// The current sample of the likelihood parameters
    #[inline]
    pub fn likelihood(&self) -> &P::Likelihood {
        &self.likelihood
    }

    /// ln p(x | θ) under the current sample
    #[inline]
    pub fn log_likelihood(&self, x: &P::Datum) -> f64 {
        self.likelihood.ln_f(x)
    }

    /// Set the posterior to prior + `stat` and draw a new likelihood from it
    pub fn resample_from_suffstat<R: Rng>(
        &mut self,
        stat: &P::Stat,
        rng: &mut R,
    ) -> Result<()> {
        self.posterior = self.prior.posterior(stat).map_err(Into::into)?;
        self.likelihood = self.posterior.try_draw(rng)?;
        Ok(())
    }

    /// Set the posterior to prior + `stat`
    pub fn meanfield_update_from_suffstat(&mut self, stat: &P::Stat) -> Result<()> {
        self.posterior = self.prior.posterior(stat).map_err(Into::into)?;
        Ok(())
    }

    /// One natural-gradient step toward prior + `stat / prob`
    ///
    /// `prob` is the fraction of the data set `stat` was computed from and
    /// `stepsize` the step length ρ:
    ///
    /// η<sub>post</sub> ← (1 − ρ) η<sub>post</sub> + ρ (η<sub>prior</sub> + stat / prob)
    pub fn meanfield_sgdstep_from_suffstat(
        &mut self,
        stat: &P::Stat,
        prob: f64,
        stepsize: f64,
    ) -> Result<()> {
        let mut target = self.prior.to_natural();
        target.axpy(1.0 / prob, stat);

        let mut nat = self.posterior.to_natural();
        nat.scale(1.0 - stepsize);
        nat.axpy(stepsize, &target);

        self.posterior = self.prior.from_natural(&nat).map_err(Into::into)?;
        Ok(())
    }

    /// −KL(posterior ‖ prior), this model's term of the evidence lower bound
    pub fn variational_lowerbound(&self) -> f64 {
        -self.posterior.kl(&self.prior)
    }

    /// Empirical-Bayes epoch boundary: the posterior becomes the prior
    pub fn advance_epoch(&mut self) {
        self.prior = self.posterior.clone();
    }
}

impl<P> Bayesian<P>
where
    P: ConjugateModel + Sampleable<P::Likelihood>,
{
    /// Posterior given weighted data, then a fresh likelihood draw
    pub fn resample<'a, I, R>(&mut self, data: I, rng: &mut R) -> Result<()>
    where
        I: IntoIterator<Item = (&'a P::Datum, f64)>,
        P::Datum: 'a,
        R: Rng,
    {
        let stat = self.prior.suffstat(data);
        self.resample_from_suffstat(&stat, rng)
    }

    /// Posterior given weighted data
    pub fn meanfield_update<'a, I>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a P::Datum, f64)>,
        P::Datum: 'a,
    {
        let stat = self.prior.suffstat(data);
        self.meanfield_update_from_suffstat(&stat)
    }

    /// Natural-gradient step on a weighted minibatch drawn with probability
    /// `prob`
    pub fn meanfield_sgdstep<'a, I>(
        &mut self,
        data: I,
        prob: f64,
        stepsize: f64,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (&'a P::Datum, f64)>,
        P::Datum: 'a,
    {
        let stat = self.prior.suffstat(data);
        self.meanfield_sgdstep_from_suffstat(&stat, prob, stepsize)
    }

    /// E[ln p(x | θ)] under the posterior
    pub fn expected_log_likelihood(&self, xs: &[P::Datum]) -> Vec<f64> {
        self.posterior.expected_log_likelihood(xs)
    }
}
