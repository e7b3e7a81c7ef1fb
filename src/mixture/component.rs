use super::Expert;
use crate::data::Observation;
use crate::error::Result;
use crate::model::Bayesian;
use crate::traits::{
    BasisPredictive, ConjugateModel, RegressionPredictive, Sampleable,
};
use nalgebra::DVector;
use rand::Rng;
use std::fmt;

/// One cluster of a mixture of experts
///
/// The basis is a Gaussian over inputs that gates the component; the model
/// is a linear-Gaussian regression of targets on inputs.
#[derive(Clone, Debug)]
pub struct Component<B, M>
where
    B: BasisPredictive + Sampleable<B::Likelihood>,
    M: RegressionPredictive + Sampleable<M::Likelihood>,
{
    basis: Bayesian<B>,
    model: Bayesian<M>,
}

impl<B, M> Component<B, M>
where
    B: BasisPredictive + Sampleable<B::Likelihood>,
    M: RegressionPredictive + Sampleable<M::Likelihood>,
{
    pub fn new<R: Rng>(basis_prior: B, model_prior: M, rng: &mut R) -> Self {
        Component {
            basis: Bayesian::new(basis_prior, rng),
            model: Bayesian::new(model_prior, rng),
        }
    }

    #[inline]
    pub fn basis(&self) -> &Bayesian<B> {
        &self.basis
    }

    #[inline]
    pub fn model(&self) -> &Bayesian<M> {
        &self.model
    }
}

/// Weighted inputs of weighted observations
fn inputs<'a: 'b, 'b>(
    data: &'b [(&'a Observation, f64)],
) -> impl Iterator<Item = (&'a DVector<f64>, f64)> + 'b {
    data.iter().map(|&(obs, w)| (&obs.input, w))
}

impl<B, M> Expert for Component<B, M>
where
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
    M: RegressionPredictive + Sampleable<M::Likelihood> + fmt::Debug + Send + Sync,
{
    type Datum = Observation;

    fn log_likelihood(&self, obs: &Observation) -> f64 {
        self.basis.log_likelihood(&obs.input) + self.model.log_likelihood(obs)
    }

    fn expected_log_likelihood(&self, xs: &[Observation]) -> Vec<f64> {
        let inputs: Vec<DVector<f64>> =
            xs.iter().map(|obs| obs.input.clone()).collect();
        self.basis
            .expected_log_likelihood(&inputs)
            .into_iter()
            .zip(self.model.expected_log_likelihood(xs))
            .map(|(b, m)| b + m)
            .collect()
    }

    fn check_datum(&self, obs: &Observation) -> Result<()> {
        self.basis.posterior().check_datum(&obs.input)?;
        self.model.posterior().check_datum(obs)
    }

    fn resample<R: Rng>(
        &mut self,
        data: &[(&Observation, f64)],
        rng: &mut R,
    ) -> Result<()> {
        self.basis.resample(inputs(data), rng)?;
        self.model.resample(data.iter().copied(), rng)
    }

    fn meanfield_update(&mut self, data: &[(&Observation, f64)]) -> Result<()> {
        self.basis.meanfield_update(inputs(data))?;
        self.model.meanfield_update(data.iter().copied())
    }

    fn meanfield_sgdstep(
        &mut self,
        data: &[(&Observation, f64)],
        prob: f64,
        stepsize: f64,
    ) -> Result<()> {
        self.basis.meanfield_sgdstep(inputs(data), prob, stepsize)?;
        self.model
            .meanfield_sgdstep(data.iter().copied(), prob, stepsize)
    }

    fn variational_lowerbound(&self) -> f64 {
        self.basis.variational_lowerbound() + self.model.variational_lowerbound()
    }

    fn advance_epoch(&mut self) {
        self.basis.advance_epoch();
        self.model.advance_epoch();
    }
}

/// A single conjugate family used directly as the expert of a density
/// mixture
impl<P> Expert for Bayesian<P>
where
    P: ConjugateModel + Sampleable<P::Likelihood> + fmt::Debug + Send + Sync,
    P::Datum: Clone + fmt::Debug + Send + Sync,
{
    type Datum = P::Datum;

    fn log_likelihood(&self, x: &P::Datum) -> f64 {
        Bayesian::log_likelihood(self, x)
    }

    fn expected_log_likelihood(&self, xs: &[P::Datum]) -> Vec<f64> {
        Bayesian::expected_log_likelihood(self, xs)
    }

    fn check_datum(&self, x: &P::Datum) -> Result<()> {
        self.posterior().check_datum(x)
    }

    fn resample<R: Rng>(
        &mut self,
        data: &[(&P::Datum, f64)],
        rng: &mut R,
    ) -> Result<()> {
        Bayesian::resample(self, data.iter().copied(), rng)
    }

    fn meanfield_update(&mut self, data: &[(&P::Datum, f64)]) -> Result<()> {
        Bayesian::meanfield_update(self, data.iter().copied())
    }

    fn meanfield_sgdstep(
        &mut self,
        data: &[(&P::Datum, f64)],
        prob: f64,
        stepsize: f64,
    ) -> Result<()> {
        Bayesian::meanfield_sgdstep(self, data.iter().copied(), prob, stepsize)
    }

    fn variational_lowerbound(&self) -> f64 {
        Bayesian::variational_lowerbound(self)
    }

    fn advance_epoch(&mut self) {
        Bayesian::advance_epoch(self)
    }
}
