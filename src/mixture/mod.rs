//! Gated mixtures of conjugate experts
//!
//! A [`Mixture`] owns a gating prior over K categorical weights, K experts
//! and a buffer of data batches with their hard labels and responsibility
//! matrices. It is fitted by Gibbs sampling ([`Mixture::resample`]), batch
//! mean-field coordinate ascent
//! ([`Mixture::meanfield_coordinate_descent`]) or stochastic natural-gradient
//! steps ([`Mixture::meanfield_stochastic_descent`]), in any order.
mod component;
pub mod jobs;
mod prediction;
mod tied;

pub use component::Component;
pub use prediction::{
    ParsePredictionKindError, PredictionKind, PredictiveMoments,
};
pub use tied::TiedMixture;

use crate::data::{observations, AffineTransform, Observation, TransformKind};
use crate::dist::{
    Categorical, MatrixNormalGamma, MatrixNormalWishart, NormalGamma,
    NormalWishart,
};
use crate::error::{Error, Result};
use crate::misc::{argmax, ln_pflip, logsumexp};
use crate::model::Bayesian;
use crate::traits::{BasisPredictive, GatingPrior, RegressionPredictive, Sampleable};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rand::seq::index;
use rand::Rng;
use std::fmt;

/// Responsibilities at or below this do not make a label "used"
pub const USED_LABEL_THRESHOLD: f64 = 1e-2;

/// Relative slack allowed before an ELBO decrease is reported
const ELBO_NOISE: f64 = 1e-8;

/// A mixture expert: the per-component part of a [`Mixture`]
///
/// Implemented for [`Component`] (regression experts with an input basis)
/// and for [`Bayesian`] (a single conjugate family, for density mixtures).
pub trait Expert: Clone + fmt::Debug + Send + Sync {
    type Datum: Clone + fmt::Debug + Send + Sync;

    /// ln p(x | θ) under the current parameter sample
    fn log_likelihood(&self, x: &Self::Datum) -> f64;

    /// E[ln p(x | θ)] under the posterior for every x in `xs`
    fn expected_log_likelihood(&self, xs: &[Self::Datum]) -> Vec<f64>;

    /// Check that `x` has the dimensions this expert models
    fn check_datum(&self, x: &Self::Datum) -> Result<()>;

    /// Posterior from weighted data, then a fresh parameter sample
    fn resample<R: Rng>(
        &mut self,
        data: &[(&Self::Datum, f64)],
        rng: &mut R,
    ) -> Result<()>;

    /// Posterior from weighted data
    fn meanfield_update(&mut self, data: &[(&Self::Datum, f64)]) -> Result<()>;

    /// Natural-gradient step on a weighted minibatch drawn with
    /// probability `prob`
    fn meanfield_sgdstep(
        &mut self,
        data: &[(&Self::Datum, f64)],
        prob: f64,
        stepsize: f64,
    ) -> Result<()>;

    /// −KL(posterior ‖ prior) summed over the expert's factors
    fn variational_lowerbound(&self) -> f64;

    /// Posteriors become priors
    fn advance_epoch(&mut self);
}

/// A buffered data batch with its assignment state
#[derive(Clone, Debug)]
pub(crate) struct Batch<X> {
    pub(crate) data: Vec<X>,
    pub(crate) labels: Vec<usize>,
    /// N × K, rows sum to one
    pub(crate) resp: DMatrix<f64>,
}

impl<X> Batch<X> {
    /// A batch with labels drawn from the gating weights
    pub(crate) fn new<R: Rng>(data: Vec<X>, weights: &Categorical, rng: &mut R) -> Self {
        let labels = ln_pflip(weights.ln_weights(), data.len(), true, rng);
        let mut resp = DMatrix::zeros(data.len(), weights.k());
        labels
            .iter()
            .enumerate()
            .for_each(|(n, &z)| resp[(n, z)] = 1.0);
        Batch { data, labels, resp }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Hard label `z` for point `n` with a one-hot responsibility row
    pub(crate) fn set_label(&mut self, n: usize, z: usize) {
        self.labels[n] = z;
        self.resp.row_mut(n).fill(0.0);
        self.resp[(n, z)] = 1.0;
    }

    /// Store responsibilities and the most responsible labels
    pub(crate) fn set_responsibilities(&mut self, estep: Estep) {
        self.labels = estep.labels;
        self.resp = estep.resp;
    }
}

/// The result of normalizing a matrix of log-responsibilities
#[derive(Clone, Debug)]
pub(crate) struct Estep {
    pub(crate) resp: DMatrix<f64>,
    pub(crate) labels: Vec<usize>,
    /// Σₙ logsumexpₖ of the unnormalized log-responsibilities
    pub(crate) bound: f64,
}

/// Normalize N × K log-responsibilities row by row
pub(crate) fn normalize_logits(mut logits: DMatrix<f64>) -> Estep {
    let n = logits.nrows();
    let mut labels = Vec::with_capacity(n);
    let mut bound = 0.0;
    for i in 0..n {
        let row: Vec<f64> = logits.row(i).iter().copied().collect();
        let lse = logsumexp(&row);
        bound += lse;
        labels.push(argmax(&row).unwrap_or(0));
        logits
            .row_mut(i)
            .iter_mut()
            .for_each(|l| *l = (*l - lse).exp());
    }
    Estep {
        resp: logits,
        labels,
        bound,
    }
}

/// Σₙ Σₖ rₙₖ (logitₙₖ − ln rₙₖ), the data term of the ELBO at the given
/// responsibilities
pub(crate) fn responsibility_bound(logits: &DMatrix<f64>, resp: &DMatrix<f64>) -> f64 {
    logits
        .iter()
        .zip(resp.iter())
        .filter(|(_, &r)| r > 0.0)
        .map(|(l, &r)| r * (l - r.ln()))
        .sum()
}

pub(crate) fn used_labels<X>(batches: &[Batch<X>], k: usize) -> Vec<usize> {
    (0..k)
        .filter(|&ix| {
            batches.iter().any(|batch| {
                batch.resp.column(ix).iter().any(|&r| r > USED_LABEL_THRESHOLD)
            })
        })
        .collect()
}

/// Expected occupation counts of every component
pub(crate) fn occupation_counts<X>(batches: &[Batch<X>], k: usize) -> Vec<f64> {
    let mut counts = vec![0.0; k];
    for batch in batches {
        for (ix, count) in counts.iter_mut().enumerate() {
            *count += batch.resp.column(ix).sum();
        }
    }
    counts
}

/// Hard label counts of every component
pub(crate) fn label_counts<X>(batches: &[Batch<X>], k: usize) -> Vec<f64> {
    let mut counts = vec![0.0; k];
    for batch in batches {
        batch.labels.iter().for_each(|&z| counts[z] += 1.0);
    }
    counts
}

/// Report an ELBO decrease and test for convergence
pub(crate) fn check_elbo(elbos: &[f64], tol: f64) -> bool {
    match elbos {
        [.., prev, last] => {
            if *last < prev - ELBO_NOISE * (1.0 + prev.abs()) {
                warn!("evidence lower bound decreased from {} to {}", prev, last);
            }
            (last - prev).abs() < tol
        }
        _ => false,
    }
}

/// A gated mixture of experts
///
/// # Parameters
///
/// `G`: The gating prior, [`Dirichlet`](crate::dist::Dirichlet) or
/// [`StickBreaking`](crate::dist::StickBreaking)
/// `E`: The expert, usually a [`Component`] or a [`Bayesian`]
#[derive(Clone, Debug)]
pub struct Mixture<G, E>
where
    G: GatingPrior + Sampleable<Categorical>,
    E: Expert,
{
    gating: Bayesian<G>,
    components: Vec<E>,
    batches: Vec<Batch<E::Datum>>,
    input_transform: Option<AffineTransform>,
    target_transform: Option<AffineTransform>,
    transform_kind: TransformKind,
}

/// Dirichlet-process mixture of full-covariance linear-Gaussian experts
pub type MixtureOfLinearGaussians<G> =
    Mixture<G, Component<NormalWishart, MatrixNormalWishart>>;

/// Mixture of linear-Gaussian experts with diagonal bases and noise
pub type MixtureOfDiagonalLinearGaussians<G> =
    Mixture<G, Component<NormalGamma, MatrixNormalGamma>>;

/// Mixture of full-covariance Gaussians
pub type MixtureOfGaussians<G> = Mixture<G, Bayesian<NormalWishart>>;

/// Mixture of diagonal Gaussians
pub type MixtureOfDiagonalGaussians<G> = Mixture<G, Bayesian<NormalGamma>>;

impl<G, E> Mixture<G, E>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    E: Expert,
{
    /// Create a mixture with one expert per gating weight
    pub fn new<R: Rng>(gating_prior: G, components: Vec<E>, rng: &mut R) -> Result<Self> {
        if gating_prior.k() != components.len() {
            return Err(Error::DimensionMismatch {
                what: "number of experts",
                expected: gating_prior.k(),
                found: components.len(),
            });
        }
        Ok(Mixture {
            gating: Bayesian::new(gating_prior, rng),
            components,
            batches: Vec::new(),
            input_transform: None,
            target_transform: None,
            transform_kind: TransformKind::default(),
        })
    }

    /// The number of components, K
    #[inline]
    pub fn size(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn gating(&self) -> &Bayesian<G> {
        &self.gating
    }

    #[inline]
    pub fn components(&self) -> &[E] {
        &self.components
    }

    #[inline]
    pub fn nb_batches(&self) -> usize {
        self.batches.len()
    }

    /// Total number of buffered observations
    pub fn nb_data(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    /// Hard labels of every batch
    pub fn labels(&self) -> Vec<&[usize]> {
        self.batches.iter().map(|b| b.labels.as_slice()).collect()
    }

    /// N × K responsibilities of every batch
    pub fn responsibilities(&self) -> Vec<&DMatrix<f64>> {
        self.batches.iter().map(|b| &b.resp).collect()
    }

    /// Components holding at least one observation with responsibility
    /// above [`USED_LABEL_THRESHOLD`]
    pub fn used_labels(&self) -> Vec<usize> {
        used_labels(&self.batches, self.size())
    }

    #[inline]
    pub fn input_transform(&self) -> Option<&AffineTransform> {
        self.input_transform.as_ref()
    }

    #[inline]
    pub fn target_transform(&self) -> Option<&AffineTransform> {
        self.target_transform.as_ref()
    }

    /// How `add_data` fits a missing transform; whitening by default
    #[inline]
    pub fn transform_kind(&self) -> TransformKind {
        self.transform_kind
    }

    pub fn set_transform_kind(&mut self, kind: TransformKind) {
        self.transform_kind = kind;
    }

    /// Buffer an already-transformed batch, labeled from the gating sample
    pub(crate) fn push_batch<R: Rng>(&mut self, data: Vec<E::Datum>, rng: &mut R) -> Result<()> {
        if data.is_empty() {
            return Err(Error::NoData);
        }
        for x in &data {
            for component in &self.components {
                component.check_datum(x)?;
            }
        }
        let batch = Batch::new(data, self.gating.likelihood(), rng);
        self.batches.push(batch);
        Ok(())
    }

    /// Drop every buffered batch
    pub fn clear_data(&mut self) -> Result<()> {
        if self.batches.is_empty() {
            Err(Error::NoData)
        } else {
            self.batches.clear();
            Ok(())
        }
    }

    /// `maxiter` Gibbs sweeps of components, gating and labels
    pub fn resample<R: Rng>(&mut self, maxiter: usize, rng: &mut R) -> Result<()> {
        if self.batches.is_empty() {
            return Err(Error::NoData);
        }
        for iter in 0..maxiter {
            self.resample_components(rng)?;
            self.resample_gating(rng)?;
            self.resample_labels(rng);
            debug!(
                "gibbs sweep {}: {} used labels",
                iter,
                self.used_labels().len()
            );
        }
        Ok(())
    }

    /// Redraw every expert from its posterior given the hard labels
    pub fn resample_components<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        for (k, component) in self.components.iter_mut().enumerate() {
            let data: Vec<(&E::Datum, f64)> = self
                .batches
                .iter()
                .flat_map(|batch| {
                    batch
                        .data
                        .iter()
                        .zip(batch.labels.iter())
                        .filter(move |(_, &z)| z == k)
                        .map(|(x, _)| (x, 1.0))
                })
                .collect();
            component.resample(&data, rng)?;
        }
        Ok(())
    }

    /// Redraw the gating weights given the hard label counts
    pub fn resample_gating<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        let counts = label_counts(&self.batches, self.size());
        let stat = self.gating.prior().count_suffstat(&counts);
        self.gating.resample_from_suffstat(&stat, rng)
    }

    /// Redraw every label with probability ∝ πₖ p(x | θₖ)
    pub fn resample_labels<R: Rng>(&mut self, rng: &mut R) {
        let ln_weights = self.gating.likelihood().ln_weights();
        for batch in self.batches.iter_mut() {
            for n in 0..batch.len() {
                let x = &batch.data[n];
                let logits: Vec<f64> = self
                    .components
                    .iter()
                    .zip(ln_weights.iter())
                    .map(|(component, ln_w)| ln_w + component.log_likelihood(x))
                    .collect();
                let z = ln_pflip(&logits, 1, false, rng)[0];
                batch.set_label(n, z);
            }
        }
    }

    /// N × K matrix of E[ln πₖ] + E[ln p(xₙ | θₖ)]
    fn expected_logits(&self, data: &[E::Datum]) -> DMatrix<f64> {
        let ln_weights = self.gating.posterior().expected_ln_weights();
        let ells: Vec<Vec<f64>> = self
            .components
            .iter()
            .map(|component| component.expected_log_likelihood(data))
            .collect();
        DMatrix::from_fn(data.len(), self.size(), |n, k| ln_weights[k] + ells[k][n])
    }

    /// Responsibilities of every batch under the current posteriors.
    /// Returns the data term of the ELBO.
    pub fn meanfield_estep(&mut self) -> f64 {
        let esteps: Vec<Estep> = self
            .batches
            .iter()
            .map(|batch| normalize_logits(self.expected_logits(&batch.data)))
            .collect();
        self.batches
            .iter_mut()
            .zip(esteps)
            .map(|(batch, estep)| {
                let bound = estep.bound;
                batch.set_responsibilities(estep);
                bound
            })
            .sum()
    }

    /// Posteriors given the stored responsibilities
    pub fn meanfield_mstep(&mut self) -> Result<()> {
        for (k, component) in self.components.iter_mut().enumerate() {
            let data: Vec<(&E::Datum, f64)> = self
                .batches
                .iter()
                .flat_map(|batch| {
                    (0..batch.len()).map(move |n| (&batch.data[n], batch.resp[(n, k)]))
                })
                .collect();
            component.meanfield_update(&data)?;
        }
        let counts = occupation_counts(&self.batches, self.size());
        let stat = self.gating.prior().count_suffstat(&counts);
        self.gating.meanfield_update_from_suffstat(&stat)
    }

    /// −Σ KL(posterior ‖ prior) over experts and gating
    fn prior_bound(&self) -> f64 {
        self.components
            .iter()
            .map(Expert::variational_lowerbound)
            .sum::<f64>()
            + self.gating.variational_lowerbound()
    }

    /// Batch coordinate ascent until the ELBO improves by less than `tol`
    /// or `maxiter` iterations have run. Returns the ELBO of every
    /// iteration.
    ///
    /// The posteriors are first updated from the stored responsibilities,
    /// so the labels drawn by `add_data` or a Gibbs sweep seed the ascent.
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
            let elbo = self.meanfield_estep() + self.prior_bound();
            if !elbo.is_finite() {
                return Err(Error::Degenerate {
                    what: "evidence lower bound",
                });
            }
            self.meanfield_mstep()?;
            elbos.push(elbo);
            debug!("meanfield iteration {}: elbo = {}", iter, elbo);
            if progress {
                info!(
                    "meanfield iteration {}/{}: elbo = {:.4}, {} used labels",
                    iter + 1,
                    maxiter,
                    elbo,
                    self.used_labels().len()
                );
            }
            if check_elbo(&elbos, tol) {
                break;
            }
        }
        Ok(elbos)
    }

    /// One stochastic step on an already-transformed minibatch
    pub(crate) fn sgdstep_on(
        &mut self,
        data: &[E::Datum],
        prob: f64,
        stepsize: f64,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(Error::NoData);
        }
        if !(prob > 0.0 && prob <= 1.0) {
            return Err(Error::Degenerate {
                what: "minibatch fraction outside (0, 1]",
            });
        }
        let estep = normalize_logits(self.expected_logits(data));
        for (k, component) in self.components.iter_mut().enumerate() {
            let weighted: Vec<(&E::Datum, f64)> = data
                .iter()
                .zip(estep.resp.column(k).iter().copied())
                .collect();
            component.meanfield_sgdstep(&weighted, prob, stepsize)?;
        }
        let counts: Vec<f64> = (0..self.size()).map(|k| estep.resp.column(k).sum()).collect();
        let stat = self.gating.prior().count_suffstat(&counts);
        self.gating.meanfield_sgdstep_from_suffstat(&stat, prob, stepsize)
    }

    /// `maxiter` natural-gradient steps, each on `batchsize` points drawn
    /// without replacement from the buffered data, starting from the
    /// posteriors at the stored responsibilities
    pub fn meanfield_stochastic_descent<R: Rng>(
        &mut self,
        stepsize: f64,
        batchsize: usize,
        maxiter: usize,
        rng: &mut R,
    ) -> Result<()> {
        let positions: Vec<(usize, usize)> = self
            .batches
            .iter()
            .enumerate()
            .flat_map(|(b, batch)| (0..batch.len()).map(move |n| (b, n)))
            .collect();
        if positions.is_empty() {
            return Err(Error::NoData);
        }
        self.meanfield_mstep()?;
        let batchsize = batchsize.clamp(1, positions.len());
        let prob = batchsize as f64 / positions.len() as f64;
        for iter in 0..maxiter {
            let minibatch: Vec<E::Datum> = index::sample(rng, positions.len(), batchsize)
                .into_iter()
                .map(|ix| {
                    let (b, n) = positions[ix];
                    self.batches[b].data[n].clone()
                })
                .collect();
            self.sgdstep_on(&minibatch, prob, stepsize)?;
            debug!("stochastic step {}/{}", iter + 1, maxiter);
        }
        self.meanfield_estep();
        Ok(())
    }

    /// The full ELBO at the stored responsibilities
    pub fn variational_lowerbound(&self) -> f64 {
        self.batches
            .iter()
            .map(|batch| responsibility_bound(&self.expected_logits(&batch.data), &batch.resp))
            .sum::<f64>()
            + self.prior_bound()
    }

    /// Empirical-Bayes epoch boundary for the gating and every expert
    pub fn advance_epoch(&mut self) {
        self.gating.advance_epoch();
        self.components.iter_mut().for_each(Expert::advance_epoch);
    }
}

/// Store a supplied transform, or fit one of `kind` from `xs` if none is
/// stored yet
fn update_transform(
    stored: &mut Option<AffineTransform>,
    supplied: Option<AffineTransform>,
    kind: TransformKind,
    xs: &[DVector<f64>],
) -> Result<()> {
    match supplied {
        Some(transform) => *stored = Some(transform),
        None if stored.is_none() => *stored = Some(kind.fit(xs)?),
        None => (),
    }
    Ok(())
}

/// Apply an optional transform to every point
pub(crate) fn apply_transform(
    transform: Option<&AffineTransform>,
    xs: &[DVector<f64>],
    what: &'static str,
) -> Result<Vec<DVector<f64>>> {
    match transform {
        Some(t) => xs
            .iter()
            .map(|x| {
                t.check(x, what)?;
                Ok(t.transform(x))
            })
            .collect(),
        None => Ok(xs.to_vec()),
    }
}

impl<G, B, M> Mixture<G, Component<B, M>>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
    M: RegressionPredictive + Sampleable<M::Likelihood> + fmt::Debug + Send + Sync,
{
    /// Buffer a batch of (target, input) pairs
    ///
    /// When `whiten` is set the supplied transforms replace the stored
    /// ones, and a missing transform is fitted to this batch, as set by
    /// [`set_transform_kind`](Self::set_transform_kind), if none is stored
    /// yet. Stored transforms apply to this and later
    /// batches, and to predictions.
    pub fn add_data<R: Rng>(
        &mut self,
        targets: &[DVector<f64>],
        inputs: &[DVector<f64>],
        whiten: bool,
        input_transform: Option<AffineTransform>,
        target_transform: Option<AffineTransform>,
        rng: &mut R,
    ) -> Result<()> {
        if targets.len() != inputs.len() {
            return Err(Error::DimensionMismatch {
                what: "number of targets",
                expected: inputs.len(),
                found: targets.len(),
            });
        }
        if inputs.is_empty() {
            return Err(Error::NoData);
        }
        if whiten {
            let kind = self.transform_kind;
            update_transform(&mut self.input_transform, input_transform, kind, inputs)?;
            update_transform(&mut self.target_transform, target_transform, kind, targets)?;
        }
        let data = self.transformed_observations(targets, inputs)?;
        self.push_batch(data, rng)
    }

    fn transformed_observations(
        &self,
        targets: &[DVector<f64>],
        inputs: &[DVector<f64>],
    ) -> Result<Vec<Observation>> {
        let inputs = apply_transform(self.input_transform.as_ref(), inputs, "input")?;
        let targets = apply_transform(self.target_transform.as_ref(), targets, "target")?;
        Ok(observations(&targets, &inputs))
    }

    /// One natural-gradient step on a raw minibatch that is a fraction
    /// `prob` of the data set
    pub fn meanfield_sgdstep(
        &mut self,
        targets: &[DVector<f64>],
        inputs: &[DVector<f64>],
        prob: f64,
        stepsize: f64,
    ) -> Result<()> {
        if targets.len() != inputs.len() {
            return Err(Error::DimensionMismatch {
                what: "number of targets",
                expected: inputs.len(),
                found: targets.len(),
            });
        }
        let data = self.transformed_observations(targets, inputs)?;
        for obs in &data {
            for component in &self.components {
                component.check_datum(obs)?;
            }
        }
        self.sgdstep_on(&data, prob, stepsize)
    }
}

impl<G, B> Mixture<G, Bayesian<B>>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
{
    /// Buffer a batch of points, whitened as in the regression case
    pub fn add_data<R: Rng>(
        &mut self,
        xs: &[DVector<f64>],
        whiten: bool,
        transform: Option<AffineTransform>,
        rng: &mut R,
    ) -> Result<()> {
        if xs.is_empty() {
            return Err(Error::NoData);
        }
        if whiten {
            update_transform(&mut self.input_transform, transform, self.transform_kind, xs)?;
        }
        let data = apply_transform(self.input_transform.as_ref(), xs, "input")?;
        self.push_batch(data, rng)
    }

    /// One natural-gradient step on a raw minibatch that is a fraction
    /// `prob` of the data set
    pub fn meanfield_sgdstep(
        &mut self,
        xs: &[DVector<f64>],
        prob: f64,
        stepsize: f64,
    ) -> Result<()> {
        let data = apply_transform(self.input_transform.as_ref(), xs, "input")?;
        for x in &data {
            for component in &self.components {
                component.check_datum(x)?;
            }
        }
        self.sgdstep_on(&data, prob, stepsize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::{Dirichlet, StickBreaking};
    use crate::traits::ExponentialFamily;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    const TOL: f64 = 1E-9;

    fn two_blobs(n: usize) -> Vec<DVector<f64>> {
        (0..n)
            .map(|i| {
                let s = if i % 2 == 0 { 1.0 } else { -1.0 };
                let jitter = 0.1 * ((i as f64) * 0.37).sin();
                DVector::from_row_slice(&[s * 2.0 + jitter, s * 2.0 - jitter])
            })
            .collect()
    }

    fn gmm(k: usize, rng: &mut Xoshiro256Plus) -> MixtureOfGaussians<Dirichlet> {
        let experts = (0..k)
            .map(|_| {
                let prior = NormalWishart::new(
                    DVector::zeros(2),
                    0.05,
                    DMatrix::identity(2, 2),
                    4.0,
                )
                .unwrap();
                Bayesian::new(prior, rng)
            })
            .collect();
        Mixture::new(Dirichlet::symmetric(0.5, k).unwrap(), experts, rng).unwrap()
    }

    #[test]
    fn normalized_logits_sum_to_one() {
        let logits = DMatrix::from_row_slice(2, 3, &[0.0, -1.0, -700.0, 3.0, 3.0, f64::NEG_INFINITY]);
        let estep = normalize_logits(logits);
        for row in estep.resp.row_iter() {
            assert::close(row.sum(), 1.0, TOL);
        }
        assert_eq!(estep.labels, vec![0, 0]);
    }

    #[test]
    fn responsibility_bound_is_tight_at_the_normalized_responsibilities() {
        let logits = DMatrix::from_row_slice(2, 2, &[0.3, -1.2, 2.0, 0.5]);
        let estep = normalize_logits(logits.clone());
        assert::close(responsibility_bound(&logits, &estep.resp), estep.bound, TOL);
    }

    #[test]
    fn mismatched_experts_are_rejected() {
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let mixture = gmm(3, &mut rng);
        let experts = mixture.components().to_vec();
        let res = Mixture::new(StickBreaking::dirichlet_process(4, 1.0).unwrap(), experts, &mut rng);
        assert!(matches!(res, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn clear_data_without_data_is_an_error() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let mut mixture = gmm(2, &mut rng);
        assert_eq!(mixture.clear_data(), Err(Error::NoData));
        mixture.add_data(&two_blobs(10), false, None, &mut rng).unwrap();
        assert_eq!(mixture.nb_data(), 10);
        assert!(mixture.clear_data().is_ok());
        assert_eq!(mixture.nb_batches(), 0);
    }

    #[test]
    fn wrong_dimension_data_is_rejected() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let mut mixture = gmm(2, &mut rng);
        let xs = vec![DVector::zeros(3)];
        assert!(matches!(
            mixture.add_data(&xs, false, None, &mut rng),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn new_batches_have_valid_labels_and_one_hot_rows() {
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let mut mixture = gmm(3, &mut rng);
        mixture.add_data(&two_blobs(20), false, None, &mut rng).unwrap();
        for (labels, resp) in mixture.labels().iter().zip(mixture.responsibilities()) {
            for (n, &z) in labels.iter().enumerate() {
                assert!(z < 3);
                assert_eq!(resp[(n, z)], 1.0);
                assert::close(resp.row(n).sum(), 1.0, TOL);
            }
        }
    }

    #[test]
    fn gibbs_separates_two_blobs() {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let mut mixture = gmm(4, &mut rng);
        mixture.add_data(&two_blobs(100), false, None, &mut rng).unwrap();
        mixture.resample(50, &mut rng).unwrap();
        let labels = mixture.labels()[0];
        // no component is shared between the two blobs
        let left: Vec<usize> = labels.iter().step_by(2).copied().collect();
        let right: Vec<usize> = labels.iter().skip(1).step_by(2).copied().collect();
        assert!(left.iter().all(|z| !right.contains(z)));
        assert!(mixture.used_labels().len() >= 2);
    }

    #[test]
    fn meanfield_bound_is_monotone_and_matches_the_stored_bound() {
        let mut rng = Xoshiro256Plus::seed_from_u64(6);
        let mut mixture = gmm(3, &mut rng);
        mixture.add_data(&two_blobs(60), false, None, &mut rng).unwrap();
        mixture.resample(5, &mut rng).unwrap();
        let elbos = mixture.meanfield_coordinate_descent(1e-10, 30, false).unwrap();
        for w in elbos.windows(2) {
            assert!(w[1] >= w[0] - 1e-8 * (1.0 + w[0].abs()));
        }
        for resp in mixture.responsibilities() {
            for row in resp.row_iter() {
                assert::close(row.sum(), 1.0, TOL);
            }
        }
        // after the M-step the stored bound can only be higher
        assert!(mixture.variational_lowerbound() >= *elbos.last().unwrap() - 1e-6);
    }

    #[test]
    fn stochastic_descent_refreshes_responsibilities() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let mut mixture = gmm(3, &mut rng);
        mixture.add_data(&two_blobs(40), false, None, &mut rng).unwrap();
        mixture.meanfield_stochastic_descent(0.5, 10, 20, &mut rng).unwrap();
        assert!(!mixture.used_labels().is_empty());
        assert!(mixture.variational_lowerbound().is_finite());
    }

    #[test]
    fn standardization_can_replace_whitening() {
        let mut rng = Xoshiro256Plus::seed_from_u64(9);
        let mut mixture = gmm(2, &mut rng);
        mixture.set_transform_kind(TransformKind::Standardization);
        let xs = two_blobs(40);
        mixture.add_data(&xs, true, None, &mut rng).unwrap();
        let expected = AffineTransform::standardization(&xs).unwrap();
        assert_eq!(mixture.input_transform(), Some(&expected));
        // a diagonal map, unlike whitening of correlated blobs
        let w = expected.matrix();
        assert_eq!(w[(0, 1)], 0.0);
        assert_eq!(w[(1, 0)], 0.0);
    }

    #[test]
    fn gating_counts_follow_hard_labels_after_meanfield() {
        let mut rng = Xoshiro256Plus::seed_from_u64(10);
        let mut mixture = gmm(3, &mut rng);
        mixture.add_data(&two_blobs(60), false, None, &mut rng).unwrap();
        mixture.meanfield_coordinate_descent(1e-8, 20, false).unwrap();
        let hard = label_counts(&mixture.batches, 3);
        assert::close(hard.iter().sum::<f64>(), 60.0, TOL);
        for batch in &mixture.batches {
            for (n, &z) in batch.labels.iter().enumerate() {
                assert!(batch.resp[(n, z)] >= batch.resp.row(n).max() - TOL);
            }
        }
        // one sweep hardens every row onto its label
        mixture.resample(1, &mut rng).unwrap();
        let hard = label_counts(&mixture.batches, 3);
        let soft = occupation_counts(&mixture.batches, 3);
        for (h, s) in hard.iter().zip(soft.iter()) {
            assert::close(*h, *s, TOL);
        }
    }

    #[test]
    fn meanfield_without_gibbs_uses_the_initial_labels() {
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        let mut mixture = gmm(4, &mut rng);
        mixture.add_data(&two_blobs(100), false, None, &mut rng).unwrap();
        mixture.meanfield_coordinate_descent(1e-10, 200, false).unwrap();
        let first = &mixture.components()[0];
        let distinct = mixture.components()[1..]
            .iter()
            .any(|c| c.posterior().kl(first.posterior()) > 1e-6);
        assert!(distinct, "every expert collapsed onto the same posterior");
        let labels = mixture.labels()[0];
        let left: Vec<usize> = labels.iter().step_by(2).copied().collect();
        let right: Vec<usize> = labels.iter().skip(1).step_by(2).copied().collect();
        assert!(left.iter().all(|z| !right.contains(z)));
    }

    #[test]
    fn bad_minibatch_fraction_is_rejected() {
        let mut rng = Xoshiro256Plus::seed_from_u64(8);
        let mut mixture = gmm(2, &mut rng);
        let xs = two_blobs(4);
        assert!(mixture.meanfield_sgdstep(&xs, 0.0, 0.1).is_err());
        assert!(mixture.meanfield_sgdstep(&xs, 0.5, 0.1).is_ok());
    }
}
