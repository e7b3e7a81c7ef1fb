//! Posterior predictive moments of fitted mixtures
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use super::{apply_transform, Component, Mixture};
use crate::dist::Categorical;
use crate::error::{Error, Result};
use crate::misc::{argmax, logsumexp};
use crate::model::Bayesian;
use crate::traits::{
    BasisPredictive, GatingPrior, HasDensity, Predictive, RegressionPredictive,
    Sampleable,
};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// How component predictives are combined into one prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "lowercase"))]
pub enum PredictionKind {
    /// Moment-matched average over components
    Average,
    /// The single most probable component
    Mode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePredictionKindError(pub String);

impl fmt::Display for ParsePredictionKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown prediction kind '{}', expected 'average' or 'mode'",
            self.0
        )
    }
}

impl std::error::Error for ParsePredictionKindError {}

impl FromStr for PredictionKind {
    type Err = ParsePredictionKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" => Ok(PredictionKind::Average),
            "mode" => Ok(PredictionKind::Mode),
            _ => Err(ParsePredictionKindError(s.to_string())),
        }
    }
}

/// Predictive moments of N inputs, one row per input, in target space
#[derive(Debug, Clone, PartialEq)]
pub struct PredictiveMoments {
    /// N × dy
    pub mean: DMatrix<f64>,
    /// Diagonal of the predictive covariance, N × dy
    pub variance: DMatrix<f64>,
    pub stddev: DMatrix<f64>,
    /// Negative log predictive density of each target, when targets were
    /// given
    pub nlpd: Option<Vec<f64>>,
}

impl PredictiveMoments {
    fn from_rows(rows: Vec<PredictiveRow>) -> Self {
        let n = rows.len();
        let dy = rows.first().map_or(0, |row| row.mean.len());
        let mean = DMatrix::from_fn(n, dy, |i, j| rows[i].mean[j]);
        let variance = DMatrix::from_fn(n, dy, |i, j| rows[i].variance[j]);
        let stddev = variance.map(f64::sqrt);
        let nlpd = rows.iter().map(|row| row.nlpd).collect();
        PredictiveMoments {
            mean,
            variance,
            stddev,
            nlpd,
        }
    }

    /// Mean squared error of the predictive mean against `targets`
    pub fn mse(&self, targets: &[DVector<f64>]) -> f64 {
        let n = targets.len().min(self.mean.nrows());
        if n == 0 {
            return f64::NAN;
        }
        let sse: f64 = targets
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, y)| (self.mean.row(i).transpose() - y).norm_squared())
            .sum();
        sse / (n * self.mean.ncols()) as f64
    }
}

struct PredictiveRow {
    mean: DVector<f64>,
    variance: DVector<f64>,
    nlpd: Option<f64>,
}

/// ln E[πₖ] renormalized over the K instantiated components
fn ln_mean_weights<G: GatingPrior>(gating: &G) -> Vec<f64> {
    let weights = gating.mean_weights();
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / total).ln()).collect()
}

/// Normalized log weights ln wₖ(x) over the selected components
fn normalized(mut ln_weights: Vec<f64>) -> Vec<f64> {
    let z = logsumexp(&ln_weights);
    ln_weights.iter_mut().for_each(|w| *w -= z);
    ln_weights
}

impl<G, B, M> Mixture<G, Component<B, M>>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
    M: RegressionPredictive + Sampleable<M::Likelihood> + fmt::Debug + Send + Sync,
{
    /// Components predictions run over: the used labels when `sparse` is
    /// set and some exist, every component otherwise
    fn predictive_labels(&self, sparse: bool) -> Vec<usize> {
        let used = if sparse { self.used_labels() } else { Vec::new() };
        if used.is_empty() {
            (0..self.size()).collect()
        } else {
            used
        }
    }

    /// (label, ln E[πₖ], basis predictive) for every selected component
    fn basis_predictives(&self, labels: &[usize]) -> Result<Vec<(usize, f64, B::Predictive)>> {
        let ln_weights = ln_mean_weights(self.gating.posterior());
        labels
            .iter()
            .map(|&k| {
                let pred = self.components[k].basis().posterior().posterior_predictive()?;
                Ok((k, ln_weights[k], pred))
            })
            .collect()
    }

    fn transform_input(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        let z = match &self.input_transform {
            Some(t) => {
                t.check(x, "input")?;
                t.transform(x)
            }
            None => x.clone(),
        };
        if let Some(component) = self.components.first() {
            component.basis().posterior().check_datum(&z)?;
        }
        Ok(z)
    }

    fn ln_activation(
        &self,
        basis: &[(usize, f64, B::Predictive)],
        z: &DVector<f64>,
    ) -> Vec<f64> {
        normalized(
            basis
                .iter()
                .map(|(_, ln_w, pred)| ln_w + pred.ln_f(z))
                .collect(),
        )
    }

    /// Normalized gating activations wₖ(x), N × K. Components left out by
    /// `sparse` get zero weight.
    pub fn meanfield_predictive_activation(
        &self,
        inputs: &[DVector<f64>],
        sparse: bool,
    ) -> Result<DMatrix<f64>> {
        let basis = self.basis_predictives(&self.predictive_labels(sparse))?;
        let mut activation = DMatrix::zeros(inputs.len(), self.size());
        for (n, x) in inputs.iter().enumerate() {
            let z = self.transform_input(x)?;
            for ((k, _, _), ln_w) in basis.iter().zip(self.ln_activation(&basis, &z)) {
                activation[(n, *k)] = ln_w.exp();
            }
        }
        Ok(activation)
    }

    fn predict_row(
        &self,
        basis: &[(usize, f64, B::Predictive)],
        x: &DVector<f64>,
        y: Option<&DVector<f64>>,
        kind: PredictionKind,
    ) -> Result<PredictiveRow> {
        let z = self.transform_input(x)?;
        let ln_w = self.ln_activation(basis, &z);
        let preds = basis
            .iter()
            .map(|(k, _, _)| self.components[*k].model().posterior().posterior_predictive_at(&z))
            .collect::<Result<Vec<M::Predictive>>>()?;

        let (mean_z, cov_z) = match kind {
            PredictionKind::Average => {
                let dy = preds.first().map_or(0, |p| p.location().len());
                let mut mean = DVector::zeros(dy);
                let mut second = DMatrix::zeros(dy, dy);
                for (pred, lw) in preds.iter().zip(ln_w.iter()) {
                    let w = lw.exp();
                    let loc = pred.location();
                    second += (pred.moment_covariance() + &loc * loc.transpose()) * w;
                    mean.axpy(w, &loc, 1.0);
                }
                let cov = second - &mean * mean.transpose();
                (mean, cov)
            }
            PredictionKind::Mode => {
                let ix = argmax(&ln_w).ok_or(Error::NoData)?;
                (preds[ix].location(), preds[ix].moment_covariance())
            }
        };

        let nlpd = match y {
            Some(y) => {
                let (y_z, ln_jacobian) = match &self.target_transform {
                    Some(t) => {
                        t.check(y, "target")?;
                        (t.transform(y), t.ln_abs_det())
                    }
                    None => (y.clone(), 0.0),
                };
                // scored under the full mixture density whatever the kind
                let terms: Vec<f64> = preds
                    .iter()
                    .zip(ln_w.iter())
                    .map(|(pred, lw)| lw + pred.ln_f(&y_z))
                    .collect();
                Some(-(logsumexp(&terms) + ln_jacobian))
            }
            None => None,
        };

        let (mean, cov) = match &self.target_transform {
            Some(t) => (t.inverse_transform(&mean_z), t.inverse_covariance(&cov_z)),
            None => (mean_z, cov_z),
        };
        Ok(PredictiveRow {
            mean,
            variance: cov.diagonal(),
            nlpd,
        })
    }

    fn check_targets(
        inputs: &[DVector<f64>],
        targets: Option<&[DVector<f64>]>,
    ) -> Result<()> {
        match targets {
            Some(ys) if ys.len() != inputs.len() => Err(Error::DimensionMismatch {
                what: "number of targets",
                expected: inputs.len(),
                found: ys.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Predictive moments at every input over all components, with the
    /// negative log predictive density of `targets` when given
    pub fn meanfield_prediction(
        &self,
        inputs: &[DVector<f64>],
        targets: Option<&[DVector<f64>]>,
        kind: PredictionKind,
    ) -> Result<PredictiveMoments> {
        Self::check_targets(inputs, targets)?;
        let basis = self.basis_predictives(&self.predictive_labels(false))?;
        let rows = inputs
            .iter()
            .enumerate()
            .map(|(n, x)| self.predict_row(&basis, x, targets.map(|ys| &ys[n]), kind))
            .collect::<Result<Vec<_>>>()?;
        Ok(PredictiveMoments::from_rows(rows))
    }

    /// [`meanfield_prediction`](Self::meanfield_prediction) over chunks of
    /// inputs on the rayon pool, optionally restricted to the used labels
    pub fn parallel_meanfield_prediction(
        &self,
        inputs: &[DVector<f64>],
        targets: Option<&[DVector<f64>]>,
        sparse: bool,
        kind: PredictionKind,
    ) -> Result<PredictiveMoments>
    where
        B::Predictive: Send + Sync,
    {
        Self::check_targets(inputs, targets)?;
        let basis = self.basis_predictives(&self.predictive_labels(sparse))?;
        let nthreads = rayon::current_num_threads().max(1);
        let chunk = ((inputs.len() + nthreads - 1) / nthreads).max(1);
        let nchunks = (inputs.len() + chunk - 1) / chunk;
        let chunks = (0..nchunks)
            .into_par_iter()
            .map(|c| {
                let lo = c * chunk;
                let hi = (lo + chunk).min(inputs.len());
                (lo..hi)
                    .map(|n| {
                        self.predict_row(&basis, &inputs[n], targets.map(|ys| &ys[n]), kind)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PredictiveMoments::from_rows(chunks.into_iter().flatten().collect()))
    }
}

impl<G, B> Mixture<G, Bayesian<B>>
where
    G: GatingPrior + Sampleable<Categorical> + fmt::Debug + Send + Sync,
    B: BasisPredictive + Sampleable<B::Likelihood> + fmt::Debug + Send + Sync,
{
    /// ln E[πₖ] + ln p̂ₖ(z), N × K, in whitened space
    fn ln_joint_predictive(&self, inputs: &[DVector<f64>]) -> Result<DMatrix<f64>> {
        let ln_weights = ln_mean_weights(self.gating.posterior());
        let preds = self
            .components
            .iter()
            .map(|c| c.posterior().posterior_predictive())
            .collect::<Result<Vec<_>>>()?;
        let zs = apply_transform(self.input_transform.as_ref(), inputs, "input")?;
        for z in &zs {
            if let Some(c) = self.components.first() {
                c.posterior().check_datum(z)?;
            }
        }
        Ok(DMatrix::from_fn(zs.len(), self.size(), |n, k| {
            ln_weights[k] + preds[k].ln_f(&zs[n])
        }))
    }

    /// Posterior probability of each component for each input, N × K
    pub fn meanfield_predictive_activation(
        &self,
        inputs: &[DVector<f64>],
    ) -> Result<DMatrix<f64>> {
        let mut joint = self.ln_joint_predictive(inputs)?;
        for n in 0..joint.nrows() {
            let row: Vec<f64> = joint.row(n).iter().copied().collect();
            let z = logsumexp(&row);
            joint.row_mut(n).iter_mut().for_each(|l| *l = (*l - z).exp());
        }
        Ok(joint)
    }

    /// ln p(x) of each input under the posterior predictive mixture, in the
    /// original input space
    pub fn log_predictive_density(&self, inputs: &[DVector<f64>]) -> Result<Vec<f64>> {
        let joint = self.ln_joint_predictive(inputs)?;
        let ln_jacobian = self.input_transform.as_ref().map_or(0.0, |t| t.ln_abs_det());
        Ok((0..joint.nrows())
            .map(|n| {
                let row: Vec<f64> = joint.row(n).iter().copied().collect();
                logsumexp(&row) + ln_jacobian
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::{
        MatrixNormalWishart, NormalWishart, StickBreaking,
    };
    use crate::mixture::{MixtureOfGaussians, MixtureOfLinearGaussians};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    const TOL: f64 = 1E-9;

    fn line(n: usize) -> (Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let inputs: Vec<DVector<f64>> = (0..n)
            .map(|i| DVector::from_element(1, -1.0 + 2.0 * i as f64 / (n - 1) as f64))
            .collect();
        let targets = inputs
            .iter()
            .enumerate()
            .map(|(i, x)| DVector::from_element(1, 2.0 * x[0] + 0.5 + 0.01 * ((i as f64) * 0.7).sin()))
            .collect();
        (targets, inputs)
    }

    fn fitted(whiten: bool) -> (MixtureOfLinearGaussians<StickBreaking>, Vec<DVector<f64>>, Vec<DVector<f64>>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(17);
        let k = 3;
        let components = (0..k)
            .map(|_| {
                let basis = NormalWishart::new(
                    DVector::zeros(1),
                    0.05,
                    DMatrix::identity(1, 1),
                    3.0,
                )
                .unwrap();
                let model = MatrixNormalWishart::new(
                    DMatrix::zeros(1, 2),
                    DMatrix::identity(2, 2) * 0.01,
                    DMatrix::identity(1, 1),
                    3.0,
                    true,
                )
                .unwrap();
                Component::new(basis, model, &mut rng)
            })
            .collect();
        let gating = StickBreaking::dirichlet_process(k, 1.0).unwrap();
        let mut mixture = Mixture::new(gating, components, &mut rng).unwrap();
        let (targets, inputs) = line(100);
        mixture
            .add_data(&targets, &inputs, whiten, None, None, &mut rng)
            .unwrap();
        mixture.resample(10, &mut rng).unwrap();
        mixture.meanfield_coordinate_descent(1e-8, 50, false).unwrap();
        (mixture, targets, inputs)
    }

    #[test]
    fn prediction_kind_parses_case_insensitively() {
        assert_eq!("average".parse(), Ok(PredictionKind::Average));
        assert_eq!("Mode".parse(), Ok(PredictionKind::Mode));
        assert!("median".parse::<PredictionKind>().is_err());
    }

    #[test]
    fn prediction_recovers_a_line() {
        let (mixture, targets, inputs) = fitted(false);
        let pred = mixture
            .meanfield_prediction(&inputs, Some(&targets), PredictionKind::Average)
            .unwrap();
        assert_eq!(pred.mean.shape(), (100, 1));
        assert!(pred.mse(&targets) < 1e-2);
        assert!(pred.variance.iter().all(|&v| v > 0.0));
        assert!(pred.nlpd.unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn whitened_prediction_is_in_target_space() {
        let (mixture, targets, inputs) = fitted(true);
        assert!(mixture.target_transform().is_some());
        let pred = mixture
            .meanfield_prediction(&inputs, None, PredictionKind::Mode)
            .unwrap();
        assert!(pred.mse(&targets) < 1e-2);
        assert!(pred.nlpd.is_none());
    }

    #[test]
    fn mode_and_average_share_the_mixture_nlpd() {
        let (mixture, targets, inputs) = fitted(true);
        let average = mixture
            .meanfield_prediction(&inputs, Some(&targets), PredictionKind::Average)
            .unwrap();
        let mode = mixture
            .meanfield_prediction(&inputs, Some(&targets), PredictionKind::Mode)
            .unwrap();
        for (a, m) in average.nlpd.unwrap().iter().zip(mode.nlpd.unwrap()) {
            assert::close(*a, m, TOL);
        }
    }

    #[test]
    fn parallel_prediction_matches_serial() {
        let (mixture, targets, inputs) = fitted(false);
        let serial = mixture
            .meanfield_prediction(&inputs, Some(&targets), PredictionKind::Average)
            .unwrap();
        let parallel = mixture
            .parallel_meanfield_prediction(&inputs, Some(&targets), false, PredictionKind::Average)
            .unwrap();
        approx::assert_relative_eq!(serial.mean, parallel.mean, epsilon = TOL);
        approx::assert_relative_eq!(serial.variance, parallel.variance, epsilon = TOL);
        assert_eq!(serial.nlpd.map(|v| v.len()), parallel.nlpd.map(|v| v.len()));
    }

    #[test]
    fn activations_are_normalized() {
        let (mixture, _, inputs) = fitted(false);
        for sparse in [false, true] {
            let act = mixture.meanfield_predictive_activation(&inputs, sparse).unwrap();
            assert_eq!(act.shape(), (100, 3));
            for row in act.row_iter() {
                assert::close(row.sum(), 1.0, TOL);
            }
        }
    }

    #[test]
    fn mismatched_targets_are_rejected() {
        let (mixture, targets, inputs) = fitted(false);
        let res = mixture.meanfield_prediction(&inputs, Some(&targets[..10]), PredictionKind::Average);
        assert!(matches!(res, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn density_mixture_predictive_is_normalized_in_one_dimension() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let experts = (0..2)
            .map(|_| {
                let prior =
                    NormalWishart::new(DVector::zeros(1), 0.1, DMatrix::identity(1, 1), 2.0)
                        .unwrap();
                Bayesian::new(prior, &mut rng)
            })
            .collect();
        let gating = StickBreaking::dirichlet_process(2, 1.0).unwrap();
        let mut mixture: MixtureOfGaussians<StickBreaking> =
            Mixture::new(gating, experts, &mut rng).unwrap();
        let xs: Vec<DVector<f64>> = (0..50)
            .map(|i| DVector::from_element(1, if i % 2 == 0 { 1.0 } else { -1.0 } + 0.01 * i as f64))
            .collect();
        mixture.add_data(&xs, true, None, &mut rng).unwrap();
        mixture.meanfield_coordinate_descent(1e-8, 30, false).unwrap();

        // trapezoid rule over a wide grid
        let h = 0.01;
        let grid: Vec<DVector<f64>> = (0..4001)
            .map(|i| DVector::from_element(1, -20.0 + h * i as f64))
            .collect();
        let mass: f64 = mixture
            .log_predictive_density(&grid)
            .unwrap()
            .iter()
            .map(|l| l.exp() * h)
            .sum();
        assert::close(mass, 1.0, 1e-2);

        let act = mixture.meanfield_predictive_activation(&xs).unwrap();
        for row in act.row_iter() {
            assert::close(row.sum(), 1.0, TOL);
        }
    }
}
