//! Normal-Gamma prior over a Gaussian with diagonal precision
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::dist::{
    DiagonalStudentT, Gamma, GammaError, GaussianWithDiagonalPrecision,
};
use crate::error::Error;
use crate::impl_display;
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::DVector;
use rand::Rng;
use std::fmt;

/// Independent Normal-Gamma priors, one per dimension:
///
/// λ<sub>i</sub> ~ Gamma(α<sub>i</sub>, β<sub>i</sub>),
/// μ<sub>i</sub> | λ<sub>i</sub> ~ N(m<sub>i</sub>, (κ<sub>i</sub>λ<sub>i</sub>)⁻¹)
///
/// This is the conjugate prior of
/// [`GaussianWithDiagonalPrecision`](crate::dist::GaussianWithDiagonalPrecision).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "NormalGammaParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "NormalGammaParameters"))]
pub struct NormalGamma {
    mu: DVector<f64>,
    kappas: DVector<f64>,
    gamma: Gamma,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct NormalGammaParameters {
    pub mu: DVector<f64>,
    pub kappas: DVector<f64>,
    pub alphas: DVector<f64>,
    pub betas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum NormalGammaError {
    /// The mean has a non-finite entry
    MuNotFinite,
    /// μ, κ and the Gamma factor have different lengths
    DimensionMismatch { n_mu: usize, n_kappas: usize, n_gamma: usize },
    /// A κ is non-positive or non-finite
    KappaTooLow { ix: usize, kappa: f64 },
    /// The Gamma factor is invalid
    Gamma(GammaError),
}

impl From<GammaError> for NormalGammaError {
    fn from(err: GammaError) -> Self {
        NormalGammaError::Gamma(err)
    }
}

/// | slot     | statistic | natural parameter |
/// |----------|-----------|-------------------|
/// | `mu`     | λμ        | κm                |
/// | `kappas` | −½λμ²     | κ                 |
/// | `alphas` | ½ ln λ    | 2α − 1            |
/// | `betas`  | −½λ       | 2β + κm²          |
#[derive(Debug, Clone, PartialEq)]
pub struct NormalGammaStat {
    pub mu: DVector<f64>,
    pub kappas: DVector<f64>,
    pub alphas: DVector<f64>,
    pub betas: DVector<f64>,
}

impl_statistics!(NormalGammaStat { mu, kappas, alphas, betas });

impl NormalGamma {
    pub fn new(
        mu: DVector<f64>,
        kappas: DVector<f64>,
        alphas: DVector<f64>,
        betas: DVector<f64>,
    ) -> Result<Self, NormalGammaError> {
        let gamma = Gamma::new(alphas, betas)?;
        if mu.len() != kappas.len() || mu.len() != gamma.ndims() {
            return Err(NormalGammaError::DimensionMismatch {
                n_mu: mu.len(),
                n_kappas: kappas.len(),
                n_gamma: gamma.ndims(),
            });
        }
        if mu.iter().any(|x| !x.is_finite()) {
            return Err(NormalGammaError::MuNotFinite);
        }
        if let Some((ix, &kappa)) = kappas
            .iter()
            .enumerate()
            .find(|&(_, &k)| k <= 0.0 || !k.is_finite())
        {
            return Err(NormalGammaError::KappaTooLow { ix, kappa });
        }
        Ok(NormalGamma { mu, kappas, gamma })
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.mu.len()
    }

    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    #[inline]
    pub fn kappas(&self) -> &DVector<f64> {
        &self.kappas
    }

    #[inline]
    pub fn alphas(&self) -> &DVector<f64> {
        self.gamma.alphas()
    }

    #[inline]
    pub fn betas(&self) -> &DVector<f64> {
        self.gamma.betas()
    }

    /// The marginal Gamma over the precisions
    #[inline]
    pub fn gamma(&self) -> &Gamma {
        &self.gamma
    }
}

impl Parameterized for NormalGamma {
    type Parameters = NormalGammaParameters;
    type ParameterError = NormalGammaError;

    fn emit_params(&self) -> Self::Parameters {
        NormalGammaParameters {
            mu: self.mu.clone(),
            kappas: self.kappas.clone(),
            alphas: self.alphas().clone(),
            betas: self.betas().clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, NormalGammaError> {
        NormalGamma::new(params.mu, params.kappas, params.alphas, params.betas)
    }
}

impl TryFrom<NormalGammaParameters> for NormalGamma {
    type Error = NormalGammaError;

    fn try_from(params: NormalGammaParameters) -> Result<Self, Self::Error> {
        NormalGamma::from_params(params)
    }
}

impl From<NormalGamma> for NormalGammaParameters {
    fn from(ng: NormalGamma) -> Self {
        ng.emit_params()
    }
}

impl From<&NormalGamma> for String {
    fn from(ng: &NormalGamma) -> String {
        format!("NG({}; μ: {:?})", ng.ndims(), ng.mu.as_slice())
    }
}

impl_display!(NormalGamma);

impl ExponentialFamily for NormalGamma {
    type Stat = NormalGammaStat;
    type Error = NormalGammaError;

    fn to_natural(&self) -> NormalGammaStat {
        let kmu = self.kappas.component_mul(&self.mu);
        NormalGammaStat {
            betas: self.betas() * 2.0 + kmu.component_mul(&self.mu),
            mu: kmu,
            kappas: self.kappas.clone(),
            alphas: self.alphas().map(|a| 2.0 * a - 1.0),
        }
    }

    fn from_natural(&self, nat: &NormalGammaStat) -> Result<Self, NormalGammaError> {
        let mu = nat.mu.component_div(&nat.kappas);
        let alphas = nat.alphas.map(|a| 0.5 * (a + 1.0));
        let betas = (&nat.betas - nat.kappas.component_mul(&mu).component_mul(&mu)) * 0.5;
        NormalGamma::new(mu, nat.kappas.clone(), alphas, betas)
    }

    fn log_partition(&self) -> f64 {
        -0.5 * self.kappas.iter().map(|k| k.ln()).sum::<f64>()
            + self.gamma.log_partition()
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    fn expected_statistics(&self) -> NormalGammaStat {
        let e_lmbda = self.gamma.expected_lmbdas();
        let e_ln_lmbda = self.gamma.expected_ln_lmbdas();
        NormalGammaStat {
            mu: e_lmbda.component_mul(&self.mu),
            kappas: DVector::from_fn(self.ndims(), |i, _| {
                -0.5 * (1.0 / self.kappas[i] + self.mu[i] * self.mu[i] * e_lmbda[i])
            }),
            alphas: e_ln_lmbda * 0.5,
            betas: e_lmbda * -0.5,
        }
    }
}

impl ConjugatePrior for NormalGamma {
    type Datum = DVector<f64>;
    type Likelihood = GaussianWithDiagonalPrecision;
}

impl ConjugateModel for NormalGamma {
    fn empty_suffstat(&self) -> NormalGammaStat {
        let d = self.ndims();
        NormalGammaStat {
            mu: DVector::zeros(d),
            kappas: DVector::zeros(d),
            alphas: DVector::zeros(d),
            betas: DVector::zeros(d),
        }
    }

    /// [x, 1, 1, x∘x]
    fn observe(&self, stat: &mut NormalGammaStat, x: &DVector<f64>, weight: f64) {
        stat.mu.axpy(weight, x, 1.0);
        stat.kappas.add_scalar_mut(weight);
        stat.alphas.add_scalar_mut(weight);
        stat.betas.axpy(weight, &x.component_mul(x), 1.0);
    }

    fn likelihood_log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    fn expected_log_likelihood(&self, xs: &[DVector<f64>]) -> Vec<f64> {
        let e_lmbda = self.gamma.expected_lmbdas();
        let c: f64 = self
            .gamma
            .expected_ln_lmbdas()
            .iter()
            .zip(self.kappas.iter())
            .map(|(e_ln, k)| 0.5 * e_ln - HALF_LN_2PI - 0.5 / k)
            .sum();
        xs.iter()
            .map(|x| {
                c - 0.5
                    * x.iter()
                        .zip(self.mu.iter())
                        .zip(e_lmbda.iter())
                        .map(|((xi, m), l)| l * (xi - m) * (xi - m))
                        .sum::<f64>()
            })
            .collect()
    }

    fn check_datum(&self, x: &DVector<f64>) -> Result<(), Error> {
        if x.len() == self.ndims() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                what: "Gaussian observation",
                expected: self.ndims(),
                found: x.len(),
            })
        }
    }
}

impl BasisPredictive for NormalGamma {
    type Predictive = DiagonalStudentT;

    /// t<sub>2α</sub>(m, β(κ + 1)/(ακ)) per dimension
    fn posterior_predictive(&self) -> Result<DiagonalStudentT, Error> {
        let alphas = self.alphas();
        let betas = self.betas();
        let scales = DVector::from_fn(self.ndims(), |i, _| {
            let k = self.kappas[i];
            betas[i] * (k + 1.0) / (alphas[i] * k)
        });
        Ok(DiagonalStudentT::new(alphas * 2.0, self.mu.clone(), scales)?)
    }
}

impl HasDensity<GaussianWithDiagonalPrecision> for NormalGamma {
    fn ln_f(&self, g: &GaussianWithDiagonalPrecision) -> f64 {
        let lmbdas = g.lmbdas();
        let ln_gamma = self.gamma.ln_f(lmbdas);
        let ln_normals: f64 = (0..self.ndims())
            .map(|i| {
                let prec = self.kappas[i] * lmbdas[i];
                let z = g.mu()[i] - self.mu[i];
                0.5 * prec.ln() - HALF_LN_2PI - 0.5 * prec * z * z
            })
            .sum();
        ln_gamma + ln_normals
    }
}

impl Sampleable<GaussianWithDiagonalPrecision> for NormalGamma {
    fn draw<R: Rng>(&self, rng: &mut R) -> GaussianWithDiagonalPrecision {
        let lmbdas: DVector<f64> = self.gamma.draw(rng);
        let mu = GaussianWithDiagonalPrecision::new_unchecked(
            self.mu.clone(),
            self.kappas.component_mul(&lmbdas),
        )
        .draw(rng);
        GaussianWithDiagonalPrecision::new_unchecked(mu, lmbdas)
    }
}

impl Mean<GaussianWithDiagonalPrecision> for NormalGamma {
    fn mean(&self) -> Option<GaussianWithDiagonalPrecision> {
        GaussianWithDiagonalPrecision::new(
            self.mu.clone(),
            self.gamma.expected_lmbdas(),
        )
        .ok()
    }
}

impl std::error::Error for NormalGammaError {}

impl fmt::Display for NormalGammaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MuNotFinite => write!(f, "non-finite entry in mu"),
            Self::DimensionMismatch {
                n_mu,
                n_kappas,
                n_gamma,
            } => write!(
                f,
                "dimensions disagree: {} means, {} kappas, {} precisions",
                n_mu, n_kappas, n_gamma
            ),
            Self::KappaTooLow { ix, kappa } => write!(
                f,
                "kappa at index {} must be positive and finite, got {}",
                ix, kappa
            ),
            Self::Gamma(err) => write!(f, "{}", err),
        }
    }
}
