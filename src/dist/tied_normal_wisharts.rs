//! Joint normal-Wishart prior over K Gaussians sharing one precision
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::dist::normal_wishart::check_kappa;
use crate::dist::{
    GaussianError, GaussianWithPrecision, MvStudentT, Wishart, WishartError,
};
use crate::error::Error;
use crate::impl_display;
use crate::misc::{invpd, quad_form};
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::fmt;

/// K Gaussians N(μₖ, Λ⁻¹) with a shared precision
///
/// Observations are labeled, `(k, x)`, and scored under the k-th mean.
#[derive(Debug, Clone, PartialEq)]
pub struct TiedGaussians {
    components: Vec<GaussianWithPrecision>,
}

impl TiedGaussians {
    pub fn new(
        mus: Vec<DVector<f64>>,
        lmbda: DMatrix<f64>,
    ) -> Result<Self, GaussianError> {
        let components = mus
            .into_iter()
            .map(|mu| GaussianWithPrecision::new(mu, lmbda.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TiedGaussians { components })
    }

    /// Number of tied components
    #[inline]
    pub fn k(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn components(&self) -> &[GaussianWithPrecision] {
        &self.components
    }

    pub fn mus(&self) -> Vec<DVector<f64>> {
        self.components.iter().map(|g| g.mu().clone()).collect()
    }

    /// The shared precision, or `None` when there are no components
    pub fn lmbda(&self) -> Option<&DMatrix<f64>> {
        self.components.first().map(|g| g.lmbda())
    }
}

impl From<&TiedGaussians> for String {
    fn from(tg: &TiedGaussians) -> String {
        format!("TiedGaussians(k: {})", tg.k())
    }
}

impl_display!(TiedGaussians);

impl HasDensity<(usize, DVector<f64>)> for TiedGaussians {
    fn ln_f(&self, (k, x): &(usize, DVector<f64>)) -> f64 {
        self.components
            .get(*k)
            .map_or(f64::NEG_INFINITY, |g| g.ln_f(x))
    }
}

/// Joint prior over K means and one shared precision:
///
/// Λ ~ W(ψ, ν),  μₖ | Λ ~ N(mₖ, (κₖΛ)⁻¹) independently
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
///
/// let prior = TiedNormalWisharts::new(
///     vec![DVector::zeros(2); 3],
///     DVector::from_element(3, 0.1),
///     DMatrix::identity(2, 2),
///     4.0,
/// ).unwrap();
///
/// let xs = vec![(1, DVector::from_row_slice(&[1.0, -1.0])); 5];
/// let post = prior.posterior(&prior.suffstat(xs.iter().map(|x| (x, 1.0)))).unwrap();
///
/// // only the second mean moves
/// assert_eq!(post.mus()[0], DVector::zeros(2));
/// assert!((post.mus()[1][0] - 5.0 / 5.1).abs() < 1e-12);
/// assert_eq!(post.nu(), 9.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "TiedNormalWishartsParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "TiedNormalWishartsParameters"))]
pub struct TiedNormalWisharts {
    mus: Vec<DVector<f64>>,
    kappas: DVector<f64>,
    wishart: Wishart,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct TiedNormalWishartsParameters {
    pub mus: Vec<DVector<f64>>,
    pub kappas: DVector<f64>,
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum TiedNormalWishartsError {
    /// No components
    KIsZero,
    /// A mean has a non-finite entry
    MuNotFinite { ix: usize },
    /// The number of means and of κs differ
    KMismatch { n_mus: usize, n_kappas: usize },
    /// A mean's dimension differs from the scale matrix's
    DimensionMismatch { ix: usize, n_mu: usize, n_psi: usize },
    /// κ is non-positive or non-finite
    KappaTooLow { ix: usize, kappa: f64 },
    /// The Wishart factor is invalid
    Wishart(WishartError),
}

impl From<WishartError> for TiedNormalWishartsError {
    fn from(err: WishartError) -> Self {
        TiedNormalWishartsError::Wishart(err)
    }
}

/// | slot     | statistic    | natural parameter       |
/// |----------|--------------|-------------------------|
/// | `mus`    | Λμₖ          | κₖmₖ                    |
/// | `kappas` | −½μₖᵀΛμₖ     | κₖ                      |
/// | `psi`    | −½Λ          | ψ⁻¹ + Σκₖmₖmₖᵀ          |
/// | `nu`     | ½ ln\|Λ\|    | ν − d − 1 + K           |
#[derive(Debug, Clone, PartialEq)]
pub struct TiedNormalWishartsStat {
    pub mus: Vec<DVector<f64>>,
    pub kappas: DVector<f64>,
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

impl_statistics!(TiedNormalWishartsStat {
    mus,
    kappas,
    psi,
    nu
});

impl TiedNormalWisharts {
    pub fn new(
        mus: Vec<DVector<f64>>,
        kappas: DVector<f64>,
        psi: DMatrix<f64>,
        nu: f64,
    ) -> Result<Self, TiedNormalWishartsError> {
        if mus.is_empty() {
            return Err(TiedNormalWishartsError::KIsZero);
        }
        if mus.len() != kappas.len() {
            return Err(TiedNormalWishartsError::KMismatch {
                n_mus: mus.len(),
                n_kappas: kappas.len(),
            });
        }
        for (ix, mu) in mus.iter().enumerate() {
            if mu.len() != psi.nrows() {
                return Err(TiedNormalWishartsError::DimensionMismatch {
                    ix,
                    n_mu: mu.len(),
                    n_psi: psi.nrows(),
                });
            }
            if mu.iter().any(|x| !x.is_finite()) {
                return Err(TiedNormalWishartsError::MuNotFinite { ix });
            }
        }
        if let Some((ix, &kappa)) =
            kappas.iter().enumerate().find(|&(_, &k)| !check_kappa(k))
        {
            return Err(TiedNormalWishartsError::KappaTooLow { ix, kappa });
        }
        let wishart = Wishart::new(psi, nu)?;
        Ok(TiedNormalWisharts {
            mus,
            kappas,
            wishart,
        })
    }

    /// The same prior mean and strength for every component
    pub fn symmetric(
        k: usize,
        mu: DVector<f64>,
        kappa: f64,
        psi: DMatrix<f64>,
        nu: f64,
    ) -> Result<Self, TiedNormalWishartsError> {
        TiedNormalWisharts::new(
            vec![mu; k],
            DVector::from_element(k, kappa),
            psi,
            nu,
        )
    }

    /// Number of components
    #[inline]
    pub fn k(&self) -> usize {
        self.mus.len()
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.wishart.ndims()
    }

    #[inline]
    pub fn mus(&self) -> &[DVector<f64>] {
        &self.mus
    }

    #[inline]
    pub fn kappas(&self) -> &DVector<f64> {
        &self.kappas
    }

    #[inline]
    pub fn psi(&self) -> &DMatrix<f64> {
        self.wishart.psi()
    }

    #[inline]
    pub fn nu(&self) -> f64 {
        self.wishart.nu()
    }

    #[inline]
    pub fn wishart(&self) -> &Wishart {
        &self.wishart
    }

    /// Expected log-likelihood of every point under every component, N × K
    pub fn expected_log_likelihoods(&self, xs: &[DVector<f64>]) -> DMatrix<f64> {
        let d = self.ndims() as f64;
        let nu = self.nu();
        let c = 0.5 * self.wishart.expected_ln_det() - d * HALF_LN_2PI;
        DMatrix::from_fn(xs.len(), self.k(), |n, k| {
            let diff = &xs[n] - &self.mus[k];
            c - 0.5 * (nu * quad_form(self.psi(), &diff) + d / self.kappas[k])
        })
    }

    /// Statistics of unlabeled points weighted by an N × K responsibility
    /// matrix. A one-hot matrix gives the statistics of hard labels.
    pub fn responsibility_suffstat(
        &self,
        xs: &[DVector<f64>],
        resp: &DMatrix<f64>,
    ) -> TiedNormalWishartsStat {
        let mut stat = self.empty_suffstat();
        for (n, x) in xs.iter().enumerate() {
            for k in 0..self.k() {
                let r = resp[(n, k)];
                if r > 0.0 {
                    stat.mus[k].axpy(r, x, 1.0);
                    stat.kappas[k] += r;
                }
            }
            let total: f64 = resp.row(n).sum();
            stat.psi.ger(total, x, x, 1.0);
            stat.nu += total;
        }
        stat
    }

    /// Marginal predictive of a new point from each component
    pub fn posterior_predictives(&self) -> Result<Vec<MvStudentT>, Error> {
        let df = self.nu() - self.ndims() as f64 + 1.0;
        let psi_inv = self.wishart.psi_inv();
        self.mus
            .iter()
            .zip(self.kappas.iter())
            .map(|(mu, &kappa)| {
                let scale = &psi_inv * ((kappa + 1.0) / (kappa * df));
                MvStudentT::new(df, mu.clone(), scale).map_err(Error::from)
            })
            .collect()
    }
}

impl Parameterized for TiedNormalWisharts {
    type Parameters = TiedNormalWishartsParameters;
    type ParameterError = TiedNormalWishartsError;

    fn emit_params(&self) -> Self::Parameters {
        TiedNormalWishartsParameters {
            mus: self.mus.clone(),
            kappas: self.kappas.clone(),
            psi: self.psi().clone(),
            nu: self.nu(),
        }
    }

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, TiedNormalWishartsError> {
        TiedNormalWisharts::new(params.mus, params.kappas, params.psi, params.nu)
    }
}

impl TryFrom<TiedNormalWishartsParameters> for TiedNormalWisharts {
    type Error = TiedNormalWishartsError;

    fn try_from(
        params: TiedNormalWishartsParameters,
    ) -> Result<Self, Self::Error> {
        TiedNormalWisharts::from_params(params)
    }
}

impl From<TiedNormalWisharts> for TiedNormalWishartsParameters {
    fn from(tnw: TiedNormalWisharts) -> Self {
        tnw.emit_params()
    }
}

impl From<&TiedNormalWisharts> for String {
    fn from(tnw: &TiedNormalWisharts) -> String {
        format!(
            "TiedNW(k: {}, d: {}, ν: {})",
            tnw.k(),
            tnw.ndims(),
            tnw.nu()
        )
    }
}

impl_display!(TiedNormalWisharts);

impl ExponentialFamily for TiedNormalWisharts {
    type Stat = TiedNormalWishartsStat;
    type Error = TiedNormalWishartsError;

    fn to_natural(&self) -> TiedNormalWishartsStat {
        let d = self.ndims() as f64;
        let mut psi = self.wishart.psi_inv();
        for (mu, &kappa) in self.mus.iter().zip(self.kappas.iter()) {
            psi.ger(kappa, mu, mu, 1.0);
        }
        TiedNormalWishartsStat {
            mus: self
                .mus
                .iter()
                .zip(self.kappas.iter())
                .map(|(mu, &kappa)| mu * kappa)
                .collect(),
            kappas: self.kappas.clone(),
            psi,
            nu: self.nu() - d - 1.0 + self.k() as f64,
        }
    }

    fn from_natural(
        &self,
        nat: &TiedNormalWishartsStat,
    ) -> Result<Self, TiedNormalWishartsError> {
        if let Some((ix, &kappa)) =
            nat.kappas.iter().enumerate().find(|&(_, &k)| !check_kappa(k))
        {
            return Err(TiedNormalWishartsError::KappaTooLow { ix, kappa });
        }
        let mus: Vec<DVector<f64>> = nat
            .mus
            .iter()
            .zip(nat.kappas.iter())
            .map(|(eta, &kappa)| eta / kappa)
            .collect();
        let mut scatter = nat.psi.clone();
        for (mu, &kappa) in mus.iter().zip(nat.kappas.iter()) {
            scatter.ger(-kappa, mu, mu, 1.0);
        }
        let psi = invpd(&scatter).ok_or(WishartError::ScaleNotPositiveDefinite)?;
        let nu = nat.nu + psi.nrows() as f64 + 1.0 - mus.len() as f64;
        TiedNormalWisharts::new(mus, nat.kappas.clone(), psi, nu)
    }

    fn log_partition(&self) -> f64 {
        -0.5 * self.ndims() as f64 * self.kappas.iter().map(|k| k.ln()).sum::<f64>()
            + self.wishart.log_partition()
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * (self.k() * self.ndims()) as f64
    }

    fn expected_statistics(&self) -> TiedNormalWishartsStat {
        let d = self.ndims() as f64;
        let e_lmbda = self.psi() * self.nu();
        TiedNormalWishartsStat {
            mus: self.mus.iter().map(|mu| &e_lmbda * mu).collect(),
            kappas: DVector::from_fn(self.k(), |k, _| {
                -0.5 * (d / self.kappas[k] + quad_form(&e_lmbda, &self.mus[k]))
            }),
            psi: e_lmbda * -0.5,
            nu: 0.5 * self.wishart.expected_ln_det(),
        }
    }
}

impl ConjugatePrior for TiedNormalWisharts {
    type Datum = (usize, DVector<f64>);
    type Likelihood = TiedGaussians;
}

impl ConjugateModel for TiedNormalWisharts {
    fn empty_suffstat(&self) -> TiedNormalWishartsStat {
        let d = self.ndims();
        TiedNormalWishartsStat {
            mus: vec![DVector::zeros(d); self.k()],
            kappas: DVector::zeros(self.k()),
            psi: DMatrix::zeros(d, d),
            nu: 0.0,
        }
    }

    /// [x at slot k, 1 at slot k, xxᵀ, 1]
    fn observe(
        &self,
        stat: &mut TiedNormalWishartsStat,
        (k, x): &(usize, DVector<f64>),
        weight: f64,
    ) {
        stat.mus[*k].axpy(weight, x, 1.0);
        stat.kappas[*k] += weight;
        stat.psi.ger(weight, x, x, 1.0);
        stat.nu += weight;
    }

    fn likelihood_log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    fn expected_log_likelihood(&self, xs: &[(usize, DVector<f64>)]) -> Vec<f64> {
        let d = self.ndims() as f64;
        let nu = self.nu();
        let c = 0.5 * self.wishart.expected_ln_det() - d * HALF_LN_2PI;
        xs.iter()
            .map(|(k, x)| {
                let diff = x - &self.mus[*k];
                c - 0.5 * (nu * quad_form(self.psi(), &diff) + d / self.kappas[*k])
            })
            .collect()
    }

    fn check_datum(&self, (k, x): &(usize, DVector<f64>)) -> Result<(), Error> {
        if *k >= self.k() {
            Err(Error::DimensionMismatch {
                what: "tied component label",
                expected: self.k(),
                found: *k,
            })
        } else if x.len() != self.ndims() {
            Err(Error::DimensionMismatch {
                what: "Gaussian observation",
                expected: self.ndims(),
                found: x.len(),
            })
        } else {
            Ok(())
        }
    }
}

impl HasDensity<TiedGaussians> for TiedNormalWisharts {
    fn ln_f(&self, tg: &TiedGaussians) -> f64 {
        let lmbda = match tg.lmbda() {
            Some(lmbda) if tg.k() == self.k() => lmbda,
            _ => return f64::NEG_INFINITY,
        };
        let ln_means: f64 = tg
            .components()
            .iter()
            .zip(self.mus.iter().zip(self.kappas.iter()))
            .map(|(g, (mu, &kappa))| {
                GaussianWithPrecision::new(mu.clone(), lmbda * kappa)
                    .map_or(f64::NEG_INFINITY, |prior| prior.ln_f(g.mu()))
            })
            .sum();
        self.wishart.ln_f(lmbda) + ln_means
    }
}

impl Sampleable<TiedGaussians> for TiedNormalWisharts {
    fn draw<R: Rng>(&self, rng: &mut R) -> TiedGaussians {
        self.try_draw(rng)
            .expect("Wishart draws are positive definite")
    }

    fn try_draw<R: Rng>(&self, rng: &mut R) -> Result<TiedGaussians, Error> {
        let lmbda: DMatrix<f64> = self.wishart.draw(rng);
        let mut mus = Vec::with_capacity(self.mus.len());
        for (mu, &kappa) in self.mus.iter().zip(self.kappas.iter()) {
            mus.push(GaussianWithPrecision::new(mu.clone(), &lmbda * kappa)?.draw(rng));
        }
        Ok(TiedGaussians::new(mus, lmbda)?)
    }
}

impl Mean<TiedGaussians> for TiedNormalWisharts {
    fn mean(&self) -> Option<TiedGaussians> {
        TiedGaussians::new(self.mus.clone(), self.psi() * self.nu()).ok()
    }
}

impl std::error::Error for TiedNormalWishartsError {}

impl fmt::Display for TiedNormalWishartsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KIsZero => write!(f, "need at least one component"),
            Self::MuNotFinite { ix } => {
                write!(f, "non-finite entry in mean {}", ix)
            }
            Self::KMismatch { n_mus, n_kappas } => write!(
                f,
                "{} means given but {} kappas",
                n_mus, n_kappas
            ),
            Self::DimensionMismatch { ix, n_mu, n_psi } => write!(
                f,
                "mean {} has {} dimensions but psi has {}",
                ix, n_mu, n_psi
            ),
            Self::KappaTooLow { ix, kappa } => write!(
                f,
                "kappa at index {} must be positive and finite, got {}",
                ix, kappa
            ),
            Self::Wishart(err) => write!(f, "{}", err),
        }
    }
}
