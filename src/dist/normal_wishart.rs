//! Normal-Wishart prior over the mean and precision of a Gaussian
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::dist::{GaussianWithPrecision, MvStudentT, Wishart, WishartError};
use crate::error::Error;
use crate::impl_display;
use crate::misc::{invpd, quad_form};
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::fmt;

/// Normal-Wishart, the conjugate prior of a Gaussian with unknown mean μ
/// and precision Λ:
///
/// Λ ~ W(ψ, ν),  μ | Λ ~ N(m, (κΛ)⁻¹)
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
///
/// let nw = NormalWishart::new(
///     DVector::zeros(2),
///     0.5,
///     DMatrix::identity(2, 2),
///     4.0,
/// ).unwrap();
///
/// let xs = vec![DVector::from_row_slice(&[1.0, 2.0]); 10];
/// let stat = nw.suffstat(xs.iter().map(|x| (x, 1.0)));
/// let post = nw.posterior(&stat).unwrap();
///
/// assert_eq!(post.kappa(), 10.5);
/// assert_eq!(post.nu(), 14.0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "NormalWishartParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "NormalWishartParameters"))]
pub struct NormalWishart {
    mu: DVector<f64>,
    kappa: f64,
    wishart: Wishart,
}

impl PartialEq for NormalWishart {
    fn eq(&self, other: &NormalWishart) -> bool {
        self.mu == other.mu
            && self.kappa == other.kappa
            && self.wishart == other.wishart
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct NormalWishartParameters {
    pub mu: DVector<f64>,
    pub kappa: f64,
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum NormalWishartError {
    /// The mean has a non-finite entry
    MuNotFinite,
    /// The mean and the scale matrix have different dimensions
    DimensionMismatch { n_mu: usize, n_psi: usize },
    /// κ is non-positive or non-finite
    KappaTooLow { kappa: f64 },
    /// The Wishart factor is invalid
    Wishart(WishartError),
}

impl From<WishartError> for NormalWishartError {
    fn from(err: WishartError) -> Self {
        NormalWishartError::Wishart(err)
    }
}

/// | slot    | statistic  | natural parameter |
/// |---------|------------|-------------------|
/// | `mu`    | Λμ         | κm                |
/// | `kappa` | −½μᵀΛμ     | κ                 |
/// | `psi`   | −½Λ        | ψ⁻¹ + κmmᵀ        |
/// | `nu`    | ½ ln\|Λ\|  | ν − d             |
#[derive(Debug, Clone, PartialEq)]
pub struct NormalWishartStat {
    pub mu: DVector<f64>,
    pub kappa: f64,
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

impl_statistics!(NormalWishartStat { mu, kappa, psi, nu });

pub(crate) fn check_kappa(kappa: f64) -> bool {
    kappa > 0.0 && kappa.is_finite()
}

impl NormalWishart {
    /// Create a new Normal-Wishart
    ///
    /// # Arguments
    /// - mu: The prior mean of μ, m
    /// - kappa: The prior strength on the mean, κ
    /// - psi: The Wishart scale matrix, ψ
    /// - nu: The Wishart degrees of freedom, ν
    pub fn new(
        mu: DVector<f64>,
        kappa: f64,
        psi: DMatrix<f64>,
        nu: f64,
    ) -> Result<Self, NormalWishartError> {
        if mu.iter().any(|x| !x.is_finite()) {
            return Err(NormalWishartError::MuNotFinite);
        }
        if mu.len() != psi.nrows() {
            return Err(NormalWishartError::DimensionMismatch {
                n_mu: mu.len(),
                n_psi: psi.nrows(),
            });
        }
        if !check_kappa(kappa) {
            return Err(NormalWishartError::KappaTooLow { kappa });
        }
        let wishart = Wishart::new(psi, nu)?;
        Ok(NormalWishart { mu, kappa, wishart })
    }

    /// Get the number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.mu.len()
    }

    /// Get the prior mean, m
    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    /// Get κ
    #[inline]
    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    /// Get the Wishart scale, ψ
    #[inline]
    pub fn psi(&self) -> &DMatrix<f64> {
        self.wishart.psi()
    }

    /// Get the Wishart degrees of freedom, ν
    #[inline]
    pub fn nu(&self) -> f64 {
        self.wishart.nu()
    }

    /// The marginal Wishart over Λ
    #[inline]
    pub fn wishart(&self) -> &Wishart {
        &self.wishart
    }

    pub fn set_mu(&mut self, mu: DVector<f64>) -> Result<(), NormalWishartError> {
        if mu.len() != self.ndims() {
            Err(NormalWishartError::DimensionMismatch {
                n_mu: mu.len(),
                n_psi: self.ndims(),
            })
        } else if mu.iter().any(|x| !x.is_finite()) {
            Err(NormalWishartError::MuNotFinite)
        } else {
            self.mu = mu;
            Ok(())
        }
    }

    pub fn set_kappa(&mut self, kappa: f64) -> Result<(), NormalWishartError> {
        if check_kappa(kappa) {
            self.kappa = kappa;
            Ok(())
        } else {
            Err(NormalWishartError::KappaTooLow { kappa })
        }
    }
}

impl Parameterized for NormalWishart {
    type Parameters = NormalWishartParameters;
    type ParameterError = NormalWishartError;

    fn emit_params(&self) -> Self::Parameters {
        NormalWishartParameters {
            mu: self.mu.clone(),
            kappa: self.kappa,
            psi: self.psi().clone(),
            nu: self.nu(),
        }
    }

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, NormalWishartError> {
        NormalWishart::new(params.mu, params.kappa, params.psi, params.nu)
    }
}

impl TryFrom<NormalWishartParameters> for NormalWishart {
    type Error = NormalWishartError;

    fn try_from(params: NormalWishartParameters) -> Result<Self, Self::Error> {
        NormalWishart::from_params(params)
    }
}

impl From<NormalWishart> for NormalWishartParameters {
    fn from(nw: NormalWishart) -> Self {
        nw.emit_params()
    }
}

impl From<&NormalWishart> for String {
    fn from(nw: &NormalWishart) -> String {
        format!(
            "NW({}; μ: {:?}, κ: {}, ν: {})",
            nw.ndims(),
            nw.mu.as_slice(),
            nw.kappa,
            nw.nu()
        )
    }
}

impl_display!(NormalWishart);

impl ExponentialFamily for NormalWishart {
    type Stat = NormalWishartStat;
    type Error = NormalWishartError;

    fn to_natural(&self) -> NormalWishartStat {
        let d = self.ndims() as f64;
        NormalWishartStat {
            mu: &self.mu * self.kappa,
            kappa: self.kappa,
            psi: self.wishart.psi_inv()
                + &self.mu * self.mu.transpose() * self.kappa,
            nu: self.nu() - d,
        }
    }

    fn from_natural(
        &self,
        nat: &NormalWishartStat,
    ) -> Result<Self, NormalWishartError> {
        let kappa = nat.kappa;
        if !check_kappa(kappa) {
            return Err(NormalWishartError::KappaTooLow { kappa });
        }
        let mu = &nat.mu / kappa;
        let psi = invpd(&(&nat.psi - &mu * mu.transpose() * kappa))
            .ok_or(WishartError::ScaleNotPositiveDefinite)?;
        let nu = nat.nu + mu.len() as f64;
        NormalWishart::new(mu, kappa, psi, nu)
    }

    fn log_partition(&self) -> f64 {
        -0.5 * self.ndims() as f64 * self.kappa.ln()
            + self.wishart.log_partition()
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    fn expected_statistics(&self) -> NormalWishartStat {
        let d = self.ndims() as f64;
        let nu = self.nu();
        let e_lmbda = self.psi() * nu;
        NormalWishartStat {
            mu: &e_lmbda * &self.mu,
            kappa: -0.5 * (d / self.kappa + quad_form(&e_lmbda, &self.mu)),
            psi: e_lmbda * -0.5,
            nu: 0.5 * self.wishart.expected_ln_det(),
        }
    }
}

impl ConjugatePrior for NormalWishart {
    type Datum = DVector<f64>;
    type Likelihood = GaussianWithPrecision;
}

impl ConjugateModel for NormalWishart {
    fn empty_suffstat(&self) -> NormalWishartStat {
        let d = self.ndims();
        NormalWishartStat {
            mu: DVector::zeros(d),
            kappa: 0.0,
            psi: DMatrix::zeros(d, d),
            nu: 0.0,
        }
    }

    /// [x, 1, xxᵀ, 1]
    fn observe(&self, stat: &mut NormalWishartStat, x: &DVector<f64>, weight: f64) {
        stat.mu.axpy(weight, x, 1.0);
        stat.kappa += weight;
        stat.psi.ger(weight, x, x, 1.0);
        stat.nu += weight;
    }

    fn likelihood_log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    /// ½E[ln|Λ|] − ½d/κ − ½ν(x − m)ᵀψ(x − m) − ½d ln 2π
    fn expected_log_likelihood(&self, xs: &[DVector<f64>]) -> Vec<f64> {
        let d = self.ndims() as f64;
        let nu = self.nu();
        let c = 0.5 * self.wishart.expected_ln_det()
            - 0.5 * d / self.kappa
            - d * HALF_LN_2PI;
        xs.iter()
            .map(|x| {
                let diff = x - &self.mu;
                c - 0.5 * nu * quad_form(self.psi(), &diff)
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

impl BasisPredictive for NormalWishart {
    type Predictive = MvStudentT;

    /// t<sub>ν−d+1</sub>(m, (κ + 1)/(κ(ν − d + 1)) ψ⁻¹)
    fn posterior_predictive(&self) -> Result<MvStudentT, Error> {
        let d = self.ndims() as f64;
        let df = self.nu() - d + 1.0;
        let scale = self.wishart.psi_inv()
            * ((self.kappa + 1.0) / (self.kappa * df));
        Ok(MvStudentT::new(df, self.mu.clone(), scale)?)
    }
}

impl HasDensity<GaussianWithPrecision> for NormalWishart {
    fn ln_f(&self, g: &GaussianWithPrecision) -> f64 {
        let d = self.ndims() as f64;
        let diff = g.mu() - &self.mu;
        self.wishart.ln_f(g.lmbda())
            + 0.5 * d * self.kappa.ln()
            + 0.5 * g.ln_det_lmbda()
            - d * HALF_LN_2PI
            - 0.5 * self.kappa * quad_form(g.lmbda(), &diff)
    }
}

impl Sampleable<GaussianWithPrecision> for NormalWishart {
    /// Λ ~ W(ψ, ν), then μ ~ N(m, (κΛ)⁻¹)
    ///
    /// # Panics
    ///
    /// If Λ is not numerically positive definite. Use `try_draw` to get
    /// an error instead.
    fn draw<R: Rng>(&self, rng: &mut R) -> GaussianWithPrecision {
        self.try_draw(rng)
            .expect("Wishart draws are positive definite")
    }

    fn try_draw<R: Rng>(&self, rng: &mut R) -> Result<GaussianWithPrecision, Error> {
        let lmbda: DMatrix<f64> = self.wishart.draw(rng);
        let mu = GaussianWithPrecision::new(self.mu.clone(), &lmbda * self.kappa)?
            .draw(rng);
        Ok(GaussianWithPrecision::new(mu, lmbda)?)
    }
}

impl Mean<GaussianWithPrecision> for NormalWishart {
    fn mean(&self) -> Option<GaussianWithPrecision> {
        GaussianWithPrecision::new(self.mu.clone(), self.psi() * self.nu()).ok()
    }
}

impl Mode<GaussianWithPrecision> for NormalWishart {
    /// The joint mode, (m, (ν − d)ψ)
    fn mode(&self) -> Option<GaussianWithPrecision> {
        let d = self.ndims() as f64;
        if self.nu() > d {
            GaussianWithPrecision::new(self.mu.clone(), self.psi() * (self.nu() - d))
                .ok()
        } else {
            None
        }
    }
}

impl std::error::Error for NormalWishartError {}

impl fmt::Display for NormalWishartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MuNotFinite => write!(f, "non-finite entry in mu"),
            Self::DimensionMismatch { n_mu, n_psi } => write!(
                f,
                "mu has {} dimensions but psi is {} x {}",
                n_mu, n_psi, n_psi
            ),
            Self::KappaTooLow { kappa } => write!(
                f,
                "kappa must be positive and finite, got {}",
                kappa
            ),
            Self::Wishart(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_basic_impls, test_exponential_family};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const TOL: f64 = 1E-10;

    fn nw() -> NormalWishart {
        NormalWishart::new(
            DVector::from_row_slice(&[0.5, -0.3]),
            0.8,
            DMatrix::from_row_slice(2, 2, &[1.2, 0.2, 0.2, 0.6]),
            4.5,
        )
        .unwrap()
    }

    fn xs() -> Vec<DVector<f64>> {
        vec![
            DVector::from_row_slice(&[1.0, 0.2]),
            DVector::from_row_slice(&[-0.4, 0.9]),
            DVector::from_row_slice(&[0.3, -1.1]),
        ]
    }

    #[test]
    fn overflowing_mean_precision_is_an_error_not_a_panic() {
        let mut rng = SmallRng::seed_from_u64(9);
        let nw = NormalWishart::new(
            DVector::zeros(2),
            f64::MAX,
            DMatrix::identity(2, 2) * 10.0,
            4.5,
        )
        .unwrap();
        for _ in 0..5 {
            let res: Result<GaussianWithPrecision, Error> = nw.try_draw(&mut rng);
            assert!(matches!(
                res,
                Err(Error::Gaussian(crate::dist::GaussianError::PrecisionNotPositiveDefinite))
            ));
        }
    }

    test_basic_impls!(nw());
    test_exponential_family!(nw(), GaussianWithPrecision);

    #[test]
    fn posterior_matches_textbook_update() {
        let prior = nw();
        let data = xs();
        let n = data.len() as f64;
        let post = prior.posterior(&prior.suffstat(data.iter().map(|x| (x, 1.0)))).unwrap();

        let xbar = data.iter().fold(DVector::zeros(2), |acc, x| acc + x) / n;
        let kappa_n = prior.kappa() + n;
        let mu_n = (prior.mu() * prior.kappa() + &xbar * n) / kappa_n;
        let scatter = data.iter().fold(DMatrix::zeros(2, 2), |acc, x| {
            let z = x - &xbar;
            acc + &z * z.transpose()
        });
        let dm = &xbar - prior.mu();
        let psi_inv_n = invpd(prior.psi()).unwrap()
            + scatter
            + &dm * dm.transpose() * (prior.kappa() * n / kappa_n);

        assert::close(post.kappa(), kappa_n, TOL);
        assert::close(post.nu(), prior.nu() + n, TOL);
        for (a, b) in post.mu().iter().zip(mu_n.iter()) {
            assert::close(*a, *b, TOL);
        }
        let psi_n = invpd(&psi_inv_n).unwrap();
        for (a, b) in post.psi().iter().zip(psi_n.iter()) {
            assert::close(*a, *b, TOL);
        }
    }

    #[test]
    fn closed_form_expected_log_likelihood_matches_statistics() {
        let prior = nw();
        let data = xs();
        let fast = prior.expected_log_likelihood(&data);
        for (x, f) in data.iter().zip(fast.iter()) {
            assert::close(*f, prior.expected_log_likelihood_by_statistics(x), TOL);
        }
    }

    #[test]
    fn ln_f_of_a_sample_is_finite() {
        let mut rng = SmallRng::seed_from_u64(11);
        let prior = nw();
        for _ in 0..20 {
            let g: GaussianWithPrecision = prior.draw(&mut rng);
            assert!(prior.ln_f(&g).is_finite());
        }
    }

    #[test]
    fn ln_f_agrees_with_the_exponential_family_form() {
        let prior = nw();
        let g = GaussianWithPrecision::new(
            DVector::from_row_slice(&[0.1, 0.4]),
            DMatrix::from_row_slice(2, 2, &[3.0, -0.5, -0.5, 2.0]),
        )
        .unwrap();
        let lmbda = g.lmbda();
        let mu = g.mu();
        let t = NormalWishartStat {
            mu: lmbda * mu,
            kappa: -0.5 * quad_form(lmbda, mu),
            psi: lmbda * -0.5,
            nu: 0.5 * g.ln_det_lmbda(),
        };
        let expected =
            prior.to_natural().dot(&t) - prior.log_partition() + prior.log_base();
        assert::close(prior.ln_f(&g), expected, TOL);
    }

    #[test]
    fn predictive_is_a_t() {
        let prior = nw();
        let t = prior.posterior_predictive().unwrap();
        assert::close(t.df(), 3.5, TOL);
        assert_eq!(t.loc(), prior.mu());
    }

    #[test]
    fn bad_kappa_is_rejected() {
        let res = NormalWishart::new(DVector::zeros(1), 0.0, DMatrix::identity(1, 1), 2.0);
        assert_eq!(res, Err(NormalWishartError::KappaTooLow { kappa: 0.0 }));
    }
}
