//! Gaussian likelihoods parameterized by their precision
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::impl_display;
use crate::misc::{chol_ln_det, cholesky, invpd, solve_lower_transpose};
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

/// Multivariate Gaussian, N(μ, Λ⁻¹), with mean μ and precision Λ
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
///
/// let g = GaussianWithPrecision::new(
///     DVector::zeros(2),
///     DMatrix::identity(2, 2),
/// ).unwrap();
///
/// let ln_f = g.ln_f(&DVector::zeros(2));
/// assert!((ln_f + 2.0_f64.ln() + std::f64::consts::PI.ln()).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "GaussianWithPrecisionParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "GaussianWithPrecisionParameters"))]
pub struct GaussianWithPrecision {
    mu: DVector<f64>,
    lmbda: DMatrix<f64>,
    /// Lower Cholesky factor of Λ
    chol_l: DMatrix<f64>,
    ln_det: f64,
}

impl PartialEq for GaussianWithPrecision {
    fn eq(&self, other: &GaussianWithPrecision) -> bool {
        self.mu == other.mu && self.lmbda == other.lmbda
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct GaussianWithPrecisionParameters {
    pub mu: DVector<f64>,
    pub lmbda: DMatrix<f64>,
}

/// Gaussian with a diagonal precision, N(μ, diag(λ)⁻¹)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct GaussianWithDiagonalPrecision {
    mu: DVector<f64>,
    lmbdas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct GaussianWithDiagonalPrecisionParameters {
    pub mu: DVector<f64>,
    pub lmbdas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum GaussianError {
    /// The mean has a non-finite entry
    MuNotFinite,
    /// The mean and the precision have different dimensions
    MuPrecisionDimensionMismatch { n_mu: usize, n_precision: usize },
    /// The precision matrix is not positive definite
    PrecisionNotPositiveDefinite,
    /// A diagonal precision is non-positive or non-finite
    PrecisionTooLow { ix: usize, lmbda: f64 },
}

/// | slot | statistic | natural parameter |
/// |------|-----------|-------------------|
/// | `x`  | x         | Λμ                |
/// | `xx` | −½xxᵀ     | Λ                 |
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianStat {
    pub x: DVector<f64>,
    pub xx: DMatrix<f64>,
}

impl_statistics!(GaussianStat { x, xx });

/// Diagonal analogue of [`GaussianStat`], with `xx` holding −½x²
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalGaussianStat {
    pub x: DVector<f64>,
    pub xx: DVector<f64>,
}

impl_statistics!(DiagonalGaussianStat { x, xx });

impl GaussianWithPrecision {
    /// Create a new Gaussian from a mean and a positive-definite precision
    pub fn new(
        mu: DVector<f64>,
        lmbda: DMatrix<f64>,
    ) -> Result<Self, GaussianError> {
        if mu.iter().any(|x| !x.is_finite()) {
            return Err(GaussianError::MuNotFinite);
        }
        if !lmbda.is_square() || lmbda.nrows() != mu.len() {
            return Err(GaussianError::MuPrecisionDimensionMismatch {
                n_mu: mu.len(),
                n_precision: lmbda.nrows(),
            });
        }
        let chol =
            cholesky(&lmbda).ok_or(GaussianError::PrecisionNotPositiveDefinite)?;
        let ln_det = chol_ln_det(&chol);
        Ok(GaussianWithPrecision {
            mu,
            lmbda,
            chol_l: chol.l(),
            ln_det,
        })
    }

    /// Standard Gaussian in `ndims` dimensions
    pub fn standard(ndims: usize) -> Self {
        GaussianWithPrecision {
            mu: DVector::zeros(ndims),
            lmbda: DMatrix::identity(ndims, ndims),
            chol_l: DMatrix::identity(ndims, ndims),
            ln_det: 0.0,
        }
    }

    /// Get the number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.mu.len()
    }

    /// Get a reference to the mean, μ
    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    /// Get a reference to the precision, Λ
    #[inline]
    pub fn lmbda(&self) -> &DMatrix<f64> {
        &self.lmbda
    }

    /// Get ln|Λ|
    #[inline]
    pub fn ln_det_lmbda(&self) -> f64 {
        self.ln_det
    }

    /// Set the mean
    pub fn set_mu(&mut self, mu: DVector<f64>) -> Result<(), GaussianError> {
        if mu.len() != self.ndims() {
            Err(GaussianError::MuPrecisionDimensionMismatch {
                n_mu: mu.len(),
                n_precision: self.ndims(),
            })
        } else if mu.iter().any(|x| !x.is_finite()) {
            Err(GaussianError::MuNotFinite)
        } else {
            self.mu = mu;
            Ok(())
        }
    }

    /// Set the precision
    pub fn set_lmbda(&mut self, lmbda: DMatrix<f64>) -> Result<(), GaussianError> {
        let new = GaussianWithPrecision::new(self.mu.clone(), lmbda)?;
        *self = new;
        Ok(())
    }

    /// (x − μ)ᵀ Λ (x − μ)
    #[inline]
    pub fn mahalanobis(&self, x: &DVector<f64>) -> f64 {
        let diff = x - &self.mu;
        self.chol_l.tr_mul(&diff).norm_squared()
    }
}

impl GaussianWithDiagonalPrecision {
    /// Create a new Gaussian from a mean and positive precisions
    pub fn new(
        mu: DVector<f64>,
        lmbdas: DVector<f64>,
    ) -> Result<Self, GaussianError> {
        if mu.iter().any(|x| !x.is_finite()) {
            return Err(GaussianError::MuNotFinite);
        }
        if lmbdas.len() != mu.len() {
            return Err(GaussianError::MuPrecisionDimensionMismatch {
                n_mu: mu.len(),
                n_precision: lmbdas.len(),
            });
        }
        if let Some((ix, &lmbda)) = lmbdas
            .iter()
            .enumerate()
            .find(|&(_, &l)| l <= 0.0 || !l.is_finite())
        {
            return Err(GaussianError::PrecisionTooLow { ix, lmbda });
        }
        Ok(GaussianWithDiagonalPrecision { mu, lmbdas })
    }

    /// Creates a new Gaussian without checking whether the parameters are
    /// valid.
    #[inline]
    pub fn new_unchecked(mu: DVector<f64>, lmbdas: DVector<f64>) -> Self {
        GaussianWithDiagonalPrecision { mu, lmbdas }
    }

    /// Get the number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.mu.len()
    }

    /// Get a reference to the mean, μ
    #[inline]
    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    /// Get a reference to the precisions, λ
    #[inline]
    pub fn lmbdas(&self) -> &DVector<f64> {
        &self.lmbdas
    }
}

impl Parameterized for GaussianWithPrecision {
    type Parameters = GaussianWithPrecisionParameters;
    type ParameterError = GaussianError;

    fn emit_params(&self) -> Self::Parameters {
        GaussianWithPrecisionParameters {
            mu: self.mu.clone(),
            lmbda: self.lmbda.clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, GaussianError> {
        GaussianWithPrecision::new(params.mu, params.lmbda)
    }
}

impl TryFrom<GaussianWithPrecisionParameters> for GaussianWithPrecision {
    type Error = GaussianError;

    fn try_from(
        params: GaussianWithPrecisionParameters,
    ) -> Result<Self, Self::Error> {
        GaussianWithPrecision::from_params(params)
    }
}

impl From<GaussianWithPrecision> for GaussianWithPrecisionParameters {
    fn from(g: GaussianWithPrecision) -> Self {
        g.emit_params()
    }
}

impl Parameterized for GaussianWithDiagonalPrecision {
    type Parameters = GaussianWithDiagonalPrecisionParameters;
    type ParameterError = GaussianError;

    fn emit_params(&self) -> Self::Parameters {
        GaussianWithDiagonalPrecisionParameters {
            mu: self.mu.clone(),
            lmbdas: self.lmbdas.clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, GaussianError> {
        GaussianWithDiagonalPrecision::new(params.mu, params.lmbdas)
    }
}

impl From<&GaussianWithPrecision> for String {
    fn from(g: &GaussianWithPrecision) -> String {
        format!("N({}; μ: {:?})", g.ndims(), g.mu.as_slice())
    }
}

impl From<&GaussianWithDiagonalPrecision> for String {
    fn from(g: &GaussianWithDiagonalPrecision) -> String {
        format!(
            "N({}; μ: {:?}, λ: {:?})",
            g.ndims(),
            g.mu.as_slice(),
            g.lmbdas.as_slice()
        )
    }
}

impl_display!(GaussianWithPrecision);
impl_display!(GaussianWithDiagonalPrecision);

impl ExponentialFamily for GaussianWithPrecision {
    type Stat = GaussianStat;
    type Error = GaussianError;

    fn to_natural(&self) -> GaussianStat {
        GaussianStat {
            x: &self.lmbda * &self.mu,
            xx: self.lmbda.clone(),
        }
    }

    fn from_natural(&self, nat: &GaussianStat) -> Result<Self, GaussianError> {
        let sigma =
            invpd(&nat.xx).ok_or(GaussianError::PrecisionNotPositiveDefinite)?;
        GaussianWithPrecision::new(sigma * &nat.x, nat.xx.clone())
    }

    fn log_partition(&self) -> f64 {
        0.5 * self.mu.dot(&(&self.lmbda * &self.mu)) - 0.5 * self.ln_det
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    fn expected_statistics(&self) -> GaussianStat {
        let sigma = cholesky_inverse(&self.chol_l);
        GaussianStat {
            x: self.mu.clone(),
            xx: (sigma + &self.mu * self.mu.transpose()) * -0.5,
        }
    }
}

impl ExponentialFamily for GaussianWithDiagonalPrecision {
    type Stat = DiagonalGaussianStat;
    type Error = GaussianError;

    fn to_natural(&self) -> DiagonalGaussianStat {
        DiagonalGaussianStat {
            x: self.lmbdas.component_mul(&self.mu),
            xx: self.lmbdas.clone(),
        }
    }

    fn from_natural(
        &self,
        nat: &DiagonalGaussianStat,
    ) -> Result<Self, GaussianError> {
        GaussianWithDiagonalPrecision::new(
            nat.x.component_div(&nat.xx),
            nat.xx.clone(),
        )
    }

    fn log_partition(&self) -> f64 {
        self.mu
            .iter()
            .zip(self.lmbdas.iter())
            .map(|(m, l)| 0.5 * l * m * m - 0.5 * l.ln())
            .sum()
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * self.ndims() as f64
    }

    fn expected_statistics(&self) -> DiagonalGaussianStat {
        DiagonalGaussianStat {
            x: self.mu.clone(),
            xx: self.mu.zip_map(&self.lmbdas, |m, l| -0.5 * (1.0 / l + m * m)),
        }
    }
}

/// (L Lᵀ)⁻¹ from a lower-triangular factor
fn cholesky_inverse(chol_l: &DMatrix<f64>) -> DMatrix<f64> {
    let n = chol_l.nrows();
    let mut l_inv_t = DMatrix::zeros(n, n);
    for j in 0..n {
        let mut e = DVector::zeros(n);
        e[j] = 1.0;
        l_inv_t.set_column(j, &solve_lower_transpose(chol_l, &e));
    }
    // (L Lᵀ)⁻¹ = L⁻ᵀ L⁻¹
    &l_inv_t * l_inv_t.transpose()
}

impl HasDensity<DVector<f64>> for GaussianWithPrecision {
    fn ln_f(&self, x: &DVector<f64>) -> f64 {
        let d = self.ndims() as f64;
        0.5 * self.ln_det - d * HALF_LN_2PI - 0.5 * self.mahalanobis(x)
    }
}

impl HasDensity<DVector<f64>> for GaussianWithDiagonalPrecision {
    fn ln_f(&self, x: &DVector<f64>) -> f64 {
        x.iter()
            .zip(self.mu.iter().zip(self.lmbdas.iter()))
            .map(|(xi, (m, l))| {
                let z = xi - m;
                0.5 * l.ln() - HALF_LN_2PI - 0.5 * l * z * z
            })
            .sum()
    }
}

impl Sampleable<DVector<f64>> for GaussianWithPrecision {
    /// x = μ + L⁻ᵀz for Λ = LLᵀ
    fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        let z: DVector<f64> =
            DVector::from_fn(self.ndims(), |_, _| rng.sample(StandardNormal));
        solve_lower_transpose(&self.chol_l, &z) + &self.mu
    }
}

impl Sampleable<DVector<f64>> for GaussianWithDiagonalPrecision {
    fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        self.mu.zip_map(&self.lmbdas, |m, l| {
            let z: f64 = rng.sample(StandardNormal);
            m + z / l.sqrt()
        })
    }
}

impl Mean<DVector<f64>> for GaussianWithPrecision {
    fn mean(&self) -> Option<DVector<f64>> {
        Some(self.mu.clone())
    }
}

impl Mode<DVector<f64>> for GaussianWithPrecision {
    fn mode(&self) -> Option<DVector<f64>> {
        Some(self.mu.clone())
    }
}

impl Variance<DMatrix<f64>> for GaussianWithPrecision {
    fn variance(&self) -> Option<DMatrix<f64>> {
        Some(cholesky_inverse(&self.chol_l))
    }
}

impl Mean<DVector<f64>> for GaussianWithDiagonalPrecision {
    fn mean(&self) -> Option<DVector<f64>> {
        Some(self.mu.clone())
    }
}

impl Mode<DVector<f64>> for GaussianWithDiagonalPrecision {
    fn mode(&self) -> Option<DVector<f64>> {
        Some(self.mu.clone())
    }
}

impl Variance<DVector<f64>> for GaussianWithDiagonalPrecision {
    fn variance(&self) -> Option<DVector<f64>> {
        Some(self.lmbdas.map(|l| 1.0 / l))
    }
}

impl std::error::Error for GaussianError {}

impl fmt::Display for GaussianError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MuNotFinite => write!(f, "non-finite entry in mu"),
            Self::MuPrecisionDimensionMismatch { n_mu, n_precision } => write!(
                f,
                "mu has {} dimensions but the precision has {}",
                n_mu, n_precision
            ),
            Self::PrecisionNotPositiveDefinite => {
                write!(f, "the precision matrix is not positive definite")
            }
            Self::PrecisionTooLow { ix, lmbda } => write!(
                f,
                "precision at index {} must be positive and finite, got {}",
                ix, lmbda
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::LN_2PI;
    use crate::{test_basic_impls, test_exponential_family};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const TOL: f64 = 1E-12;

    fn full() -> GaussianWithPrecision {
        GaussianWithPrecision::new(
            DVector::from_row_slice(&[0.5, -1.0]),
            DMatrix::from_row_slice(2, 2, &[2.0, 0.4, 0.4, 1.0]),
        )
        .unwrap()
    }

    fn diag() -> GaussianWithDiagonalPrecision {
        GaussianWithDiagonalPrecision::new(
            DVector::from_row_slice(&[0.5, -1.0]),
            DVector::from_row_slice(&[2.0, 0.25]),
        )
        .unwrap()
    }

    mod full_precision {
        use super::*;

        test_basic_impls!(full());
        test_exponential_family!(full(), DVector<f64>);

        #[test]
        fn ln_f_at_mean() {
            let g = full();
            let ln_det = g.lmbda().determinant().ln();
            assert::close(
                g.ln_f(&g.mu().clone()),
                0.5 * ln_det - LN_2PI,
                TOL,
            );
        }

        #[test]
        fn entropy_matches_closed_form() {
            // H = d/2 (1 + ln 2π) − ½ ln|Λ|
            let g = full();
            let expected = (1.0 + LN_2PI) - 0.5 * g.ln_det_lmbda();
            assert::close(g.entropy(), expected, 1E-10);
        }

        #[test]
        fn sample_covariance_is_inverse_precision() {
            let mut rng = SmallRng::seed_from_u64(0xABCD);
            let g = full();
            let n = 50_000;
            let xs = g.sample(n, &mut rng);
            let mean = xs.iter().fold(DVector::zeros(2), |acc, x| acc + x)
                / n as f64;
            let cov = xs.iter().fold(DMatrix::zeros(2, 2), |acc, x| {
                let d = x - &mean;
                acc + &d * d.transpose()
            }) / n as f64;
            let expected = g.variance().unwrap();
            for (a, b) in cov.iter().zip(expected.iter()) {
                assert::close(*a, *b, 0.04);
            }
        }

        #[test]
        fn non_pd_precision_is_rejected() {
            let res = GaussianWithPrecision::new(
                DVector::zeros(2),
                DMatrix::from_row_slice(2, 2, &[1.0, 3.0, 3.0, 1.0]),
            );
            assert_eq!(res, Err(GaussianError::PrecisionNotPositiveDefinite));
        }
    }

    mod diagonal_precision {
        use super::*;

        test_basic_impls!(diag());
        test_exponential_family!(diag(), DVector<f64>);

        #[test]
        fn agrees_with_full_precision() {
            let d = diag();
            let f = GaussianWithPrecision::new(
                d.mu().clone(),
                DMatrix::from_diagonal(d.lmbdas()),
            )
            .unwrap();
            let x = DVector::from_row_slice(&[1.2, 0.3]);
            assert::close(d.ln_f(&x), f.ln_f(&x), TOL);
            assert::close(d.entropy(), f.entropy(), 1E-10);
        }

        #[test]
        fn negative_precision_is_rejected() {
            let res = GaussianWithDiagonalPrecision::new(
                DVector::zeros(2),
                DVector::from_row_slice(&[1.0, -1.0]),
            );
            if let Err(GaussianError::PrecisionTooLow { ix: 1, .. }) = res {
            } else {
                panic!("wrong error")
            }
        }
    }
}
