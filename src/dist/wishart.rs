//! Wishart distribution over positive-definite precision matrices
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::LN_2;
use crate::impl_display;
use crate::misc::{
    chol_ln_det, cholesky, invpd, lnmv_gamma, wishart_expected_ln_det,
};
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::{Cholesky, DMatrix, Dyn};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use std::fmt;

/// [Wishart distribution](https://en.wikipedia.org/wiki/Wishart_distribution),
/// W(ψ, ν) over d × d positive-definite matrices Λ.
///
/// ψ is the scale matrix and ν > d − 1 the degrees of freedom, so that
/// E[Λ] = νψ.
///
/// # Example
///
/// ```
/// use nalgebra::DMatrix;
/// use dpmoe::prelude::*;
///
/// let w = Wishart::new(DMatrix::identity(3, 3), 5.0).unwrap();
/// let mut rng = rand::thread_rng();
/// let lambda: DMatrix<f64> = w.draw(&mut rng);
///
/// assert!(lambda.clone().cholesky().is_some());
/// assert_eq!(w.mean(), Some(DMatrix::identity(3, 3) * 5.0));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "WishartParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "WishartParameters"))]
pub struct Wishart {
    psi: DMatrix<f64>,
    nu: f64,
    chol: Cholesky<f64, Dyn>,
}

impl PartialEq for Wishart {
    fn eq(&self, other: &Wishart) -> bool {
        self.psi == other.psi && self.nu == other.nu
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct WishartParameters {
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum WishartError {
    /// The scale matrix is not square
    ScaleMatrixNotSquare { nrows: usize, ncols: usize },
    /// The scale matrix is not positive definite
    ScaleNotPositiveDefinite,
    /// The degrees of freedom are not greater than the dimension minus one
    DfLessThanDimensions { df: f64, ndims: usize },
    /// The degrees of freedom are infinite or NaN
    DfNotFinite { df: f64 },
}

/// Natural parameters and sufficient statistics of the Wishart
///
/// | slot  | statistic  | natural parameter |
/// |-------|------------|-------------------|
/// | `psi` | −½Λ        | ψ⁻¹               |
/// | `nu`  | ½ ln\|Λ\|  | ν − d − 1         |
#[derive(Debug, Clone, PartialEq)]
pub struct WishartStat {
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

impl_statistics!(WishartStat { psi, nu });

impl Wishart {
    /// Create a new Wishart
    ///
    /// # Arguments
    /// - psi: The positive-definite d × d scale matrix, ψ
    /// - nu: The degrees of freedom, ν > d − 1
    pub fn new(psi: DMatrix<f64>, nu: f64) -> Result<Self, WishartError> {
        if !psi.is_square() {
            return Err(WishartError::ScaleMatrixNotSquare {
                nrows: psi.nrows(),
                ncols: psi.ncols(),
            });
        }

        let ndims = psi.nrows();
        if !nu.is_finite() {
            Err(WishartError::DfNotFinite { df: nu })
        } else if nu <= ndims as f64 - 1.0 {
            Err(WishartError::DfLessThanDimensions { df: nu, ndims })
        } else {
            let chol =
                cholesky(&psi).ok_or(WishartError::ScaleNotPositiveDefinite)?;
            Ok(Wishart { psi, nu, chol })
        }
    }

    /// Wishart with an identity scale and ν = d + 1
    pub fn identity(ndims: usize) -> Self {
        let psi = DMatrix::identity(ndims, ndims);
        let chol = Cholesky::new_unchecked(psi.clone());
        Wishart {
            psi,
            nu: ndims as f64 + 1.0,
            chol,
        }
    }

    /// Get the number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.psi.nrows()
    }

    /// Get a reference to the scale matrix, ψ
    #[inline]
    pub fn psi(&self) -> &DMatrix<f64> {
        &self.psi
    }

    /// Get the degrees of freedom, ν
    #[inline]
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Set the scale matrix
    pub fn set_psi(&mut self, psi: DMatrix<f64>) -> Result<(), WishartError> {
        let new = Wishart::new(psi, self.nu)?;
        *self = new;
        Ok(())
    }

    /// Set the degrees of freedom
    pub fn set_nu(&mut self, nu: f64) -> Result<(), WishartError> {
        let ndims = self.ndims();
        if !nu.is_finite() {
            Err(WishartError::DfNotFinite { df: nu })
        } else if nu <= ndims as f64 - 1.0 {
            Err(WishartError::DfLessThanDimensions { df: nu, ndims })
        } else {
            self.nu = nu;
            Ok(())
        }
    }

    /// The Cholesky factorization of ψ
    #[inline]
    pub fn psi_chol(&self) -> &Cholesky<f64, Dyn> {
        &self.chol
    }

    /// ψ⁻¹
    #[inline]
    pub fn psi_inv(&self) -> DMatrix<f64> {
        self.chol.inverse()
    }

    /// ln|ψ|
    #[inline]
    pub fn ln_det_psi(&self) -> f64 {
        chol_ln_det(&self.chol)
    }

    /// E[ln|Λ|]
    #[inline]
    pub fn expected_ln_det(&self) -> f64 {
        wishart_expected_ln_det(self.ndims(), self.nu, self.ln_det_psi())
    }
}

impl Parameterized for Wishart {
    type Parameters = WishartParameters;
    type ParameterError = WishartError;

    fn emit_params(&self) -> Self::Parameters {
        WishartParameters {
            psi: self.psi.clone(),
            nu: self.nu,
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, WishartError> {
        Wishart::new(params.psi, params.nu)
    }
}

impl TryFrom<WishartParameters> for Wishart {
    type Error = WishartError;

    fn try_from(params: WishartParameters) -> Result<Self, Self::Error> {
        Wishart::from_params(params)
    }
}

impl From<Wishart> for WishartParameters {
    fn from(w: Wishart) -> Self {
        w.emit_params()
    }
}

impl From<&Wishart> for String {
    fn from(w: &Wishart) -> String {
        format!("W({}; ν: {})", w.ndims(), w.nu)
    }
}

impl_display!(Wishart);

impl ExponentialFamily for Wishart {
    type Stat = WishartStat;
    type Error = WishartError;

    fn to_natural(&self) -> WishartStat {
        WishartStat {
            psi: self.psi_inv(),
            nu: self.nu - self.ndims() as f64 - 1.0,
        }
    }

    fn from_natural(&self, nat: &WishartStat) -> Result<Self, WishartError> {
        let psi = invpd(&nat.psi).ok_or(WishartError::ScaleNotPositiveDefinite)?;
        let nu = nat.nu + psi.nrows() as f64 + 1.0;
        Wishart::new(psi, nu)
    }

    fn log_partition(&self) -> f64 {
        let d = self.ndims();
        0.5 * self.nu * (d as f64 * LN_2 + self.ln_det_psi())
            + lnmv_gamma(d, 0.5 * self.nu)
    }

    fn log_base(&self) -> f64 {
        0.0
    }

    fn expected_statistics(&self) -> WishartStat {
        WishartStat {
            psi: &self.psi * (-0.5 * self.nu),
            nu: 0.5 * self.expected_ln_det(),
        }
    }
}

impl HasDensity<DMatrix<f64>> for Wishart {
    fn ln_f(&self, x: &DMatrix<f64>) -> f64 {
        let d = self.ndims() as f64;
        match cholesky(x) {
            Some(x_chol) => {
                let ln_det_x = chol_ln_det(&x_chol);
                let tr = self.chol.solve(x).trace();
                0.5 * (self.nu - d - 1.0) * ln_det_x
                    - 0.5 * tr
                    - self.log_partition()
            }
            None => f64::NEG_INFINITY,
        }
    }
}

impl Sampleable<DMatrix<f64>> for Wishart {
    /// Bartlett decomposition, Λ = L A Aᵀ Lᵀ for ψ = L Lᵀ
    fn draw<R: Rng>(&self, rng: &mut R) -> DMatrix<f64> {
        let d = self.ndims();
        let mut a = DMatrix::<f64>::zeros(d, d);
        for i in 0..d {
            let chi2 = ChiSquared::new(self.nu - i as f64).unwrap();
            a[(i, i)] = chi2.sample(rng).sqrt();
            for j in 0..i {
                a[(i, j)] = rng.sample(StandardNormal);
            }
        }
        let la = self.chol.l() * a;
        let x = &la * la.transpose();
        (&x + x.transpose()) * 0.5
    }
}

impl Mean<DMatrix<f64>> for Wishart {
    fn mean(&self) -> Option<DMatrix<f64>> {
        Some(&self.psi * self.nu)
    }
}

impl Mode<DMatrix<f64>> for Wishart {
    fn mode(&self) -> Option<DMatrix<f64>> {
        let d = self.ndims() as f64;
        if self.nu >= d + 1.0 {
            Some(&self.psi * (self.nu - d - 1.0))
        } else {
            None
        }
    }
}

impl std::error::Error for WishartError {}

impl fmt::Display for WishartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleMatrixNotSquare { nrows, ncols } => write!(
                f,
                "The scale matrix is not square ({} x {})",
                nrows, ncols
            ),
            Self::ScaleNotPositiveDefinite => {
                write!(f, "The scale matrix is not positive definite")
            }
            Self::DfLessThanDimensions { df, ndims } => write!(
                f,
                "df, the degrees of freedom must be greater than ndims \
                minus one. Got df = {} and ndims = {}",
                df, ndims
            ),
            Self::DfNotFinite { df } => write!(f, "non-finite df: {}", df),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_basic_impls, test_exponential_family};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use special::Gamma as _;

    const TOL: f64 = 1E-12;

    fn scale() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 0.5])
    }

    test_basic_impls!(Wishart::identity(3));
    test_exponential_family!(Wishart::new(scale(), 4.5).unwrap(), DMatrix<f64>);

    #[test]
    fn entropy_matches_closed_form() {
        let nu: f64 = 4.5;
        let ln_det = scale().determinant().ln();
        let a = nu / 2.0;
        // p = 2
        let ln_mv_gamma = 0.5 * std::f64::consts::PI.ln()
            + a.ln_gamma().0
            + (a - 0.5).ln_gamma().0;
        let mv_digamma = a.digamma() + (a - 0.5).digamma();
        let expected = 1.5 * ln_det + 3.0 * 2.0_f64.ln() + ln_mv_gamma
            - 0.5 * (nu - 3.0) * mv_digamma
            + nu;
        let w = Wishart::new(scale(), nu).unwrap();
        assert::close(w.entropy(), expected, 1E-10);
    }

    #[test]
    fn new_should_reject_bad_params() {
        match Wishart::new(DMatrix::zeros(2, 3), 3.0) {
            Err(WishartError::ScaleMatrixNotSquare { nrows: 2, ncols: 3 }) => (),
            _ => panic!("wrong error"),
        }
        match Wishart::new(scale(), 0.5) {
            Err(WishartError::DfLessThanDimensions { .. }) => (),
            _ => panic!("wrong error"),
        }
        let not_pd = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        match Wishart::new(not_pd, 3.0) {
            Err(WishartError::ScaleNotPositiveDefinite) => (),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn one_dimensional_wishart_is_a_gamma() {
        // W(ψ, ν) on 1 × 1 matrices is Gamma(ν/2, rate = 1/(2ψ))
        let psi: f64 = 0.7;
        let nu: f64 = 3.2;
        let w = Wishart::new(DMatrix::from_element(1, 1, psi), nu).unwrap();
        let x: f64 = 1.3;
        let expected = (0.5 * nu - 1.0) * x.ln()
            - x / (2.0 * psi)
            - 0.5 * nu * (2.0 * psi).ln()
            - (0.5 * nu).ln_gamma().0;
        assert::close(w.ln_f(&DMatrix::from_element(1, 1, x)), expected, TOL);
    }

    #[test]
    fn natural_parameters_map_back_to_standard() {
        let w = Wishart::new(scale(), 4.5).unwrap();
        let back = w.from_natural(&w.to_natural()).unwrap();
        assert::close(back.nu(), 4.5, TOL);
        for (a, b) in back.psi().iter().zip(scale().iter()) {
            assert::close(*a, *b, 1E-10);
        }
    }

    #[test]
    fn sample_mean_approaches_nu_psi() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let w = Wishart::new(scale(), 6.0).unwrap();
        let n = 20_000;
        let sum = w
            .sample(n, &mut rng)
            .into_iter()
            .fold(DMatrix::zeros(2, 2), |acc, x| acc + x);
        let mean = sum / n as f64;
        let expected = w.mean().unwrap();
        for (a, b) in mean.iter().zip(expected.iter()) {
            assert::close(*a, *b, 0.25);
        }
    }

    #[test]
    fn mode_requires_enough_df() {
        let w = Wishart::new(scale(), 2.5).unwrap();
        assert!(w.mode().is_none());
        let w = Wishart::new(scale(), 4.0).unwrap();
        assert_eq!(w.mode(), Some(scale()));
    }
}
