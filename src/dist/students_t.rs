//! Student's t laws, the posterior predictives of the conjugate Gaussian
//! families
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::LN_PI;
use crate::impl_display;
use crate::misc::{chol_ln_det, cholesky};
use crate::traits::*;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};
use special::Gamma as _;
use std::fmt;

/// Multivariate [Student's t distribution](https://en.wikipedia.org/wiki/Multivariate_t-distribution),
/// t<sub>ν</sub>(μ, Σ) with degrees of freedom ν, location μ and scale
/// matrix Σ.
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
///
/// let t = MvStudentT::new(4.0, DVector::zeros(2), DMatrix::identity(2, 2)).unwrap();
///
/// // The covariance of a t with ν > 2 is Σ ν / (ν − 2)
/// assert_eq!(t.moment_covariance(), DMatrix::identity(2, 2) * 2.0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "MvStudentTParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "MvStudentTParameters"))]
pub struct MvStudentT {
    df: f64,
    loc: DVector<f64>,
    scale: DMatrix<f64>,
    chol: Cholesky<f64, Dyn>,
}

impl PartialEq for MvStudentT {
    fn eq(&self, other: &MvStudentT) -> bool {
        self.df == other.df && self.loc == other.loc && self.scale == other.scale
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct MvStudentTParameters {
    pub df: f64,
    pub loc: DVector<f64>,
    pub scale: DMatrix<f64>,
}

/// Independent Student's t distributions, one per dimension
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct DiagonalStudentT {
    dfs: DVector<f64>,
    locs: DVector<f64>,
    /// Squared scales
    scales: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum StudentTError {
    /// The degrees of freedom are non-positive or non-finite
    DfTooLow { df: f64 },
    /// The location has a non-finite entry
    LocNotFinite,
    /// The scale is not positive definite (or a diagonal scale is not
    /// positive)
    ScaleNotPositiveDefinite,
    /// Location and scale dimensions disagree
    DimensionMismatch { n_loc: usize, n_scale: usize },
}

fn check_df(df: f64) -> Result<(), StudentTError> {
    if df > 0.0 && df.is_finite() {
        Ok(())
    } else {
        Err(StudentTError::DfTooLow { df })
    }
}

/// Moment-matched variance factor ν / (ν − 2). Where the variance does not
/// exist (ν ≤ 2) the scale itself is used.
#[inline]
fn variance_factor(df: f64) -> f64 {
    if df > 2.0 {
        df / (df - 2.0)
    } else {
        1.0
    }
}

impl MvStudentT {
    pub fn new(
        df: f64,
        loc: DVector<f64>,
        scale: DMatrix<f64>,
    ) -> Result<Self, StudentTError> {
        check_df(df)?;
        if loc.iter().any(|x| !x.is_finite()) {
            return Err(StudentTError::LocNotFinite);
        }
        if !scale.is_square() || scale.nrows() != loc.len() {
            return Err(StudentTError::DimensionMismatch {
                n_loc: loc.len(),
                n_scale: scale.nrows(),
            });
        }
        let chol =
            cholesky(&scale).ok_or(StudentTError::ScaleNotPositiveDefinite)?;
        Ok(MvStudentT {
            df,
            loc,
            scale,
            chol,
        })
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.loc.len()
    }

    /// Degrees of freedom, ν
    #[inline]
    pub fn df(&self) -> f64 {
        self.df
    }

    #[inline]
    pub fn loc(&self) -> &DVector<f64> {
        &self.loc
    }

    #[inline]
    pub fn scale(&self) -> &DMatrix<f64> {
        &self.scale
    }
}

impl DiagonalStudentT {
    pub fn new(
        dfs: DVector<f64>,
        locs: DVector<f64>,
        scales: DVector<f64>,
    ) -> Result<Self, StudentTError> {
        if dfs.len() != locs.len() || scales.len() != locs.len() {
            return Err(StudentTError::DimensionMismatch {
                n_loc: locs.len(),
                n_scale: scales.len().min(dfs.len()),
            });
        }
        dfs.iter().try_for_each(|&df| check_df(df))?;
        if locs.iter().any(|x| !x.is_finite()) {
            return Err(StudentTError::LocNotFinite);
        }
        if scales.iter().any(|&s| !(s > 0.0 && s.is_finite())) {
            return Err(StudentTError::ScaleNotPositiveDefinite);
        }
        Ok(DiagonalStudentT { dfs, locs, scales })
    }

    #[inline]
    pub fn ndims(&self) -> usize {
        self.locs.len()
    }

    #[inline]
    pub fn dfs(&self) -> &DVector<f64> {
        &self.dfs
    }

    #[inline]
    pub fn locs(&self) -> &DVector<f64> {
        &self.locs
    }

    /// The squared scale of each dimension
    #[inline]
    pub fn scales(&self) -> &DVector<f64> {
        &self.scales
    }
}

impl Parameterized for MvStudentT {
    type Parameters = MvStudentTParameters;
    type ParameterError = StudentTError;

    fn emit_params(&self) -> Self::Parameters {
        MvStudentTParameters {
            df: self.df,
            loc: self.loc.clone(),
            scale: self.scale.clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, StudentTError> {
        MvStudentT::new(params.df, params.loc, params.scale)
    }
}

impl TryFrom<MvStudentTParameters> for MvStudentT {
    type Error = StudentTError;

    fn try_from(params: MvStudentTParameters) -> Result<Self, Self::Error> {
        MvStudentT::from_params(params)
    }
}

impl From<MvStudentT> for MvStudentTParameters {
    fn from(t: MvStudentT) -> Self {
        t.emit_params()
    }
}

impl From<&MvStudentT> for String {
    fn from(t: &MvStudentT) -> String {
        format!("t({}; ν: {}, μ: {:?})", t.ndims(), t.df, t.loc.as_slice())
    }
}

impl From<&DiagonalStudentT> for String {
    fn from(t: &DiagonalStudentT) -> String {
        format!("t({}; μ: {:?})", t.ndims(), t.locs.as_slice())
    }
}

impl_display!(MvStudentT);
impl_display!(DiagonalStudentT);

impl HasDensity<DVector<f64>> for MvStudentT {
    fn ln_f(&self, x: &DVector<f64>) -> f64 {
        let d = self.ndims() as f64;
        let nu = self.df;
        let diff = x - &self.loc;
        let maha = diff.dot(&self.chol.solve(&diff));
        (0.5 * (nu + d)).ln_gamma().0
            - (0.5 * nu).ln_gamma().0
            - 0.5 * d * (nu.ln() + LN_PI)
            - 0.5 * chol_ln_det(&self.chol)
            - 0.5 * (nu + d) * (maha / nu).ln_1p()
    }
}

impl HasDensity<DVector<f64>> for DiagonalStudentT {
    fn ln_f(&self, x: &DVector<f64>) -> f64 {
        x.iter()
            .enumerate()
            .map(|(i, xi)| {
                let nu = self.dfs[i];
                let s2 = self.scales[i];
                let z = xi - self.locs[i];
                (0.5 * (nu + 1.0)).ln_gamma().0
                    - (0.5 * nu).ln_gamma().0
                    - 0.5 * (nu.ln() + LN_PI + s2.ln())
                    - 0.5 * (nu + 1.0) * (z * z / (nu * s2)).ln_1p()
            })
            .sum()
    }
}

impl Sampleable<DVector<f64>> for MvStudentT {
    /// x = μ + L z / √(u/ν) with z standard normal and u ~ χ²(ν)
    fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        let z: DVector<f64> =
            DVector::from_fn(self.ndims(), |_, _| rng.sample(StandardNormal));
        let u = ChiSquared::new(self.df).unwrap().sample(rng);
        self.chol.l() * z / (u / self.df).sqrt() + &self.loc
    }
}

impl Sampleable<DVector<f64>> for DiagonalStudentT {
    fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        DVector::from_fn(self.ndims(), |i, _| {
            let t = rand_distr::StudentT::new(self.dfs[i]).unwrap();
            self.locs[i] + self.scales[i].sqrt() * t.sample(rng)
        })
    }
}

impl Mean<DVector<f64>> for MvStudentT {
    fn mean(&self) -> Option<DVector<f64>> {
        if self.df > 1.0 {
            Some(self.loc.clone())
        } else {
            None
        }
    }
}

impl Mode<DVector<f64>> for MvStudentT {
    fn mode(&self) -> Option<DVector<f64>> {
        Some(self.loc.clone())
    }
}

impl Variance<DMatrix<f64>> for MvStudentT {
    fn variance(&self) -> Option<DMatrix<f64>> {
        if self.df > 2.0 {
            Some(&self.scale * (self.df / (self.df - 2.0)))
        } else {
            None
        }
    }
}

impl Mode<DVector<f64>> for DiagonalStudentT {
    fn mode(&self) -> Option<DVector<f64>> {
        Some(self.locs.clone())
    }
}

impl Predictive for MvStudentT {
    fn location(&self) -> DVector<f64> {
        self.loc.clone()
    }

    fn moment_covariance(&self) -> DMatrix<f64> {
        &self.scale * variance_factor(self.df)
    }
}

impl Predictive for DiagonalStudentT {
    fn location(&self) -> DVector<f64> {
        self.locs.clone()
    }

    fn moment_covariance(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(
            &self.scales.zip_map(&self.dfs, |s2, df| s2 * variance_factor(df)),
        )
    }
}

impl std::error::Error for StudentTError {}

impl fmt::Display for StudentTError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DfTooLow { df } => write!(
                f,
                "degrees of freedom must be positive and finite, got {}",
                df
            ),
            Self::LocNotFinite => write!(f, "non-finite entry in location"),
            Self::ScaleNotPositiveDefinite => {
                write!(f, "the scale is not positive definite")
            }
            Self::DimensionMismatch { n_loc, n_scale } => write!(
                f,
                "location has {} dimensions but the scale has {}",
                n_loc, n_scale
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::LN_2PI;
    use crate::test_basic_impls;

    const TOL: f64 = 1E-12;

    fn mvt() -> MvStudentT {
        MvStudentT::new(
            5.0,
            DVector::from_row_slice(&[1.0, -1.0]),
            DMatrix::from_row_slice(2, 2, &[1.5, 0.2, 0.2, 0.8]),
        )
        .unwrap()
    }

    test_basic_impls!(mvt());

    #[test]
    fn one_dimensional_cauchy() {
        // t₁(0, 1) is the standard Cauchy
        let t = MvStudentT::new(1.0, DVector::zeros(1), DMatrix::identity(1, 1))
            .unwrap();
        let x = DVector::from_element(1, 0.7);
        let expected = -(std::f64::consts::PI * (1.0 + 0.49)).ln();
        assert::close(t.ln_f(&x), expected, TOL);
    }

    #[test]
    fn diagonal_matches_full_with_diagonal_scale() {
        let diag = DiagonalStudentT::new(
            DVector::from_element(1, 3.0),
            DVector::from_element(1, 0.5),
            DVector::from_element(1, 2.0),
        )
        .unwrap();
        let full = MvStudentT::new(
            3.0,
            DVector::from_element(1, 0.5),
            DMatrix::from_element(1, 1, 2.0),
        )
        .unwrap();
        let x = DVector::from_element(1, -0.3);
        assert::close(diag.ln_f(&x), full.ln_f(&x), TOL);
        assert_eq!(diag.moment_covariance(), full.moment_covariance());
    }

    #[test]
    fn large_df_approaches_gaussian() {
        let t = MvStudentT::new(1E6, DVector::zeros(2), DMatrix::identity(2, 2))
            .unwrap();
        assert::close(t.ln_f(&DVector::zeros(2)), -LN_2PI, 1E-6);
    }

    #[test]
    fn heavy_tails_fall_back_to_scale() {
        let t = MvStudentT::new(1.5, DVector::zeros(2), DMatrix::identity(2, 2))
            .unwrap();
        assert!(t.variance().is_none());
        assert_eq!(t.moment_covariance(), DMatrix::identity(2, 2));
    }

    #[test]
    fn bad_params_are_rejected() {
        assert_eq!(
            MvStudentT::new(0.0, DVector::zeros(1), DMatrix::identity(1, 1)),
            Err(StudentTError::DfTooLow { df: 0.0 })
        );
        assert_eq!(
            MvStudentT::new(
                2.0,
                DVector::zeros(2),
                DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0])
            ),
            Err(StudentTError::ScaleNotPositiveDefinite)
        );
    }
}
