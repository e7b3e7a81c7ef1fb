//! Linear-Gaussian regression likelihoods, y | x ~ N(A x̃, Λ⁻¹)
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::data::{regressor, Observation};
use crate::impl_display;
use crate::misc::{chol_ln_det, cholesky, solve_lower_transpose};
use crate::traits::*;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

/// Linear regression with full output precision
///
/// The coefficient matrix A is `drow × dcol`. When `affine` is set the last
/// column of A is the bias and x̃ is the input with a 1 appended, so
/// `dcol = ndims_in + 1`.
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
///
/// // y = 2x + 1
/// let lg = LinearGaussianWithPrecision::new(
///     DMatrix::from_row_slice(1, 2, &[2.0, 1.0]),
///     DMatrix::identity(1, 1),
///     true,
/// ).unwrap();
///
/// assert_eq!(lg.mean_at(&DVector::from_element(1, 3.0))[0], 7.0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(try_from = "LinearGaussianParameters"))]
#[cfg_attr(feature = "serde1", serde(into = "LinearGaussianParameters"))]
pub struct LinearGaussianWithPrecision {
    coef: DMatrix<f64>,
    lmbda: DMatrix<f64>,
    affine: bool,
    /// Lower Cholesky factor of Λ
    chol_l: DMatrix<f64>,
    ln_det: f64,
}

impl PartialEq for LinearGaussianWithPrecision {
    fn eq(&self, other: &LinearGaussianWithPrecision) -> bool {
        self.coef == other.coef
            && self.lmbda == other.lmbda
            && self.affine == other.affine
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct LinearGaussianParameters {
    pub coef: DMatrix<f64>,
    pub lmbda: DMatrix<f64>,
    pub affine: bool,
}

/// Linear regression with independent output precisions λ
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct LinearGaussianWithDiagonalPrecision {
    coef: DMatrix<f64>,
    lmbdas: DVector<f64>,
    affine: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum LinearGaussianError {
    /// The coefficient matrix has a non-finite entry
    CoefNotFinite,
    /// The coefficient matrix has no column for the bias term
    NoBiasColumn,
    /// The coefficient rows and the precision dimension disagree
    DimensionMismatch { n_rows: usize, n_precision: usize },
    /// The precision matrix is not positive definite
    PrecisionNotPositiveDefinite,
    /// A diagonal precision is non-positive or non-finite
    PrecisionTooLow { ix: usize, lmbda: f64 },
}

fn check_coef(coef: &DMatrix<f64>, affine: bool) -> Result<(), LinearGaussianError> {
    if coef.iter().any(|x| !x.is_finite()) {
        Err(LinearGaussianError::CoefNotFinite)
    } else if affine && coef.ncols() == 0 {
        Err(LinearGaussianError::NoBiasColumn)
    } else {
        Ok(())
    }
}

impl LinearGaussianWithPrecision {
    pub fn new(
        coef: DMatrix<f64>,
        lmbda: DMatrix<f64>,
        affine: bool,
    ) -> Result<Self, LinearGaussianError> {
        check_coef(&coef, affine)?;
        if !lmbda.is_square() || lmbda.nrows() != coef.nrows() {
            return Err(LinearGaussianError::DimensionMismatch {
                n_rows: coef.nrows(),
                n_precision: lmbda.nrows(),
            });
        }
        let chol = cholesky(&lmbda)
            .ok_or(LinearGaussianError::PrecisionNotPositiveDefinite)?;
        let ln_det = chol_ln_det(&chol);
        Ok(LinearGaussianWithPrecision {
            coef,
            lmbda,
            affine,
            chol_l: chol.l(),
            ln_det,
        })
    }

    /// Number of output dimensions
    #[inline]
    pub fn ndims_out(&self) -> usize {
        self.coef.nrows()
    }

    /// Number of input dimensions, without the bias
    #[inline]
    pub fn ndims_in(&self) -> usize {
        self.coef.ncols() - usize::from(self.affine)
    }

    #[inline]
    pub fn coef(&self) -> &DMatrix<f64> {
        &self.coef
    }

    #[inline]
    pub fn lmbda(&self) -> &DMatrix<f64> {
        &self.lmbda
    }

    #[inline]
    pub fn affine(&self) -> bool {
        self.affine
    }

    /// E[y | x] = A x̃
    pub fn mean_at(&self, input: &DVector<f64>) -> DVector<f64> {
        &self.coef * regressor(input, self.affine)
    }

    /// Draw a target for `input`
    pub fn draw_target<R: Rng>(
        &self,
        input: &DVector<f64>,
        rng: &mut R,
    ) -> DVector<f64> {
        let z: DVector<f64> =
            DVector::from_fn(self.ndims_out(), |_, _| rng.sample(StandardNormal));
        solve_lower_transpose(&self.chol_l, &z) + self.mean_at(input)
    }
}

impl LinearGaussianWithDiagonalPrecision {
    pub fn new(
        coef: DMatrix<f64>,
        lmbdas: DVector<f64>,
        affine: bool,
    ) -> Result<Self, LinearGaussianError> {
        check_coef(&coef, affine)?;
        if lmbdas.len() != coef.nrows() {
            return Err(LinearGaussianError::DimensionMismatch {
                n_rows: coef.nrows(),
                n_precision: lmbdas.len(),
            });
        }
        if let Some((ix, &lmbda)) = lmbdas
            .iter()
            .enumerate()
            .find(|&(_, &l)| l <= 0.0 || !l.is_finite())
        {
            return Err(LinearGaussianError::PrecisionTooLow { ix, lmbda });
        }
        Ok(LinearGaussianWithDiagonalPrecision {
            coef,
            lmbdas,
            affine,
        })
    }

    #[inline]
    pub fn ndims_out(&self) -> usize {
        self.coef.nrows()
    }

    #[inline]
    pub fn ndims_in(&self) -> usize {
        self.coef.ncols() - usize::from(self.affine)
    }

    #[inline]
    pub fn coef(&self) -> &DMatrix<f64> {
        &self.coef
    }

    #[inline]
    pub fn lmbdas(&self) -> &DVector<f64> {
        &self.lmbdas
    }

    #[inline]
    pub fn affine(&self) -> bool {
        self.affine
    }

    pub fn mean_at(&self, input: &DVector<f64>) -> DVector<f64> {
        &self.coef * regressor(input, self.affine)
    }

    pub fn draw_target<R: Rng>(
        &self,
        input: &DVector<f64>,
        rng: &mut R,
    ) -> DVector<f64> {
        let mean = self.mean_at(input);
        mean.zip_map(&self.lmbdas, |m, l| {
            let z: f64 = rng.sample(StandardNormal);
            m + z / l.sqrt()
        })
    }
}

impl Parameterized for LinearGaussianWithPrecision {
    type Parameters = LinearGaussianParameters;
    type ParameterError = LinearGaussianError;

    fn emit_params(&self) -> Self::Parameters {
        LinearGaussianParameters {
            coef: self.coef.clone(),
            lmbda: self.lmbda.clone(),
            affine: self.affine,
        }
    }

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, LinearGaussianError> {
        LinearGaussianWithPrecision::new(params.coef, params.lmbda, params.affine)
    }
}

impl TryFrom<LinearGaussianParameters> for LinearGaussianWithPrecision {
    type Error = LinearGaussianError;

    fn try_from(params: LinearGaussianParameters) -> Result<Self, Self::Error> {
        LinearGaussianWithPrecision::from_params(params)
    }
}

impl From<LinearGaussianWithPrecision> for LinearGaussianParameters {
    fn from(lg: LinearGaussianWithPrecision) -> Self {
        lg.emit_params()
    }
}

impl From<&LinearGaussianWithPrecision> for String {
    fn from(lg: &LinearGaussianWithPrecision) -> String {
        format!(
            "LinearGaussian({} -> {}; affine: {})",
            lg.ndims_in(),
            lg.ndims_out(),
            lg.affine
        )
    }
}

impl From<&LinearGaussianWithDiagonalPrecision> for String {
    fn from(lg: &LinearGaussianWithDiagonalPrecision) -> String {
        format!(
            "LinearGaussian({} -> {}; affine: {}, λ: {:?})",
            lg.ndims_in(),
            lg.ndims_out(),
            lg.affine,
            lg.lmbdas.as_slice()
        )
    }
}

impl_display!(LinearGaussianWithPrecision);
impl_display!(LinearGaussianWithDiagonalPrecision);

impl HasDensity<Observation> for LinearGaussianWithPrecision {
    fn ln_f(&self, obs: &Observation) -> f64 {
        let d = self.ndims_out() as f64;
        let diff = &obs.target - self.mean_at(&obs.input);
        let maha = self.chol_l.tr_mul(&diff).norm_squared();
        0.5 * self.ln_det - d * HALF_LN_2PI - 0.5 * maha
    }
}

impl HasDensity<Observation> for LinearGaussianWithDiagonalPrecision {
    fn ln_f(&self, obs: &Observation) -> f64 {
        let mean = self.mean_at(&obs.input);
        obs.target
            .iter()
            .zip(mean.iter().zip(self.lmbdas.iter()))
            .map(|(y, (m, l))| {
                let z = y - m;
                0.5 * l.ln() - HALF_LN_2PI - 0.5 * l * z * z
            })
            .sum()
    }
}

impl std::error::Error for LinearGaussianError {}

impl fmt::Display for LinearGaussianError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoefNotFinite => write!(f, "non-finite coefficient"),
            Self::NoBiasColumn => {
                write!(f, "an affine model needs a bias column")
            }
            Self::DimensionMismatch { n_rows, n_precision } => write!(
                f,
                "{} coefficient rows but the precision has {} dimensions",
                n_rows, n_precision
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
    use crate::dist::GaussianWithPrecision;
    use crate::test_basic_impls;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const TOL: f64 = 1E-12;

    fn full() -> LinearGaussianWithPrecision {
        LinearGaussianWithPrecision::new(
            DMatrix::from_row_slice(2, 2, &[1.0, 0.5, -2.0, 0.0]),
            DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]),
            true,
        )
        .unwrap()
    }

    test_basic_impls!(full());

    #[test]
    fn ln_f_is_a_gaussian_around_the_regression() {
        let lg = full();
        let x = DVector::from_element(1, 1.5);
        let y = DVector::from_row_slice(&[0.1, -2.0]);
        let g = GaussianWithPrecision::new(lg.mean_at(&x), lg.lmbda().clone())
            .unwrap();
        assert::close(lg.ln_f(&Observation::new(y.clone(), x)), g.ln_f(&y), TOL);
    }

    #[test]
    fn diagonal_agrees_with_full() {
        let coef = DMatrix::from_row_slice(2, 1, &[0.7, -0.2]);
        let lmbdas = DVector::from_row_slice(&[4.0, 0.5]);
        let diag = LinearGaussianWithDiagonalPrecision::new(
            coef.clone(),
            lmbdas.clone(),
            false,
        )
        .unwrap();
        let full = LinearGaussianWithPrecision::new(
            coef,
            DMatrix::from_diagonal(&lmbdas),
            false,
        )
        .unwrap();
        let obs = Observation::new(
            DVector::from_row_slice(&[1.0, 1.0]),
            DVector::from_element(1, 2.0),
        );
        assert::close(diag.ln_f(&obs), full.ln_f(&obs), TOL);
        assert_eq!(diag.ndims_in(), 1);
        assert_eq!(full.ndims_in(), 1);
    }

    #[test]
    fn drawn_targets_center_on_the_mean() {
        let mut rng = SmallRng::seed_from_u64(3);
        let lg = full();
        let x = DVector::from_element(1, -1.0);
        let n = 20_000;
        let mean = (0..n)
            .map(|_| lg.draw_target(&x, &mut rng))
            .fold(DVector::zeros(2), |acc, y| acc + y)
            / n as f64;
        let expected = lg.mean_at(&x);
        assert::close(mean[0], expected[0], 0.03);
        assert::close(mean[1], expected[1], 0.03);
    }

    #[test]
    fn mismatched_precision_is_rejected() {
        let res = LinearGaussianWithPrecision::new(
            DMatrix::zeros(2, 3),
            DMatrix::identity(3, 3),
            false,
        );
        assert_eq!(
            res,
            Err(LinearGaussianError::DimensionMismatch {
                n_rows: 2,
                n_precision: 3
            })
        );
    }
}
