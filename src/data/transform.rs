#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// How a transform is fitted to a batch when none is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "lowercase"))]
pub enum TransformKind {
    /// [`AffineTransform::whitening`]
    #[default]
    Whitening,
    /// [`AffineTransform::standardization`]
    Standardization,
}

impl TransformKind {
    pub fn fit(self, xs: &[DVector<f64>]) -> Result<AffineTransform> {
        match self {
            TransformKind::Whitening => AffineTransform::whitening(xs),
            TransformKind::Standardization => AffineTransform::standardization(xs),
        }
    }
}

/// An invertible affine map z = W(x − shift)
///
/// Used to whiten or standardize inputs and targets before they reach the
/// experts, and to map predictions back.
///
/// # Example
///
/// ```
/// use nalgebra::DVector;
/// use dpmoe::data::AffineTransform;
///
/// let xs: Vec<DVector<f64>> = (0..100)
///     .map(|i| DVector::from_row_slice(&[i as f64, 3.0 * (i % 7) as f64]))
///     .collect();
///
/// let t = AffineTransform::whitening(&xs).unwrap();
/// let x = &xs[42];
/// let back = t.inverse_transform(&t.transform(x));
/// assert!((back - x).norm() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct AffineTransform {
    shift: DVector<f64>,
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
    ln_abs_det: f64,
}

impl AffineTransform {
    /// Create a transform from a shift and an invertible square matrix
    pub fn new(shift: DVector<f64>, matrix: DMatrix<f64>) -> Result<Self> {
        if !matrix.is_square() {
            return Err(Error::DimensionMismatch {
                what: "transform matrix columns",
                expected: matrix.nrows(),
                found: matrix.ncols(),
            });
        }
        if matrix.nrows() != shift.len() {
            return Err(Error::DimensionMismatch {
                what: "transform shift",
                expected: matrix.nrows(),
                found: shift.len(),
            });
        }
        let det = matrix.determinant();
        let inverse = matrix.clone().try_inverse();
        match inverse {
            Some(inverse) if det.is_finite() && det != 0.0 => Ok(AffineTransform {
                shift,
                matrix,
                inverse,
                ln_abs_det: det.abs().ln(),
            }),
            _ => Err(Error::Degenerate {
                what: "singular transform matrix",
            }),
        }
    }

    /// The identity map in `ndims` dimensions
    pub fn identity(ndims: usize) -> Self {
        AffineTransform {
            shift: DVector::zeros(ndims),
            matrix: DMatrix::identity(ndims, ndims),
            inverse: DMatrix::identity(ndims, ndims),
            ln_abs_det: 0.0,
        }
    }

    /// PCA whitening: the transformed data has zero mean and identity
    /// covariance
    pub fn whitening(xs: &[DVector<f64>]) -> Result<Self> {
        let (mean, cov) = moments(xs)?;
        let eigen = SymmetricEigen::new(cov);
        let max_eig = eigen.eigenvalues.max();
        if eigen
            .eigenvalues
            .iter()
            .any(|&e| !(e > 1e-12 * max_eig.max(1.0)))
        {
            return Err(Error::Degenerate {
                what: "data covariance is singular",
            });
        }
        let scale = DMatrix::from_diagonal(&eigen.eigenvalues.map(|e| e.sqrt().recip()));
        AffineTransform::new(mean, scale * eigen.eigenvectors.transpose())
    }

    /// Per-dimension standardization to zero mean and unit variance
    pub fn standardization(xs: &[DVector<f64>]) -> Result<Self> {
        let (mean, cov) = moments(xs)?;
        let diag = cov.diagonal();
        if diag.iter().any(|&v| !(v > 0.0)) {
            return Err(Error::Degenerate {
                what: "a dimension has zero variance",
            });
        }
        AffineTransform::new(
            mean,
            DMatrix::from_diagonal(&diag.map(|v| v.sqrt().recip())),
        )
    }

    /// Get the number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.shift.len()
    }

    /// Get the shift
    #[inline]
    pub fn shift(&self) -> &DVector<f64> {
        &self.shift
    }

    /// Get the matrix, W
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// ln|det W|
    #[inline]
    pub fn ln_abs_det(&self) -> f64 {
        self.ln_abs_det
    }

    /// z = W(x − shift)
    pub fn transform(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.matrix * (x - &self.shift)
    }

    /// x = W⁻¹z + shift
    pub fn inverse_transform(&self, z: &DVector<f64>) -> DVector<f64> {
        &self.inverse * z + &self.shift
    }

    /// Map a covariance in transformed space back, W⁻¹ C W⁻ᵀ
    pub fn inverse_covariance(&self, cov: &DMatrix<f64>) -> DMatrix<f64> {
        &self.inverse * cov * self.inverse.transpose()
    }

    /// Check that `x` lives in the space of this transform
    pub(crate) fn check(&self, x: &DVector<f64>, what: &'static str) -> Result<()> {
        if x.len() == self.ndims() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                what,
                expected: self.ndims(),
                found: x.len(),
            })
        }
    }
}

/// Sample mean and (maximum-likelihood) covariance
fn moments(xs: &[DVector<f64>]) -> Result<(DVector<f64>, DMatrix<f64>)> {
    if xs.len() < 2 {
        return Err(Error::Degenerate {
            what: "at least two points are needed to fit a transform",
        });
    }
    let d = xs[0].len();
    if let Some(x) = xs.iter().find(|x| x.len() != d) {
        return Err(Error::DimensionMismatch {
            what: "transform data",
            expected: d,
            found: x.len(),
        });
    }
    let n = xs.len() as f64;
    let mean = xs.iter().fold(DVector::zeros(d), |acc, x| acc + x) / n;
    let cov = xs.iter().fold(DMatrix::zeros(d, d), |acc, x| {
        let z = x - &mean;
        acc + &z * z.transpose()
    }) / n;
    Ok((mean, cov))
}
