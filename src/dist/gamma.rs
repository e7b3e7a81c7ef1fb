//! Independent Gamma distributions over a vector of precisions
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::impl_display;
use crate::misc::vec_to_string;
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::DVector;
use rand::Rng;
use rand_distr::Gamma as RGamma;
use special::Gamma as _;
use std::fmt;

/// A vector of independent [Gamma distributions](https://en.wikipedia.org/wiki/Gamma_distribution),
/// λ<sub>i</sub> ~ Gamma(α<sub>i</sub>, β<sub>i</sub>) with shapes α and
/// rates β.
///
/// # Example
///
/// ```
/// use nalgebra::DVector;
/// use dpmoe::prelude::*;
///
/// let gamma = Gamma::new(
///     DVector::from_row_slice(&[2.0, 3.0]),
///     DVector::from_row_slice(&[1.0, 0.5]),
/// ).unwrap();
///
/// assert_eq!(gamma.mean(), Some(DVector::from_row_slice(&[2.0, 6.0])));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Gamma {
    alphas: DVector<f64>,
    betas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct GammaParameters {
    pub alphas: DVector<f64>,
    pub betas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum GammaError {
    /// The shape vector is empty
    Empty,
    /// The shape and rate vectors have different lengths
    DimensionMismatch { n_alphas: usize, n_betas: usize },
    /// A shape is less than or equal to zero
    ShapeTooLow { ix: usize, shape: f64 },
    /// A shape is infinite or NaN
    ShapeNotFinite { ix: usize, shape: f64 },
    /// A rate is less than or equal to zero
    RateTooLow { ix: usize, rate: f64 },
    /// A rate is infinite or NaN
    RateNotFinite { ix: usize, rate: f64 },
}

/// | slot     | statistic | natural parameter |
/// |----------|-----------|-------------------|
/// | `alphas` | ln λ      | α − 1             |
/// | `betas`  | −λ        | β                 |
#[derive(Debug, Clone, PartialEq)]
pub struct GammaStat {
    pub alphas: DVector<f64>,
    pub betas: DVector<f64>,
}

impl_statistics!(GammaStat { alphas, betas });

impl Gamma {
    /// Create a new vector of Gammas from shapes and rates
    pub fn new(
        alphas: DVector<f64>,
        betas: DVector<f64>,
    ) -> Result<Self, GammaError> {
        if alphas.is_empty() {
            return Err(GammaError::Empty);
        }
        if alphas.len() != betas.len() {
            return Err(GammaError::DimensionMismatch {
                n_alphas: alphas.len(),
                n_betas: betas.len(),
            });
        }
        for (ix, &shape) in alphas.iter().enumerate() {
            if !shape.is_finite() {
                return Err(GammaError::ShapeNotFinite { ix, shape });
            } else if shape <= 0.0 {
                return Err(GammaError::ShapeTooLow { ix, shape });
            }
        }
        for (ix, &rate) in betas.iter().enumerate() {
            if !rate.is_finite() {
                return Err(GammaError::RateNotFinite { ix, rate });
            } else if rate <= 0.0 {
                return Err(GammaError::RateTooLow { ix, rate });
            }
        }
        Ok(Gamma { alphas, betas })
    }

    /// Creates a new Gamma without checking whether the parameters are valid.
    #[inline]
    pub fn new_unchecked(alphas: DVector<f64>, betas: DVector<f64>) -> Self {
        Gamma { alphas, betas }
    }

    /// Get the number of dimensions
    #[inline]
    pub fn ndims(&self) -> usize {
        self.alphas.len()
    }

    /// Get the shape parameters, α
    #[inline]
    pub fn alphas(&self) -> &DVector<f64> {
        &self.alphas
    }

    /// Get the rate parameters, β
    #[inline]
    pub fn betas(&self) -> &DVector<f64> {
        &self.betas
    }

    /// E[λ] = α/β
    pub fn expected_lmbdas(&self) -> DVector<f64> {
        self.alphas.component_div(&self.betas)
    }

    /// E[ln λ] = ψ(α) − ln β
    pub fn expected_ln_lmbdas(&self) -> DVector<f64> {
        self.alphas.zip_map(&self.betas, |a, b| a.digamma() - b.ln())
    }
}

impl Parameterized for Gamma {
    type Parameters = GammaParameters;
    type ParameterError = GammaError;

    fn emit_params(&self) -> Self::Parameters {
        GammaParameters {
            alphas: self.alphas.clone(),
            betas: self.betas.clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, GammaError> {
        Gamma::new(params.alphas, params.betas)
    }
}

impl From<&Gamma> for String {
    fn from(gam: &Gamma) -> String {
        format!(
            "G(α: {}, β: {})",
            vec_to_string(gam.alphas.as_slice(), 5),
            vec_to_string(gam.betas.as_slice(), 5)
        )
    }
}

impl_display!(Gamma);

impl ExponentialFamily for Gamma {
    type Stat = GammaStat;
    type Error = GammaError;

    fn to_natural(&self) -> GammaStat {
        GammaStat {
            alphas: self.alphas.add_scalar(-1.0),
            betas: self.betas.clone(),
        }
    }

    fn from_natural(&self, nat: &GammaStat) -> Result<Self, GammaError> {
        Gamma::new(nat.alphas.add_scalar(1.0), nat.betas.clone())
    }

    fn log_partition(&self) -> f64 {
        self.alphas
            .iter()
            .zip(self.betas.iter())
            .map(|(&a, &b)| a.ln_gamma().0 - a * b.ln())
            .sum()
    }

    fn log_base(&self) -> f64 {
        0.0
    }

    fn expected_statistics(&self) -> GammaStat {
        GammaStat {
            alphas: self.expected_ln_lmbdas(),
            betas: -self.expected_lmbdas(),
        }
    }
}

impl HasDensity<DVector<f64>> for Gamma {
    fn ln_f(&self, x: &DVector<f64>) -> f64 {
        if x.iter().any(|&xi| xi <= 0.0) {
            return f64::NEG_INFINITY;
        }
        let nat = self.to_natural();
        x.iter()
            .zip(nat.alphas.iter().zip(nat.betas.iter()))
            .map(|(xi, (a1, b))| a1 * xi.ln() - b * xi)
            .sum::<f64>()
            - self.log_partition()
    }
}

impl Sampleable<DVector<f64>> for Gamma {
    fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        self.alphas.zip_map(&self.betas, |a, b| {
            let g = RGamma::new(a, 1.0 / b).unwrap();
            rng.sample(g)
        })
    }
}

impl Mean<DVector<f64>> for Gamma {
    fn mean(&self) -> Option<DVector<f64>> {
        Some(self.expected_lmbdas())
    }
}

impl Mode<DVector<f64>> for Gamma {
    fn mode(&self) -> Option<DVector<f64>> {
        if self.alphas.iter().all(|&a| a >= 1.0) {
            Some(self.alphas.add_scalar(-1.0).component_div(&self.betas))
        } else {
            None
        }
    }
}

impl Variance<DVector<f64>> for Gamma {
    fn variance(&self) -> Option<DVector<f64>> {
        Some(self.alphas.zip_map(&self.betas, |a, b| a / (b * b)))
    }
}

impl std::error::Error for GammaError {}

impl fmt::Display for GammaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "shape vector is empty"),
            Self::DimensionMismatch { n_alphas, n_betas } => write!(
                f,
                "{} shapes given with {} rates",
                n_alphas, n_betas
            ),
            Self::ShapeTooLow { ix, shape } => {
                write!(f, "shape ({}) at index {} must be greater than zero", shape, ix)
            }
            Self::ShapeNotFinite { ix, shape } => {
                write!(f, "non-finite shape at index {}: {}", ix, shape)
            }
            Self::RateTooLow { ix, rate } => {
                write!(f, "rate ({}) at index {} must be greater than zero", rate, ix)
            }
            Self::RateNotFinite { ix, rate } => {
                write!(f, "non-finite rate at index {}: {}", ix, rate)
            }
        }
    }
}
