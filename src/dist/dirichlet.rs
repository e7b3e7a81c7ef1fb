//! Dirichlet distribution over mixing weights
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::dist::Categorical;
use crate::impl_display;
use crate::misc::vec_to_string;
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::DVector;
use rand::Rng;
use rand_distr::Gamma as RGamma;
use special::Gamma as _;
use std::fmt;

/// [Dirichlet distribution](https://en.wikipedia.org/wiki/Dirichlet_distribution)
/// over points on the k-simplex.
///
/// As a gating prior, the Dirichlet is the finite, exchangeable
/// alternative to [`StickBreaking`](crate::dist::StickBreaking).
///
/// # Example
///
/// ```
/// use dpmoe::prelude::*;
///
/// let dir = Dirichlet::new(vec![1.0, 2.0, 1.0]).unwrap();
/// assert_eq!(dir.mean_weights(), vec![0.25, 0.5, 0.25]);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Dirichlet {
    alphas: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct DirichletParameters {
    pub alphas: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum DirichletError {
    /// k parameter is zero
    KIsZero,
    /// alpha parameter(s) is less than or equal to zero
    AlphaTooLow { ix: usize, alpha: f64 },
    /// alpha parameter(s) is infinite or NaN
    AlphaNotFinite { ix: usize, alpha: f64 },
}

/// | slot     | statistic | natural parameter |
/// |----------|-----------|-------------------|
/// | `alphas` | ln π      | α − 1             |
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletStat {
    pub alphas: DVector<f64>,
}

impl_statistics!(DirichletStat { alphas });

impl Dirichlet {
    /// Creates a `Dirichlet` with a given `alphas` vector
    pub fn new(alphas: Vec<f64>) -> Result<Self, DirichletError> {
        if alphas.is_empty() {
            return Err(DirichletError::KIsZero);
        }

        alphas.iter().enumerate().try_for_each(|(ix, &alpha)| {
            if !alpha.is_finite() {
                Err(DirichletError::AlphaNotFinite { ix, alpha })
            } else if alpha <= 0.0 {
                Err(DirichletError::AlphaTooLow { ix, alpha })
            } else {
                Ok(())
            }
        })?;

        Ok(Dirichlet { alphas })
    }

    /// Creates a new Dirichlet without checking whether the parameters are
    /// valid.
    #[inline]
    pub fn new_unchecked(alphas: Vec<f64>) -> Self {
        Dirichlet { alphas }
    }

    /// Creates a `Dirichlet` where all alphas are identical.
    ///
    /// # Example
    ///
    /// ```
    /// # use dpmoe::dist::Dirichlet;
    /// let dir = Dirichlet::symmetric(1.5, 4).unwrap();
    /// assert_eq!(*dir.alphas(), vec![1.5, 1.5, 1.5, 1.5]);
    /// ```
    pub fn symmetric(alpha: f64, k: usize) -> Result<Self, DirichletError> {
        Dirichlet::new(vec![alpha; k])
    }

    /// The number of elements in the `Dirichlet`
    #[inline]
    pub fn k(&self) -> usize {
        self.alphas.len()
    }

    /// A reference to the alphas
    #[inline]
    pub fn alphas(&self) -> &Vec<f64> {
        &self.alphas
    }
}

impl Parameterized for Dirichlet {
    type Parameters = DirichletParameters;
    type ParameterError = DirichletError;

    fn emit_params(&self) -> Self::Parameters {
        DirichletParameters {
            alphas: self.alphas.clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, DirichletError> {
        Dirichlet::new(params.alphas)
    }
}

impl From<&Dirichlet> for String {
    fn from(dir: &Dirichlet) -> String {
        format!("Dir(α: {})", vec_to_string(&dir.alphas, 5))
    }
}

impl_display!(Dirichlet);

impl ExponentialFamily for Dirichlet {
    type Stat = DirichletStat;
    type Error = DirichletError;

    fn to_natural(&self) -> DirichletStat {
        DirichletStat {
            alphas: DVector::from_iterator(
                self.k(),
                self.alphas.iter().map(|a| a - 1.0),
            ),
        }
    }

    fn from_natural(&self, nat: &DirichletStat) -> Result<Self, DirichletError> {
        Dirichlet::new(nat.alphas.iter().map(|a| a + 1.0).collect())
    }

    fn log_partition(&self) -> f64 {
        let sum_alpha: f64 = self.alphas.iter().sum();
        self.alphas.iter().map(|a| a.ln_gamma().0).sum::<f64>()
            - sum_alpha.ln_gamma().0
    }

    fn log_base(&self) -> f64 {
        0.0
    }

    fn expected_statistics(&self) -> DirichletStat {
        DirichletStat {
            alphas: DVector::from_vec(self.expected_ln_weights()),
        }
    }
}

impl ConjugatePrior for Dirichlet {
    type Datum = usize;
    type Likelihood = Categorical;
}

impl GatingPrior for Dirichlet {
    fn k(&self) -> usize {
        self.alphas.len()
    }

    fn count_suffstat(&self, counts: &[f64]) -> DirichletStat {
        DirichletStat {
            alphas: DVector::from_column_slice(counts),
        }
    }

    /// E[ln π<sub>k</sub>] = ψ(α<sub>k</sub>) − ψ(Σα)
    fn expected_ln_weights(&self) -> Vec<f64> {
        let dg_sum = self.alphas.iter().sum::<f64>().digamma();
        self.alphas.iter().map(|a| a.digamma() - dg_sum).collect()
    }

    fn mean_weights(&self) -> Vec<f64> {
        let sum_alpha: f64 = self.alphas.iter().sum();
        self.alphas.iter().map(|a| a / sum_alpha).collect()
    }
}

impl HasDensity<Vec<f64>> for Dirichlet {
    fn ln_f(&self, x: &Vec<f64>) -> f64 {
        if x.len() != self.k() || x.iter().any(|&xi| xi <= 0.0) {
            return f64::NEG_INFINITY;
        }
        self.alphas
            .iter()
            .zip(x.iter())
            .map(|(a, xi)| (a - 1.0) * xi.ln())
            .sum::<f64>()
            - self.log_partition()
    }
}

impl Sampleable<Vec<f64>> for Dirichlet {
    fn draw<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        let ys: Vec<f64> = self
            .alphas
            .iter()
            .map(|&alpha| {
                let g = RGamma::new(alpha, 1.0).unwrap();
                rng.sample(g)
            })
            .collect();
        let z: f64 = ys.iter().sum();
        ys.iter().map(|y| y / z).collect()
    }
}

impl Sampleable<Categorical> for Dirichlet {
    fn draw<R: Rng>(&self, rng: &mut R) -> Categorical {
        let weights: Vec<f64> = self.draw(rng);
        Categorical::new_unchecked(weights.iter().map(|w| w.ln()).collect())
    }
}

impl Mean<Vec<f64>> for Dirichlet {
    fn mean(&self) -> Option<Vec<f64>> {
        Some(self.mean_weights())
    }
}

impl std::error::Error for DirichletError {}

impl fmt::Display for DirichletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KIsZero => write!(f, "k must be greater than zero"),
            Self::AlphaTooLow { ix, alpha } => write!(
                f,
                "Alpha at index {} must be greater than zero, got {}",
                ix, alpha
            ),
            Self::AlphaNotFinite { ix, alpha } => write!(
                f,
                "Alpha at index {} must be finite, got {}",
                ix, alpha
            ),
        }
    }
}
