//! Categorical distribution of x<sub>k</sub> in {0, 1, ..., k-1}
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::impl_display;
use crate::misc::{argmax, ln_pflip, logsumexp, vec_to_string};
use crate::traits::*;
use rand::Rng;
use std::fmt;

/// [Categorical distribution](https://en.wikipedia.org/wiki/Categorical_distribution)
/// over unordered values in [0, k).
///
/// This is the likelihood of a mixture label given the mixing weights.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct Categorical {
    // Use log weights instead to optimize for computation of ln_f
    ln_weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct CategoricalParameters {
    pub ln_weights: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum CategoricalError {
    /// One or more of the weights is infinite or NaN
    NonFiniteWeight { ix: usize, weight: f64 },
    /// One or more of the weights is less than zero
    NegativeWeight { ix: usize, weight: f64 },
    /// Every weight is zero
    ZeroMass,
    /// Weights has not entries
    EmptyWeights,
}

impl Categorical {
    /// Construct a new Categorical distribution from weights
    ///
    /// The weights must all be non-negative, but do not need to sum to 1
    /// because they will be normalized in the constructor.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dpmoe::traits::*;
    /// # use dpmoe::dist::Categorical;
    /// let cat = Categorical::new(&[4.0, 2.0, 3.0, 1.0]).unwrap();
    ///
    /// assert::close(cat.f(&0), 0.4, 1E-12);
    /// assert::close(cat.f(&3), 0.1, 1E-12);
    /// ```
    pub fn new(weights: &[f64]) -> Result<Self, CategoricalError> {
        if weights.is_empty() {
            return Err(CategoricalError::EmptyWeights);
        }

        weights.iter().enumerate().try_for_each(|(ix, &weight)| {
            if weight < 0.0 {
                Err(CategoricalError::NegativeWeight { ix, weight })
            } else if !weight.is_finite() {
                Err(CategoricalError::NonFiniteWeight { ix, weight })
            } else {
                Ok(())
            }
        })?;

        let ln_weights: Vec<f64> = weights.iter().map(|w| w.ln()).collect();
        Categorical::from_unnormed_ln_weights(ln_weights)
    }

    /// Build a Categorical from log weights that need not be normalized
    pub fn from_unnormed_ln_weights(
        ln_weights: Vec<f64>,
    ) -> Result<Self, CategoricalError> {
        if ln_weights.is_empty() {
            return Err(CategoricalError::EmptyWeights);
        }
        if let Some((ix, &weight)) = ln_weights
            .iter()
            .enumerate()
            .find(|&(_, &w)| w.is_nan() || w == f64::INFINITY)
        {
            return Err(CategoricalError::NonFiniteWeight { ix, weight });
        }
        let ln_norm = logsumexp(&ln_weights);
        if ln_norm == f64::NEG_INFINITY {
            return Err(CategoricalError::ZeroMass);
        }
        Ok(Categorical::new_unchecked(
            ln_weights.iter().map(|w| w - ln_norm).collect(),
        ))
    }

    /// Creates a new Categorical without checking whether the ln weights
    /// are valid.
    #[inline]
    pub fn new_unchecked(ln_weights: Vec<f64>) -> Self {
        Categorical { ln_weights }
    }

    /// Uniform weights over `k` categories
    pub fn uniform(k: usize) -> Self {
        let lnp = -(k as f64).ln();
        Categorical::new_unchecked(vec![lnp; k])
    }

    /// Return the weights (`exp(ln_weights)`)
    pub fn weights(&self) -> Vec<f64> {
        self.ln_weights.iter().map(|&w| w.exp()).collect()
    }

    /// Get the number of possible outcomes
    #[inline]
    pub fn k(&self) -> usize {
        self.ln_weights.len()
    }

    /// Get a reference to the normalized log weights
    #[inline]
    pub fn ln_weights(&self) -> &Vec<f64> {
        &self.ln_weights
    }
}

impl Parameterized for Categorical {
    type Parameters = CategoricalParameters;
    type ParameterError = CategoricalError;

    fn emit_params(&self) -> Self::Parameters {
        CategoricalParameters {
            ln_weights: self.ln_weights.clone(),
        }
    }

    fn from_params(params: Self::Parameters) -> Result<Self, CategoricalError> {
        Categorical::from_unnormed_ln_weights(params.ln_weights)
    }
}

impl From<&Categorical> for String {
    fn from(cat: &Categorical) -> String {
        format!("Categorical({}; {})", cat.k(), vec_to_string(&cat.weights(), 5))
    }
}

impl_display!(Categorical);

impl HasDensity<usize> for Categorical {
    fn ln_f(&self, x: &usize) -> f64 {
        self.ln_weights
            .get(*x)
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }
}

impl Sampleable<usize> for Categorical {
    fn draw<R: Rng>(&self, rng: &mut R) -> usize {
        ln_pflip(&self.ln_weights, 1, true, rng)[0]
    }

    fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<usize> {
        ln_pflip(&self.ln_weights, n, true, rng)
    }
}

impl Mode<usize> for Categorical {
    fn mode(&self) -> Option<usize> {
        argmax(&self.ln_weights)
    }
}

impl std::error::Error for CategoricalError {}

impl fmt::Display for CategoricalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteWeight { ix, weight } => {
                write!(f, "non-finite weight ({}) at index {}", weight, ix)
            }
            Self::NegativeWeight { ix, weight } => {
                write!(f, "negative weight ({}) at index {}", weight, ix)
            }
            Self::ZeroMass => write!(f, "all weights are zero"),
            Self::EmptyWeights => write!(f, "empty weights"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_basic_impls;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const TOL: f64 = 1E-12;

    test_basic_impls!(Categorical::uniform(3));

    #[test]
    fn ln_weights_are_normalized() {
        let cat =
            Categorical::from_unnormed_ln_weights(vec![0.0, 1.0, 2.0]).unwrap();
        let total: f64 = cat.weights().iter().sum();
        assert::close(total, 1.0, TOL);
    }

    #[test]
    fn out_of_range_outcome_has_no_mass() {
        let cat = Categorical::uniform(2);
        assert_eq!(cat.ln_f(&2), f64::NEG_INFINITY);
        assert::close(cat.f(&1), 0.5, TOL);
    }

    #[test]
    fn zero_weight_category_is_never_drawn() {
        let mut rng = SmallRng::seed_from_u64(7);
        let cat = Categorical::new(&[1.0, 0.0, 3.0]).unwrap();
        let xs = cat.sample(1000, &mut rng);
        assert!(xs.iter().all(|&x| x != 1));
        assert_eq!(cat.mode(), Some(2));
    }

    #[test]
    fn bad_weights_are_rejected() {
        assert_eq!(Categorical::new(&[]), Err(CategoricalError::EmptyWeights));
        assert_eq!(
            Categorical::new(&[0.0, 0.0]),
            Err(CategoricalError::ZeroMass)
        );
        assert!(matches!(
            Categorical::new(&[1.0, -1.0]),
            Err(CategoricalError::NegativeWeight { ix: 1, .. })
        ));
    }
}
