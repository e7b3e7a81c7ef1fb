//! Truncated stick-breaking prior over mixing weights
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::dist::Categorical;
use crate::impl_display;
use crate::misc::vec_to_string;
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::DVector;
use rand::Rng;
use rand_distr::Beta as RBeta;
use special::Gamma as _;
use std::fmt;

/// Truncated [stick-breaking](https://en.wikipedia.org/wiki/Dirichlet_process#The_stick-breaking_process)
/// distribution with independent stick fractions v<sub>k</sub> ~
/// Beta(γ<sub>k</sub>, δ<sub>k</sub>) and weights
/// π<sub>k</sub> = v<sub>k</sub> Π<sub>j<k</sub>(1 − v<sub>j</sub>).
///
/// The truncation level K is a hard cap on the number of components. Mass
/// left on the stick after the K-th break is not assigned to any component.
///
/// # Example
///
/// ```
/// use dpmoe::prelude::*;
///
/// let sb = StickBreaking::dirichlet_process(10, 1.0).unwrap();
/// let w = sb.mean_weights();
///
/// // Under a DP(1) every break takes half of what is left
/// assert!((w[0] - 0.5).abs() < 1e-12);
/// assert!((w[1] - 0.25).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct StickBreaking {
    gammas: DVector<f64>,
    deltas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct StickBreakingParameters {
    pub gammas: DVector<f64>,
    pub deltas: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum StickBreakingError {
    /// The truncation level is zero
    KIsZero,
    /// γ and δ have different lengths
    DimensionMismatch { n_gammas: usize, n_deltas: usize },
    /// A γ is non-positive or non-finite
    InvalidGamma { ix: usize, gamma: f64 },
    /// A δ is non-positive or non-finite
    InvalidDelta { ix: usize, delta: f64 },
}

/// | slot     | statistic    | natural parameter |
/// |----------|--------------|-------------------|
/// | `gammas` | ln v         | γ − 1             |
/// | `deltas` | ln (1 − v)   | δ − 1             |
#[derive(Debug, Clone, PartialEq)]
pub struct StickBreakingStat {
    pub gammas: DVector<f64>,
    pub deltas: DVector<f64>,
}

impl_statistics!(StickBreakingStat { gammas, deltas });

impl StickBreaking {
    pub fn new(
        gammas: DVector<f64>,
        deltas: DVector<f64>,
    ) -> Result<Self, StickBreakingError> {
        if gammas.is_empty() {
            return Err(StickBreakingError::KIsZero);
        }
        if gammas.len() != deltas.len() {
            return Err(StickBreakingError::DimensionMismatch {
                n_gammas: gammas.len(),
                n_deltas: deltas.len(),
            });
        }
        let invalid = |x: f64| x <= 0.0 || !x.is_finite();
        if let Some((ix, &gamma)) =
            gammas.iter().enumerate().find(|&(_, &g)| invalid(g))
        {
            return Err(StickBreakingError::InvalidGamma { ix, gamma });
        }
        if let Some((ix, &delta)) =
            deltas.iter().enumerate().find(|&(_, &d)| invalid(d))
        {
            return Err(StickBreakingError::InvalidDelta { ix, delta });
        }
        Ok(StickBreaking { gammas, deltas })
    }

    /// The K-truncated stick-breaking construction of a Dirichlet process
    /// with concentration `alpha`, v<sub>k</sub> ~ Beta(1, α)
    pub fn dirichlet_process(
        k: usize,
        alpha: f64,
    ) -> Result<Self, StickBreakingError> {
        StickBreaking::new(DVector::from_element(k, 1.0), DVector::from_element(k, alpha))
    }

    /// The truncation level
    #[inline]
    pub fn k(&self) -> usize {
        self.gammas.len()
    }

    #[inline]
    pub fn gammas(&self) -> &DVector<f64> {
        &self.gammas
    }

    #[inline]
    pub fn deltas(&self) -> &DVector<f64> {
        &self.deltas
    }

    /// (E[ln v<sub>k</sub>], E[ln(1 − v<sub>k</sub>)]) for every stick
    fn expected_ln_sticks(&self) -> (Vec<f64>, Vec<f64>) {
        self.gammas
            .iter()
            .zip(self.deltas.iter())
            .map(|(&g, &d)| {
                let dg_sum = (g + d).digamma();
                (g.digamma() - dg_sum, d.digamma() - dg_sum)
            })
            .unzip()
    }
}

impl Parameterized for StickBreaking {
    type Parameters = StickBreakingParameters;
    type ParameterError = StickBreakingError;

    fn emit_params(&self) -> Self::Parameters {
        StickBreakingParameters {
            gammas: self.gammas.clone(),
            deltas: self.deltas.clone(),
        }
    }

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, StickBreakingError> {
        StickBreaking::new(params.gammas, params.deltas)
    }
}

impl From<&StickBreaking> for String {
    fn from(sb: &StickBreaking) -> String {
        format!(
            "SB(γ: {}, δ: {})",
            vec_to_string(sb.gammas.as_slice(), 5),
            vec_to_string(sb.deltas.as_slice(), 5)
        )
    }
}

impl_display!(StickBreaking);

impl ExponentialFamily for StickBreaking {
    type Stat = StickBreakingStat;
    type Error = StickBreakingError;

    fn to_natural(&self) -> StickBreakingStat {
        StickBreakingStat {
            gammas: self.gammas.add_scalar(-1.0),
            deltas: self.deltas.add_scalar(-1.0),
        }
    }

    fn from_natural(
        &self,
        nat: &StickBreakingStat,
    ) -> Result<Self, StickBreakingError> {
        StickBreaking::new(nat.gammas.add_scalar(1.0), nat.deltas.add_scalar(1.0))
    }

    fn log_partition(&self) -> f64 {
        self.gammas
            .iter()
            .zip(self.deltas.iter())
            .map(|(&g, &d)| g.ln_gamma().0 + d.ln_gamma().0 - (g + d).ln_gamma().0)
            .sum()
    }

    fn log_base(&self) -> f64 {
        0.0
    }

    fn expected_statistics(&self) -> StickBreakingStat {
        let (ln_v, ln_1mv) = self.expected_ln_sticks();
        StickBreakingStat {
            gammas: DVector::from_vec(ln_v),
            deltas: DVector::from_vec(ln_1mv),
        }
    }
}

impl ConjugatePrior for StickBreaking {
    type Datum = usize;
    type Likelihood = Categorical;
}

impl GatingPrior for StickBreaking {
    fn k(&self) -> usize {
        self.gammas.len()
    }

    /// [n<sub>k</sub>, Σ<sub>j>k</sub> n<sub>j</sub>]
    fn count_suffstat(&self, counts: &[f64]) -> StickBreakingStat {
        let k = counts.len();
        let mut tail = vec![0.0; k];
        for ix in (0..k.saturating_sub(1)).rev() {
            tail[ix] = tail[ix + 1] + counts[ix + 1];
        }
        StickBreakingStat {
            gammas: DVector::from_column_slice(counts),
            deltas: DVector::from_vec(tail),
        }
    }

    /// E[ln π<sub>k</sub>] = E[ln v<sub>k</sub>] + Σ<sub>j<k</sub> E[ln(1 − v<sub>j</sub>)]
    fn expected_ln_weights(&self) -> Vec<f64> {
        let (ln_v, ln_1mv) = self.expected_ln_sticks();
        let mut acc = 0.0;
        ln_v.iter()
            .zip(ln_1mv.iter())
            .map(|(lv, l1mv)| {
                let ln_w = lv + acc;
                acc += l1mv;
                ln_w
            })
            .collect()
    }

    fn mean_weights(&self) -> Vec<f64> {
        let mut rest = 1.0;
        self.gammas
            .iter()
            .zip(self.deltas.iter())
            .map(|(&g, &d)| {
                let ev = g / (g + d);
                let w = ev * rest;
                rest *= 1.0 - ev;
                w
            })
            .collect()
    }
}

impl HasDensity<DVector<f64>> for StickBreaking {
    /// Density of the stick fractions v
    fn ln_f(&self, v: &DVector<f64>) -> f64 {
        if v.len() != self.k() || v.iter().any(|&vi| vi <= 0.0 || vi >= 1.0) {
            return f64::NEG_INFINITY;
        }
        let nat = self.to_natural();
        v.iter()
            .zip(nat.gammas.iter().zip(nat.deltas.iter()))
            .map(|(vi, (g1, d1))| g1 * vi.ln() + d1 * (1.0 - vi).ln())
            .sum::<f64>()
            - self.log_partition()
    }
}

impl Sampleable<DVector<f64>> for StickBreaking {
    /// Draw stick fractions
    fn draw<R: Rng>(&self, rng: &mut R) -> DVector<f64> {
        self.gammas.zip_map(&self.deltas, |g, d| {
            let beta = RBeta::new(g, d).unwrap();
            rng.sample(beta)
        })
    }
}

impl Sampleable<Categorical> for StickBreaking {
    fn draw<R: Rng>(&self, rng: &mut R) -> Categorical {
        let v: DVector<f64> = self.draw(rng);
        let mut ln_rest = 0.0;
        let ln_weights = v
            .iter()
            .map(|vi| {
                let ln_w = vi.ln() + ln_rest;
                ln_rest += (-vi).ln_1p();
                ln_w
            })
            .collect();
        // leftover mass is dropped, so the weights are renormalized
        Categorical::from_unnormed_ln_weights(ln_weights)
            .unwrap_or_else(|_| Categorical::uniform(self.k()))
    }
}

impl std::error::Error for StickBreakingError {}

impl fmt::Display for StickBreakingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KIsZero => write!(f, "k must be greater than zero"),
            Self::DimensionMismatch { n_gammas, n_deltas } => write!(
                f,
                "{} gammas given with {} deltas",
                n_gammas, n_deltas
            ),
            Self::InvalidGamma { ix, gamma } => write!(
                f,
                "gamma at index {} must be positive and finite, got {}",
                ix, gamma
            ),
            Self::InvalidDelta { ix, delta } => write!(
                f,
                "delta at index {} must be positive and finite, got {}",
                ix, delta
            ),
        }
    }
}
