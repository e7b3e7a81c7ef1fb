//! Trait definitions
use crate::data::Observation;
use crate::dist::Categorical;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::fmt;

/// A distribution that can be represented by a plain parameter struct
pub trait Parameterized: Sized {
    type Parameters;
    type ParameterError;

    fn emit_params(&self) -> Self::Parameters;

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, Self::ParameterError>;
}

/// Log density (pdf/pmf) of a distribution over `X`
pub trait HasDensity<X> {
    /// Probability function
    fn f(&self, x: &X) -> f64 {
        self.ln_f(x).exp()
    }

    /// Log probability function
    fn ln_f(&self, x: &X) -> f64;
}

/// A distribution we can draw values of type `X` from
pub trait Sampleable<X> {
    /// Single draw from the `Rv`
    fn draw<R: Rng>(&self, rng: &mut R) -> X;

    /// A draw that reports numerical failure instead of panicking, for
    /// families whose draws can come out not positive definite
    fn try_draw<R: Rng>(&self, rng: &mut R) -> crate::error::Result<X> {
        Ok(self.draw(rng))
    }

    /// Multiple draws of the `Rv`
    fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<X> {
        (0..n).map(|_| self.draw(rng)).collect()
    }
}

pub trait Mean<M> {
    fn mean(&self) -> Option<M>;
}

pub trait Mode<M> {
    fn mode(&self) -> Option<M>;
}

pub trait Variance<V> {
    fn variance(&self) -> Option<V>;
}

/// A fixed-shape tuple of scalars, vectors and matrices
///
/// The same tuple type carries natural parameters, sufficient statistics of
/// data, and expected sufficient statistics, so conjugate updates reduce to
/// the vector-space operations below.
pub trait Statistics: Clone + fmt::Debug + Send + Sync {
    /// Sum of the elementwise products of every slot
    fn dot(&self, other: &Self) -> f64;

    /// `self += a * x`
    fn axpy(&mut self, a: f64, x: &Self);

    /// `self *= a`
    fn scale(&mut self, a: f64);

    /// A tuple of zeros with the shape of `self`
    fn zeros_like(&self) -> Self;
}

/// An exponential-family distribution
///
/// The density has the form
/// *p(θ) = exp(⟨η, T(θ)⟩ − A(η) + ln h)* where *η* are the natural
/// parameters, *T* the sufficient statistics, *A* the log partition and
/// *ln h* a constant log base measure. Implementors store only their
/// standard parameters; natural parameters are computed on demand.
pub trait ExponentialFamily: Sized + Clone {
    /// Natural parameter / sufficient statistic tuple
    type Stat: Statistics;
    /// Error raised when natural parameters leave the valid domain
    type Error: std::error::Error + Into<crate::Error>;

    /// The natural parameters, η
    fn to_natural(&self) -> Self::Stat;

    /// Build a distribution from natural parameters
    ///
    /// `self` only supplies structural settings that are not parameters
    /// (e.g. whether a regression carries a bias column). The result has the
    /// same shape as `self`.
    fn from_natural(&self, nat: &Self::Stat) -> Result<Self, Self::Error>;

    /// The log partition function, A(η)
    fn log_partition(&self) -> f64;

    /// The constant log base measure, ln h
    fn log_base(&self) -> f64;

    /// E[T(θ)] under this distribution
    fn expected_statistics(&self) -> Self::Stat;

    /// Differential entropy
    fn entropy(&self) -> f64 {
        self.log_partition()
            - self.log_base()
            - self.to_natural().dot(&self.expected_statistics())
    }

    /// Cross entropy H(self, other) = −E<sub>self</sub>[ln other]
    fn cross_entropy(&self, other: &Self) -> f64 {
        other.log_partition()
            - other.log_base()
            - other.to_natural().dot(&self.expected_statistics())
    }

    /// KL(self ‖ other)
    fn kl(&self, other: &Self) -> f64 {
        self.cross_entropy(other) - self.entropy()
    }
}

/// An exponential family that is conjugate to a likelihood on `Datum`
pub trait ConjugatePrior: ExponentialFamily {
    /// The type of a single observation
    type Datum;
    /// The likelihood whose parameters this family is a distribution over
    type Likelihood: HasDensity<Self::Datum> + Clone + fmt::Debug + Send + Sync;

    /// The conjugate update η<sub>post</sub> = η + stat
    fn posterior(&self, stat: &Self::Stat) -> Result<Self, Self::Error> {
        let mut nat = self.to_natural();
        nat.axpy(1.0, stat);
        self.from_natural(&nat)
    }
}

/// A conjugate prior whose sufficient statistics are built from individual
/// (possibly weighted) observations
pub trait ConjugateModel: ConjugatePrior {
    /// Zero statistics of the right shape
    fn empty_suffstat(&self) -> Self::Stat;

    /// Add `weight` times the statistics of `x` to `stat`
    fn observe(&self, stat: &mut Self::Stat, x: &Self::Datum, weight: f64);

    /// Weighted sufficient statistics of `data`
    fn suffstat<'a, I>(&self, data: I) -> Self::Stat
    where
        I: IntoIterator<Item = (&'a Self::Datum, f64)>,
        Self::Datum: 'a,
    {
        let mut stat = self.empty_suffstat();
        for (x, w) in data {
            if w != 0.0 {
                self.observe(&mut stat, x, w);
            }
        }
        stat
    }

    /// The constant log base measure of the likelihood
    fn likelihood_log_base(&self) -> f64;

    /// E[ln p(x | θ)] under this distribution over θ for each `x` in `xs`
    fn expected_log_likelihood(&self, xs: &[Self::Datum]) -> Vec<f64>;

    /// E[ln p(x | θ)] through the statistics identity
    /// ln h + ⟨E[T(θ)], t(x)⟩. Slow, but exact.
    fn expected_log_likelihood_by_statistics(&self, x: &Self::Datum) -> f64 {
        let mut stat = self.empty_suffstat();
        self.observe(&mut stat, x, 1.0);
        self.likelihood_log_base() + self.expected_statistics().dot(&stat)
    }

    /// Check that `x` has the dimensions this family expects
    fn check_datum(&self, x: &Self::Datum) -> Result<(), crate::Error>;
}

/// A prior on categorical mixing weights
pub trait GatingPrior:
    ConjugatePrior<Datum = usize, Likelihood = Categorical>
{
    /// Number of components
    fn k(&self) -> usize;

    /// Sufficient statistics of (possibly fractional) label counts
    fn count_suffstat(&self, counts: &[f64]) -> Self::Stat;

    /// E[ln π<sub>k</sub>] for each component
    fn expected_ln_weights(&self) -> Vec<f64>;

    /// E[π<sub>k</sub>] for each component
    fn mean_weights(&self) -> Vec<f64>;
}

/// A predictive density with moment-matched summaries
pub trait Predictive: HasDensity<DVector<f64>> {
    /// Location of the predictive
    fn location(&self) -> DVector<f64>;

    /// Covariance of a moment-matched Gaussian
    fn moment_covariance(&self) -> DMatrix<f64>;
}

/// A prior over Gaussian parameters with a closed-form posterior predictive
pub trait BasisPredictive: ConjugateModel<Datum = DVector<f64>> {
    type Predictive: Predictive;

    /// p(x | data) with the parameters integrated out
    fn posterior_predictive(&self) -> Result<Self::Predictive, crate::Error>;
}

/// A prior over linear-Gaussian parameters with a closed-form posterior
/// predictive
pub trait RegressionPredictive: ConjugateModel<Datum = Observation> {
    type Predictive: Predictive;

    /// p(y | x, data) with the parameters integrated out
    fn posterior_predictive_at(
        &self,
        input: &DVector<f64>,
    ) -> Result<Self::Predictive, crate::Error>;
}
