//! Re-imports for convenience
#[doc(no_inline)]
pub use crate::data::{AffineTransform, Observation, TransformKind};
#[doc(no_inline)]
pub use crate::dist::*;
#[doc(no_inline)]
pub use crate::error::{Error, Result};
#[doc(no_inline)]
pub use crate::mixture::jobs::{
    run_jobs, Job, MeanfieldSchedule, Schedule, StochasticSchedule,
};
#[doc(no_inline)]
pub use crate::mixture::{
    Component, Expert, Mixture, MixtureOfDiagonalGaussians,
    MixtureOfDiagonalLinearGaussians, MixtureOfGaussians,
    MixtureOfLinearGaussians, PredictionKind, PredictiveMoments, TiedMixture,
};
#[doc(no_inline)]
pub use crate::model::Bayesian;
#[doc(no_inline)]
pub use crate::traits::*;
