//! Crate-level error type
use crate::dist::{
    CategoricalError, DirichletError, GammaError, GaussianError,
    LinearGaussianError, MatrixNormalGammaError, MatrixNormalWishartError,
    NormalGammaError, NormalWishartError, StickBreakingError, StudentTError,
    TiedNormalWishartsError, WishartError,
};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by models, mixtures and fitting routines
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An operation that needs data was given none
    NoData,
    /// An argument has the wrong dimensions
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A matrix that must be positive definite is not
    NotPositiveDefinite { what: &'static str },
    /// A computation produced a degenerate result (singular covariance,
    /// zero normalizer, non-finite bound, ...)
    Degenerate { what: &'static str },
    Wishart(WishartError),
    Gamma(GammaError),
    Gaussian(GaussianError),
    LinearGaussian(LinearGaussianError),
    NormalWishart(NormalWishartError),
    NormalGamma(NormalGammaError),
    MatrixNormalWishart(MatrixNormalWishartError),
    MatrixNormalGamma(MatrixNormalGammaError),
    TiedNormalWisharts(TiedNormalWishartsError),
    Dirichlet(DirichletError),
    StickBreaking(StickBreakingError),
    Categorical(CategoricalError),
    StudentT(StudentTError),
}

macro_rules! impl_from_dist_error {
    ($($err: ident => $variant: ident),+ $(,)?) => {
        $(
            impl From<$err> for Error {
                fn from(err: $err) -> Self {
                    Error::$variant(err)
                }
            }
        )+
    };
}

impl_from_dist_error!(
    WishartError => Wishart,
    GammaError => Gamma,
    GaussianError => Gaussian,
    LinearGaussianError => LinearGaussian,
    NormalWishartError => NormalWishart,
    NormalGammaError => NormalGamma,
    MatrixNormalWishartError => MatrixNormalWishart,
    MatrixNormalGammaError => MatrixNormalGamma,
    TiedNormalWishartsError => TiedNormalWisharts,
    DirichletError => Dirichlet,
    StickBreakingError => StickBreaking,
    CategoricalError => Categorical,
    StudentTError => StudentT,
);

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wishart(err) => Some(err),
            Self::Gamma(err) => Some(err),
            Self::Gaussian(err) => Some(err),
            Self::LinearGaussian(err) => Some(err),
            Self::NormalWishart(err) => Some(err),
            Self::NormalGamma(err) => Some(err),
            Self::MatrixNormalWishart(err) => Some(err),
            Self::MatrixNormalGamma(err) => Some(err),
            Self::TiedNormalWisharts(err) => Some(err),
            Self::Dirichlet(err) => Some(err),
            Self::StickBreaking(err) => Some(err),
            Self::Categorical(err) => Some(err),
            Self::StudentT(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no data"),
            Self::DimensionMismatch {
                what,
                expected,
                found,
            } => write!(
                f,
                "{}: expected dimension {}, found {}",
                what, expected, found
            ),
            Self::NotPositiveDefinite { what } => {
                write!(f, "{} is not positive definite", what)
            }
            Self::Degenerate { what } => write!(f, "degenerate: {}", what),
            Self::Wishart(err) => write!(f, "Wishart: {}", err),
            Self::Gamma(err) => write!(f, "Gamma: {}", err),
            Self::Gaussian(err) => write!(f, "Gaussian: {}", err),
            Self::LinearGaussian(err) => write!(f, "linear Gaussian: {}", err),
            Self::NormalWishart(err) => write!(f, "normal-Wishart: {}", err),
            Self::NormalGamma(err) => write!(f, "normal-Gamma: {}", err),
            Self::MatrixNormalWishart(err) => {
                write!(f, "matrix-normal-Wishart: {}", err)
            }
            Self::MatrixNormalGamma(err) => {
                write!(f, "matrix-normal-Gamma: {}", err)
            }
            Self::TiedNormalWisharts(err) => {
                write!(f, "tied normal-Wisharts: {}", err)
            }
            Self::Dirichlet(err) => write!(f, "Dirichlet: {}", err),
            Self::StickBreaking(err) => write!(f, "stick-breaking: {}", err),
            Self::Categorical(err) => write!(f, "Categorical: {}", err),
            Self::StudentT(err) => write!(f, "Student's t: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn distribution_errors_convert_and_keep_their_source() {
        let err: Error = WishartError::ScaleNotPositiveDefinite.into();
        assert_eq!(err, Error::Wishart(WishartError::ScaleNotPositiveDefinite));
        assert!(err.source().is_some());
        assert!(Error::NoData.source().is_none());
    }

    #[test]
    fn display_names_the_problem() {
        let err = Error::DimensionMismatch {
            what: "input",
            expected: 2,
            found: 3,
        };
        assert_eq!(err.to_string(), "input: expected dimension 2, found 3");
    }
}
