//! Probability distributions
//!
//! Conjugate priors, the likelihoods they are conjugate to, and their
//! closed-form posterior predictives.
mod categorical;
mod dirichlet;
mod gamma;
mod gaussian;
mod linear_gaussian;
mod matrix_normal_gamma;
mod matrix_normal_wishart;
mod normal_gamma;
mod normal_wishart;
mod stick_breaking;
mod students_t;
mod tied_normal_wisharts;
mod wishart;

pub use categorical::{Categorical, CategoricalError, CategoricalParameters};
pub use dirichlet::{
    Dirichlet, DirichletError, DirichletParameters, DirichletStat,
};
pub use gamma::{Gamma, GammaError, GammaParameters, GammaStat};
pub use gaussian::{
    DiagonalGaussianStat, GaussianError, GaussianStat,
    GaussianWithDiagonalPrecision, GaussianWithDiagonalPrecisionParameters,
    GaussianWithPrecision, GaussianWithPrecisionParameters,
};
pub use linear_gaussian::{
    LinearGaussianError, LinearGaussianParameters,
    LinearGaussianWithDiagonalPrecision, LinearGaussianWithPrecision,
};
pub use matrix_normal_gamma::{
    MatrixNormalGamma, MatrixNormalGammaError, MatrixNormalGammaParameters,
    MatrixNormalGammaStat,
};
pub use matrix_normal_wishart::{
    MatrixNormalWishart, MatrixNormalWishartError,
    MatrixNormalWishartParameters, MatrixNormalWishartStat,
};
pub use normal_gamma::{
    NormalGamma, NormalGammaError, NormalGammaParameters, NormalGammaStat,
};
pub use normal_wishart::{
    NormalWishart, NormalWishartError, NormalWishartParameters,
    NormalWishartStat,
};
pub use stick_breaking::{
    StickBreaking, StickBreakingError, StickBreakingParameters,
    StickBreakingStat,
};
pub use students_t::{
    DiagonalStudentT, MvStudentT, MvStudentTParameters, StudentTError,
};
pub use tied_normal_wisharts::{
    TiedGaussians, TiedNormalWisharts, TiedNormalWishartsError,
    TiedNormalWishartsParameters, TiedNormalWishartsStat,
};
pub use wishart::{Wishart, WishartError, WishartParameters, WishartStat};
