//! Matrix-normal-Wishart prior over linear-Gaussian regressions
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::data::Observation;
use crate::dist::{
    LinearGaussianWithPrecision, MvStudentT, Wishart, WishartError,
};
use crate::error::Error;
use crate::impl_display;
use crate::misc::{chol_ln_det, cholesky, invpd, quad_form, solve_lower_transpose_mat};
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::{Cholesky, DMatrix, Dyn};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

/// Matrix-normal-Wishart, the conjugate prior of
/// [`LinearGaussianWithPrecision`]:
///
/// Λ ~ W(ψ, ν),  A | Λ ~ MN(M, Λ⁻¹, K⁻¹)
///
/// where A is the `drow × dcol` coefficient matrix and K the column
/// precision. With `affine` set, the last column of A is the bias.
///
/// # Example
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use dpmoe::prelude::*;
///
/// let mnw = MatrixNormalWishart::new(
///     DMatrix::zeros(1, 2),
///     DMatrix::identity(2, 2) * 0.01,
///     DMatrix::identity(1, 1),
///     3.0,
///     true,
/// ).unwrap();
///
/// // y = 2x − 1
/// let data: Vec<Observation> = (0..20)
///     .map(|i| {
///         let x = i as f64 / 10.0;
///         Observation::new(DVector::from_element(1, 2.0 * x - 1.0), DVector::from_element(1, x))
///     })
///     .collect();
///
/// let post = mnw.posterior(&mnw.suffstat(data.iter().map(|o| (o, 1.0)))).unwrap();
/// assert!((post.m()[(0, 0)] - 2.0).abs() < 1e-2);
/// assert!((post.m()[(0, 1)] + 1.0).abs() < 1e-2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde1",
    serde(try_from = "MatrixNormalWishartParameters")
)]
#[cfg_attr(feature = "serde1", serde(into = "MatrixNormalWishartParameters"))]
pub struct MatrixNormalWishart {
    m: DMatrix<f64>,
    k: DMatrix<f64>,
    k_chol: Cholesky<f64, Dyn>,
    wishart: Wishart,
    affine: bool,
}

impl PartialEq for MatrixNormalWishart {
    fn eq(&self, other: &MatrixNormalWishart) -> bool {
        self.m == other.m
            && self.k == other.k
            && self.wishart == other.wishart
            && self.affine == other.affine
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct MatrixNormalWishartParameters {
    pub m: DMatrix<f64>,
    pub k: DMatrix<f64>,
    pub psi: DMatrix<f64>,
    pub nu: f64,
    pub affine: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum MatrixNormalWishartError {
    /// The mean matrix has a non-finite entry
    MNotFinite,
    /// M, K and ψ have incompatible shapes
    DimensionMismatch {
        m_shape: (usize, usize),
        n_k: usize,
        n_psi: usize,
    },
    /// An affine model without a bias column
    NoBiasColumn,
    /// The column precision K is not positive definite
    KNotPositiveDefinite,
    /// The Wishart factor is invalid
    Wishart(WishartError),
}

impl From<WishartError> for MatrixNormalWishartError {
    fn from(err: WishartError) -> Self {
        MatrixNormalWishartError::Wishart(err)
    }
}

/// | slot  | statistic  | natural parameter        |
/// |-------|------------|--------------------------|
/// | `m`   | ΛA         | MK                       |
/// | `k`   | −½AᵀΛA     | K                        |
/// | `psi` | −½Λ        | ψ⁻¹ + MKMᵀ               |
/// | `nu`  | ½ ln\|Λ\|  | ν − drow − 1 + dcol      |
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixNormalWishartStat {
    pub m: DMatrix<f64>,
    pub k: DMatrix<f64>,
    pub psi: DMatrix<f64>,
    pub nu: f64,
}

impl_statistics!(MatrixNormalWishartStat { m, k, psi, nu });

impl MatrixNormalWishart {
    /// Create a new matrix-normal-Wishart
    ///
    /// # Arguments
    /// - m: The `drow × dcol` mean of the coefficients, M
    /// - k: The `dcol × dcol` column precision, K
    /// - psi: The `drow × drow` Wishart scale, ψ
    /// - nu: The Wishart degrees of freedom, ν
    /// - affine: whether the last column of the coefficients is a bias
    pub fn new(
        m: DMatrix<f64>,
        k: DMatrix<f64>,
        psi: DMatrix<f64>,
        nu: f64,
        affine: bool,
    ) -> Result<Self, MatrixNormalWishartError> {
        if m.iter().any(|x| !x.is_finite()) {
            return Err(MatrixNormalWishartError::MNotFinite);
        }
        if !k.is_square() || k.nrows() != m.ncols() || psi.nrows() != m.nrows()
        {
            return Err(MatrixNormalWishartError::DimensionMismatch {
                m_shape: m.shape(),
                n_k: k.nrows(),
                n_psi: psi.nrows(),
            });
        }
        if affine && m.ncols() == 0 {
            return Err(MatrixNormalWishartError::NoBiasColumn);
        }
        let k_chol =
            cholesky(&k).ok_or(MatrixNormalWishartError::KNotPositiveDefinite)?;
        let wishart = Wishart::new(psi, nu)?;
        Ok(MatrixNormalWishart {
            m,
            k,
            k_chol,
            wishart,
            affine,
        })
    }

    /// Number of output dimensions, drow
    #[inline]
    pub fn drow(&self) -> usize {
        self.m.nrows()
    }

    /// Number of coefficient columns, dcol, including the bias
    #[inline]
    pub fn dcol(&self) -> usize {
        self.m.ncols()
    }

    /// Number of input dimensions, without the bias
    #[inline]
    pub fn ndims_in(&self) -> usize {
        self.dcol() - usize::from(self.affine)
    }

    #[inline]
    pub fn m(&self) -> &DMatrix<f64> {
        &self.m
    }

    #[inline]
    pub fn k(&self) -> &DMatrix<f64> {
        &self.k
    }

    #[inline]
    pub fn psi(&self) -> &DMatrix<f64> {
        self.wishart.psi()
    }

    #[inline]
    pub fn nu(&self) -> f64 {
        self.wishart.nu()
    }

    #[inline]
    pub fn affine(&self) -> bool {
        self.affine
    }

    #[inline]
    pub fn wishart(&self) -> &Wishart {
        &self.wishart
    }

    /// K⁻¹
    #[inline]
    fn k_inv(&self) -> DMatrix<f64> {
        self.k_chol.inverse()
    }
}

impl Parameterized for MatrixNormalWishart {
    type Parameters = MatrixNormalWishartParameters;
    type ParameterError = MatrixNormalWishartError;

    fn emit_params(&self) -> Self::Parameters {
        MatrixNormalWishartParameters {
            m: self.m.clone(),
            k: self.k.clone(),
            psi: self.psi().clone(),
            nu: self.nu(),
            affine: self.affine,
        }
    }

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, MatrixNormalWishartError> {
        MatrixNormalWishart::new(
            params.m,
            params.k,
            params.psi,
            params.nu,
            params.affine,
        )
    }
}

impl TryFrom<MatrixNormalWishartParameters> for MatrixNormalWishart {
    type Error = MatrixNormalWishartError;

    fn try_from(
        params: MatrixNormalWishartParameters,
    ) -> Result<Self, Self::Error> {
        MatrixNormalWishart::from_params(params)
    }
}

impl From<MatrixNormalWishart> for MatrixNormalWishartParameters {
    fn from(mnw: MatrixNormalWishart) -> Self {
        mnw.emit_params()
    }
}

impl From<&MatrixNormalWishart> for String {
    fn from(mnw: &MatrixNormalWishart) -> String {
        format!(
            "MNW({} x {}; ν: {}, affine: {})",
            mnw.drow(),
            mnw.dcol(),
            mnw.nu(),
            mnw.affine
        )
    }
}

impl_display!(MatrixNormalWishart);

impl ExponentialFamily for MatrixNormalWishart {
    type Stat = MatrixNormalWishartStat;
    type Error = MatrixNormalWishartError;

    fn to_natural(&self) -> MatrixNormalWishartStat {
        let mk = &self.m * &self.k;
        MatrixNormalWishartStat {
            psi: self.wishart.psi_inv() + &mk * self.m.transpose(),
            m: mk,
            k: self.k.clone(),
            nu: self.nu() - self.drow() as f64 - 1.0 + self.dcol() as f64,
        }
    }

    fn from_natural(
        &self,
        nat: &MatrixNormalWishartStat,
    ) -> Result<Self, MatrixNormalWishartError> {
        let k_inv =
            invpd(&nat.k).ok_or(MatrixNormalWishartError::KNotPositiveDefinite)?;
        let m = &nat.m * k_inv;
        let psi = invpd(&(&nat.psi - &nat.m * m.transpose()))
            .ok_or(WishartError::ScaleNotPositiveDefinite)?;
        let nu = nat.nu + m.nrows() as f64 + 1.0 - m.ncols() as f64;
        MatrixNormalWishart::new(m, nat.k.clone(), psi, nu, self.affine)
    }

    fn log_partition(&self) -> f64 {
        -0.5 * self.drow() as f64 * chol_ln_det(&self.k_chol)
            + self.wishart.log_partition()
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * (self.drow() * self.dcol()) as f64
    }

    fn expected_statistics(&self) -> MatrixNormalWishartStat {
        let e_lmbda = self.psi() * self.nu();
        let e_lmbda_m = &e_lmbda * &self.m;
        MatrixNormalWishartStat {
            k: (self.k_inv() * self.drow() as f64 + self.m.transpose() * &e_lmbda_m)
                * -0.5,
            m: e_lmbda_m,
            psi: e_lmbda * -0.5,
            nu: 0.5 * self.wishart.expected_ln_det(),
        }
    }
}

impl ConjugatePrior for MatrixNormalWishart {
    type Datum = Observation;
    type Likelihood = LinearGaussianWithPrecision;
}

impl ConjugateModel for MatrixNormalWishart {
    fn empty_suffstat(&self) -> MatrixNormalWishartStat {
        let (drow, dcol) = (self.drow(), self.dcol());
        MatrixNormalWishartStat {
            m: DMatrix::zeros(drow, dcol),
            k: DMatrix::zeros(dcol, dcol),
            psi: DMatrix::zeros(drow, drow),
            nu: 0.0,
        }
    }

    /// [yx̃ᵀ, x̃x̃ᵀ, yyᵀ, 1]
    fn observe(
        &self,
        stat: &mut MatrixNormalWishartStat,
        obs: &Observation,
        weight: f64,
    ) {
        let x = obs.regressor(self.affine);
        let y = &obs.target;
        stat.m.ger(weight, y, &x, 1.0);
        stat.k.ger(weight, &x, &x, 1.0);
        stat.psi.ger(weight, y, y, 1.0);
        stat.nu += weight;
    }

    fn likelihood_log_base(&self) -> f64 {
        -HALF_LN_2PI * self.drow() as f64
    }

    /// ½E[ln|Λ|] − ½drow ln 2π − ½[ν(y − Mx̃)ᵀψ(y − Mx̃) + drow x̃ᵀK⁻¹x̃]
    fn expected_log_likelihood(&self, xs: &[Observation]) -> Vec<f64> {
        let drow = self.drow() as f64;
        let nu = self.nu();
        let c = 0.5 * self.wishart.expected_ln_det() - drow * HALF_LN_2PI;
        let k_inv = self.k_inv();
        xs.iter()
            .map(|obs| {
                let x = obs.regressor(self.affine);
                let resid = &obs.target - &self.m * &x;
                c - 0.5
                    * (nu * quad_form(self.psi(), &resid)
                        + drow * quad_form(&k_inv, &x))
            })
            .collect()
    }

    fn check_datum(&self, obs: &Observation) -> Result<(), Error> {
        if obs.target.len() != self.drow() {
            Err(Error::DimensionMismatch {
                what: "regression target",
                expected: self.drow(),
                found: obs.target.len(),
            })
        } else if obs.input.len() != self.ndims_in() {
            Err(Error::DimensionMismatch {
                what: "regression input",
                expected: self.ndims_in(),
                found: obs.input.len(),
            })
        } else {
            Ok(())
        }
    }
}

impl RegressionPredictive for MatrixNormalWishart {
    type Predictive = MvStudentT;

    /// t<sub>ν−drow+1</sub>(Mx̃, (1 + x̃ᵀK⁻¹x̃)/(ν − drow + 1) ψ⁻¹)
    fn posterior_predictive_at(
        &self,
        input: &nalgebra::DVector<f64>,
    ) -> Result<MvStudentT, Error> {
        let x = crate::data::regressor(input, self.affine);
        let df = self.nu() - self.drow() as f64 + 1.0;
        let c = (1.0 + quad_form(&self.k_inv(), &x)) / df;
        Ok(MvStudentT::new(
            df,
            &self.m * x,
            self.wishart.psi_inv() * c,
        )?)
    }
}

impl HasDensity<LinearGaussianWithPrecision> for MatrixNormalWishart {
    fn ln_f(&self, lg: &LinearGaussianWithPrecision) -> f64 {
        let lmbda = lg.lmbda();
        let (drow, dcol) = (self.drow() as f64, self.dcol() as f64);
        match cholesky(lmbda) {
            Some(lmbda_chol) => {
                let diff = lg.coef() - &self.m;
                let tr = (&self.k * diff.transpose() * lmbda * diff).trace();
                self.wishart.ln_f(lmbda)
                    + 0.5 * dcol * chol_ln_det(&lmbda_chol)
                    + 0.5 * drow * chol_ln_det(&self.k_chol)
                    - 0.5 * tr
                    - drow * dcol * HALF_LN_2PI
            }
            None => f64::NEG_INFINITY,
        }
    }
}

impl Sampleable<LinearGaussianWithPrecision> for MatrixNormalWishart {
    /// Λ ~ W(ψ, ν), then A = M + L<sub>Λ</sub>⁻ᵀ Z L<sub>K</sub>⁻¹
    fn draw<R: Rng>(&self, rng: &mut R) -> LinearGaussianWithPrecision {
        self.try_draw(rng)
            .expect("Wishart draws are positive definite")
    }

    fn try_draw<R: Rng>(&self, rng: &mut R) -> Result<LinearGaussianWithPrecision, Error> {
        let lmbda: DMatrix<f64> = self.wishart.draw(rng);
        let lmbda_l = cholesky(&lmbda)
            .ok_or(Error::NotPositiveDefinite {
                what: "sampled noise precision",
            })?
            .l();
        let z = DMatrix::from_fn(self.drow(), self.dcol(), |_, _| {
            rng.sample::<f64, _>(StandardNormal)
        });
        // Z L_K⁻¹ = (L_K⁻ᵀ Zᵀ)ᵀ
        let z_k = solve_lower_transpose_mat(&self.k_chol.l(), &z.transpose())
            .transpose();
        let coef = &self.m + solve_lower_transpose_mat(&lmbda_l, &z_k);
        Ok(LinearGaussianWithPrecision::new(coef, lmbda, self.affine)?)
    }
}

impl Mean<LinearGaussianWithPrecision> for MatrixNormalWishart {
    fn mean(&self) -> Option<LinearGaussianWithPrecision> {
        LinearGaussianWithPrecision::new(
            self.m.clone(),
            self.psi() * self.nu(),
            self.affine,
        )
        .ok()
    }
}

impl std::error::Error for MatrixNormalWishartError {}

impl fmt::Display for MatrixNormalWishartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MNotFinite => write!(f, "non-finite entry in M"),
            Self::DimensionMismatch { m_shape, n_k, n_psi } => write!(
                f,
                "M is {} x {} but K has {} and psi {} dimensions",
                m_shape.0, m_shape.1, n_k, n_psi
            ),
            Self::NoBiasColumn => {
                write!(f, "an affine model needs a bias column")
            }
            Self::KNotPositiveDefinite => {
                write!(f, "the column precision K is not positive definite")
            }
            Self::Wishart(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::NormalWishart;
    use crate::{test_basic_impls, test_exponential_family};
    use nalgebra::DVector;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const TOL: f64 = 1E-10;

    fn mnw() -> MatrixNormalWishart {
        MatrixNormalWishart::new(
            DMatrix::from_row_slice(2, 2, &[0.5, -0.2, 1.0, 0.3]),
            DMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 0.5]),
            DMatrix::from_row_slice(2, 2, &[0.8, 0.1, 0.1, 1.2]),
            5.0,
            true,
        )
        .unwrap()
    }

    fn data() -> Vec<Observation> {
        vec![
            Observation::new(
                DVector::from_row_slice(&[0.4, 1.0]),
                DVector::from_element(1, 0.3),
            ),
            Observation::new(
                DVector::from_row_slice(&[-0.1, 2.2]),
                DVector::from_element(1, -1.2),
            ),
            Observation::new(
                DVector::from_row_slice(&[0.9, 0.0]),
                DVector::from_element(1, 0.8),
            ),
        ]
    }

    test_basic_impls!(mnw());
    test_exponential_family!(mnw(), LinearGaussianWithPrecision);

    #[test]
    fn closed_form_expected_log_likelihood_matches_statistics() {
        let prior = mnw();
        let xs = data();
        let fast = prior.expected_log_likelihood(&xs);
        for (x, f) in xs.iter().zip(fast.iter()) {
            assert::close(*f, prior.expected_log_likelihood_by_statistics(x), TOL);
        }
    }

    #[test]
    fn zero_column_regression_is_a_normal_wishart() {
        // With only a bias column, MNW(M, κ, ψ, ν) on y is NW(M, κ, ψ, ν)
        let m = DVector::from_row_slice(&[0.3, -0.5]);
        let psi = DMatrix::from_row_slice(2, 2, &[0.8, 0.1, 0.1, 1.2]);
        let mnw = MatrixNormalWishart::new(
            DMatrix::from_column_slice(2, 1, m.as_slice()),
            DMatrix::from_element(1, 1, 1.7),
            psi.clone(),
            4.5,
            true,
        )
        .unwrap();
        let nw = NormalWishart::new(m, 1.7, psi, 4.5).unwrap();
        assert::close(mnw.entropy(), nw.entropy(), TOL);

        let y = DVector::from_row_slice(&[1.0, 0.2]);
        let obs = Observation::new(y.clone(), DVector::zeros(0));
        assert::close(
            mnw.expected_log_likelihood(&[obs])[0],
            nw.expected_log_likelihood(&[y])[0],
            TOL,
        );
    }

    #[test]
    fn sampled_coefficients_center_on_m() {
        let mut rng = SmallRng::seed_from_u64(17);
        let prior = mnw();
        let n = 20_000;
        let mean = (0..n)
            .map(|_| {
                let lg: LinearGaussianWithPrecision = prior.draw(&mut rng);
                lg.coef().clone()
            })
            .fold(DMatrix::zeros(2, 2), |acc, a| acc + a)
            / n as f64;
        for (a, b) in mean.iter().zip(prior.m().iter()) {
            assert::close(*a, *b, 0.05);
        }
    }

    #[test]
    fn ln_f_agrees_with_the_exponential_family_form() {
        let prior = mnw();
        let lg = LinearGaussianWithPrecision::new(
            DMatrix::from_row_slice(2, 2, &[0.1, 0.2, -0.3, 0.4]),
            DMatrix::from_row_slice(2, 2, &[1.5, 0.3, 0.3, 0.9]),
            true,
        )
        .unwrap();
        let (a, l) = (lg.coef(), lg.lmbda());
        let t = MatrixNormalWishartStat {
            m: l * a,
            k: a.transpose() * l * a * -0.5,
            psi: l * -0.5,
            nu: 0.5 * l.determinant().ln(),
        };
        let expected =
            prior.to_natural().dot(&t) - prior.log_partition() + prior.log_base();
        assert::close(prior.ln_f(&lg), expected, TOL);
    }

    #[test]
    fn predictive_grows_away_from_the_data() {
        let prior = mnw();
        let post = prior
            .posterior(&prior.suffstat(data().iter().map(|o| (o, 1.0))))
            .unwrap();
        let near = post
            .posterior_predictive_at(&DVector::from_element(1, 0.0))
            .unwrap();
        let far = post
            .posterior_predictive_at(&DVector::from_element(1, 30.0))
            .unwrap();
        assert!(far.scale()[(0, 0)] > near.scale()[(0, 0)]);
        assert::close(near.df(), post.nu() - 1.0, TOL);
    }

    #[test]
    fn mismatched_observations_are_rejected() {
        let prior = mnw();
        let obs = Observation::new(DVector::zeros(2), DVector::zeros(3));
        assert!(matches!(
            prior.check_datum(&obs),
            Err(Error::DimensionMismatch {
                what: "regression input",
                ..
            })
        ));
    }
}
