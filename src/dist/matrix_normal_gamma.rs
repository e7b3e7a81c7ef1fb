//! Matrix-normal-Gamma prior over regressions with diagonal noise
#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::consts::HALF_LN_2PI;
use crate::data::{regressor, Observation};
use crate::dist::{
    DiagonalStudentT, Gamma, GammaError, LinearGaussianWithDiagonalPrecision,
};
use crate::error::Error;
use crate::impl_display;
use crate::misc::{chol_ln_det, cholesky, invpd, quad_form, solve_lower_transpose};
use crate::stats::impl_statistics;
use crate::traits::*;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::Rng;
use rand_distr::StandardNormal;
use std::fmt;

/// Matrix-normal-Gamma, the conjugate prior of
/// [`LinearGaussianWithDiagonalPrecision`]. Each output row i has its own
/// noise precision and a coefficient row that is Gaussian given it:
///
/// λᵢ ~ Gamma(αᵢ, βᵢ),  aᵢ | λᵢ ~ N(mᵢ, (λᵢK)⁻¹)
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde1",
    serde(try_from = "MatrixNormalGammaParameters")
)]
#[cfg_attr(feature = "serde1", serde(into = "MatrixNormalGammaParameters"))]
pub struct MatrixNormalGamma {
    m: DMatrix<f64>,
    k: DMatrix<f64>,
    k_chol: Cholesky<f64, Dyn>,
    gamma: Gamma,
    affine: bool,
}

impl PartialEq for MatrixNormalGamma {
    fn eq(&self, other: &MatrixNormalGamma) -> bool {
        self.m == other.m
            && self.k == other.k
            && self.gamma == other.gamma
            && self.affine == other.affine
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub struct MatrixNormalGammaParameters {
    pub m: DMatrix<f64>,
    pub k: DMatrix<f64>,
    pub alphas: DVector<f64>,
    pub betas: DVector<f64>,
    pub affine: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde1", serde(rename_all = "snake_case"))]
pub enum MatrixNormalGammaError {
    /// The mean matrix has a non-finite entry
    MNotFinite,
    /// M, K and the Gamma factor have incompatible shapes
    DimensionMismatch {
        m_shape: (usize, usize),
        n_k: usize,
        n_gamma: usize,
    },
    /// An affine model without a bias column
    NoBiasColumn,
    /// The column precision K is not positive definite
    KNotPositiveDefinite,
    /// The Gamma factor is invalid
    Gamma(GammaError),
}

impl From<GammaError> for MatrixNormalGammaError {
    fn from(err: GammaError) -> Self {
        MatrixNormalGammaError::Gamma(err)
    }
}

/// | slot     | statistic       | natural parameter        |
/// |----------|-----------------|--------------------------|
/// | `m`      | diag(λ)A        | MK                       |
/// | `k`      | −½Σλᵢaᵢaᵢᵀ      | K                        |
/// | `alphas` | ½ ln λ          | 2α − 2 + dcol            |
/// | `betas`  | −½λ             | 2β + diag(MKMᵀ)          |
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixNormalGammaStat {
    pub m: DMatrix<f64>,
    pub k: DMatrix<f64>,
    pub alphas: DVector<f64>,
    pub betas: DVector<f64>,
}

impl_statistics!(MatrixNormalGammaStat {
    m,
    k,
    alphas,
    betas
});

/// diag(M K Mᵀ)
fn row_quad_forms(m: &DMatrix<f64>, k: &DMatrix<f64>) -> DVector<f64> {
    let mk = m * k;
    DVector::from_fn(m.nrows(), |i, _| mk.row(i).dot(&m.row(i)))
}

impl MatrixNormalGamma {
    pub fn new(
        m: DMatrix<f64>,
        k: DMatrix<f64>,
        alphas: DVector<f64>,
        betas: DVector<f64>,
        affine: bool,
    ) -> Result<Self, MatrixNormalGammaError> {
        if m.iter().any(|x| !x.is_finite()) {
            return Err(MatrixNormalGammaError::MNotFinite);
        }
        let gamma = Gamma::new(alphas, betas)?;
        if !k.is_square()
            || k.nrows() != m.ncols()
            || gamma.ndims() != m.nrows()
        {
            return Err(MatrixNormalGammaError::DimensionMismatch {
                m_shape: m.shape(),
                n_k: k.nrows(),
                n_gamma: gamma.ndims(),
            });
        }
        if affine && m.ncols() == 0 {
            return Err(MatrixNormalGammaError::NoBiasColumn);
        }
        let k_chol =
            cholesky(&k).ok_or(MatrixNormalGammaError::KNotPositiveDefinite)?;
        Ok(MatrixNormalGamma {
            m,
            k,
            k_chol,
            gamma,
            affine,
        })
    }

    #[inline]
    pub fn drow(&self) -> usize {
        self.m.nrows()
    }

    #[inline]
    pub fn dcol(&self) -> usize {
        self.m.ncols()
    }

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
    pub fn alphas(&self) -> &DVector<f64> {
        self.gamma.alphas()
    }

    #[inline]
    pub fn betas(&self) -> &DVector<f64> {
        self.gamma.betas()
    }

    #[inline]
    pub fn affine(&self) -> bool {
        self.affine
    }

    /// The marginal Gamma over the noise precisions
    #[inline]
    pub fn gamma(&self) -> &Gamma {
        &self.gamma
    }
}

impl Parameterized for MatrixNormalGamma {
    type Parameters = MatrixNormalGammaParameters;
    type ParameterError = MatrixNormalGammaError;

    fn emit_params(&self) -> Self::Parameters {
        MatrixNormalGammaParameters {
            m: self.m.clone(),
            k: self.k.clone(),
            alphas: self.alphas().clone(),
            betas: self.betas().clone(),
            affine: self.affine,
        }
    }

    fn from_params(
        params: Self::Parameters,
    ) -> Result<Self, MatrixNormalGammaError> {
        MatrixNormalGamma::new(
            params.m,
            params.k,
            params.alphas,
            params.betas,
            params.affine,
        )
    }
}

impl TryFrom<MatrixNormalGammaParameters> for MatrixNormalGamma {
    type Error = MatrixNormalGammaError;

    fn try_from(params: MatrixNormalGammaParameters) -> Result<Self, Self::Error> {
        MatrixNormalGamma::from_params(params)
    }
}

impl From<MatrixNormalGamma> for MatrixNormalGammaParameters {
    fn from(mng: MatrixNormalGamma) -> Self {
        mng.emit_params()
    }
}

impl From<&MatrixNormalGamma> for String {
    fn from(mng: &MatrixNormalGamma) -> String {
        format!(
            "MNG({} x {}; affine: {})",
            mng.drow(),
            mng.dcol(),
            mng.affine
        )
    }
}

impl_display!(MatrixNormalGamma);

impl ExponentialFamily for MatrixNormalGamma {
    type Stat = MatrixNormalGammaStat;
    type Error = MatrixNormalGammaError;

    fn to_natural(&self) -> MatrixNormalGammaStat {
        let dcol = self.dcol() as f64;
        MatrixNormalGammaStat {
            m: &self.m * &self.k,
            k: self.k.clone(),
            alphas: self.alphas().map(|a| 2.0 * a - 2.0 + dcol),
            betas: self.betas() * 2.0 + row_quad_forms(&self.m, &self.k),
        }
    }

    fn from_natural(
        &self,
        nat: &MatrixNormalGammaStat,
    ) -> Result<Self, MatrixNormalGammaError> {
        let k_inv =
            invpd(&nat.k).ok_or(MatrixNormalGammaError::KNotPositiveDefinite)?;
        let m = &nat.m * k_inv;
        let dcol = m.ncols() as f64;
        let alphas = nat.alphas.map(|a| 0.5 * (a + 2.0 - dcol));
        let betas = (&nat.betas - row_quad_forms(&m, &nat.k)) * 0.5;
        MatrixNormalGamma::new(m, nat.k.clone(), alphas, betas, self.affine)
    }

    fn log_partition(&self) -> f64 {
        -0.5 * self.drow() as f64 * chol_ln_det(&self.k_chol)
            + self.gamma.log_partition()
    }

    fn log_base(&self) -> f64 {
        -HALF_LN_2PI * (self.drow() * self.dcol()) as f64
    }

    fn expected_statistics(&self) -> MatrixNormalGammaStat {
        let e_lmbda = self.gamma.expected_lmbdas();
        let lmbda_m = DMatrix::from_diagonal(&e_lmbda) * &self.m;
        MatrixNormalGammaStat {
            k: (self.k_chol.inverse() * self.drow() as f64
                + self.m.transpose() * &lmbda_m)
                * -0.5,
            m: lmbda_m,
            alphas: self.gamma.expected_ln_lmbdas() * 0.5,
            betas: e_lmbda * -0.5,
        }
    }
}

impl ConjugatePrior for MatrixNormalGamma {
    type Datum = Observation;
    type Likelihood = LinearGaussianWithDiagonalPrecision;
}

impl ConjugateModel for MatrixNormalGamma {
    fn empty_suffstat(&self) -> MatrixNormalGammaStat {
        let (drow, dcol) = (self.drow(), self.dcol());
        MatrixNormalGammaStat {
            m: DMatrix::zeros(drow, dcol),
            k: DMatrix::zeros(dcol, dcol),
            alphas: DVector::zeros(drow),
            betas: DVector::zeros(drow),
        }
    }

    /// [yx̃ᵀ, x̃x̃ᵀ, 1, y∘y]
    fn observe(
        &self,
        stat: &mut MatrixNormalGammaStat,
        obs: &Observation,
        weight: f64,
    ) {
        let x = obs.regressor(self.affine);
        let y = &obs.target;
        stat.m.ger(weight, y, &x, 1.0);
        stat.k.ger(weight, &x, &x, 1.0);
        stat.alphas.add_scalar_mut(weight);
        stat.betas.axpy(weight, &y.component_mul(y), 1.0);
    }

    fn likelihood_log_base(&self) -> f64 {
        -HALF_LN_2PI * self.drow() as f64
    }

    fn expected_log_likelihood(&self, xs: &[Observation]) -> Vec<f64> {
        let e_lmbda = self.gamma.expected_lmbdas();
        let c: f64 = self
            .gamma
            .expected_ln_lmbdas()
            .iter()
            .map(|e_ln| 0.5 * e_ln - HALF_LN_2PI)
            .sum();
        let drow = self.drow() as f64;
        let k_inv = self.k_chol.inverse();
        xs.iter()
            .map(|obs| {
                let x = obs.regressor(self.affine);
                let resid = &obs.target - &self.m * &x;
                let weighted: f64 = resid
                    .iter()
                    .zip(e_lmbda.iter())
                    .map(|(r, l)| l * r * r)
                    .sum();
                c - 0.5 * (weighted + drow * quad_form(&k_inv, &x))
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

impl RegressionPredictive for MatrixNormalGamma {
    type Predictive = DiagonalStudentT;

    /// t<sub>2αᵢ</sub>(mᵢᵀx̃, (βᵢ/αᵢ)(1 + x̃ᵀK⁻¹x̃)) per output
    fn posterior_predictive_at(
        &self,
        input: &DVector<f64>,
    ) -> Result<DiagonalStudentT, Error> {
        let x = regressor(input, self.affine);
        let c = 1.0 + quad_form(&self.k_chol.inverse(), &x);
        let scales = self.betas().component_div(self.alphas()) * c;
        Ok(DiagonalStudentT::new(
            self.alphas() * 2.0,
            &self.m * x,
            scales,
        )?)
    }
}

impl HasDensity<LinearGaussianWithDiagonalPrecision> for MatrixNormalGamma {
    fn ln_f(&self, lg: &LinearGaussianWithDiagonalPrecision) -> f64 {
        let lmbdas = lg.lmbdas();
        let dcol = self.dcol() as f64;
        let ln_det_k = chol_ln_det(&self.k_chol);
        let diff = lg.coef() - &self.m;
        let rows: f64 = (0..self.drow())
            .map(|i| {
                let row = diff.row(i).transpose();
                0.5 * dcol * lmbdas[i].ln() + 0.5 * ln_det_k
                    - 0.5 * lmbdas[i] * quad_form(&self.k, &row)
                    - dcol * HALF_LN_2PI
            })
            .sum();
        self.gamma.ln_f(lmbdas) + rows
    }
}

impl Sampleable<LinearGaussianWithDiagonalPrecision> for MatrixNormalGamma {
    /// aᵢ = mᵢ + L<sub>K</sub>⁻ᵀz / √λᵢ
    fn draw<R: Rng>(&self, rng: &mut R) -> LinearGaussianWithDiagonalPrecision {
        self.try_draw(rng).expect("Gamma draws are positive")
    }

    fn try_draw<R: Rng>(
        &self,
        rng: &mut R,
    ) -> Result<LinearGaussianWithDiagonalPrecision, Error> {
        let lmbdas: DVector<f64> = self.gamma.draw(rng);
        let k_l = self.k_chol.l();
        let mut coef = self.m.clone();
        for i in 0..self.drow() {
            let z = DVector::from_fn(self.dcol(), |_, _| {
                rng.sample::<f64, _>(StandardNormal)
            });
            let noise = solve_lower_transpose(&k_l, &z) / lmbdas[i].sqrt();
            for (j, e) in noise.iter().enumerate() {
                coef[(i, j)] += e;
            }
        }
        Ok(LinearGaussianWithDiagonalPrecision::new(coef, lmbdas, self.affine)?)
    }
}

impl Mean<LinearGaussianWithDiagonalPrecision> for MatrixNormalGamma {
    fn mean(&self) -> Option<LinearGaussianWithDiagonalPrecision> {
        LinearGaussianWithDiagonalPrecision::new(
            self.m.clone(),
            self.gamma.expected_lmbdas(),
            self.affine,
        )
        .ok()
    }
}

impl std::error::Error for MatrixNormalGammaError {}

impl fmt::Display for MatrixNormalGammaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MNotFinite => write!(f, "non-finite entry in M"),
            Self::DimensionMismatch {
                m_shape,
                n_k,
                n_gamma,
            } => write!(
                f,
                "M is {} x {} but K has {} and the Gamma {} dimensions",
                m_shape.0, m_shape.1, n_k, n_gamma
            ),
            Self::NoBiasColumn => {
                write!(f, "an affine model needs a bias column")
            }
            Self::KNotPositiveDefinite => {
                write!(f, "the column precision K is not positive definite")
            }
            Self::Gamma(err) => write!(f, "{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::MatrixNormalWishart;
    use crate::{test_basic_impls, test_exponential_family};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    const TOL: f64 = 1E-10;

    fn mng() -> MatrixNormalGamma {
        MatrixNormalGamma::new(
            DMatrix::from_row_slice(2, 3, &[0.5, -0.2, 0.1, 1.0, 0.3, -0.4]),
            DMatrix::from_row_slice(
                3,
                3,
                &[2.0, 0.1, 0.0, 0.1, 0.5, 0.2, 0.0, 0.2, 1.0],
            ),
            DVector::from_row_slice(&[3.0, 2.0]),
            DVector::from_row_slice(&[1.5, 0.7]),
            true,
        )
        .unwrap()
    }

    fn data() -> Vec<Observation> {
        vec![
            Observation::new(
                DVector::from_row_slice(&[0.4, 1.0]),
                DVector::from_row_slice(&[0.3, 0.1]),
            ),
            Observation::new(
                DVector::from_row_slice(&[-0.1, 2.2]),
                DVector::from_row_slice(&[-1.2, 0.5]),
            ),
        ]
    }

    test_basic_impls!(mng());
    test_exponential_family!(mng(), LinearGaussianWithDiagonalPrecision);

    #[test]
    fn closed_form_expected_log_likelihood_matches_statistics() {
        let prior = mng();
        let xs = data();
        let fast = prior.expected_log_likelihood(&xs);
        for (x, f) in xs.iter().zip(fast.iter()) {
            assert::close(*f, prior.expected_log_likelihood_by_statistics(x), TOL);
        }
    }

    #[test]
    fn single_output_matches_matrix_normal_wishart() {
        // One output row: Gamma(α, β) on λ is W(1/(2β), 2α)
        let m = DMatrix::from_row_slice(1, 2, &[0.4, -0.3]);
        let k = DMatrix::from_row_slice(2, 2, &[1.5, 0.2, 0.2, 0.8]);
        let (alpha, beta) = (2.5, 0.8);
        let mng = MatrixNormalGamma::new(
            m.clone(),
            k.clone(),
            DVector::from_element(1, alpha),
            DVector::from_element(1, beta),
            true,
        )
        .unwrap();
        let mnw = MatrixNormalWishart::new(
            m,
            k,
            DMatrix::from_element(1, 1, 0.5 / beta),
            2.0 * alpha,
            true,
        )
        .unwrap();
        assert::close(mng.entropy(), mnw.entropy(), TOL);

        let obs = Observation::new(
            DVector::from_element(1, 0.7),
            DVector::from_element(1, -0.2),
        );
        assert::close(
            mng.expected_log_likelihood(&[obs.clone()])[0],
            mnw.expected_log_likelihood(&[obs])[0],
            TOL,
        );
    }

    #[test]
    fn sampled_coefficients_center_on_m() {
        let mut rng = SmallRng::seed_from_u64(3);
        let prior = mng();
        let n = 20_000;
        let mean = (0..n)
            .map(|_| {
                let lg: LinearGaussianWithDiagonalPrecision = prior.draw(&mut rng);
                lg.coef().clone()
            })
            .fold(DMatrix::zeros(2, 3), |acc, a| acc + a)
            / n as f64;
        for (a, b) in mean.iter().zip(prior.m().iter()) {
            assert::close(*a, *b, 0.05);
        }
    }

    #[test]
    fn posterior_predictive_is_centered_on_the_regression() {
        let prior = mng();
        let input = DVector::from_row_slice(&[0.5, -0.5]);
        let pred = prior.posterior_predictive_at(&input).unwrap();
        let expected = prior.m() * regressor(&input, true);
        assert::close(pred.locs()[0], expected[0], TOL);
        assert::close(pred.dfs()[1], 4.0, TOL);
    }
}
