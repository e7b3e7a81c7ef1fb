//! Positive-definite linear algebra helpers
//!
//! Every inverse of a covariance-like matrix in the crate goes through
//! [`invpd`], which fails instead of returning a matrix full of NaNs when the
//! input is not numerically positive definite.
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// (A + Aᵀ) / 2
pub fn symmetrize(a: DMatrix<f64>) -> DMatrix<f64> {
    let at = a.transpose();
    (a + at) * 0.5
}

/// Cholesky factorization of the symmetric part of `a`
pub fn cholesky(a: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    if !a.is_square() || a.iter().any(|x| !x.is_finite()) {
        return None;
    }
    symmetrize(a.clone()).cholesky()
}

/// Inverse of a symmetric positive-definite matrix
///
/// # Example
///
/// ```
/// use nalgebra::DMatrix;
/// use dpmoe::misc::invpd;
///
/// let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
/// let ainv = invpd(&a).unwrap();
/// let eye = &a * &ainv;
///
/// assert!((eye[(0, 0)] - 1.0).abs() < 1e-12);
/// assert!(eye[(0, 1)].abs() < 1e-12);
///
/// let b = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
/// assert!(invpd(&b).is_none());
/// ```
pub fn invpd(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    cholesky(a).map(|chol| symmetrize(chol.inverse()))
}

/// ln|A| from a Cholesky factorization of A
#[inline]
pub fn chol_ln_det(chol: &Cholesky<f64, Dyn>) -> f64 {
    2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>()
}

/// Solve Lᵀx = b for a lower-triangular factor L with a positive diagonal
pub fn solve_lower_transpose(l: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let n = b.len();
    let mut x = b.clone();
    for i in (0..n).rev() {
        let mut s = x[i];
        for j in (i + 1)..n {
            s -= l[(j, i)] * x[j];
        }
        x[i] = s / l[(i, i)];
    }
    x
}

/// Solve LᵀX = B column by column
pub fn solve_lower_transpose_mat(l: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let mut x = DMatrix::zeros(b.nrows(), b.ncols());
    for j in 0..b.ncols() {
        let col = solve_lower_transpose(l, &b.column(j).clone_owned());
        x.set_column(j, &col);
    }
    x
}

/// xᵀ A x
#[inline]
pub fn quad_form(a: &DMatrix<f64>, x: &DVector<f64>) -> f64 {
    x.dot(&(a * x))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1E-10;

    fn spd() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            3,
            &[4.0, 1.2, 0.4, 1.2, 3.0, -0.5, 0.4, -0.5, 2.0],
        )
    }

    #[test]
    fn invpd_is_an_inverse() {
        let a = spd();
        let ainv = invpd(&a).unwrap();
        let eye = &a * &ainv;
        for i in 0..3 {
            for j in 0..3 {
                let target = if i == j { 1.0 } else { 0.0 };
                assert::close(eye[(i, j)], target, TOL);
            }
        }
    }

    #[test]
    fn invpd_rejects_indefinite_and_nan() {
        let mut a = spd();
        a[(0, 0)] = -1.0;
        assert!(invpd(&a).is_none());

        let mut b = spd();
        b[(1, 2)] = f64::NAN;
        assert!(invpd(&b).is_none());

        assert!(invpd(&DMatrix::zeros(2, 3)).is_none());
    }

    #[test]
    fn ln_det_matches_determinant() {
        let a = spd();
        let chol = cholesky(&a).unwrap();
        assert::close(chol_ln_det(&chol), a.determinant().ln(), TOL);
    }

    #[test]
    fn lower_transpose_solve() {
        let chol = cholesky(&spd()).unwrap();
        let l = chol.l();
        let b = DVector::from_row_slice(&[1.0, -2.0, 0.5]);
        let x = solve_lower_transpose(&l, &b);
        let bb = l.transpose() * &x;
        for i in 0..3 {
            assert::close(bb[i], b[i], TOL);
        }
    }

    #[test]
    fn lower_transpose_solve_matrix() {
        let l = cholesky(&spd()).unwrap().l();
        let b = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, -2.0, 1.0, 0.5, 3.0]);
        let x = solve_lower_transpose_mat(&l, &b);
        let bb = l.transpose() * x;
        for (u, v) in bb.iter().zip(b.iter()) {
            assert::close(*u, *v, TOL);
        }
    }
}
