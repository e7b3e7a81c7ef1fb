use crate::consts::{LN_2, LN_PI};
use rand::distributions::Open01;
use rand::Rng;
use special::Gamma;
use std::fmt::Debug;

/// Convert a Vector to a printable string
///
/// # Example
///
/// ```rust
/// # use dpmoe::misc::vec_to_string;
/// let xs: Vec<u8> = vec![0, 1, 2, 3, 4, 5];
///
/// assert_eq!(vec_to_string(&xs, 6).as_str(), "[0, 1, 2, 3, 4, 5]");
/// assert_eq!(vec_to_string(&xs, 5).as_str(), "[0, 1, 2, 3, ... , 5]");
///
/// ```
pub fn vec_to_string<T: Debug>(xs: &[T], max_entries: usize) -> String {
    let mut out = String::new();
    out += "[";
    let n = xs.len();
    xs.iter().enumerate().for_each(|(i, x)| {
        let to_push = if i < max_entries - 1 {
            format!("{:?}, ", x)
        } else if i == (max_entries - 1) && n > max_entries {
            String::from("... , ")
        } else if i == n - 1 {
            format!("{:?}]", x)
        } else {
            String::new()
        };

        out.push_str(to_push.as_str());
    });

    out
}

/// Safely compute `log(sum(exp(xs))`
///
/// Returns `-∞` when every entry is `-∞`.
pub fn logsumexp(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        panic!("Empty container");
    } else if xs.len() == 1 {
        xs[0]
    } else {
        let maxval = xs.iter().fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
        if maxval == f64::NEG_INFINITY {
            return maxval;
        }

        xs.iter().fold(0.0, |acc, x| acc + (x - maxval).exp()).ln() + maxval
    }
}

#[inline]
fn catflip(cws: &[f64], r: f64) -> Option<usize> {
    if cws.len() > 9 {
        let ix = cws.partition_point(|&w| w < r);
        if ix < cws.len() {
            Some(ix)
        } else {
            None
        }
    } else {
        cws.iter().position(|&w| w > r)
    }
}

/// Draw an index according to log-domain weights
///
/// Draw a `usize` from the categorical distribution defined by `ln_weights`.
/// If `normed` is `true` then exp(`ln_weights`) is assumed to sum to 1.
///
/// # Examples
///
/// ```rust
/// use dpmoe::misc::ln_pflip;
///
/// let weights: Vec<f64> = vec![0.4, 0.2, 0.3, 0.1];
/// let ln_weights: Vec<f64> = weights.iter().map(|&w| w.ln()).collect();
///
/// let xs = ln_pflip(&ln_weights, 100, true, &mut rand::thread_rng());
///
/// assert_eq!(xs.len(), 100);
/// assert!(xs.iter().all(|&x| x <= 3));
/// ```
pub fn ln_pflip<R: Rng>(
    ln_weights: &[f64],
    n: usize,
    normed: bool,
    rng: &mut R,
) -> Vec<usize> {
    let z = if normed { 0.0 } else { logsumexp(ln_weights) };

    let mut cws: Vec<f64> = ln_weights.iter().map(|w| (w - z).exp()).collect();

    for i in 1..cws.len() {
        cws[i] += cws[i - 1];
    }

    (0..n)
        .map(|_| {
            // the last bin absorbs round-off in the cumulative sum
            let r: f64 = rng.sample(Open01);
            catflip(&cws, r).unwrap_or(cws.len() - 1)
        })
        .collect()
}

/// Index of the first largest element in `xs`. `None` if `xs` is empty.
///
/// # Examples
///
/// ```rust
/// use dpmoe::misc::argmax;
///
/// assert_eq!(argmax(&[1.0, 3.0, 2.0, 3.0]), Some(1));
/// assert_eq!(argmax(&[]), None);
/// ```
pub fn argmax(xs: &[f64]) -> Option<usize> {
    xs.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (ix, &x)| match best {
            Some((_, b)) if b >= x => best,
            _ => Some((ix, x)),
        })
        .map(|(ix, _)| ix)
}

/// Natural logarithm of the multivariate gamma function, *ln Γ<sub>p</sub>(a)*.
///
/// # Arguments
///
/// * `p` - Positive integer degrees of freedom
/// * `a` - The number for which to compute the multivariate gamma
pub fn lnmv_gamma(p: usize, a: f64) -> f64 {
    let pf = p as f64;
    let a0 = pf * (pf - 1.0) / 4.0 * LN_PI;
    (1..=p).fold(a0, |acc, j| acc + (a + (1.0 - j as f64) / 2.0).ln_gamma().0)
}

/// Multivariate digamma, *ψ<sub>p</sub>(a) = Σ<sub>i<p</sub> ψ(a - i/2)*
pub fn mv_digamma(p: usize, a: f64) -> f64 {
    (0..p).map(|i| (a - i as f64 / 2.0).digamma()).sum()
}

/// E[ln|Λ|] for Λ ~ W(ψ, ν) given ln|ψ|
#[inline]
pub fn wishart_expected_ln_det(ndims: usize, nu: f64, ln_det_psi: f64) -> f64 {
    mv_digamma(ndims, nu / 2.0) + ndims as f64 * LN_2 + ln_det_psi
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1E-12;

    #[test]
    fn logsumexp_on_vector_of_zeros() {
        let xs: Vec<f64> = vec![0.0; 5];
        // should be about log(5)
        assert::close(logsumexp(&xs), 1.6094379124341003, TOL);
    }

    #[test]
    fn logsumexp_on_random_values() {
        let xs: Vec<f64> = vec![
            0.30415386,
            -0.07072296,
            -1.04287019,
            0.27855407,
            -0.81896765,
        ];
        assert::close(logsumexp(&xs), 1.4820007894263059, TOL);
    }

    #[test]
    fn logsumexp_of_all_neg_infinity_is_neg_infinity() {
        let xs = vec![f64::NEG_INFINITY; 3];
        assert_eq!(logsumexp(&xs), f64::NEG_INFINITY);
    }

    #[test]
    #[should_panic]
    fn logsumexp_should_panic_on_empty() {
        let xs: Vec<f64> = Vec::new();
        logsumexp(&xs);
    }

    #[test]
    fn lnmv_gamma_values() {
        assert::close(lnmv_gamma(1, 1.0), 0.0, TOL);
        assert::close(lnmv_gamma(1, 12.0), 17.502307845873887, TOL);
        assert::close(lnmv_gamma(3, 12.0), 50.615815724290741, TOL);
        assert::close(lnmv_gamma(3, 8.23), 25.709195968438628, TOL);
    }

    #[test]
    fn mv_digamma_is_derivative_of_lnmv_gamma() {
        let h = 1e-6;
        for &(p, a) in &[(1, 2.5), (2, 3.0), (4, 7.1)] {
            let fd = (lnmv_gamma(p, a + h) - lnmv_gamma(p, a - h)) / (2.0 * h);
            assert::close(mv_digamma(p, a), fd, 1e-6);
        }
    }

    #[test]
    fn ln_pflip_never_draws_zero_weight() {
        let mut rng = rand::thread_rng();
        let ln_weights = vec![0.0, f64::NEG_INFINITY, 0.0];
        let xs = ln_pflip(&ln_weights, 1000, false, &mut rng);
        assert!(xs.iter().all(|&x| x != 1));
    }

    #[test]
    fn ln_pflip_long_weights_uses_every_bin() {
        let mut rng = rand::thread_rng();
        let ln_weights = vec![-(12.0_f64).ln(); 12];
        let xs = ln_pflip(&ln_weights, 5000, true, &mut rng);
        assert!((0..12).all(|k| xs.contains(&k)));
    }

    #[test]
    fn argmax_returns_first_max() {
        assert_eq!(argmax(&[0.0, 2.0, 2.0, -1.0]), Some(1));
        assert_eq!(argmax(&[-3.0]), Some(0));
    }
}
