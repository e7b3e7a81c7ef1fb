//! Data utilities
mod transform;

pub use self::transform::{AffineTransform, TransformKind};

use nalgebra::DVector;

/// An input/target pair for a regression expert
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub target: DVector<f64>,
    pub input: DVector<f64>,
}

impl Observation {
    pub fn new(target: DVector<f64>, input: DVector<f64>) -> Self {
        Observation { target, input }
    }

    /// The input with a trailing 1 appended when `affine`
    #[inline]
    pub fn regressor(&self, affine: bool) -> DVector<f64> {
        regressor(&self.input, affine)
    }
}

/// `x` with a trailing 1 appended when `affine`
#[inline]
pub fn regressor(x: &DVector<f64>, affine: bool) -> DVector<f64> {
    if affine {
        x.clone().insert_row(x.len(), 1.0)
    } else {
        x.clone()
    }
}

/// Pair up targets and inputs
pub(crate) fn observations(
    targets: &[DVector<f64>],
    inputs: &[DVector<f64>],
) -> Vec<Observation> {
    targets
        .iter()
        .zip(inputs.iter())
        .map(|(y, x)| Observation::new(y.clone(), x.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_regressor_appends_one() {
        let obs = Observation::new(
            DVector::from_element(1, 2.0),
            DVector::from_row_slice(&[0.5, -0.5]),
        );
        assert_eq!(
            obs.regressor(true),
            DVector::from_row_slice(&[0.5, -0.5, 1.0])
        );
        assert_eq!(obs.regressor(false), obs.input);
    }
}
