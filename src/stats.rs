//! Slot-wise arithmetic backing the [`Statistics`](crate::traits::Statistics)
//! tuples of every family
use nalgebra::{DMatrix, DVector};

/// One slot of a statistics tuple
pub(crate) trait StatField {
    fn dot(&self, other: &Self) -> f64;
    fn axpy(&mut self, a: f64, x: &Self);
    fn scale(&mut self, a: f64);
    fn zeros_like(&self) -> Self;
}

impl StatField for f64 {
    #[inline]
    fn dot(&self, other: &Self) -> f64 {
        self * other
    }

    #[inline]
    fn axpy(&mut self, a: f64, x: &Self) {
        *self += a * x;
    }

    #[inline]
    fn scale(&mut self, a: f64) {
        *self *= a;
    }

    #[inline]
    fn zeros_like(&self) -> Self {
        0.0
    }
}

impl StatField for DVector<f64> {
    #[inline]
    fn dot(&self, other: &Self) -> f64 {
        self.iter().zip(other.iter()).map(|(a, b)| a * b).sum()
    }

    #[inline]
    fn axpy(&mut self, a: f64, x: &Self) {
        self.iter_mut().zip(x.iter()).for_each(|(s, xi)| *s += a * xi);
    }

    #[inline]
    fn scale(&mut self, a: f64) {
        *self *= a;
    }

    #[inline]
    fn zeros_like(&self) -> Self {
        DVector::zeros(self.len())
    }
}

impl StatField for DMatrix<f64> {
    #[inline]
    fn dot(&self, other: &Self) -> f64 {
        self.iter().zip(other.iter()).map(|(a, b)| a * b).sum()
    }

    #[inline]
    fn axpy(&mut self, a: f64, x: &Self) {
        self.iter_mut().zip(x.iter()).for_each(|(s, xi)| *s += a * xi);
    }

    #[inline]
    fn scale(&mut self, a: f64) {
        *self *= a;
    }

    #[inline]
    fn zeros_like(&self) -> Self {
        DMatrix::zeros(self.nrows(), self.ncols())
    }
}

impl<T: StatField> StatField for Vec<T> {
    fn dot(&self, other: &Self) -> f64 {
        self.iter().zip(other.iter()).map(|(a, b)| a.dot(b)).sum()
    }

    fn axpy(&mut self, a: f64, x: &Self) {
        self.iter_mut().zip(x.iter()).for_each(|(s, xi)| s.axpy(a, xi));
    }

    fn scale(&mut self, a: f64) {
        self.iter_mut().for_each(|s| s.scale(a));
    }

    fn zeros_like(&self) -> Self {
        self.iter().map(StatField::zeros_like).collect()
    }
}

/// Implement `Statistics` for a struct whose fields are all `StatField`s
macro_rules! impl_statistics {
    ($kind: ident { $($field: ident),+ $(,)? }) => {
        impl $crate::traits::Statistics for $kind {
            fn dot(&self, other: &Self) -> f64 {
                0.0 $(+ $crate::stats::StatField::dot(&self.$field, &other.$field))+
            }

            fn axpy(&mut self, a: f64, x: &Self) {
                $($crate::stats::StatField::axpy(&mut self.$field, a, &x.$field);)+
            }

            fn scale(&mut self, a: f64) {
                $($crate::stats::StatField::scale(&mut self.$field, a);)+
            }

            fn zeros_like(&self) -> Self {
                $kind {
                    $($field: $crate::stats::StatField::zeros_like(&self.$field),)+
                }
            }
        }
    };
}

pub(crate) use impl_statistics;
