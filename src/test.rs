// tests that Clone, Debug, and PartialEq are implemented for a distribution
#[macro_export]
macro_rules! test_basic_impls {
    ($fx: expr) => {
        #[test]
        fn should_impl_debug_clone_and_partialeq() {
            assert_eq!($fx, $fx.clone());
            let _s1 = format!("{:?}", $fx);
        }
    };
}

// natural-parameter bijection of an exponential family, and its entropy
// against a Monte Carlo estimate of -E[ln f(x)] over draws of type `$x`
#[macro_export]
macro_rules! test_exponential_family {
    ($fx: expr, $x: ty) => {
        #[test]
        fn natural_parameters_round_trip() {
            use $crate::traits::{ExponentialFamily, Statistics};
            let fx = $fx;
            let nat = fx.to_natural();
            let back = fx.from_natural(&nat).unwrap();
            let mut diff = back.to_natural();
            diff.axpy(-1.0, &nat);
            let scale = 1.0 + nat.dot(&nat).sqrt();
            assert!(diff.dot(&diff).sqrt() < 1E-8 * scale);
        }

        #[test]
        fn entropy_matches_monte_carlo() {
            use rand::SeedableRng;
            use $crate::traits::{ExponentialFamily, HasDensity, Sampleable};
            let fx = $fx;
            let mut rng = rand_xoshiro::Xoshiro256Plus::seed_from_u64(0xABCD);
            let n = 20_000;
            let mc = -(0..n)
                .map(|_| {
                    let x: $x = fx.draw(&mut rng);
                    fx.ln_f(&x)
                })
                .sum::<f64>()
                / n as f64;
            let h = fx.entropy();
            assert!(
                (h - mc).abs() < 0.1 + 1E-2 * h.abs(),
                "entropy {} vs Monte Carlo {}",
                h,
                mc
            );
            assert::close(fx.kl(&fx), 0.0, 1E-8 * (1.0 + h.abs()));
        }
    };
}
