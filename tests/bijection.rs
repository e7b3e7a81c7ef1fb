use dpmoe::prelude::*;
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;

/// Relative round-trip error of the natural parameters
fn round_trip_error<D: ExponentialFamily>(d: &D) -> f64 {
    let nat = d.to_natural();
    let back = d
        .from_natural(&nat)
        .map_err(Into::<Error>::into)
        .unwrap()
        .to_natural();
    let mut diff = nat.clone();
    diff.axpy(-1.0, &back);
    diff.dot(&diff).sqrt() / (1.0 + nat.dot(&nat).sqrt())
}

/// A well-conditioned positive-definite matrix from free entries
fn spd(entries: &[f64], d: usize) -> DMatrix<f64> {
    let a = DMatrix::from_row_slice(d, d, &entries[..d * d]);
    &a * a.transpose() + DMatrix::identity(d, d)
}

proptest! {
    #[test]
    fn normal_wishart_round_trips(
        entries in prop::collection::vec(-1.0..1.0_f64, 9),
        mu in prop::collection::vec(-5.0..5.0_f64, 3),
        kappa in 0.01..10.0_f64,
        extra_nu in 0.1..20.0_f64,
    ) {
        let nw = NormalWishart::new(
            DVector::from_vec(mu),
            kappa,
            spd(&entries, 3),
            2.0 + extra_nu,
        ).unwrap();
        prop_assert!(round_trip_error(&nw) < 1e-8);
    }

    #[test]
    fn normal_gamma_round_trips(
        mu in prop::collection::vec(-5.0..5.0_f64, 2),
        kappas in prop::collection::vec(0.01..10.0_f64, 2),
        alphas in prop::collection::vec(0.6..20.0_f64, 2),
        betas in prop::collection::vec(0.01..10.0_f64, 2),
    ) {
        let ng = NormalGamma::new(
            DVector::from_vec(mu),
            DVector::from_vec(kappas),
            DVector::from_vec(alphas),
            DVector::from_vec(betas),
        ).unwrap();
        prop_assert!(round_trip_error(&ng) < 1e-8);
    }

    #[test]
    fn matrix_normal_wishart_round_trips(
        m in prop::collection::vec(-3.0..3.0_f64, 6),
        k_entries in prop::collection::vec(-1.0..1.0_f64, 9),
        psi_entries in prop::collection::vec(-1.0..1.0_f64, 4),
        extra_nu in 0.1..20.0_f64,
    ) {
        let mnw = MatrixNormalWishart::new(
            DMatrix::from_row_slice(2, 3, &m),
            spd(&k_entries, 3),
            spd(&psi_entries, 2),
            1.0 + extra_nu,
            true,
        ).unwrap();
        prop_assert!(round_trip_error(&mnw) < 1e-8);
    }

    #[test]
    fn stick_breaking_and_dirichlet_round_trip(
        gammas in prop::collection::vec(0.1..50.0_f64, 1..8),
        delta in 0.1..50.0_f64,
    ) {
        let k = gammas.len();
        let sb = StickBreaking::new(
            DVector::from_vec(gammas.clone()),
            DVector::from_element(k, delta),
        ).unwrap();
        prop_assert!(round_trip_error(&sb) < 1e-8);

        let dir = Dirichlet::new(gammas).unwrap();
        prop_assert!(round_trip_error(&dir) < 1e-8);
    }
}
