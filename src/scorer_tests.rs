use crate::basis::SubspaceBasis;
use crate::config::ScorerConfig;
use crate::error::ScoringError;
use crate::scorer::*;
use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const TOLERANCE: f64 = 1e-9;

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-2.0..2.0))
}

fn fitted_basis(n_features: usize, seed: u64) -> SubspaceBasis {
    let reference = generate_random_data(60, n_features, seed);
    SubspaceBasis::fit(reference.view(), &ScorerConfig::default()).expect("fit")
}

fn identity_basis(n_features: usize) -> SubspaceBasis {
    let singular_values: Array1<f64> = (0..n_features).rev().map(|v| (v + 1) as f64).collect();
    SubspaceBasis::from_directions(Array2::eye(n_features), singular_values).expect("identity basis")
}

#[test]
fn row_norms_are_sums_of_squares() {
    let x = array![[1.0, 2.0, 2.0], [0.0, -3.0, 4.0]];
    assert_eq!(row_norms(x.view()), array![9.0, 25.0]);
}

#[test]
fn projected_energy_is_monotone_in_rank() {
    let basis = fitted_basis(6, 11);
    let eval = generate_random_data(25, 6, 12);
    let mut accumulator = EnergyAccumulator::new(eval.view(), &basis).unwrap();
    let mut previous = Array1::<f64>::zeros(eval.nrows());
    for rank in 1..=basis.n_directions() {
        let current = accumulator.advance().unwrap().to_owned();
        assert_eq!(accumulator.rank(), rank);
        for (now, before) in current.iter().zip(previous.iter()) {
            assert!(*now >= *before, "energy dropped at rank {}: {} < {}", rank, now, before);
        }
        previous = current;
    }
}

#[test]
fn residuals_are_non_negative_and_vanish_at_full_rank() {
    let basis = fitted_basis(5, 21);
    let eval = generate_random_data(30, 5, 22);
    for rank in 1..=basis.n_directions() {
        let residuals = residual_scores(eval.view(), &basis, rank).unwrap();
        for &r in residuals.iter() {
            assert!(r >= -TOLERANCE, "negative residual {} at rank {}", r, rank);
        }
    }
    let full = residual_scores(eval.view(), &basis, basis.n_directions()).unwrap();
    let norms = row_norms(eval.view());
    for (r, n) in full.iter().zip(norms.iter()) {
        assert_abs_diff_eq!(*r, 0.0, epsilon = 1e-9 * n.max(1.0));
    }
}

#[test]
fn incremental_energy_matches_direct_projection() {
    let basis = fitted_basis(7, 31);
    let eval = generate_random_data(15, 7, 32);
    for rank in [1, 3, 7] {
        let incremental = projected_energy_at_rank(eval.view(), &basis, rank).unwrap();
        let leading = basis.directions().slice(s![.., ..rank]).to_owned();
        let coordinates = eval.dot(&leading);
        let direct = coordinates.mapv(|c| c * c).sum_axis(ndarray::Axis(1));
        for (a, b) in incremental.iter().zip(direct.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }
}

#[test]
fn advance_to_can_rewind() {
    let basis = fitted_basis(4, 41);
    let eval = generate_random_data(10, 4, 42);
    let mut accumulator = EnergyAccumulator::new(eval.view(), &basis).unwrap();
    let at_three = accumulator.advance_to(3).unwrap().to_owned();
    let at_one = accumulator.advance_to(1).unwrap().to_owned();
    assert_eq!(accumulator.rank(), 1);
    assert_eq!(at_one, projected_energy_at_rank(eval.view(), &basis, 1).unwrap());
    assert_eq!(at_three, projected_energy_at_rank(eval.view(), &basis, 3).unwrap());
    accumulator.advance_to(4).unwrap();
    assert!(matches!(
        accumulator.advance(),
        Err(ScoringError::InvalidRank { requested: 5, max: 4 })
    ));
}

#[test]
fn invalid_ranks_are_rejected_not_clamped() {
    let basis = identity_basis(3);
    let eval = array![[1.0, 2.0, 3.0]];
    assert_eq!(
        residual_scores(eval.view(), &basis, 0),
        Err(ScoringError::InvalidRank { requested: 0, max: 3 })
    );
    assert_eq!(
        projected_energy_at_rank(eval.view(), &basis, 4),
        Err(ScoringError::InvalidRank { requested: 4, max: 3 })
    );
}

#[test]
fn dimension_mismatch_is_rejected_before_scoring() {
    let basis = identity_basis(3);
    let eval = array![[1.0, 2.0]];
    assert_eq!(
        residual_scores(eval.view(), &basis, 1),
        Err(ScoringError::DimensionMismatch { expected: 3, found: 2 })
    );
    let two_rows = array![[1.0, 2.0], [2.0, 1.0]];
    let labels = array![true, false];
    assert_eq!(
        select_rank(two_rows.view(), labels.view(), &basis, 2),
        Err(ScoringError::DimensionMismatch { expected: 3, found: 2 })
    );
}

#[test]
fn equal_auc_ranks_resolve_to_the_smallest() {
    // Feature 1 is zero everywhere, so ranks 1 and 2 produce identical residuals.
    // Feature 2 separates the classes until rank 3 removes all residual energy.
    let basis = identity_basis(3);
    let eval = array![
        [1.0, 0.0, 0.1],
        [2.0, 0.0, 0.2],
        [0.5, 0.0, 0.3],
        [1.5, 0.0, 2.0],
        [0.2, 0.0, 3.0],
    ];
    let labels = array![false, false, false, true, true];
    let selection = select_rank(eval.view(), labels.view(), &basis, 3).unwrap();
    assert_eq!(selection.sweep.len(), 3);
    assert_abs_diff_eq!(selection.sweep[0].auc, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(selection.sweep[1].auc, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(selection.sweep[2].auc, 0.5, epsilon = 1e-12);
    assert_eq!(selection.rank, 1);
    assert_abs_diff_eq!(selection.auc, 1.0, epsilon = 1e-12);
}

#[test]
fn strictly_better_later_rank_is_selected() {
    // Negatives are large along feature 1, which only rank 2 removes.
    let basis = identity_basis(3);
    let eval = array![
        [0.0, 5.0, 0.1],
        [0.0, 6.0, 0.2],
        [0.0, 0.1, 1.0],
        [0.0, 0.2, 1.5],
    ];
    let labels = array![false, false, true, true];
    let selection = select_rank(eval.view(), labels.view(), &basis, 3).unwrap();
    assert_eq!(selection.rank, 2);
    assert!(selection.sweep[0].auc < selection.sweep[1].auc);
}

#[test]
fn max_rank_above_dimensionality_is_capped() {
    let basis = identity_basis(2);
    let eval = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
    let labels = array![false, true, true];
    let selection = select_rank(eval.view(), labels.view(), &basis, 10).unwrap();
    assert_eq!(selection.sweep.len(), 2);
    assert!(selection.rank <= 2);
}

#[test]
fn single_class_evaluation_refuses_to_select() {
    let basis = identity_basis(2);
    let eval = array![[1.0, 0.0], [0.0, 1.0]];
    let labels = array![false, false];
    assert_eq!(
        select_rank(eval.view(), labels.view(), &basis, 2),
        Err(ScoringError::DegenerateLabelSet { positives: 0, negatives: 2 })
    );
    assert!(matches!(
        select_rank(eval.view(), array![true, false].view(), &basis, 0),
        Err(ScoringError::InvalidRank { requested: 0, .. })
    ));
}

#[test]
fn scoring_does_not_mutate_the_basis() {
    let basis = fitted_basis(4, 51);
    let snapshot = basis.clone();
    let eval = generate_random_data(12, 4, 52);
    let labels: Array1<bool> = (0..12).map(|i| i % 4 == 0).collect();
    select_rank(eval.view(), labels.view(), &basis, 4).unwrap();
    residual_scores(eval.view(), &basis, 2).unwrap();
    assert_eq!(basis, snapshot);
}

#[test]
fn accumulator_accepts_a_basis_borrowed_for_less_time_than_the_rows() {
    let eval = generate_random_data(8, 3, 61);
    let rows = eval.view();
    let energy_at_two = {
        let basis = identity_basis(3);
        let mut accumulator = EnergyAccumulator::new(rows, &basis).unwrap();
        accumulator.advance_to(2).unwrap();
        assert_eq!(accumulator.rank(), 2);
        accumulator.energy().to_owned()
    };
    let direct = rows.slice(s![.., ..2]).mapv(|v| v * v).sum_axis(ndarray::Axis(1));
    for (a, b) in energy_at_two.iter().zip(direct.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn energy_view_tracks_the_current_rank() {
    let basis = identity_basis(2);
    let eval = array![[3.0, 4.0], [1.0, -2.0]];
    let mut accumulator = EnergyAccumulator::new(eval.view(), &basis).unwrap();
    assert_eq!(accumulator.energy(), array![0.0, 0.0]);
    accumulator.advance().unwrap();
    assert_eq!(accumulator.energy(), array![9.0, 1.0]);
    accumulator.advance().unwrap();
    assert_eq!(accumulator.energy(), array![25.0, 5.0]);
}

#[test]
fn non_finite_rows_are_rejected_before_scoring() {
    let basis = identity_basis(2);
    let eval = array![[1.0, 2.0], [f64::NAN, 0.5], [0.0, 1.0]];
    assert_eq!(
        residual_scores(eval.view(), &basis, 1),
        Err(ScoringError::NonFiniteInput { context: "scored matrix" })
    );
    let labels = array![false, true, true];
    assert!(matches!(
        select_rank(eval.view(), labels.view(), &basis, 2),
        Err(ScoringError::NonFiniteInput { .. })
    ));
    let infinite = array![[f64::INFINITY, 0.0]];
    assert!(matches!(
        projected_energy_at_rank(infinite.view(), &basis, 2),
        Err(ScoringError::NonFiniteInput { .. })
    ));
}
