// src/metrics.rs

//! Ranking-quality metric used to pick the subspace rank.

use crate::error::{Result, ScoringError};
use ndarray::{Array1, ArrayView1};

/// Area under the ROC curve, computed from the Mann-Whitney rank sum.
///
/// Returns the probability that a randomly chosen positive row has a strictly
/// higher score than a randomly chosen negative row, with ties counted as one
/// half. Tied scores receive the average of the ranks they span.
///
/// `labels[i]` and `scores[i]` must describe the same observation.
///
/// # Errors
/// - `LengthMismatch` if the two vectors differ in length.
/// - `NonFiniteInput` if any score is NaN or infinite.
/// - `DegenerateLabelSet` if either class is absent.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use subspace_residual::metrics::roc_auc;
///
/// let labels = array![true, true, false, false];
/// let scores = array![0.9, 0.4, 0.5, 0.1];
/// let auc = roc_auc(labels.view(), scores.view()).unwrap();
/// assert!((auc - 0.75).abs() < 1e-12);
/// ```
pub fn roc_auc(labels: ArrayView1<bool>, scores: ArrayView1<f64>) -> Result<f64> {
    if labels.len() != scores.len() {
        return Err(ScoringError::LengthMismatch {
            context: "AUC labels vs scores",
            expected: labels.len(),
            found: scores.len(),
        });
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ScoringError::NonFiniteInput { context: "AUC scores" });
    }

    let n_pos = labels.iter().filter(|&&is_positive| is_positive).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(ScoringError::DegenerateLabelSet {
            positives: n_pos,
            negatives: n_neg,
        });
    }

    let ranks = average_ranks(scores);
    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(labels.iter())
        .filter(|(_, &is_positive)| is_positive)
        .map(|(rank, _)| *rank)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// 1-based ranks of `values`; equal values share the mean of their ranks.
pub fn average_ranks(values: ArrayView1<f64>) -> Array1<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = Array1::<f64>::zeros(n);
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1 ..= end.
        let shared_rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = shared_rank;
        }
        start = end;
    }
    ranks
}

/// Converts a numeric 0/1 label vector into booleans, rejecting anything else.
pub fn labels_from_binary(values: ArrayView1<f64>) -> Result<Array1<bool>> {
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            if value == 1.0 {
                Ok(true)
            } else if value == 0.0 {
                Ok(false)
            } else {
                Err(ScoringError::NonBinaryLabel { index, value })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn all_tied_scores_give_one_half() {
        let labels = array![true, true, false, false];
        let scores = array![5.0, 5.0, 5.0, 5.0];
        let auc = roc_auc(labels.view(), scores.view()).unwrap();
        assert_abs_diff_eq!(auc, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn partial_ties_count_half_a_pair() {
        // Pairs (pos, neg): (3,1)=1, (3,3)=0.5, (2,1)=1, (2,3)=0 -> 2.5 / 4
        let labels = array![true, true, false, false];
        let scores = array![3.0, 2.0, 1.0, 3.0];
        let auc = roc_auc(labels.view(), scores.view()).unwrap();
        assert_abs_diff_eq!(auc, 0.625, epsilon = 1e-12);
    }

    #[test]
    fn perfect_and_inverted_separation() {
        let labels = array![false, true, false, true, false];
        let good = array![0.1, 0.9, 0.2, 0.8, 0.3];
        let bad = good.mapv(|s| 1.0 - s);
        assert_abs_diff_eq!(roc_auc(labels.view(), good.view()).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(roc_auc(labels.view(), bad.view()).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn negating_scores_mirrors_auc() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..20 {
            let n = 40;
            let labels: Array1<bool> = (0..n).map(|i| i % 3 == 0).collect();
            // Coarse integer scores so that ties are common.
            let scores: Array1<f64> = (0..n).map(|_| rng.gen_range(0..6) as f64).collect();
            let auc = roc_auc(labels.view(), scores.view()).unwrap();
            let negated = roc_auc(labels.view(), scores.mapv(|s| -s).view()).unwrap();
            assert!((0.0..=1.0).contains(&auc));
            assert_abs_diff_eq!(auc + negated, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn independent_noise_averages_to_one_half() {
        let mut rng = ChaCha8Rng::seed_from_u64(2025);
        let trials = 50;
        let n = 400;
        let mut total = 0.0;
        for _ in 0..trials {
            let labels: Array1<bool> = (0..n).map(|_| rng.gen_bool(0.2)).collect();
            let scores: Array1<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
            total += roc_auc(labels.view(), scores.view()).unwrap();
        }
        let mean = total / trials as f64;
        assert!((mean - 0.5).abs() < 0.03, "mean AUC over noise was {}", mean);
    }

    #[test]
    fn single_class_is_degenerate() {
        let labels = array![false, false, false];
        let scores = array![1.0, 2.0, 3.0];
        assert_eq!(
            roc_auc(labels.view(), scores.view()),
            Err(ScoringError::DegenerateLabelSet { positives: 0, negatives: 3 })
        );
        let empty_labels = Array1::<bool>::from(vec![]);
        let empty_scores = Array1::<f64>::from(vec![]);
        assert!(matches!(
            roc_auc(empty_labels.view(), empty_scores.view()),
            Err(ScoringError::DegenerateLabelSet { .. })
        ));
    }

    #[test]
    fn misaligned_or_nan_inputs_are_rejected() {
        let labels = array![true, false];
        assert!(matches!(
            roc_auc(labels.view(), array![1.0].view()),
            Err(ScoringError::LengthMismatch { .. })
        ));
        assert!(matches!(
            roc_auc(labels.view(), array![1.0, f64::NAN].view()),
            Err(ScoringError::NonFiniteInput { .. })
        ));
    }

    #[test]
    fn average_ranks_share_tied_positions() {
        let ranks = average_ranks(array![10.0, 20.0, 10.0, 30.0, 20.0].view());
        assert_eq!(ranks, array![1.5, 3.5, 1.5, 5.0, 3.5]);
    }

    #[test]
    fn binary_labels_must_be_zero_or_one() {
        let ok = labels_from_binary(array![0.0, 1.0, 1.0].view()).unwrap();
        assert_eq!(ok, array![false, true, true]);
        assert_eq!(
            labels_from_binary(array![0.0, 0.5].view()),
            Err(ScoringError::NonBinaryLabel { index: 1, value: 0.5 })
        );
    }
}
