// src/diagnostics.rs

use crate::basis::SubspaceBasis;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// AUC and residual summary for one candidate rank of a rank sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSweepEntry {
    pub rank: usize,
    pub auc: f64,
    /// Most negative residual observed; anything well below zero means roundoff trouble.
    pub min_residual: f64,
    pub mean_residual: f64,
}

impl RankSweepEntry {
    pub(crate) fn new(rank: usize, auc: f64, residuals: ArrayView1<f64>) -> Self {
        let min_residual = residuals.iter().copied().fold(f64::INFINITY, f64::min);
        let mean_residual = residuals.mean().unwrap_or(f64::NAN);
        Self { rank, auc, min_residual, mean_residual }
    }
}

/// Summary of a fitted basis, for the reporting side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasisDiagnostics {
    pub n_features: usize,
    pub n_directions: usize,
    pub n_reference_rows: usize,
    /// ||I - V^T V||_F
    pub orthogonality_error: f64,
    /// First few singular values.
    pub singular_values_sample: Vec<f64>,
    /// Fraction of reference energy captured by the first r directions, r = 1..=n_directions.
    pub cumulative_energy_fraction: Vec<f64>,
}

const SINGULAR_VALUE_SAMPLE_LEN: usize = 10;

impl BasisDiagnostics {
    pub fn from_basis(basis: &SubspaceBasis) -> Self {
        let squared: Vec<f64> = basis.singular_values().iter().map(|s| s * s).collect();
        let total: f64 = squared.iter().sum();
        let cumulative_energy_fraction = squared
            .iter()
            .scan(0.0, |running, &e| {
                *running += e;
                Some(if total > 0.0 { *running / total } else { 0.0 })
            })
            .collect();

        Self {
            n_features: basis.n_features(),
            n_directions: basis.n_directions(),
            n_reference_rows: basis.n_reference_rows(),
            orthogonality_error: orthogonality_error(basis.directions()),
            singular_values_sample: basis
                .singular_values()
                .iter()
                .take(SINGULAR_VALUE_SAMPLE_LEN)
                .copied()
                .collect(),
            cumulative_energy_fraction,
        }
    }
}

/// Frobenius norm of I - V^T V for a matrix whose columns should be orthonormal.
pub fn orthogonality_error(directions: ArrayView2<f64>) -> f64 {
    let k = directions.ncols();
    let gram = directions.t().dot(&directions);
    let deviation = gram - Array2::<f64>::eye(k);
    deviation.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn identity_has_zero_orthogonality_error() {
        assert_abs_diff_eq!(orthogonality_error(Array2::<f64>::eye(4).view()), 0.0);
        let skewed = array![[1.0, 1.0], [0.0, 1.0]];
        assert!(orthogonality_error(skewed.view()) > 0.5);
    }

    #[test]
    fn cumulative_energy_reaches_one() {
        let basis = SubspaceBasis::from_directions(Array2::eye(3), array![3.0, 2.0, 1.0]).unwrap();
        let diag = BasisDiagnostics::from_basis(&basis);
        assert_eq!(diag.n_directions, 3);
        assert_abs_diff_eq!(diag.cumulative_energy_fraction[0], 9.0 / 14.0, epsilon = 1e-12);
        assert_abs_diff_eq!(diag.cumulative_energy_fraction[2], 1.0, epsilon = 1e-12);
        assert_eq!(diag.singular_values_sample, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn sweep_entry_summarises_residuals() {
        let entry = RankSweepEntry::new(2, 0.75, array![1.0, -0.5, 2.5].view());
        assert_eq!(entry.min_residual, -0.5);
        assert_abs_diff_eq!(entry.mean_residual, 1.0, epsilon = 1e-12);
    }
}
