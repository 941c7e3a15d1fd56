// src/preprocess.rs

use crate::config::Preprocessing;
use crate::error::{Result, ScoringError};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// Column statistics learned from the reference subset.
///
/// Statistics come from the reference rows only, so scoring other partitions
/// never leaks their distribution back into the fitted subspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    mode: Preprocessing,
    n_features: usize,
    /// Shape: (n_features). Present for `Center` and `Standardize`.
    mean: Option<Array1<f64>>,
    /// Sanitized standard deviations, all strictly positive.
    /// Shape: (n_features). Present for `Standardize`.
    scale: Option<Array1<f64>>,
}

impl FittedPreprocessor {
    /// Learns the column transform for `mode` from `reference`.
    ///
    /// Standard deviations below 1e-9 (constant columns) are replaced by 1.0.
    ///
    /// # Errors
    /// `EmptyReferenceSet` for zero rows, `EmptyFeatureSet` for zero columns,
    /// `NonFiniteInput` for NaN or infinite entries.
    pub fn fit(reference: ArrayView2<f64>, mode: Preprocessing) -> Result<Self> {
        let (n_rows, n_features) = reference.dim();
        if n_rows == 0 {
            return Err(ScoringError::EmptyReferenceSet);
        }
        if n_features == 0 {
            return Err(ScoringError::EmptyFeatureSet);
        }
        if reference.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::NonFiniteInput { context: "reference matrix" });
        }

        let (mean, scale) = match mode {
            Preprocessing::None => (None, None),
            Preprocessing::Center => (reference.mean_axis(Axis(0)), None),
            Preprocessing::Standardize => {
                let mean = reference.mean_axis(Axis(0));
                let scale = reference
                    .std_axis(Axis(0), 0.0)
                    .mapv(|s| if s.is_finite() && s > SCALE_SANITIZATION_THRESHOLD { s } else { 1.0 });
                (mean, Some(scale))
            }
        };

        Ok(Self { mode, n_features, mean, scale })
    }

    /// Returns a transformed copy of `matrix`.
    ///
    /// # Errors
    /// `DimensionMismatch` if the column count differs from the fitted one.
    pub fn transform(&self, matrix: ArrayView2<f64>) -> Result<Array2<f64>> {
        if matrix.ncols() != self.n_features {
            return Err(ScoringError::DimensionMismatch {
                expected: self.n_features,
                found: matrix.ncols(),
            });
        }
        let mut out = matrix.to_owned();
        if let Some(mean) = &self.mean {
            out -= mean;
        }
        if let Some(scale) = &self.scale {
            out /= scale;
        }
        Ok(out)
    }

    pub fn mode(&self) -> Preprocessing {
        self.mode
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }
}
