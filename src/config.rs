// src/config.rs

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the reference subset is factored into a feature-space basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FactorizationStrategy {
    /// Thin SVD when it fits the memory budget, otherwise the covariance route.
    #[default]
    Auto,
    /// SVD of the reference matrix itself; right singular vectors only.
    ThinSvd,
    /// Eigendecomposition of the features x features matrix X^T X.
    /// Needs memory proportional to features^2 rather than rows x features.
    Covariance,
}

/// Column-wise transform learned from the reference subset and applied to
/// every partition before fitting or scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// Use the design matrix as supplied.
    #[default]
    None,
    /// Subtract reference column means.
    Center,
    /// Subtract reference column means and divide by reference standard deviations.
    Standardize,
}

/// Parameters for fitting, rank selection and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScorerConfig {
    /// Highest candidate rank considered by rank selection.
    /// Capped at the basis dimensionality.
    pub max_rank: usize,
    pub factorization: FactorizationStrategy,
    /// Upper bound on the factorization's working memory. When `None`, the
    /// host's currently available memory is used as the bound.
    pub memory_ceiling_bytes: Option<u64>,
    pub preprocessing: Preprocessing,
    /// Residuals down to `-residual_tolerance` are treated as roundoff.
    /// Scores are returned unclamped; anything more negative is logged as a warning.
    pub residual_tolerance: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            max_rank: 10,
            factorization: FactorizationStrategy::Auto,
            memory_ceiling_bytes: None,
            preprocessing: Preprocessing::None,
            residual_tolerance: 1e-8,
        }
    }
}

impl ScorerConfig {
    /// Parses a TOML document. Missing keys take their default values.
    ///
    /// ```
    /// use subspace_residual::{Preprocessing, ScorerConfig};
    ///
    /// let config = ScorerConfig::from_toml_str("max_rank = 4\npreprocessing = \"standardize\"").unwrap();
    /// assert_eq!(config.max_rank, 4);
    /// assert_eq!(config.preprocessing, Preprocessing::Standardize);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ScorerConfig =
            toml::from_str(text).map_err(|e| ScoringError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScoringError::Config(format!("Failed to read {:?}: {}", path.as_ref(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rank == 0 {
            return Err(ScoringError::Config("max_rank must be at least 1.".into()));
        }
        if !self.residual_tolerance.is_finite() || self.residual_tolerance < 0.0 {
            return Err(ScoringError::Config(format!(
                "residual_tolerance must be finite and non-negative, got {}.",
                self.residual_tolerance
            )));
        }
        if self.memory_ceiling_bytes == Some(0) {
            return Err(ScoringError::Config("memory_ceiling_bytes must be positive.".into()));
        }
        Ok(())
    }
}
