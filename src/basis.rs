// src/basis.rs

use crate::config::{FactorizationStrategy, ScorerConfig};
use crate::diagnostics::orthogonality_error;
use crate::error::{Result, ScoringError};
use crate::linalg_backends::{BackendEigh, BackendSVD, LinAlgBackendProvider};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;
use sysinfo::System;

/// Tolerance for ||I - V^T V||_F when accepting externally supplied or loaded bases.
const ORTHONORMALITY_TOLERANCE: f64 = 1e-8;

/// Orthonormal feature-space directions fitted on a reference subset.
///
/// Columns are ordered by descending singular value of the reference matrix;
/// rank selection and scoring consume them in that order. A basis is never
/// mutated after construction, so it can be shared freely across threads.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubspaceBasis {
    /// Shape: (n_features, n_directions). Column j is the j-th direction.
    directions: Array2<f64>,
    /// Shape: (n_directions). Descending. Directions beyond the reference
    /// matrix's row count complete the basis and carry singular value 0.
    singular_values: Array1<f64>,
    /// Number of reference rows the basis was fitted on (0 if supplied externally).
    n_reference_rows: usize,
}

impl SubspaceBasis {
    /// Fits the basis from `reference` (rows = reference observations).
    ///
    /// Only the right singular directions are kept. The factorization route
    /// follows `config.factorization`; its working memory is estimated first
    /// and compared with `config.memory_ceiling_bytes` (or the host's available
    /// memory when unset).
    ///
    /// # Errors
    /// - `EmptyReferenceSet` if `reference` has no rows.
    /// - `EmptyFeatureSet` if it has no columns.
    /// - `NonFiniteInput` for NaN or infinite entries.
    /// - `ReferenceTooLarge` if no permitted route fits the memory budget.
    /// - `Factorization` if the backend fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use subspace_residual::{ScorerConfig, SubspaceBasis};
    ///
    /// let reference = array![[1.0, 0.1], [2.0, -0.1], [3.0, 0.05]];
    /// let basis = SubspaceBasis::fit(reference.view(), &ScorerConfig::default()).unwrap();
    /// assert_eq!(basis.n_features(), 2);
    /// assert_eq!(basis.n_directions(), 2);
    /// ```
    pub fn fit(reference: ArrayView2<f64>, config: &ScorerConfig) -> Result<Self> {
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

        let strategy = resolve_strategy(n_rows, n_features, config)?;
        info!(
            "Fitting subspace basis on {} reference rows x {} features using {:?}.",
            n_rows, n_features, strategy
        );
        let start_time = Instant::now();

        let (mut directions, singular_values) = match strategy {
            FactorizationStrategy::Covariance => factor_covariance(reference)?,
            _ => factor_svd(reference)?,
        };
        orient_directions(&mut directions);

        info!(
            "Fitted {} basis directions in {:?}.",
            directions.ncols(),
            start_time.elapsed()
        );
        debug!(
            "Leading singular values: {:?}",
            singular_values.iter().take(5).collect::<Vec<_>>()
        );

        Ok(Self {
            directions,
            singular_values,
            n_reference_rows: n_rows,
        })
    }

    /// Builds a basis from directions computed elsewhere.
    ///
    /// * `directions` - shape (n_features, n_directions), orthonormal columns.
    /// * `singular_values` - one per direction, non-negative and descending.
    pub fn from_directions(directions: Array2<f64>, singular_values: Array1<f64>) -> Result<Self> {
        let basis = Self {
            directions,
            singular_values,
            n_reference_rows: 0,
        };
        basis.validate()?;
        Ok(basis)
    }

    fn validate(&self) -> Result<()> {
        if self.directions.nrows() == 0 {
            return Err(ScoringError::EmptyFeatureSet);
        }
        if self.singular_values.len() != self.directions.ncols() {
            return Err(ScoringError::LengthMismatch {
                context: "singular values vs basis directions",
                expected: self.directions.ncols(),
                found: self.singular_values.len(),
            });
        }
        if self.directions.iter().chain(self.singular_values.iter()).any(|v| !v.is_finite()) {
            return Err(ScoringError::NonFiniteInput { context: "basis" });
        }
        let descending = self
            .singular_values
            .windows(2)
            .into_iter()
            .all(|pair| pair[0] >= pair[1]);
        if !descending || self.singular_values.iter().any(|&v| v < 0.0) {
            return Err(ScoringError::Factorization(
                "Singular values must be non-negative and in descending order.".into(),
            ));
        }
        let error = orthogonality_error(self.directions.view());
        if error > ORTHONORMALITY_TOLERANCE {
            return Err(ScoringError::Factorization(format!(
                "Basis directions are not orthonormal (||I - V^T V||_F = {:e}).",
                error
            )));
        }
        Ok(())
    }

    /// Feature dimensionality; matrices scored against this basis need this many columns.
    pub fn n_features(&self) -> usize {
        self.directions.nrows()
    }

    /// Number of directions, i.e. the highest valid rank.
    pub fn n_directions(&self) -> usize {
        self.directions.ncols()
    }

    pub fn n_reference_rows(&self) -> usize {
        self.n_reference_rows
    }

    /// Shape: (n_features, n_directions).
    pub fn directions(&self) -> ArrayView2<'_, f64> {
        self.directions.view()
    }

    /// The `index`-th direction (0-based).
    ///
    /// # Panics
    /// If `index >= n_directions()`.
    pub fn direction(&self, index: usize) -> ArrayView1<'_, f64> {
        self.directions.column(index)
    }

    pub fn singular_values(&self) -> ArrayView1<'_, f64> {
        self.singular_values.view()
    }

    /// Rejects rank 0 and ranks above `n_directions()`. Never clamps.
    pub fn check_rank(&self, rank: usize) -> Result<()> {
        if rank == 0 || rank > self.n_directions() {
            return Err(ScoringError::InvalidRank {
                requested: rank,
                max: self.n_directions(),
            });
        }
        Ok(())
    }

    pub fn check_features(&self, n_columns: usize) -> Result<()> {
        if n_columns != self.n_features() {
            return Err(ScoringError::DimensionMismatch {
                expected: self.n_features(),
                found: n_columns,
            });
        }
        Ok(())
    }

    /// Saves the basis with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            ScoringError::ModelIo(format!("Failed to create file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| ScoringError::ModelIo(format!("Failed to serialize basis: {}", e)))?;
        Ok(())
    }

    /// Loads a basis written by `save`, re-checking orthonormality and ordering.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            ScoringError::ModelIo(format!("Failed to open file at {:?}: {}", path.as_ref(), e))
        })?;
        let mut reader = BufReader::new(file);
        let basis: SubspaceBasis =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| ScoringError::ModelIo(format!("Failed to deserialize basis: {}", e)))?;
        basis.validate()?;
        Ok(basis)
    }
}

/// Approximate working set of a full-V SVD of an M x K matrix, in bytes:
/// the owned copy handed to LAPACK, the K x K V^T, the singular values and workspace.
pub fn svd_footprint_bytes(n_rows: usize, n_features: usize) -> u64 {
    let (m, k) = (n_rows as u64, n_features as u64);
    let workspace = 5 * (m + k);
    8 * (m * k + k * k + m.min(k) + workspace)
}

/// Approximate working set of the covariance route: X^T X, its eigenvectors and workspace.
pub fn covariance_footprint_bytes(n_features: usize) -> u64 {
    let k = n_features as u64;
    8 * (3 * k * k + 27 * k)
}

fn memory_limit_bytes(config: &ScorerConfig) -> Option<u64> {
    if let Some(ceiling) = config.memory_ceiling_bytes {
        return Some(ceiling);
    }
    let mut system = System::new();
    system.refresh_memory();
    match system.available_memory() {
        0 => {
            warn!("Could not determine available memory; factorization size is not bounded.");
            None
        }
        available => Some(available),
    }
}

fn resolve_strategy(
    n_rows: usize,
    n_features: usize,
    config: &ScorerConfig,
) -> Result<FactorizationStrategy> {
    let svd_bytes = svd_footprint_bytes(n_rows, n_features);
    let cov_bytes = covariance_footprint_bytes(n_features);
    let limit = memory_limit_bytes(config);
    let fits = |bytes: u64| limit.map_or(true, |l| bytes <= l);
    let too_large = |bytes: u64| ScoringError::ReferenceTooLarge {
        required_bytes: bytes,
        limit_bytes: limit.unwrap_or(u64::MAX),
    };

    match config.factorization {
        FactorizationStrategy::ThinSvd if fits(svd_bytes) => Ok(FactorizationStrategy::ThinSvd),
        FactorizationStrategy::ThinSvd => Err(too_large(svd_bytes)),
        FactorizationStrategy::Covariance if fits(cov_bytes) => Ok(FactorizationStrategy::Covariance),
        FactorizationStrategy::Covariance => Err(too_large(cov_bytes)),
        FactorizationStrategy::Auto => {
            if fits(svd_bytes) {
                Ok(FactorizationStrategy::ThinSvd)
            } else if fits(cov_bytes) {
                debug!(
                    "SVD would need ~{} bytes; falling back to the covariance route (~{} bytes).",
                    svd_bytes, cov_bytes
                );
                Ok(FactorizationStrategy::Covariance)
            } else {
                Err(too_large(cov_bytes.min(svd_bytes)))
            }
        }
    }
}

fn factor_svd(reference: ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_features = reference.ncols();
    let output = LinAlgBackendProvider::<f64>::new()
        .svd_into(reference.to_owned(), false, true)
        .map_err(|e| ScoringError::Factorization(e.to_string()))?;
    let vt = output
        .vt
        .ok_or_else(|| ScoringError::Factorization("Backend returned no right singular vectors.".into()))?;

    let directions = vt.t().to_owned();
    let mut singular_values = Array1::<f64>::zeros(directions.ncols());
    let n_computed = output.s.len().min(n_features).min(directions.ncols());
    singular_values
        .slice_mut(s![..n_computed])
        .assign(&output.s.slice(s![..n_computed]));
    Ok((directions, singular_values))
}

fn factor_covariance(reference: ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let n_features = reference.ncols();
    let gram = reference.t().dot(&reference);
    let eig = LinAlgBackendProvider::<f64>::new()
        .eigh_upper(&gram)
        .map_err(|e| ScoringError::Factorization(e.to_string()))?;

    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let mut directions = Array2::<f64>::zeros((n_features, order.len()));
    let mut singular_values = Array1::<f64>::zeros(order.len());
    for (target, &source) in order.iter().enumerate() {
        // Eigenvalues of X^T X are squared singular values of X.
        singular_values[target] = eig.eigenvalues[source].max(0.0).sqrt();
        let mut column = eig.eigenvectors.column(source).to_owned();
        let norm = column.dot(&column).sqrt();
        if norm > 1e-12 {
            column.mapv_inplace(|x| x / norm);
        }
        directions.column_mut(target).assign(&column);
    }
    Ok((directions, singular_values))
}

/// Flips each direction so its largest-magnitude component is positive.
/// Residuals do not depend on sign.
fn orient_directions(directions: &mut Array2<f64>) {
    for mut column in directions.axis_iter_mut(Axis(1)) {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            column.mapv_inplace(|v| -v);
        }
    }
}
