// src/scorer.rs

//! Residual scoring against a fitted basis and AUC-driven rank selection.
//!
//! For a row `x` and the first `N` basis directions `v_1..v_N`, the projected
//! energy is `sum_j (x . v_j)^2` and the residual score is `|x|^2` minus that
//! energy. Larger residuals mean the row is less well explained by the
//! reference subspace.

use crate::basis::SubspaceBasis;
use crate::diagnostics::RankSweepEntry;
use crate::error::{Result, ScoringError};
use crate::metrics::roc_auc;
use log::{debug, info, warn};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Squared Euclidean norm of every row.
pub fn row_norms(matrix: ArrayView2<f64>) -> Array1<f64> {
    Zip::from(matrix.rows()).par_map_collect(|row| row.dot(&row))
}

/// Cumulative projected energy of a matrix's rows, grown one basis direction at a time.
///
/// Moving from rank `N` to `N + 1` costs a single matrix-vector product, so a
/// sweep over ranks `1..=R` does `R` products in total instead of `R(R+1)/2`.
#[derive(Debug, Clone)]
pub struct EnergyAccumulator<'a, 'b> {
    matrix: ArrayView2<'a, f64>,
    basis: &'b SubspaceBasis,
    energy: Array1<f64>,
    rank: usize,
}

impl<'a, 'b> EnergyAccumulator<'a, 'b> {
    /// Starts at rank 0 (all energies zero).
    ///
    /// # Errors
    /// `DimensionMismatch` if `matrix` has a different column count than the basis,
    /// `NonFiniteInput` if it holds NaN or infinite entries.
    pub fn new(matrix: ArrayView2<'a, f64>, basis: &'b SubspaceBasis) -> Result<Self> {
        basis.check_features(matrix.ncols())?;
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::NonFiniteInput { context: "scored matrix" });
        }
        Ok(Self {
            matrix,
            basis,
            energy: Array1::zeros(matrix.nrows()),
            rank: 0,
        })
    }

    /// Number of directions accumulated so far.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn energy(&self) -> ArrayView1<'_, f64> {
        self.energy.view()
    }

    /// Adds the next direction and returns the updated energies.
    ///
    /// # Errors
    /// `InvalidRank` once every direction has been added.
    pub fn advance(&mut self) -> Result<ArrayView1<'_, f64>> {
        let next_rank = self.rank + 1;
        self.basis.check_rank(next_rank)?;
        let projection = self.matrix.dot(&self.basis.direction(self.rank));
        Zip::from(&mut self.energy)
            .and(&projection)
            .for_each(|energy, &p| *energy += p * p);
        self.rank = next_rank;
        Ok(self.energy.view())
    }

    /// Moves to `rank`, restarting from zero only if `rank` is below the current one.
    ///
    /// # Errors
    /// `InvalidRank` if `rank` is 0 or exceeds the basis dimensionality.
    pub fn advance_to(&mut self, rank: usize) -> Result<ArrayView1<'_, f64>> {
        self.basis.check_rank(rank)?;
        if rank < self.rank {
            self.energy.fill(0.0);
            self.rank = 0;
        }
        while self.rank < rank {
            self.advance()?;
        }
        Ok(self.energy.view())
    }

    pub fn into_energy(self) -> Array1<f64> {
        self.energy
    }
}

/// Squared length of each row's projection onto the span of the first `rank` directions.
///
/// # Errors
/// `InvalidRank` for rank 0 or above the basis dimensionality,
/// `DimensionMismatch` for a column count that differs from the basis,
/// `NonFiniteInput` for NaN or infinite entries.
pub fn projected_energy_at_rank(
    matrix: ArrayView2<f64>,
    basis: &SubspaceBasis,
    rank: usize,
) -> Result<Array1<f64>> {
    basis.check_rank(rank)?;
    let mut accumulator = EnergyAccumulator::new(matrix, basis)?;
    accumulator.advance_to(rank)?;
    Ok(accumulator.into_energy())
}

/// Reconstruction-error score of every row at a fixed rank.
///
/// Same errors as [`projected_energy_at_rank`]; ranks are never clamped.
///
/// # Examples
///
/// ```
/// use ndarray::{array, Array2};
/// use subspace_residual::{residual_scores, SubspaceBasis};
///
/// let basis = SubspaceBasis::from_directions(Array2::eye(2), array![2.0, 1.0]).unwrap();
/// let rows = array![[3.0, 4.0]];
/// let scores = residual_scores(rows.view(), &basis, 1).unwrap();
/// assert_eq!(scores[0], 16.0);
/// ```
pub fn residual_scores(
    matrix: ArrayView2<f64>,
    basis: &SubspaceBasis,
    rank: usize,
) -> Result<Array1<f64>> {
    let energy = projected_energy_at_rank(matrix, basis, rank)?;
    Ok(row_norms(matrix) - energy)
}

/// Outcome of a rank sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankSelection {
    /// Selected rank N*.
    pub rank: usize,
    /// AUC of the residual scores at `rank` on the selection rows.
    pub auc: f64,
    /// One entry per candidate rank, in ascending rank order.
    pub sweep: Vec<RankSweepEntry>,
}

/// Picks the rank in `1..=max_rank` whose residual scores give the highest AUC
/// on the evaluation rows.
///
/// `max_rank` is capped at the basis dimensionality. When several ranks share
/// the maximal AUC, the smallest of them wins: a later rank replaces the
/// current best only if its AUC is strictly greater.
///
/// Only `eval_matrix` and `eval_labels` are consulted, so the caller decides
/// exactly which rows may influence the choice.
///
/// # Errors
/// - `InvalidRank` if `max_rank` is 0.
/// - `LengthMismatch` if labels and rows are not aligned.
/// - `DimensionMismatch` if the column count differs from the basis.
/// - `NonFiniteInput` if the evaluation rows hold NaN or infinite entries.
/// - `DegenerateLabelSet` if the labels hold a single class; no rank is chosen.
pub fn select_rank(
    eval_matrix: ArrayView2<f64>,
    eval_labels: ArrayView1<bool>,
    basis: &SubspaceBasis,
    max_rank: usize,
) -> Result<RankSelection> {
    if max_rank == 0 {
        return Err(ScoringError::InvalidRank {
            requested: 0,
            max: basis.n_directions(),
        });
    }
    let mut accumulator = EnergyAccumulator::new(eval_matrix, basis)?;
    if eval_labels.len() != eval_matrix.nrows() {
        return Err(ScoringError::LengthMismatch {
            context: "evaluation labels vs evaluation rows",
            expected: eval_matrix.nrows(),
            found: eval_labels.len(),
        });
    }
    let positives = eval_labels.iter().filter(|&&l| l).count();
    let negatives = eval_labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ScoringError::DegenerateLabelSet { positives, negatives });
    }

    let highest_rank = max_rank.min(basis.n_directions());
    if highest_rank < max_rank {
        warn!(
            "max_rank {} exceeds the basis dimensionality; sweeping ranks 1..={} instead.",
            max_rank, highest_rank
        );
    }

    let norms = row_norms(eval_matrix);
    let mut sweep = Vec::with_capacity(highest_rank);
    let mut best: Option<(usize, f64)> = None;
    for rank in 1..=highest_rank {
        let residuals = &norms - &accumulator.advance()?;
        let auc = roc_auc(eval_labels, residuals.view())?;
        debug!("Rank {}: AUC = {:.6}", rank, auc);
        sweep.push(RankSweepEntry::new(rank, auc, residuals.view()));

        if best.map_or(true, |(_, best_auc)| auc > best_auc) {
            best = Some((rank, auc));
        }
    }

    // highest_rank >= 1, so the loop ran at least once.
    let (rank, auc) = best.ok_or(ScoringError::InvalidRank {
        requested: max_rank,
        max: basis.n_directions(),
    })?;
    info!(
        "Selected rank {} of {} candidates (AUC = {:.6}) on {} evaluation rows.",
        rank,
        highest_rank,
        auc,
        eval_matrix.nrows()
    );
    Ok(RankSelection { rank, auc, sweep })
}
