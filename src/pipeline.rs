// src/pipeline.rs

use crate::basis::SubspaceBasis;
use crate::config::ScorerConfig;
use crate::diagnostics::BasisDiagnostics;
use crate::error::{Result, ScoringError};
use crate::metrics::roc_auc;
use crate::preprocess::FittedPreprocessor;
use crate::scorer::{residual_scores, select_rank, RankSelection};
use log::{info, warn};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Row indices of the training and held-out partitions of a design matrix.
///
/// The basis is fitted on the negative rows of `train`, the rank is selected
/// on all of `train`, and `test` is only ever scored at the selected rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Partition {
    pub fn new(train: Vec<usize>, test: Vec<usize>) -> Self {
        Self { train, test }
    }

    /// Checks that every index is below `n_rows`, that no index repeats, and
    /// that both partitions are non-empty.
    pub fn validate(&self, n_rows: usize) -> Result<()> {
        if self.train.is_empty() || self.test.is_empty() {
            return Err(ScoringError::InvalidPartition(format!(
                "train ({} rows) and test ({} rows) must both be non-empty",
                self.train.len(),
                self.test.len()
            )));
        }
        let mut seen = vec![false; n_rows];
        for &index in self.train.iter().chain(self.test.iter()) {
            if index >= n_rows {
                return Err(ScoringError::InvalidPartition(format!(
                    "row index {} is out of range for {} rows",
                    index, n_rows
                )));
            }
            if std::mem::replace(&mut seen[index], true) {
                return Err(ScoringError::InvalidPartition(format!(
                    "row index {} appears more than once",
                    index
                )));
            }
        }
        Ok(())
    }
}

/// Residual scores and AUC for one partition at the selected rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionReport {
    /// Design-matrix row index of each score.
    pub rows: Vec<usize>,
    pub scores: Array1<f64>,
    /// `None` when the partition holds a single class.
    pub auc: Option<f64>,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub preprocessor: FittedPreprocessor,
    pub basis: SubspaceBasis,
    pub basis_diagnostics: BasisDiagnostics,
    pub selection: RankSelection,
    pub train: PartitionReport,
    pub test: PartitionReport,
}

/// Fit, select and score in one call, keeping the three row populations apart.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionPipeline {
    config: ScorerConfig,
}

impl ReconstructionPipeline {
    pub fn new(config: ScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Runs the full procedure on `design` with aligned `labels`.
    ///
    /// 1. Reference rows = training rows labelled negative.
    /// 2. Preprocessing statistics and the basis are fitted on the reference rows.
    /// 3. The rank is selected on every training row, both classes included.
    /// 4. Training and test rows are scored at that rank.
    ///
    /// A test partition with a single class is still scored; its AUC is `None`.
    ///
    /// # Errors
    /// Any `ScoringError` from the steps above; `EmptyReferenceSet` if the
    /// training partition has no negative rows, `DegenerateLabelSet` if the
    /// training partition holds a single class.
    pub fn run(
        &self,
        design: ArrayView2<f64>,
        labels: ArrayView1<bool>,
        partition: &Partition,
    ) -> Result<PipelineReport> {
        if labels.len() != design.nrows() {
            return Err(ScoringError::LengthMismatch {
                context: "labels vs design-matrix rows",
                expected: design.nrows(),
                found: labels.len(),
            });
        }
        partition.validate(design.nrows())?;
        let start_time = Instant::now();

        let train_matrix = design.select(Axis(0), &partition.train);
        let train_labels = labels.select(Axis(0), &partition.train);
        let test_matrix = design.select(Axis(0), &partition.test);
        let test_labels = labels.select(Axis(0), &partition.test);

        let reference_rows: Vec<usize> = partition
            .train
            .iter()
            .copied()
            .filter(|&row| !labels[row])
            .collect();
        let reference = design.select(Axis(0), &reference_rows);
        info!(
            "Pipeline: {} reference rows, {} training rows, {} test rows, {} features.",
            reference_rows.len(),
            partition.train.len(),
            partition.test.len(),
            design.ncols()
        );

        let preprocessor = FittedPreprocessor::fit(reference.view(), self.config.preprocessing)?;
        let basis = SubspaceBasis::fit(preprocessor.transform(reference.view())?.view(), &self.config)?;

        let train_prepared = preprocessor.transform(train_matrix.view())?;
        let test_prepared = preprocessor.transform(test_matrix.view())?;
        let selection = select_rank(
            train_prepared.view(),
            train_labels.view(),
            &basis,
            self.config.max_rank,
        )?;

        // Scoring only reads the basis, so both partitions can run side by side.
        let (train_result, test_result) = rayon::join(
            || score_partition(train_prepared.view(), train_labels.view(), &basis, selection.rank),
            || score_partition(test_prepared.view(), test_labels.view(), &basis, selection.rank),
        );
        let (train_scores, train_auc) = train_result?;
        let (test_scores, test_auc) = test_result?;

        for (name, scores) in [("train", &train_scores), ("test", &test_scores)] {
            let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
            if min < -self.config.residual_tolerance {
                warn!(
                    "Smallest {} residual is {:e}, below -{:e}; expect numerical trouble.",
                    name, min, self.config.residual_tolerance
                );
            }
        }

        info!(
            "Pipeline finished in {:?}: rank {}, train AUC {}, test AUC {}.",
            start_time.elapsed(),
            selection.rank,
            format_auc(train_auc),
            format_auc(test_auc)
        );

        Ok(PipelineReport {
            preprocessor,
            basis_diagnostics: BasisDiagnostics::from_basis(&basis),
            basis,
            selection,
            train: PartitionReport {
                rows: partition.train.clone(),
                scores: train_scores,
                auc: train_auc,
            },
            test: PartitionReport {
                rows: partition.test.clone(),
                scores: test_scores,
                auc: test_auc,
            },
        })
    }
}

fn score_partition(
    matrix: ArrayView2<f64>,
    labels: ArrayView1<bool>,
    basis: &SubspaceBasis,
    rank: usize,
) -> Result<(Array1<f64>, Option<f64>)> {
    let scores = residual_scores(matrix, basis, rank)?;
    let auc = match roc_auc(labels, scores.view()) {
        Ok(auc) => Some(auc),
        Err(ScoringError::DegenerateLabelSet { positives, negatives }) => {
            warn!(
                "Partition has {} positive and {} negative rows; AUC is not reported.",
                positives, negatives
            );
            None
        }
        Err(e) => return Err(e),
    };
    Ok((scores, auc))
}

fn format_auc(auc: Option<f64>) -> String {
    auc.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}
