// Reconstruction-error anomaly scoring against a low-rank subspace

#![doc = include_str!("../README.md")]

pub mod basis;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod linalg_backends;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod scorer;

#[cfg(test)]
mod scorer_tests;

pub use basis::SubspaceBasis;
pub use config::{FactorizationStrategy, Preprocessing, ScorerConfig};
pub use diagnostics::{BasisDiagnostics, RankSweepEntry};
pub use error::{Result, ScoringError};
pub use metrics::{labels_from_binary, roc_auc};
pub use pipeline::{Partition, PartitionReport, PipelineReport, ReconstructionPipeline};
pub use preprocess::FittedPreprocessor;
pub use scorer::{
    projected_energy_at_rank, residual_scores, row_norms, select_rank, EnergyAccumulator,
    RankSelection,
};
