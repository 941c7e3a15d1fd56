// src/error.rs

use thiserror::Error;

/// Every failure the scoring core can report.
///
/// None of these are recoverable inside the crate; they are contract
/// violations by the caller or computations that are genuinely undefined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// The label set has only one class, so AUC is undefined.
    #[error("AUC is undefined: label set has {positives} positive and {negatives} negative rows; both classes are required.")]
    DegenerateLabelSet { positives: usize, negatives: usize },

    #[error("Cannot fit a subspace basis: the reference matrix has zero rows.")]
    EmptyReferenceSet,

    #[error("Matrix has zero feature columns.")]
    EmptyFeatureSet,

    /// A requested rank is zero or larger than the number of basis directions.
    #[error("Invalid rank {requested}: must be between 1 and the basis dimensionality ({max}).")]
    InvalidRank { requested: usize, max: usize },

    /// Matrix column count disagrees with the basis (or preprocessor) feature dimension.
    #[error("Dimension mismatch: expected {expected} feature columns, found {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    /// Two structures that must be aligned row-for-row have different lengths.
    #[error("Length mismatch for {context}: expected {expected}, found {found}.")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Non-finite value (NaN or infinity) found in {context}.")]
    NonFiniteInput { context: &'static str },

    #[error("Label at index {index} is {value}; binary labels must be exactly 0 or 1.")]
    NonBinaryLabel { index: usize, value: f64 },

    /// The factorization would not fit in the memory budget.
    #[error("Reference matrix too large to factor: needs about {required_bytes} bytes, limit is {limit_bytes} bytes.")]
    ReferenceTooLarge { required_bytes: u64, limit_bytes: u64 },

    #[error("Factorization failed: {0}")]
    Factorization(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Model I/O failed: {0}")]
    ModelIo(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ScoringError>;
