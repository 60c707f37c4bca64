//! Error types for t1d_deseq

use thiserror::Error;

/// Main error type for the reconciliation and differential expression pipeline
#[derive(Error, Debug)]
pub enum DeError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("No samples to analyze: {reason}")]
    NoMatchingSamples { reason: String },

    #[error("fewer than 2 samples in group {group} (found {n})")]
    InsufficientReplicates { group: String, n: usize },

    #[error("Size factor estimation failed: {reason}")]
    SizeFactorFailed { reason: String },

    #[error("Trend fitting failed: {reason}")]
    TrendFittingFailed { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    RegexError(#[from] regex::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, DeError>;
