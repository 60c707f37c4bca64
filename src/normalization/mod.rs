//! Library-size normalization

mod counts;
mod size_factors;

pub use counts::{base_means, base_variances, normalized_counts};
pub use size_factors::{estimate_size_factors, SizeFactorMethod};
