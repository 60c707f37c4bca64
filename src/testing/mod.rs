//! Statistical testing for differential expression

mod fdr;
mod lrt;
mod pvalue;
mod wald;

pub use fdr::benjamini_hochberg;
pub use lrt::{likelihood_ratio_tests, lrt_test};
pub use pvalue::{chi_squared_upper, normal_two_sided};
pub use wald::{wald_test, wald_tests};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};

/// Which test produces the p-values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    /// Wald test on the condition coefficient
    #[default]
    Wald,
    /// Likelihood ratio test against the intercept-only model
    Lrt,
}

impl FromStr for TestKind {
    type Err = DeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wald" => Ok(Self::Wald),
            "lrt" => Ok(Self::Lrt),
            other => Err(DeError::InvalidConfig {
                reason: format!("unknown test '{}' (expected wald or lrt)", other),
            }),
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wald => write!(f, "Wald"),
            Self::Lrt => write!(f, "LRT"),
        }
    }
}

/// Per-gene outcome of either test. Fold changes are log2 of
/// positive group over negative group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub log2_fold_change: f64,
    pub lfc_se: f64,
    pub stat: f64,
    pub pvalue: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("wald".parse::<TestKind>().unwrap(), TestKind::Wald);
        assert_eq!("LRT".parse::<TestKind>().unwrap(), TestKind::Lrt);
        assert!("t".parse::<TestKind>().is_err());
        assert_eq!(TestKind::default(), TestKind::Wald);
    }
}
