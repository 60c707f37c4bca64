//! Size factor estimation using the median of ratios method

use ndarray::{Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::stats::{cmp_f64, median};

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeFactorMethod {
    /// Median of ratios against the geometric mean of genes with no zeros
    #[default]
    Ratio,
    /// Geometric mean over positive counts only; for matrices where every gene has a zero
    PosCounts,
}

impl std::str::FromStr for SizeFactorMethod {
    type Err = DeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ratio" => Ok(SizeFactorMethod::Ratio),
            "poscounts" => Ok(SizeFactorMethod::PosCounts),
            other => Err(DeError::InvalidConfig {
                reason: format!("unknown size factor method '{}' (use ratio or poscounts)", other),
            }),
        }
    }
}

/// Sum of logs taken in sorted order so the result does not depend on column order
fn order_free_sum(mut logs: Vec<f64>) -> f64 {
    logs.sort_by(cmp_f64);
    logs.iter().sum()
}

/// Estimate one size factor per sample.
///
/// Genes whose reference is undefined are left out of the medians only;
/// they stay in the count matrix for every later stage.
pub fn estimate_size_factors(counts: ArrayView2<f64>, method: SizeFactorMethod) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(DeError::EmptyData {
            reason: "count matrix is empty".to_string(),
        });
    }

    let log_geo_means: Vec<f64> = counts
        .axis_iter(Axis(0))
        .map(|row| match method {
            SizeFactorMethod::Ratio => {
                if row.iter().any(|&x| x <= 0.0) {
                    f64::NEG_INFINITY
                } else {
                    order_free_sum(row.iter().map(|&x| x.ln()).collect()) / n_samples as f64
                }
            }
            SizeFactorMethod::PosCounts => {
                let logs: Vec<f64> = row.iter().filter(|&&x| x > 0.0).map(|&x| x.ln()).collect();
                if logs.is_empty() {
                    f64::NEG_INFINITY
                } else {
                    order_free_sum(logs) / n_samples as f64
                }
            }
        })
        .collect();

    let n_reference = log_geo_means.iter().filter(|v| v.is_finite()).count();
    if n_reference == 0 {
        return Err(DeError::SizeFactorFailed {
            reason: match method {
                SizeFactorMethod::Ratio => {
                    "every gene contains at least one zero; use the poscounts method".to_string()
                }
                SizeFactorMethod::PosCounts => "no gene has a positive count".to_string(),
            },
        });
    }
    log::debug!("{} of {} genes define the size factor reference", n_reference, n_genes);

    let mut size_factors = Array1::zeros(n_samples);
    for (j, column) in counts.axis_iter(Axis(1)).enumerate() {
        let log_ratios: Vec<f64> = column
            .iter()
            .zip(&log_geo_means)
            .filter(|(&y, lgm)| lgm.is_finite() && y > 0.0)
            .map(|(&y, &lgm)| y.ln() - lgm)
            .collect();
        if log_ratios.is_empty() {
            return Err(DeError::SizeFactorFailed {
                reason: format!("sample {} has no positive count among reference genes", j + 1),
            });
        }
        size_factors[j] = median(&log_ratios).exp();
    }

    if method == SizeFactorMethod::PosCounts {
        // centre so the size factors have geometric mean 1
        let centre = order_free_sum(size_factors.iter().map(|s: &f64| s.ln()).collect()) / n_samples as f64;
        size_factors.mapv_inplace(|s| (s.ln() - centre).exp());
    }

    if size_factors.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
        return Err(DeError::SizeFactorFailed {
            reason: "non-positive or non-finite size factor".to_string(),
        });
    }

    Ok(size_factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_scaled_library_recovers_factor() {
        // sample 2 is sample 1 sequenced twice as deep
        let counts = array![[10.0, 20.0], [40.0, 80.0], [7.0, 14.0]];
        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap();
        assert_relative_eq!(sf[1] / sf[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(sf[0] * sf[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_genes_excluded_from_median_only() {
        let counts = array![[10.0, 20.0, 30.0], [0.0, 5.0, 9.0], [40.0, 80.0, 120.0]];
        let with_zero = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap();
        let without = estimate_size_factors(
            array![[10.0, 20.0, 30.0], [40.0, 80.0, 120.0]].view(),
            SizeFactorMethod::Ratio,
        )
        .unwrap();
        assert_eq!(with_zero, without);
    }

    #[test]
    fn test_positive_and_order_invariant() {
        let counts = Array2::from_shape_fn((40, 6), |(i, j)| ((i * 7 + j * 13) % 50 + 1 + i * j) as f64);
        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::Ratio).unwrap();
        assert!(sf.iter().all(|&s| s > 0.0));

        let order = [4, 1, 5, 0, 3, 2];
        let permuted = counts.select(Axis(1), &order);
        let sf_perm = estimate_size_factors(permuted.view(), SizeFactorMethod::Ratio).unwrap();
        for (k, &j) in order.iter().enumerate() {
            assert_eq!(sf_perm[k], sf[j]);
        }
    }

    #[test]
    fn test_all_genes_with_zero() {
        let counts = array![[0.0, 5.0, 3.0], [4.0, 0.0, 2.0], [6.0, 8.0, 0.0]];
        assert!(matches!(
            estimate_size_factors(counts.view(), SizeFactorMethod::Ratio),
            Err(DeError::SizeFactorFailed { .. })
        ));
        let sf = estimate_size_factors(counts.view(), SizeFactorMethod::PosCounts).unwrap();
        let log_mean: f64 = sf.iter().map(|s| s.ln()).sum::<f64>() / 3.0;
        assert_relative_eq!(log_mean, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("ratio".parse::<SizeFactorMethod>().unwrap(), SizeFactorMethod::Ratio);
        assert_eq!("poscounts".parse::<SizeFactorMethod>().unwrap(), SizeFactorMethod::PosCounts);
        assert!("iterate".parse::<SizeFactorMethod>().is_err());
    }
}
