//! P-value calculation from test statistics

use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Two-sided p-value of a standard normal statistic, `2 * P(Z > |z|)`
pub fn normal_two_sided(z: f64) -> Option<f64> {
    if !z.is_finite() {
        return None;
    }
    let normal = Normal::new(0.0, 1.0).ok()?;
    Some(2.0 * normal.cdf(-z.abs()))
}

/// Upper tail of the chi-squared distribution with `df` degrees of freedom
pub fn chi_squared_upper(stat: f64, df: f64) -> Option<f64> {
    if !stat.is_finite() || df <= 0.0 {
        return None;
    }
    let dist = ChiSquared::new(df).ok()?;
    Some(dist.sf(stat.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normal_pvalue() {
        assert_relative_eq!(normal_two_sided(0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(normal_two_sided(1.959964).unwrap(), 0.05, epsilon = 1e-6);
        assert_eq!(normal_two_sided(2.0), normal_two_sided(-2.0));
        assert!(normal_two_sided(f64::NAN).is_none());
    }

    #[test]
    fn test_chi_squared_pvalue() {
        assert_relative_eq!(chi_squared_upper(3.841459, 1.0).unwrap(), 0.05, epsilon = 1e-6);
        assert_relative_eq!(chi_squared_upper(0.0, 1.0).unwrap(), 1.0, epsilon = 1e-12);
        // small negative statistics from rounding count as zero
        assert_relative_eq!(chi_squared_upper(-1e-12, 1.0).unwrap(), 1.0, epsilon = 1e-12);
        assert!(chi_squared_upper(1.0, 0.0).is_none());
    }

    #[test]
    fn test_wald_and_lrt_agree_for_one_df() {
        // z^2 ~ chi2(1)
        let z = 2.3;
        assert_relative_eq!(normal_two_sided(z).unwrap(), chi_squared_upper(z * z, 1.0).unwrap(), epsilon = 1e-9);
    }
}
