//! Size-factor normalized counts and per-gene moments

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{DeError, Result};

fn check_lengths(n_samples: usize, size_factors: ArrayView1<f64>) -> Result<()> {
    if size_factors.len() != n_samples {
        return Err(DeError::DimensionMismatch {
            expected: format!("{} size factors", n_samples),
            got: format!("{} size factors", size_factors.len()),
        });
    }
    Ok(())
}

/// Counts divided column-wise by the size factors
pub fn normalized_counts(counts: ArrayView2<f64>, size_factors: ArrayView1<f64>) -> Result<Array2<f64>> {
    check_lengths(counts.ncols(), size_factors)?;
    Ok(&counts / &size_factors.insert_axis(Axis(0)))
}

/// Mean of normalized counts per gene
pub fn base_means(normalized: ArrayView2<f64>) -> Array1<f64> {
    normalized.map_axis(Axis(1), |row| row.mean().unwrap_or(0.0))
}

/// Sample variance (n - 1 denominator) of normalized counts per gene
pub fn base_variances(normalized: ArrayView2<f64>) -> Array1<f64> {
    normalized.map_axis(Axis(1), |row| if row.len() > 1 { row.var(1.0) } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_normalized_counts() {
        let counts = array![[10.0, 40.0], [4.0, 8.0]];
        let sf = array![0.5, 2.0];
        let norm = normalized_counts(counts.view(), sf.view()).unwrap();
        assert_eq!(norm, array![[20.0, 20.0], [8.0, 4.0]]);

        let means = base_means(norm.view());
        assert_relative_eq!(means[0], 20.0);
        assert_relative_eq!(means[1], 6.0);
        let vars = base_variances(norm.view());
        assert_relative_eq!(vars[0], 0.0);
        assert_relative_eq!(vars[1], 8.0);
    }

    #[test]
    fn test_length_mismatch() {
        let counts = array![[1.0, 2.0, 3.0]];
        assert!(normalized_counts(counts.view(), array![1.0, 1.0].view()).is_err());
    }
}
