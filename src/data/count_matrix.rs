//! Raw read-count matrix (genes x samples)

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{DeError, Result};

/// Return the first identifier that occurs more than once
fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(ids.len());
    ids.iter().map(|s| s.as_str()).find(|id| !seen.insert(id))
}

fn is_count(v: f64) -> bool {
    v.is_finite() && v >= 0.0 && v.fract() == 0.0
}

/// Raw sequencing read counts.
/// Rows are genes, columns are samples. Values are non-negative integers
/// stored as `f64` so the numerical stages can borrow them directly.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a count matrix, validating shape, identifiers and values
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        if n_genes == 0 || n_samples == 0 {
            return Err(DeError::EmptyData {
                reason: format!("count matrix is {} x {}", n_genes, n_samples),
            });
        }

        if let Some(dup) = first_duplicate(&gene_ids) {
            return Err(DeError::InvalidCountMatrix {
                reason: format!("duplicate gene identifier '{}'", dup),
            });
        }
        if let Some(dup) = first_duplicate(&sample_ids) {
            return Err(DeError::InvalidCountMatrix {
                reason: format!("duplicate sample identifier '{}'", dup),
            });
        }

        if let Some(((g, s), v)) = counts.indexed_iter().find(|(_, v)| !is_count(**v)) {
            return Err(DeError::InvalidCountMatrix {
                reason: format!(
                    "count for gene '{}' in sample '{}' is {}; counts must be non-negative integers",
                    gene_ids[g], sample_ids[s], v
                ),
            });
        }

        if counts.iter().all(|&x| x == 0.0) {
            return Err(DeError::InvalidCountMatrix {
                reason: "all samples have 0 counts for all genes".to_string(),
            });
        }

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts for one gene across all samples
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Keep the given columns, in the given order
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(1), sample_indices);
        let sample_ids = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();
        Self::new(counts, self.gene_ids.clone(), sample_ids)
    }

    /// Keep the named columns, in the given order
    pub fn select_samples(&self, ids: &[String]) -> Result<Self> {
        let indices = ids
            .iter()
            .map(|id| {
                self.sample_index(id).ok_or_else(|| DeError::InvalidInput {
                    reason: format!("sample '{}' is not a column of the count matrix", id),
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        self.subset_samples(&indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix = CountMatrix::new(counts, ids("g", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.gene_counts(1).sum(), 45.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CountMatrix::new(array![[10.0, -5.0], [5.0, 15.0]], ids("g", 2), ids("s", 2)).is_err());
        assert!(CountMatrix::new(array![[10.5, 5.0], [5.0, 15.0]], ids("g", 2), ids("s", 2)).is_err());
        assert!(CountMatrix::new(array![[f64::NAN, 5.0], [5.0, 15.0]], ids("g", 2), ids("s", 2)).is_err());
        assert!(CountMatrix::new(array![[0.0, 0.0], [0.0, 0.0]], ids("g", 2), ids("s", 2)).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let genes = vec!["g1".to_string(), "g1".to_string()];
        let err = CountMatrix::new(array![[1.0, 2.0], [3.0, 4.0]], genes, ids("s", 2)).unwrap_err();
        assert!(err.to_string().contains("g1"));

        let samples = vec!["s1".to_string(), "s1".to_string()];
        assert!(CountMatrix::new(array![[1.0, 2.0], [3.0, 4.0]], ids("g", 2), samples).is_err());
    }

    #[test]
    fn test_select_samples_reorders() {
        let counts = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let matrix = CountMatrix::new(counts, ids("g", 2), ids("s", 3)).unwrap();
        let picked = matrix
            .select_samples(&["s3".to_string(), "s1".to_string()])
            .unwrap();
        assert_eq!(picked.sample_ids(), &["s3".to_string(), "s1".to_string()]);
        assert_eq!(picked.counts(), array![[3.0, 1.0], [6.0, 4.0]]);

        assert!(matrix.select_samples(&["s9".to_string()]).is_err());
    }
}
