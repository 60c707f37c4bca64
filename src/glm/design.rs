//! Design matrices for the two-group comparison

use ndarray::{Array2, ArrayView2};

use crate::data::{Group, GroupLabels};
use crate::error::{DeError, Result};

/// Model matrix plus coefficient names
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    matrix: Array2<f64>,
    coef_names: Vec<String>,
}

impl Design {
    /// `~ condition` with the negative group as reference:
    /// column 0 is the intercept, column 1 indicates the positive group.
    pub fn two_group(groups: &[Group], labels: &GroupLabels) -> Result<Self> {
        let n_pos = groups.iter().filter(|g| g.is_positive()).count();
        if n_pos == 0 || n_pos == groups.len() {
            return Err(DeError::InvalidInput {
                reason: format!(
                    "design needs samples from both {} and {}",
                    labels.positive, labels.negative
                ),
            });
        }
        let matrix = Array2::from_shape_fn((groups.len(), 2), |(i, j)| match j {
            0 => 1.0,
            _ if groups[i].is_positive() => 1.0,
            _ => 0.0,
        });
        Ok(Self {
            matrix,
            coef_names: vec![
                "Intercept".to_string(),
                format!("condition_{}_vs_{}", labels.positive, labels.negative),
            ],
        })
    }

    /// `~ 1`, the reduced model of the likelihood ratio test
    pub fn intercept_only(n_samples: usize) -> Self {
        Self {
            matrix: Array2::ones((n_samples, 1)),
            coef_names: vec!["Intercept".to_string()],
        }
    }

    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn coef_names(&self) -> &[String] {
        &self.coef_names
    }

    /// Samples grouped by identical design rows, in order of first appearance
    pub fn cells(&self) -> Vec<Vec<usize>> {
        let mut patterns: Vec<Vec<f64>> = Vec::new();
        let mut cells: Vec<Vec<usize>> = Vec::new();
        for (i, row) in self.matrix.outer_iter().enumerate() {
            let row = row.to_vec();
            match patterns.iter().position(|p| *p == row) {
                Some(c) => cells[c].push(i),
                None => {
                    patterns.push(row);
                    cells.push(vec![i]);
                }
            }
        }
        cells
    }

    /// True when every cell has its own coefficient, so fitted means are cell means
    pub fn is_group_model(&self) -> bool {
        self.cells().len() == self.n_coefs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Group::{Negative as N, Positive as P};

    #[test]
    fn test_two_group_design() {
        let design = Design::two_group(&[P, N, N, P], &GroupLabels::default()).unwrap();
        assert_eq!(design.matrix().column(0).to_vec(), vec![1.0; 4]);
        assert_eq!(design.matrix().column(1).to_vec(), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(design.coef_names()[1], "condition_T1D_vs_Healthy");
        assert_eq!(design.cells(), vec![vec![0, 3], vec![1, 2]]);
        assert!(design.is_group_model());
    }

    #[test]
    fn test_single_group_rejected() {
        assert!(Design::two_group(&[P, P, P], &GroupLabels::default()).is_err());
    }

    #[test]
    fn test_intercept_only() {
        let design = Design::intercept_only(3);
        assert_eq!(design.n_coefs(), 1);
        assert_eq!(design.cells(), vec![vec![0, 1, 2]]);
        assert!(design.is_group_model());
    }
}
