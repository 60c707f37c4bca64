//! Immutable aligned dataset consumed by the statistical stages

use super::count_matrix::CountMatrix;
use super::rules::{Group, GroupLabels};
use crate::error::{DeError, Result};

/// Minimum samples per group for dispersion estimation
pub const MIN_GROUP_SIZE: usize = 2;

/// Count matrix paired with one group assignment per column.
///
/// Column `j` of the counts, `groups[j]` and `metadata_ids[j]` all describe
/// the same sample. Nothing downstream mutates a dataset; every stage
/// borrows it and returns its own result.
#[derive(Debug, Clone)]
pub struct AlignedDataset {
    counts: CountMatrix,
    groups: Vec<Group>,
    metadata_ids: Vec<String>,
    labels: GroupLabels,
}

impl AlignedDataset {
    /// Pair counts with metadata-derived groups.
    ///
    /// `sample_keys` must equal the count columns elementwise.
    pub fn new(
        counts: CountMatrix,
        sample_keys: &[String],
        groups: Vec<Group>,
        metadata_ids: Vec<String>,
        labels: GroupLabels,
    ) -> Result<Self> {
        let n = counts.n_samples();
        if groups.len() != n || metadata_ids.len() != n || sample_keys.len() != n {
            return Err(DeError::DimensionMismatch {
                expected: format!("{} samples", n),
                got: format!(
                    "{} keys, {} groups, {} metadata ids",
                    sample_keys.len(),
                    groups.len(),
                    metadata_ids.len()
                ),
            });
        }

        if let Some((col, key)) = counts
            .sample_ids()
            .iter()
            .zip(sample_keys)
            .find(|(col, key)| col != key)
        {
            return Err(DeError::InvalidMetadata {
                reason: format!(
                    "count column '{}' is aligned with metadata key '{}'",
                    col, key
                ),
            });
        }

        if labels.positive == labels.negative {
            return Err(DeError::InvalidConfig {
                reason: format!("both groups are labelled '{}'", labels.positive),
            });
        }

        Ok(Self {
            counts,
            groups,
            metadata_ids,
            labels,
        })
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn labels(&self) -> &GroupLabels {
        &self.labels
    }

    pub fn metadata_ids(&self) -> &[String] {
        &self.metadata_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        self.counts.sample_ids()
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    /// Fail unless both groups hold at least [`MIN_GROUP_SIZE`] samples.
    /// Checked by the engine before any dispersion is estimated.
    pub fn check_replicates(&self) -> Result<()> {
        for group in [Group::Negative, Group::Positive] {
            let size = self.groups.iter().filter(|&&g| g == group).count();
            if size < MIN_GROUP_SIZE {
                return Err(DeError::InsufficientReplicates {
                    group: self.labels.label(group).to_string(),
                    n: size,
                });
            }
        }
        Ok(())
    }

    /// Column indices of one group
    pub fn group_indices(&self, group: Group) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, &g)| g == group)
            .map(|(j, _)| j)
            .collect()
    }

    /// Condition label of each column
    pub fn condition_labels(&self) -> Vec<&str> {
        self.groups.iter().map(|&g| self.labels.label(g)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn counts() -> CountMatrix {
        CountMatrix::new(
            array![[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]],
            strings(&["g1", "g2"]),
            strings(&["a", "b", "c", "d"]),
        )
        .unwrap()
    }

    #[test]
    fn test_aligned_dataset() {
        let groups = vec![Group::Positive, Group::Negative, Group::Positive, Group::Negative];
        let ds = AlignedDataset::new(
            counts(),
            &strings(&["a", "b", "c", "d"]),
            groups,
            strings(&["GSM1", "GSM2", "GSM3", "GSM4"]),
            GroupLabels::default(),
        )
        .unwrap();
        assert_eq!(ds.group_indices(Group::Positive), vec![0, 2]);
        assert_eq!(ds.condition_labels(), vec!["T1D", "Healthy", "T1D", "Healthy"]);
    }

    #[test]
    fn test_misaligned_columns_rejected() {
        let groups = vec![Group::Positive, Group::Negative, Group::Positive, Group::Negative];
        let result = AlignedDataset::new(
            counts(),
            &strings(&["a", "c", "b", "d"]),
            groups,
            strings(&["1", "2", "3", "4"]),
            GroupLabels::default(),
        );
        assert!(matches!(result, Err(DeError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_single_sample_group_rejected() {
        let groups = vec![Group::Positive, Group::Positive, Group::Positive, Group::Negative];
        let ds = AlignedDataset::new(
            counts(),
            &strings(&["a", "b", "c", "d"]),
            groups,
            strings(&["1", "2", "3", "4"]),
            GroupLabels::default(),
        )
        .unwrap();
        let err = ds.check_replicates().unwrap_err();
        assert_eq!(err.to_string(), "fewer than 2 samples in group Healthy (found 1)");
    }
}
