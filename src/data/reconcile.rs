//! Sample reconciliation: metadata records + count matrix -> aligned dataset

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::count_matrix::CountMatrix;
use super::dataset::AlignedDataset;
use super::metadata::SampleMetadata;
use super::rules::{ConditionRule, ConditionRuleConfig, Group, GroupLabels, SampleKeyConfig, SampleKeyRule};
use crate::error::{DeError, Result};

/// How metadata records are interpreted and matched to count columns.
/// Loaded from the `reconcile` section of the JSON configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Column holding the metadata record identifier
    pub id_field: String,
    pub condition: ConditionRuleConfig,
    pub sample_key: SampleKeyConfig,
    pub labels: GroupLabels,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            id_field: "geo_accession".to_string(),
            condition: ConditionRuleConfig::default(),
            sample_key: SampleKeyConfig::default(),
            labels: GroupLabels::default(),
        }
    }
}

/// Bookkeeping of what reconciliation dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub n_records: usize,
    pub n_unclassified: usize,
    pub n_without_key: usize,
    pub n_unmatched_records: usize,
    pub unmatched_columns: Vec<String>,
}

/// Reconcile using rules built from configuration
pub fn reconcile(
    counts: &CountMatrix,
    metadata: &SampleMetadata,
    config: &ReconcileConfig,
) -> Result<(AlignedDataset, ReconcileReport)> {
    let condition = config.condition.build()?;
    let key_rule = config.sample_key.build()?;
    reconcile_with(
        counts,
        metadata,
        condition.as_ref(),
        key_rule.as_ref(),
        &config.id_field,
        config.labels.clone(),
    )
}

/// Reconcile with explicit rules.
///
/// 1. classify each record; records with no clear condition are dropped
/// 2. derive its sample key; records without one are dropped
/// 3. keep records whose key is a count column, and only those columns
/// 4. order the columns like the surviving records
pub fn reconcile_with(
    counts: &CountMatrix,
    metadata: &SampleMetadata,
    condition: &dyn ConditionRule,
    key_rule: &dyn SampleKeyRule,
    id_field: &str,
    labels: GroupLabels,
) -> Result<(AlignedDataset, ReconcileReport)> {
    for field in condition.fields().into_iter().chain(key_rule.fields()) {
        metadata.require_column(field)?;
    }
    if !metadata.has_column(id_field) {
        log::warn!("metadata has no '{}' column; records are identified by row number", id_field);
    }

    let mut report = ReconcileReport {
        n_records: metadata.n_records(),
        ..Default::default()
    };

    let mut keys: Vec<String> = Vec::new();
    let mut groups: Vec<Group> = Vec::new();
    let mut metadata_ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (i, record) in metadata.records().iter().enumerate() {
        let record_id = record
            .get(id_field)
            .map(str::to_string)
            .unwrap_or_else(|| format!("row{}", i + 1));

        let Some(group) = condition.classify(record) else {
            log::debug!("record {} ('{}') has no clear condition", i + 1, record_id);
            report.n_unclassified += 1;
            continue;
        };
        let Some(key) = key_rule.key(record) else {
            log::debug!("record {} ('{}') yields no sample key", i + 1, record_id);
            report.n_without_key += 1;
            continue;
        };
        if counts.sample_index(&key).is_none() {
            log::debug!("sample key '{}' of record '{}' is not a count column", key, record_id);
            report.n_unmatched_records += 1;
            continue;
        }
        if !seen.insert(key.clone()) {
            return Err(DeError::InvalidMetadata {
                reason: format!("sample key '{}' is derived from more than one record", key),
            });
        }

        keys.push(key);
        groups.push(group);
        metadata_ids.push(record_id);
    }

    report.unmatched_columns = counts
        .sample_ids()
        .iter()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();

    if keys.is_empty() {
        return Err(DeError::NoMatchingSamples {
            reason: format!(
                "none of the {} metadata records matched any of the {} count columns",
                metadata.n_records(),
                counts.n_samples()
            ),
        });
    }

    log::info!(
        "Reconciled {} of {} metadata records ({} without condition, {} without key, {} unmatched); {} count columns dropped",
        keys.len(),
        report.n_records,
        report.n_unclassified,
        report.n_without_key,
        report.n_unmatched_records,
        report.unmatched_columns.len()
    );

    let aligned_counts = counts.select_samples(&keys)?;
    let dataset = AlignedDataset::new(aligned_counts, &keys, groups, metadata_ids, labels)?;
    Ok((dataset, report))
}
