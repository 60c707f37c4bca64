//! Sample metadata as supplied by an external metadata source
//!
//! Records are kept as free text. Interpreting them (condition labels,
//! sample keys) is the job of the rules in [`crate::data::rules`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};

/// One metadata row: column name -> raw text value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    fields: HashMap<String, String>,
}

impl SampleRecord {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    /// Build a record from `(column, value)` pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Raw value of a column, if present
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|s| s.as_str())
    }
}

/// Ordered table of sample records sharing one header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    columns: Vec<String>,
    records: Vec<SampleRecord>,
}

impl SampleMetadata {
    /// Create a table; every record must only use known columns
    pub fn new(columns: Vec<String>, records: Vec<SampleRecord>) -> Result<Self> {
        if columns.is_empty() {
            return Err(DeError::InvalidMetadata {
                reason: "metadata table has no columns".to_string(),
            });
        }
        for (i, record) in records.iter().enumerate() {
            if let Some(unknown) = record.fields.keys().find(|k| !columns.contains(k)) {
                return Err(DeError::InvalidMetadata {
                    reason: format!("record {} uses unknown column '{}'", i + 1, unknown),
                });
            }
        }
        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fail with a readable message when a rule references a missing column
    pub fn require_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(DeError::InvalidMetadata {
                reason: format!(
                    "column '{}' not found (available: {})",
                    column,
                    self.columns.join(", ")
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lookup() {
        let record = SampleRecord::from_pairs([("title", "T1D sample 1"), ("geo_accession", "GSM1")]);
        assert_eq!(record.get("title"), Some("T1D sample 1"));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let columns = vec!["title".to_string()];
        let records = vec![SampleRecord::from_pairs([("source", "blood")])];
        assert!(SampleMetadata::new(columns, records).is_err());
    }

    #[test]
    fn test_require_column() {
        let meta = SampleMetadata::new(vec!["title".to_string()], vec![]).unwrap();
        assert!(meta.require_column("title").is_ok());
        let err = meta.require_column("supplementary_file").unwrap_err();
        assert!(err.to_string().contains("supplementary_file"));
    }
}
