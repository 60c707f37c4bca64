//! Pluggable rules for interpreting metadata records
//!
//! A [`ConditionRule`] maps a record to one of the two comparison groups and
//! a [`SampleKeyRule`] derives the key used to find the record's column in
//! the count matrix. Both are dataset specific, so they are built from
//! configuration ([`ConditionRuleConfig`], [`SampleKeyConfig`]).

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::metadata::SampleRecord;
use crate::error::{DeError, Result};

/// Side of the two-group comparison a sample belongs to.
/// `Positive` is the numerator of the fold change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    Positive,
    Negative,
}

impl Group {
    pub fn is_positive(self) -> bool {
        matches!(self, Group::Positive)
    }
}

/// Display names for the two groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLabels {
    pub positive: String,
    pub negative: String,
}

impl GroupLabels {
    pub fn label(&self, group: Group) -> &str {
        match group {
            Group::Positive => &self.positive,
            Group::Negative => &self.negative,
        }
    }
}

impl Default for GroupLabels {
    fn default() -> Self {
        Self {
            positive: "T1D".to_string(),
            negative: "Healthy".to_string(),
        }
    }
}

impl fmt::Display for GroupLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.positive, self.negative)
    }
}

/// Assigns a record to a group, or `None` when the record has no clear condition
pub trait ConditionRule: Send + Sync {
    fn classify(&self, record: &SampleRecord) -> Option<Group>;

    /// Metadata columns the rule reads
    fn fields(&self) -> Vec<&str>;
}

/// Derives the count-matrix column key of a record
pub trait SampleKeyRule: Send + Sync {
    fn key(&self, record: &SampleRecord) -> Option<String>;

    fn fields(&self) -> Vec<&str>;
}

/// Case-insensitive substring test: a hit is `Positive`, everything else `Negative`
#[derive(Debug, Clone)]
pub struct SubstringRule {
    field: String,
    token: String,
}

impl SubstringRule {
    pub fn new(field: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            token: token.into().to_lowercase(),
        }
    }
}

impl ConditionRule for SubstringRule {
    fn classify(&self, record: &SampleRecord) -> Option<Group> {
        let value = record.get(&self.field).unwrap_or("");
        if value.to_lowercase().contains(&self.token) {
            Some(Group::Positive)
        } else {
            Some(Group::Negative)
        }
    }

    fn fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }
}

/// Two case-insensitive patterns. Records matching neither are left unassigned.
#[derive(Debug, Clone)]
pub struct PatternRule {
    field: String,
    positive: Regex,
    negative: Regex,
}

impl PatternRule {
    pub fn new(field: impl Into<String>, positive: &str, negative: &str) -> Result<Self> {
        let build = |p: &str| RegexBuilder::new(p).case_insensitive(true).build();
        Ok(Self {
            field: field.into(),
            positive: build(positive)?,
            negative: build(negative)?,
        })
    }
}

impl ConditionRule for PatternRule {
    fn classify(&self, record: &SampleRecord) -> Option<Group> {
        let value = record.get(&self.field)?;
        if self.positive.is_match(value) {
            Some(Group::Positive)
        } else if self.negative.is_match(value) {
            Some(Group::Negative)
        } else {
            None
        }
    }

    fn fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }
}

/// Use a metadata column verbatim as the key
#[derive(Debug, Clone)]
pub struct FieldKey {
    field: String,
}

impl FieldKey {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl SampleKeyRule for FieldKey {
    fn key(&self, record: &SampleRecord) -> Option<String> {
        let value = record.get(&self.field)?.trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }
}

/// Extract the key from a column with a pattern.
/// The first capture group is the key; without groups the whole match is.
#[derive(Debug, Clone)]
pub struct RegexKey {
    field: String,
    pattern: Regex,
}

impl RegexKey {
    pub fn new(field: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            field: field.into(),
            pattern: Regex::new(pattern)?,
        })
    }
}

impl SampleKeyRule for RegexKey {
    fn key(&self, record: &SampleRecord) -> Option<String> {
        let value = record.get(&self.field)?.trim();
        let caps = self.pattern.captures(value)?;
        let m = caps.get(1).or_else(|| caps.get(0))?;
        let key = m.as_str().trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    fn fields(&self) -> Vec<&str> {
        vec![self.field.as_str()]
    }
}

/// Basename of a path or URL with every extension removed, and without the
/// `GSMnnnn_` prefix GEO puts on supplementary file names
pub const DEFAULT_KEY_PATTERN: &str = r"(?:GSM\d+_)?([^/\\.]+)(?:\.[^/\\]*)?$";

/// Serializable description of a [`ConditionRule`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionRuleConfig {
    Substring { field: String, token: String },
    Pattern { field: String, positive: String, negative: String },
}

impl ConditionRuleConfig {
    pub fn build(&self) -> Result<Box<dyn ConditionRule>> {
        match self {
            ConditionRuleConfig::Substring { field, token } => {
                if token.is_empty() {
                    return Err(DeError::InvalidConfig {
                        reason: "substring condition rule needs a non-empty token".to_string(),
                    });
                }
                Ok(Box::new(SubstringRule::new(field.clone(), token.clone())))
            }
            ConditionRuleConfig::Pattern {
                field,
                positive,
                negative,
            } => Ok(Box::new(PatternRule::new(field.clone(), positive, negative)?)),
        }
    }
}

impl Default for ConditionRuleConfig {
    fn default() -> Self {
        ConditionRuleConfig::Substring {
            field: "title".to_string(),
            token: "T1D".to_string(),
        }
    }
}

/// Serializable description of a [`SampleKeyRule`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SampleKeyConfig {
    Field { field: String },
    Regex { field: String, pattern: String },
}

impl SampleKeyConfig {
    pub fn build(&self) -> Result<Box<dyn SampleKeyRule>> {
        match self {
            SampleKeyConfig::Field { field } => Ok(Box::new(FieldKey::new(field.clone()))),
            SampleKeyConfig::Regex { field, pattern } => {
                Ok(Box::new(RegexKey::new(field.clone(), pattern)?))
            }
        }
    }
}

impl Default for SampleKeyConfig {
    fn default() -> Self {
        SampleKeyConfig::Regex {
            field: "supplementary_file".to_string(),
            pattern: DEFAULT_KEY_PATTERN.to_string(),
        }
    }
}
