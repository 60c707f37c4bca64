//! Input data: counts, sample metadata, and their reconciliation

mod count_matrix;
mod dataset;
mod metadata;
mod reconcile;
mod rules;

pub use count_matrix::CountMatrix;
pub use dataset::{AlignedDataset, MIN_GROUP_SIZE};
pub use metadata::{SampleMetadata, SampleRecord};
pub use reconcile::{reconcile, reconcile_with, ReconcileConfig, ReconcileReport};
pub use rules::{
    ConditionRule, ConditionRuleConfig, FieldKey, Group, GroupLabels, PatternRule, RegexKey,
    SampleKeyConfig, SampleKeyRule, SubstringRule, DEFAULT_KEY_PATTERN,
};
