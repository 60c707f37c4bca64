//! Differential expression result table

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::filter::is_significant;
use crate::stats::cmp_f64;

/// What happened to a gene on its way through the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneStatus {
    /// Tested and adjusted
    Tested,
    /// Zero counts in every sample; never tested
    AllZero,
    /// Removed by independent filtering; p-value kept, no adjusted p-value
    LowMean,
    /// Flagged by Cook's distance; no p-value
    CooksOutlier,
    /// GLM did not converge; no statistics
    NotConverged,
}

impl GeneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tested => "tested",
            Self::AllZero => "all_zero",
            Self::LowMean => "low_mean",
            Self::CooksOutlier => "cooks_outlier",
            Self::NotConverged => "not_converged",
        }
    }
}

impl fmt::Display for GeneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gene of the result table. Undefined statistics are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeResultRow {
    pub gene_id: String,
    pub base_mean: f64,
    pub log2_fold_change: Option<f64>,
    pub lfc_se: Option<f64>,
    pub stat: Option<f64>,
    pub pvalue: Option<f64>,
    pub padj: Option<f64>,
    pub dispersion: Option<f64>,
    pub status: GeneStatus,
}

/// Missing values sort after every present value
fn cmp_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp_f64(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ranked result table for one comparison
#[derive(Debug, Clone, Serialize)]
pub struct DeResults {
    /// Coefficient the fold changes refer to, e.g. `condition_T1D_vs_Healthy`
    pub contrast: String,
    pub test: String,
    pub rows: Vec<DeResultRow>,
}

impl DeResults {
    /// Build a table and rank it
    pub fn new(contrast: String, test: String, rows: Vec<DeResultRow>) -> Self {
        let mut results = Self { contrast, test, rows };
        results.sort();
        results
    }

    /// padj ascending with missing values last, then p-value, then gene id
    pub fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            cmp_missing_last(a.padj, b.padj)
                .then_with(|| cmp_missing_last(a.pvalue, b.pvalue))
                .then_with(|| a.gene_id.cmp(&b.gene_id))
        });
    }

    pub fn n_genes(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, gene_id: &str) -> Option<&DeResultRow> {
        self.rows.iter().find(|r| r.gene_id == gene_id)
    }

    /// Rows with `padj < threshold`, in rank order
    pub fn significant(&self, threshold: f64) -> DeResults {
        DeResults {
            contrast: self.contrast.clone(),
            test: self.test.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| is_significant(r.padj, threshold))
                .cloned()
                .collect(),
        }
    }

    /// Pair every row with its symbol from `symbols`, if any
    pub fn annotate<'a>(&'a self, symbols: &'a HashMap<String, String>) -> Vec<(&'a DeResultRow, Option<&'a str>)> {
        self.rows
            .iter()
            .map(|r| (r, symbols.get(&r.gene_id).map(String::as_str)))
            .collect()
    }

    /// Plot-ready volcano points for genes with a fold change and adjusted p-value
    pub fn volcano(&self, threshold: f64) -> Vec<VolcanoPoint> {
        self.rows
            .iter()
            .filter_map(|r| match (r.log2_fold_change, r.padj) {
                (Some(lfc), Some(padj)) => Some(VolcanoPoint {
                    gene_id: r.gene_id.clone(),
                    log2_fold_change: lfc,
                    neg_log10_padj: -padj.max(f64::MIN_POSITIVE).log10(),
                    significant: is_significant(Some(padj), threshold),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self, threshold: f64) -> ResultsSummary {
        let count = |status: GeneStatus| self.rows.iter().filter(|r| r.status == status).count();
        let significant: Vec<&DeResultRow> = self
            .rows
            .iter()
            .filter(|r| is_significant(r.padj, threshold))
            .collect();
        ResultsSummary {
            contrast: self.contrast.clone(),
            test: self.test.clone(),
            total_genes: self.rows.len(),
            tested: count(GeneStatus::Tested),
            all_zero: count(GeneStatus::AllZero),
            low_mean: count(GeneStatus::LowMean),
            cooks_outliers: count(GeneStatus::CooksOutlier),
            not_converged: count(GeneStatus::NotConverged),
            significant: significant.len(),
            up: significant.iter().filter(|r| r.log2_fold_change.is_some_and(|l| l > 0.0)).count(),
            down: significant.iter().filter(|r| r.log2_fold_change.is_some_and(|l| l < 0.0)).count(),
            threshold,
        }
    }
}

/// One point of a volcano plot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolcanoPoint {
    pub gene_id: String,
    pub log2_fold_change: f64,
    pub neg_log10_padj: f64,
    pub significant: bool,
}

/// Gene counts per status and direction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsSummary {
    pub contrast: String,
    pub test: String,
    pub total_genes: usize,
    pub tested: usize,
    pub all_zero: usize,
    pub low_mean: usize,
    pub cooks_outliers: usize,
    pub not_converged: usize,
    pub significant: usize,
    pub up: usize,
    pub down: usize,
    pub threshold: f64,
}

impl fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} test, {}", self.test, self.contrast)?;
        writeln!(f, "genes:              {}", self.total_genes)?;
        writeln!(f, "tested:             {}", self.tested)?;
        writeln!(f, "all zero:           {}", self.all_zero)?;
        writeln!(f, "low mean:           {}", self.low_mean)?;
        writeln!(f, "Cook's outliers:    {}", self.cooks_outliers)?;
        writeln!(f, "not converged:      {}", self.not_converged)?;
        writeln!(f, "padj < {}:        {}", self.threshold, self.significant)?;
        writeln!(f, "  up:               {}", self.up)?;
        write!(f, "  down:             {}", self.down)
    }
}
