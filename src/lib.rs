//! t1d_deseq: sample reconciliation and negative binomial differential
//! expression for the GSE123658 T1D vs Healthy cohort
//!
//! Metadata records are matched to count-matrix columns by configurable
//! rules, then a two-group comparison is run: median-of-ratios size
//! factors, shrunken dispersions, a negative binomial GLM per gene, Wald or
//! likelihood ratio tests and Benjamini-Hochberg adjustment.
//!
//! # Example
//!
//! ```ignore
//! use t1d_deseq::prelude::*;
//!
//! let counts = read_count_matrix("counts.tsv.gz")?;
//! let metadata = read_metadata("metadata.csv")?;
//! let config = AnalysisConfig::default();
//!
//! let (dataset, _) = reconcile(&counts, &metadata, &config.reconcile)?;
//! let results = run_analysis(&dataset, &config.analysis)?;
//! let significant = results.significant(config.analysis.alpha);
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod error;
pub mod filter;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{AnalysisConfig, AnalysisParams};
    pub use crate::data::{reconcile, AlignedDataset, CountMatrix, Group, GroupLabels, ReconcileConfig, SampleMetadata};
    pub use crate::dispersion::{estimate_dispersions, DispersionParams, TrendFitMethod};
    pub use crate::error::{DeError, Result};
    pub use crate::glm::{Design, GlmFitParams};
    pub use crate::io::{read_count_matrix, read_metadata, read_symbol_table, write_results, DeResults, GeneStatus};
    pub use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    pub use crate::testing::{benjamini_hochberg, TestKind};
    pub use crate::{normalize, run_analysis};
}

use log::{debug, info};
use ndarray::{Array1, Array2};

use config::AnalysisParams;
use data::AlignedDataset;
use dispersion::estimate_dispersions;
use error::Result;
use filter::{cooks_cutoff, cooks_outliers, independent_filtering};
use glm::{fit_genes, Design};
use io::{DeResultRow, DeResults, GeneStatus};
use normalization::{base_means, estimate_size_factors, normalized_counts, SizeFactorMethod};
use testing::{benjamini_hochberg, likelihood_ratio_tests, wald_tests, TestKind, TestOutcome};

/// Index of the condition coefficient in the two-group design
const CONDITION_COEF: usize = 1;

/// Size factors and normalized counts of an aligned dataset
pub fn normalize(dataset: &AlignedDataset, method: SizeFactorMethod) -> Result<(Array1<f64>, Array2<f64>)> {
    let counts = dataset.counts().counts();
    let size_factors = estimate_size_factors(counts, method)?;
    debug!("size factors: {:?}", size_factors.to_vec());
    let normalized = normalized_counts(counts, size_factors.view())?;
    Ok((size_factors, normalized))
}

/// Run the differential expression engine on an aligned dataset.
///
/// Fold changes are positive group over negative group. Per-gene problems
/// never fail the run; they show up as the row's [`GeneStatus`].
pub fn run_analysis(dataset: &AlignedDataset, params: &AnalysisParams) -> Result<DeResults> {
    params.validate()?;
    dataset.check_replicates()?;

    let counts = dataset.counts().counts();
    let n_genes = dataset.n_genes();
    let design = Design::two_group(dataset.groups(), dataset.labels())?;
    let contrast = design.coef_names()[CONDITION_COEF].clone();
    info!(
        "Comparing {} ({} genes, {} samples)",
        dataset.labels(),
        n_genes,
        dataset.n_samples()
    );

    info!("Estimating size factors ({:?})", params.size_factor_method);
    let (size_factors, normalized) = normalize(dataset, params.size_factor_method)?;
    let means = base_means(normalized.view()).to_vec();

    info!("Estimating dispersions ({:?} trend)", params.fit_type);
    let dispersion = estimate_dispersions(
        counts,
        size_factors.view(),
        &design,
        params.fit_type,
        &params.dispersion,
    )?;

    info!("Fitting negative binomial GLMs");
    let fits = fit_genes(counts, size_factors.view(), &design, &dispersion.dispersions, &params.glm);

    info!("Running {} test on {}", params.test, contrast);
    let outcomes = match params.test {
        TestKind::Wald => wald_tests(&fits, CONDITION_COEF),
        TestKind::Lrt => {
            let reduced = Design::intercept_only(design.n_samples());
            likelihood_ratio_tests(
                counts,
                size_factors.view(),
                &fits,
                &design,
                &reduced,
                &dispersion.dispersions,
                CONDITION_COEF,
                &params.glm,
            )
        }
    };

    let cutoff = params
        .cooks_cutoff
        .or_else(|| cooks_cutoff(design.n_samples(), design.n_coefs()));
    let cooks = match cutoff {
        Some(c) if params.cooks_filter => cooks_outliers(counts, normalized.view(), &design, &fits, c),
        _ => vec![false; n_genes],
    };

    let mut status: Vec<GeneStatus> = (0..n_genes)
        .map(|i| {
            if counts.row(i).iter().all(|&y| y == 0.0) {
                GeneStatus::AllZero
            } else if !matches!(outcomes[i], Some(TestOutcome { pvalue: Some(_), .. })) {
                GeneStatus::NotConverged
            } else if cooks[i] {
                GeneStatus::CooksOutlier
            } else {
                GeneStatus::Tested
            }
        })
        .collect();

    let pvalues: Vec<Option<f64>> = status
        .iter()
        .zip(&outcomes)
        .map(|(s, o)| match (s, o) {
            (GeneStatus::Tested, Some(o)) => o.pvalue,
            _ => None,
        })
        .collect();

    let padj = if params.independent_filtering {
        let filter = independent_filtering(&means, &pvalues, params.alpha);
        for ((s, &m), &p) in status.iter_mut().zip(&means).zip(&pvalues) {
            if filter.is_filtered(m, p) {
                *s = GeneStatus::LowMean;
            }
        }
        filter.padj
    } else {
        benjamini_hochberg(&pvalues)
    };

    let gene_ids = dataset.counts().gene_ids();
    let rows: Vec<DeResultRow> = (0..n_genes)
        .map(|i| {
            let stats = match status[i] {
                GeneStatus::AllZero | GeneStatus::NotConverged => None,
                _ => outcomes[i],
            };
            DeResultRow {
                gene_id: gene_ids[i].clone(),
                base_mean: means[i],
                log2_fold_change: stats.map(|o| o.log2_fold_change),
                lfc_se: stats.map(|o| o.lfc_se),
                stat: stats.map(|o| o.stat),
                pvalue: pvalues[i],
                padj: padj[i],
                dispersion: Some(dispersion.dispersions[i]).filter(|d| d.is_finite()),
                status: status[i],
            }
        })
        .collect();

    let results = DeResults::new(contrast, params.test.to_string(), rows);
    info!("{}", results.summary(params.alpha));
    Ok(results)
}
