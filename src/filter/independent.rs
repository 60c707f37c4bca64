//! Independent filtering on the mean of normalized counts
//!
//! Low-count genes have little power. Removing them before the BH
//! adjustment shrinks the multiple testing burden; the cutoff is chosen
//! where the smoothed number of rejections levels off.

use crate::stats::{cmp_f64, lowess, quantile_sorted};
use crate::testing::benjamini_hochberg;

/// Number of candidate quantile cutoffs
const N_THETA: usize = 50;
/// Span of the lowess fit of rejections against theta
const LOWESS_SPAN: f64 = 0.2;
const LOWESS_ITERS: usize = 3;
/// Filtering is skipped unless some cutoff rejects more than this many genes
const MIN_REJECTIONS: usize = 10;

/// Chosen filter and the adjusted p-values it produces
#[derive(Debug, Clone)]
pub struct IndependentFilter {
    /// Adjusted p-values; `None` for untested and filtered genes
    pub padj: Vec<Option<f64>>,
    /// Quantile of the base means used as cutoff
    pub theta: f64,
    /// Genes with base mean below this were filtered
    pub cutoff: f64,
    pub rejections: usize,
}

impl IndependentFilter {
    /// True when the gene was removed by the filter rather than untested
    pub fn is_filtered(&self, base_mean: f64, pvalue: Option<f64>) -> bool {
        pvalue.is_some() && base_mean < self.cutoff
    }
}

/// BH adjustment restricted to genes with `base_mean >= cutoff`
fn adjust_above(base_means: &[f64], pvalues: &[Option<f64>], cutoff: f64) -> Vec<Option<f64>> {
    let kept: Vec<Option<f64>> = pvalues
        .iter()
        .zip(base_means)
        .map(|(&p, &m)| p.filter(|_| m >= cutoff))
        .collect();
    benjamini_hochberg(&kept)
}

fn count_rejections(padj: &[Option<f64>], alpha: f64) -> usize {
    padj.iter().filter(|p| matches!(p, Some(v) if *v < alpha)).count()
}

/// Pick the base-mean cutoff that maximises discoveries at `alpha`, then
/// adjust the surviving p-values
pub fn independent_filtering(base_means: &[f64], pvalues: &[Option<f64>], alpha: f64) -> IndependentFilter {
    let mut sorted: Vec<f64> = base_means.iter().copied().filter(|m| m.is_finite()).collect();
    sorted.sort_by(cmp_f64);
    if sorted.is_empty() {
        return IndependentFilter {
            padj: benjamini_hochberg(pvalues),
            theta: 0.0,
            cutoff: 0.0,
            rejections: 0,
        };
    }

    let lower = sorted.iter().filter(|&&m| m == 0.0).count() as f64 / sorted.len() as f64;
    let upper = if lower < 0.95 { 0.95 } else { 1.0 };
    let thetas: Vec<f64> = (0..N_THETA)
        .map(|i| lower + (upper - lower) * i as f64 / (N_THETA - 1) as f64)
        .collect();
    let cutoffs: Vec<f64> = thetas.iter().map(|&t| quantile_sorted(&sorted, t)).collect();

    let adjusted: Vec<Vec<Option<f64>>> = cutoffs
        .iter()
        .map(|&c| adjust_above(base_means, pvalues, c))
        .collect();
    let num_rej: Vec<f64> = adjusted
        .iter()
        .map(|padj| count_rejections(padj, alpha) as f64)
        .collect();

    let max_rej = num_rej.iter().copied().fold(0.0_f64, f64::max);
    let chosen = if max_rej <= MIN_REJECTIONS as f64 {
        0
    } else {
        let fit = lowess(&thetas, &num_rej, LOWESS_SPAN, LOWESS_ITERS);
        let residuals: Vec<f64> = num_rej
            .iter()
            .zip(&fit)
            .filter(|(&n, _)| n > 0.0)
            .map(|(&n, &f)| n - f)
            .collect();
        let rmse = if residuals.is_empty() {
            0.0
        } else {
            (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt()
        };
        let max_fit = fit.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let first_above = |t: f64| num_rej.iter().position(|&n| n > t);
        first_above(max_fit - rmse)
            .or_else(|| first_above(0.9 * max_fit))
            .or_else(|| first_above(0.8 * max_fit))
            .unwrap_or(0)
    };

    for j in (0..N_THETA).step_by(10) {
        log::debug!("theta {:.3}: cutoff {:.3}, {} rejections", thetas[j], cutoffs[j], num_rej[j]);
    }
    log::info!(
        "independent filtering: theta {:.3}, base mean cutoff {:.3}, {} rejections at alpha {}",
        thetas[chosen],
        cutoffs[chosen],
        num_rej[chosen],
        alpha
    );

    IndependentFilter {
        rejections: num_rej[chosen] as usize,
        theta: thetas[chosen],
        cutoff: cutoffs[chosen],
        padj: adjusted.into_iter().nth(chosen).unwrap_or_default(),
    }
}
