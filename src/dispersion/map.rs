//! Empirical Bayes shrinkage of gene-wise dispersions toward the trend

use rayon::prelude::*;

use super::gene_wise::GeneDispersion;
use super::optimize::{grid_search, line_search, DispersionObjective, LogNormalPrior};
use super::DispersionParams;
use crate::glm::Design;
use crate::stats::{mad, trigamma};

/// Floor on the prior variance of `log(alpha)`
pub const MIN_PRIOR_VARIANCE: f64 = 0.25;

/// Spread of the log residuals around the trend, and the prior variance
/// derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorVariance {
    /// `mad(log(gene) - log(trend))^2`
    pub var_log_disp_ests: f64,
    /// `max(var_log_disp_ests - trigamma((m - p) / 2), 0.25)`
    pub prior_var: f64,
}

/// Prior variance from genes whose gene-wise estimate is at least
/// `100 * min_disp`
pub fn prior_variance(
    gene_dispersions: &[f64],
    trended: &[f64],
    n_samples: usize,
    n_coefs: usize,
    min_disp: f64,
) -> PriorVariance {
    let residuals: Vec<f64> = gene_dispersions
        .iter()
        .zip(trended)
        .filter(|(&g, &t)| g.is_finite() && g >= min_disp * 100.0 && t.is_finite() && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();

    if residuals.is_empty() {
        return PriorVariance {
            var_log_disp_ests: MIN_PRIOR_VARIANCE,
            prior_var: MIN_PRIOR_VARIANCE,
        };
    }

    let var_log_disp_ests = mad(&residuals).powi(2);
    let prior_var = if n_samples > n_coefs {
        let expected = trigamma((n_samples - n_coefs) as f64 / 2.0);
        (var_log_disp_ests - expected).max(MIN_PRIOR_VARIANCE)
    } else {
        MIN_PRIOR_VARIANCE
    };

    PriorVariance {
        var_log_disp_ests,
        prior_var,
    }
}

/// Posterior mode of one gene's dispersion under a normal prior on
/// `log(alpha)` centred on the trend
pub fn map_dispersion(
    counts: &[f64],
    design: &Design,
    gene: &GeneDispersion,
    trend: f64,
    prior_var: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> f64 {
    if !gene.alpha.is_finite() || trend.is_nan() || trend <= 0.0 {
        return f64::NAN;
    }
    let prior = LogNormalPrior {
        mean: trend.ln(),
        variance: prior_var,
    };
    let objective = DispersionObjective::new(counts, &gene.mu, design.matrix(), Some(prior));

    let start = if gene.alpha > 0.1 * trend { gene.alpha } else { trend };
    let search = line_search(&objective, start.ln(), params);
    let alpha = if search.iterations < params.maxit {
        search.log_alpha.exp()
    } else {
        grid_search(&objective, params.min_disp.ln(), max_disp.ln()).exp()
    };
    alpha.clamp(params.min_disp, max_disp)
}

/// MAP dispersions for every gene, in parallel and in input order
pub fn map_dispersions(
    counts: ndarray::ArrayView2<f64>,
    design: &Design,
    genes: &[GeneDispersion],
    trended: &[f64],
    prior_var: f64,
    max_disp: f64,
    params: &DispersionParams,
) -> Vec<f64> {
    (0..counts.nrows())
        .into_par_iter()
        .map(|i| {
            let row = counts.row(i).to_vec();
            map_dispersion(&row, design, &genes[i], trended[i], prior_var, max_disp, params)
        })
        .collect()
}

/// Genes whose gene-wise estimate lies more than `outlier_sd` residual
/// standard deviations above the trend. These keep their gene-wise value.
pub fn dispersion_outliers(gene_dispersions: &[f64], trended: &[f64], var_log_disp_ests: f64, outlier_sd: f64) -> Vec<bool> {
    let threshold = outlier_sd * var_log_disp_ests.sqrt();
    gene_dispersions
        .iter()
        .zip(trended)
        .map(|(&g, &t)| g.is_finite() && g > 0.0 && t > 0.0 && g.ln() - t.ln() > threshold)
        .collect()
}
