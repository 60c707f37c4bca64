//! Dispersion estimation for negative binomial models
//!
//! Three stages: gene-wise estimates (parallel), a trend across genes
//! (sequential barrier), then MAP shrinkage toward the trend (parallel).

mod gene_wise;
mod map;
mod optimize;
mod trend;

pub use gene_wise::{estimate_gene_dispersions, max_dispersion, GeneDispersion};
pub use map::{dispersion_outliers, map_dispersions, prior_variance, PriorVariance, MIN_PRIOR_VARIANCE};
pub use trend::{fit_dispersion_trend, DispersionTrend, TrendFitMethod};

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::glm::Design;
use crate::normalization::{base_means, normalized_counts};

/// Configurable parameters for dispersion estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionParams {
    /// Lower bound on every dispersion estimate
    pub min_disp: f64,
    /// Log-posterior change that ends the line search
    pub disp_tol: f64,
    /// Initial step size of the line search
    pub kappa_0: f64,
    /// Maximum line search iterations
    pub maxit: usize,
    /// Residual standard deviations above the trend that mark a dispersion outlier
    pub outlier_sd: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            disp_tol: 1e-6,
            kappa_0: 1.0,
            maxit: 100,
            outlier_sd: 2.0,
        }
    }
}

/// Every stage of the dispersion estimates, one entry per gene.
/// Genes with no counts carry `NaN`.
#[derive(Debug, Clone)]
pub struct DispersionEstimates {
    pub gene_wise: Vec<f64>,
    pub trended: Vec<f64>,
    pub map: Vec<f64>,
    /// Final values: MAP, or gene-wise for dispersion outliers
    pub dispersions: Vec<f64>,
    pub outliers: Vec<bool>,
    pub trend: DispersionTrend,
    pub prior: PriorVariance,
}

/// Estimate gene-wise, trended and MAP dispersions
pub fn estimate_dispersions(
    counts: ArrayView2<f64>,
    size_factors: ArrayView1<f64>,
    design: &Design,
    fit_type: TrendFitMethod,
    params: &DispersionParams,
) -> Result<DispersionEstimates> {
    if counts.ncols() != design.n_samples() || size_factors.len() != design.n_samples() {
        return Err(DeError::DimensionMismatch {
            expected: format!("{} samples", design.n_samples()),
            got: format!("{} count columns and {} size factors", counts.ncols(), size_factors.len()),
        });
    }
    if design.n_samples() <= design.n_coefs() {
        return Err(DeError::InvalidInput {
            reason: "as many coefficients as samples; no replicates to estimate dispersion from".to_string(),
        });
    }

    let n_samples = design.n_samples();
    let max_disp = max_dispersion(n_samples);

    let genes = estimate_gene_dispersions(counts, size_factors, design, params);
    let gene_wise: Vec<f64> = genes.iter().map(|g| g.alpha).collect();
    log::debug!(
        "gene-wise dispersions: {} estimated, {} not converged",
        gene_wise.iter().filter(|a| a.is_finite()).count(),
        genes.iter().filter(|g| g.alpha.is_finite() && !g.converged).count()
    );

    let means = base_means(normalized_counts(counts, size_factors)?.view()).to_vec();
    let trend = fit_dispersion_trend(&means, &gene_wise, fit_type, params.min_disp)?;
    log::info!("dispersion trend {}", trend);

    let trended: Vec<f64> = means
        .iter()
        .zip(&gene_wise)
        .map(|(&m, &g)| if g.is_finite() { trend.eval(m) } else { f64::NAN })
        .collect();

    let prior = prior_variance(&gene_wise, &trended, n_samples, design.n_coefs(), params.min_disp);
    log::debug!(
        "log dispersion residual variance {:.4}, prior variance {:.4}",
        prior.var_log_disp_ests,
        prior.prior_var
    );

    let map = map_dispersions(counts, design, &genes, &trended, prior.prior_var, max_disp, params);
    let outliers = dispersion_outliers(&gene_wise, &trended, prior.var_log_disp_ests, params.outlier_sd);
    let dispersions: Vec<f64> = map
        .iter()
        .zip(&gene_wise)
        .zip(&outliers)
        .map(|((&m, &g), &out)| if out { g } else { m })
        .collect();
    log::info!(
        "final dispersions: {} genes, {} dispersion outliers kept their gene-wise estimate",
        dispersions.iter().filter(|d| d.is_finite()).count(),
        outliers.iter().filter(|&&o| o).count()
    );

    Ok(DispersionEstimates {
        gene_wise,
        trended,
        map,
        dispersions,
        outliers,
        trend,
        prior,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Group, GroupLabels};
    use ndarray::Array2;

    fn design() -> Design {
        use Group::{Negative as N, Positive as P};
        Design::two_group(&[P, P, P, P, N, N, N, N], &GroupLabels::default()).unwrap()
    }

    /// Counts with variance near `mean + 0.1 * mean^2`, spread deterministically
    fn simulated_counts(n_genes: usize) -> Array2<f64> {
        Array2::from_shape_fn((n_genes, 8), |(g, s)| {
            let mean = 5.0 + (g as f64 * 7.3) % 900.0;
            let wobble = ((g * 31 + s * 17) % 11) as f64 / 10.0 - 0.5;
            let sd = (mean + 0.1 * mean * mean).sqrt();
            (mean + wobble * sd).max(0.0).round()
        })
    }

    #[test]
    fn test_estimates_are_bounded_and_finite() {
        let counts = simulated_counts(300);
        let sf = ndarray::Array1::<f64>::ones(8);
        let params = DispersionParams::default();
        let est = estimate_dispersions(counts.view(), sf.view(), &design(), TrendFitMethod::Parametric, &params).unwrap();

        assert_eq!(est.dispersions.len(), 300);
        for ((&d, &g), &out) in est.dispersions.iter().zip(&est.gene_wise).zip(&est.outliers) {
            assert!(d.is_finite());
            assert!(d >= params.min_disp && d <= max_dispersion(8));
            if out {
                assert_eq!(d, g);
            }
        }
        assert!(est.prior.prior_var >= MIN_PRIOR_VARIANCE);
    }

    #[test]
    fn test_all_zero_gene_stays_missing() {
        let mut counts = simulated_counts(100);
        counts.row_mut(3).fill(0.0);
        let sf = ndarray::Array1::<f64>::ones(8);
        let est = estimate_dispersions(counts.view(), sf.view(), &design(), TrendFitMethod::Mean, &DispersionParams::default())
            .unwrap();
        assert!(est.gene_wise[3].is_nan());
        assert!(est.trended[3].is_nan());
        assert!(est.dispersions[3].is_nan());
        assert!(!est.outliers[3]);
        assert!(est.dispersions[4].is_finite());
    }

    #[test]
    fn test_results_do_not_depend_on_thread_count() {
        let counts = simulated_counts(120);
        let sf = ndarray::Array1::<f64>::ones(8);
        let run = |threads: usize| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
                .install(|| {
                    estimate_dispersions(counts.view(), sf.view(), &design(), TrendFitMethod::Parametric, &DispersionParams::default())
                        .unwrap()
                        .dispersions
                })
        };
        let one = run(1);
        let four = run(4);
        for (a, b) in one.iter().zip(&four) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_no_replicates_rejected() {
        use Group::{Negative as N, Positive as P};
        let d = Design::two_group(&[P, N], &GroupLabels::default()).unwrap();
        let counts = ndarray::array![[1.0, 2.0]];
        let sf = ndarray::array![1.0, 1.0];
        assert!(estimate_dispersions(counts.view(), sf.view(), &d, TrendFitMethod::Mean, &DispersionParams::default()).is_err());
    }
}
