//! Dispersion-mean trend fitting

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeError, Result};
use crate::stats::trimmed_mean;

/// Outer iterations of the parametric fit
const PARAMETRIC_ITERATIONS: usize = 11;
/// Convergence threshold on `sum(log(coefs / old)^2)`
const PARAMETRIC_TOL: f64 = 1e-6;
/// Genes whose residual `disp / fitted` falls outside this band are left out
const RESIDUAL_BAND: (f64, f64) = (1e-4, 15.0);
/// Tail fraction trimmed by the mean trend
const MEAN_TRIM: f64 = 0.001;

/// Method for fitting the dispersion-mean trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendFitMethod {
    /// `alpha(mean) = a0 + a1 / mean`, falling back to `Mean` when the fit fails
    #[default]
    Parametric,
    /// A single trimmed mean of the gene-wise dispersions
    Mean,
}

impl FromStr for TrendFitMethod {
    type Err = DeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parametric" => Ok(Self::Parametric),
            "mean" => Ok(Self::Mean),
            other => Err(DeError::InvalidConfig {
                reason: format!("unknown fit type '{}' (expected parametric or mean)", other),
            }),
        }
    }
}

/// Fitted dispersion trend
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispersionTrend {
    Parametric { asympt_disp: f64, extra_pois: f64 },
    Mean { value: f64 },
}

impl DispersionTrend {
    /// Trend value at a gene's base mean
    pub fn eval(&self, base_mean: f64) -> f64 {
        match *self {
            Self::Parametric {
                asympt_disp,
                extra_pois,
            } => asympt_disp + extra_pois / base_mean.max(f64::MIN_POSITIVE),
            Self::Mean { value } => value,
        }
    }
}

impl fmt::Display for DispersionTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parametric {
                asympt_disp,
                extra_pois,
            } => write!(f, "parametric: {:.6} + {:.6} / mean", asympt_disp, extra_pois),
            Self::Mean { value } => write!(f, "mean: {:.6}", value),
        }
    }
}

/// Fit the trend of gene-wise dispersions against base means. Genes with a
/// missing estimate (`NaN`) or zero mean are ignored.
pub fn fit_dispersion_trend(
    base_means: &[f64],
    gene_dispersions: &[f64],
    method: TrendFitMethod,
    min_disp: f64,
) -> Result<DispersionTrend> {
    match method {
        TrendFitMethod::Parametric => {
            let points: Vec<(f64, f64)> = base_means
                .iter()
                .zip(gene_dispersions)
                .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d >= min_disp * 100.0)
                .map(|(&m, &d)| (m, d))
                .collect();
            match fit_parametric(&points) {
                Ok((asympt_disp, extra_pois)) => Ok(DispersionTrend::Parametric {
                    asympt_disp,
                    extra_pois,
                }),
                Err(e) => {
                    log::warn!("parametric dispersion fit failed ({}), using the mean trend", e);
                    fit_mean(gene_dispersions, min_disp)
                }
            }
        }
        TrendFitMethod::Mean => fit_mean(gene_dispersions, min_disp),
    }
}

fn fit_mean(gene_dispersions: &[f64], min_disp: f64) -> Result<DispersionTrend> {
    let used: Vec<f64> = gene_dispersions
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > min_disp * 10.0)
        .collect();
    if used.is_empty() {
        let n = gene_dispersions.iter().filter(|d| d.is_finite()).count();
        return Err(DeError::TrendFittingFailed {
            reason: format!(
                "none of the {} gene-wise dispersions exceeds 10 x min_disp ({:e}); \
                 the counts show no variation beyond Poisson. Use more genes or lower \
                 analysis.dispersion.min_disp in the configuration",
                n,
                min_disp * 10.0
            ),
        });
    }
    Ok(DispersionTrend::Mean {
        value: trimmed_mean(&used, MEAN_TRIM),
    })
}

/// Iterated gamma GLM (identity link) of dispersion on `1 / mean`,
/// refitted on the genes whose residuals stay inside [`RESIDUAL_BAND`]
fn fit_parametric(points: &[(f64, f64)]) -> Result<(f64, f64)> {
    let mut coefs = (0.1_f64, 1.0_f64);

    for iter in 0..PARAMETRIC_ITERATIONS {
        let kept: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|&(mean, disp)| {
                let resid = disp / (coefs.0 + coefs.1 / mean);
                resid > RESIDUAL_BAND.0 && resid < RESIDUAL_BAND.1
            })
            .collect();
        if kept.len() < 3 {
            return Err(DeError::TrendFittingFailed {
                reason: format!("only {} genes inside the residual band", kept.len()),
            });
        }

        let (next, glm_converged) = gamma_identity_glm(&kept, coefs);
        if !(next.0 > 0.0 && next.1 > 0.0) {
            return Err(DeError::TrendFittingFailed {
                reason: format!("coefficients not positive (a0={:.4}, a1={:.4})", next.0, next.1),
            });
        }
        let change = (next.0 / coefs.0).ln().powi(2) + (next.1 / coefs.1).ln().powi(2);
        coefs = next;
        log::debug!(
            "trend iteration {}: {} genes, a0={:.6}, a1={:.6}",
            iter + 1,
            kept.len(),
            coefs.0,
            coefs.1
        );
        if change < PARAMETRIC_TOL && glm_converged {
            return Ok(coefs);
        }
    }

    Err(DeError::TrendFittingFailed {
        reason: "dispersion trend did not converge".to_string(),
    })
}

fn gamma_deviance(points: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    points
        .iter()
        .map(|&(mean, disp)| {
            let mu = (a0 + a1 / mean).max(1e-8);
            2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
        })
        .sum()
}

/// IRLS for `disp ~ 1 + I(1/mean)`, gamma family, identity link.
/// Returns the coefficients and whether the deviance settled.
fn gamma_identity_glm(points: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(points, a0, a1);

    for _ in 0..25 {
        let (mut sw, mut swx, mut swxx, mut swy, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(mean, disp) in points {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swxx += w * x * x;
            swy += w * disp;
            swxy += w * x * disp;
        }
        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-300 || !det.is_finite() {
            return ((a0, a1), false);
        }
        a0 = (swxx * swy - swx * swxy) / det;
        a1 = (sw * swxy - swx * swy) / det;

        let dev = gamma_deviance(points, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < 1e-8 {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }
    ((a0, a1), false)
}
