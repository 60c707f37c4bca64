//! Negative binomial GLM fitting with fixed dispersion
//!
//! Iteratively reweighted least squares with a tiny ridge, falling back to
//! coordinate-wise Newton steps when IRLS does not settle.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::design::Design;
use super::linalg::{invert_spd, solve_spd, weighted_gram};
use super::negative_binomial::{nb_log_likelihood, nb_mean, nb_weight, MAX_BETA, MIN_MU};

/// Configurable parameters for GLM fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Relative deviance change that counts as converged
    pub beta_tol: f64,
    /// Maximum sweeps of the coordinate-wise fallback
    pub fallback_maxit: usize,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        Self {
            maxit: 100,
            beta_tol: 1e-8,
            fallback_maxit: 1000,
        }
    }
}

/// Ridge added to the diagonal of X'WX (1e-6 on the log2 scale)
fn ridge_lambda() -> f64 {
    let ln2 = std::f64::consts::LN_2;
    1e-6 / (ln2 * ln2)
}

/// Fit of one gene
#[derive(Debug, Clone)]
pub struct GeneFit {
    /// Coefficients on the natural-log scale
    pub beta: Vec<f64>,
    /// Standard errors on the natural-log scale
    pub se: Vec<f64>,
    pub covariance: Array2<f64>,
    /// Diagonal of the weighted hat matrix
    pub hat: Vec<f64>,
    /// Fitted means (floored at [`MIN_MU`])
    pub mu: Vec<f64>,
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: usize,
}

impl GeneFit {
    /// Usable for inference: converged with finite estimates
    pub fn is_usable(&self) -> bool {
        self.converged
            && self.beta.iter().all(|b| b.is_finite())
            && self.se.iter().all(|s| s.is_finite() && *s > 0.0)
            && self.log_likelihood.is_finite()
    }
}

fn fitted_means(design: ArrayView2<f64>, beta: &[f64], size_factors: &[f64]) -> Vec<f64> {
    design
        .outer_iter()
        .zip(size_factors)
        .map(|(row, &s)| {
            let eta: f64 = row.iter().zip(beta).map(|(x, b)| x * b).sum();
            nb_mean(eta, s).max(MIN_MU)
        })
        .collect()
}

/// Least-squares start on `log(y / s + 0.1)`
fn initial_beta(counts: &[f64], size_factors: &[f64], design: ArrayView2<f64>) -> Vec<f64> {
    let p = design.ncols();
    let log_norm: Array1<f64> = counts
        .iter()
        .zip(size_factors)
        .map(|(&y, &s)| (y / s + 0.1).ln())
        .collect();
    let gram = weighted_gram(design, &vec![1.0; counts.len()]);
    let rhs = design.t().dot(&log_norm);
    match solve_spd(gram.view(), rhs.view()) {
        Some(b) if b.iter().all(|v| v.is_finite()) => b.to_vec(),
        _ => {
            let mut b = vec![0.0; p];
            b[0] = log_norm.mean().unwrap_or(0.0);
            b
        }
    }
}

/// Fit one gene with dispersion `alpha` held fixed
pub fn fit_gene(
    counts: &[f64],
    size_factors: &[f64],
    design: ArrayView2<f64>,
    alpha: f64,
    params: &GlmFitParams,
) -> GeneFit {
    let p = design.ncols();
    let lambda = ridge_lambda();
    let mut beta = initial_beta(counts, size_factors, design);
    let mut converged = false;
    let mut dev_old = 0.0_f64;
    let mut iterations = 0;

    for iter in 0..params.maxit {
        iterations = iter + 1;
        let mu = fitted_means(design, &beta, size_factors);
        let weights: Vec<f64> = mu.iter().map(|&m| nb_weight(m, alpha)).collect();
        let working: Array1<f64> = mu
            .iter()
            .zip(counts)
            .zip(size_factors)
            .map(|((&m, &y), &s)| (m / s).ln() + (y - m) / m)
            .collect();

        let mut gram = weighted_gram(design, &weights);
        for j in 0..p {
            gram[[j, j]] += lambda;
        }
        let weighted_z: Array1<f64> = working.iter().zip(&weights).map(|(z, w)| z * w).collect();
        let rhs = design.t().dot(&weighted_z);
        let Some(next) = solve_spd(gram.view(), rhs.view()) else {
            break;
        };
        beta = next.to_vec();
        if beta.iter().any(|b| b.abs() > MAX_BETA) {
            break;
        }

        let mu = fitted_means(design, &beta, size_factors);
        let dev = -2.0 * nb_log_likelihood(counts, &mu, alpha);
        let change = (dev - dev_old).abs() / (dev.abs() + 0.1);
        if change.is_nan() {
            break;
        }
        if iter > 0 && change < params.beta_tol {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    if !converged {
        let start = if beta.iter().all(|b| b.is_finite() && b.abs() < MAX_BETA) {
            beta.clone()
        } else {
            initial_beta(counts, size_factors, design)
        };
        let (fallback_beta, fallback_converged, sweeps) =
            coordinate_newton(counts, size_factors, design, alpha, start, params);
        log::debug!(
            "IRLS did not converge; coordinate fallback {} after {} sweeps",
            if fallback_converged { "converged" } else { "failed" },
            sweeps
        );
        beta = fallback_beta;
        converged = fallback_converged;
        iterations += sweeps;
    }

    finish_fit(counts, size_factors, design, alpha, beta, converged, iterations)
}

/// Coordinate-wise Newton ascent on the log-likelihood with Armijo backtracking
fn coordinate_newton(
    counts: &[f64],
    size_factors: &[f64],
    design: ArrayView2<f64>,
    alpha: f64,
    mut beta: Vec<f64>,
    params: &GlmFitParams,
) -> (Vec<f64>, bool, usize) {
    let loglik = |b: &[f64]| nb_log_likelihood(counts, &fitted_means(design, b, size_factors), alpha);
    let mut ll = loglik(&beta);

    for sweep in 0..params.fallback_maxit {
        let ll_start = ll;
        for j in 0..beta.len() {
            let mu = fitted_means(design, &beta, size_factors);
            let mut grad = 0.0;
            let mut info = 0.0;
            for ((row, &m), &y) in design.outer_iter().zip(&mu).zip(counts) {
                grad += (y - m) / (1.0 + alpha * m) * row[j];
                info += nb_weight(m, alpha) * row[j] * row[j];
            }
            if info < 1e-20 {
                continue;
            }
            let step = grad / info;
            if step.abs() < 1e-14 {
                continue;
            }

            let old = beta[j];
            let mut t = 1.0;
            let mut accepted = false;
            while t > 1e-10 {
                beta[j] = (old + t * step).clamp(-MAX_BETA, MAX_BETA);
                let candidate = loglik(&beta);
                if candidate >= ll + 1e-4 * t * grad * step {
                    ll = candidate;
                    accepted = true;
                    break;
                }
                t *= 0.5;
            }
            if !accepted {
                beta[j] = old;
            }
        }
        if (ll - ll_start).abs() / (ll.abs() + 0.1) < params.beta_tol {
            return (beta, ll.is_finite(), sweep + 1);
        }
    }
    (beta, false, params.fallback_maxit)
}

/// Covariance, standard errors and hat diagonals at the final coefficients
fn finish_fit(
    counts: &[f64],
    size_factors: &[f64],
    design: ArrayView2<f64>,
    alpha: f64,
    beta: Vec<f64>,
    converged: bool,
    iterations: usize,
) -> GeneFit {
    let p = design.ncols();
    let mu = fitted_means(design, &beta, size_factors);
    let weights: Vec<f64> = mu.iter().map(|&m| nb_weight(m, alpha)).collect();
    let gram = weighted_gram(design, &weights);
    let mut ridged = gram.clone();
    for j in 0..p {
        ridged[[j, j]] += ridge_lambda();
    }

    let (covariance, hat) = match invert_spd(ridged.view()) {
        Some(inv) => {
            let covariance = inv.dot(&gram).dot(&inv);
            let hat = design
                .outer_iter()
                .zip(&weights)
                .map(|(row, &w)| w * row.dot(&inv.dot(&row)))
                .collect();
            (covariance, hat)
        }
        None => (Array2::from_elem((p, p), f64::NAN), vec![f64::NAN; counts.len()]),
    };
    let se = covariance
        .diag()
        .iter()
        .map(|&v| if v > 0.0 { v.sqrt() } else { f64::NAN })
        .collect();

    GeneFit {
        log_likelihood: nb_log_likelihood(counts, &mu, alpha),
        beta,
        se,
        covariance,
        hat,
        mu,
        converged,
        iterations,
    }
}

/// Fit every gene in parallel. Genes with no counts or without a finite
/// dispersion are not fitted (`None`).
pub fn fit_genes(
    counts: ArrayView2<f64>,
    size_factors: ArrayView1<f64>,
    design: &Design,
    dispersions: &[f64],
    params: &GlmFitParams,
) -> Vec<Option<GeneFit>> {
    let sf = size_factors.to_vec();
    (0..counts.nrows())
        .into_par_iter()
        .map(|i| {
            let row = counts.row(i).to_vec();
            let alpha = dispersions[i];
            if row.iter().all(|&y| y == 0.0) || !alpha.is_finite() || alpha <= 0.0 {
                return None;
            }
            Some(fit_gene(&row, &sf, design.matrix(), alpha, params))
        })
        .collect()
}
