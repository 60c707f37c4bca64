//! Gene-wise dispersion estimation using Cox-Reid adjusted profile likelihood
//!
//! Each gene is fitted on its own: a moment-based start value, fitted means
//! held fixed, then an Armijo line search in `log(alpha)` with a grid search
//! fallback when the line search does not settle.

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::optimize::{grid_search, line_search, DispersionObjective};
use super::DispersionParams;
use crate::glm::linalg::{solve_spd, weighted_gram};
use crate::glm::{fit_gene, Design, GlmFitParams, MIN_MU};

/// Gene-wise estimate plus the fitted means it was computed against
#[derive(Debug, Clone)]
pub struct GeneDispersion {
    /// `NaN` for genes with no counts
    pub alpha: f64,
    pub mu: Vec<f64>,
    pub converged: bool,
}

/// Upper bound on any dispersion estimate
pub fn max_dispersion(n_samples: usize) -> f64 {
    (n_samples as f64).max(10.0)
}

/// Least-squares fitted values of `y` on the design.
/// Falls back to the overall mean when `X'X` is singular.
fn linear_fit(y: &[f64], design: ArrayView2<f64>) -> Vec<f64> {
    let gram = weighted_gram(design, &vec![1.0; y.len()]);
    let rhs = design.t().dot(&ArrayView1::from(y));
    match solve_spd(gram.view(), rhs.view()) {
        Some(beta) => design.dot(&beta).to_vec(),
        None => {
            let mean = y.iter().sum::<f64>() / y.len() as f64;
            vec![mean; y.len()]
        }
    }
}

/// `sum(((y - mu)^2 - mu) / mu^2) / (m - p)` on normalized counts,
/// with cell means floored at 1
pub fn rough_dispersion(normalized: &[f64], design: ArrayView2<f64>) -> f64 {
    let m = normalized.len();
    let p = design.ncols();
    if m <= p {
        return 0.0;
    }
    let mu = linear_fit(normalized, design);
    let sum: f64 = normalized
        .iter()
        .zip(&mu)
        .map(|(&y, &mu)| {
            let mu = mu.max(1.0);
            ((y - mu).powi(2) - mu) / (mu * mu)
        })
        .sum();
    (sum / (m - p) as f64).max(0.0)
}

/// `(var - xim * mean) / mean^2` where `xim` is the mean of `1 / s`.
/// Infinite for genes with zero mean.
pub fn moments_dispersion(normalized: &[f64], xim: f64) -> f64 {
    let n = normalized.len() as f64;
    let mean = normalized.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return f64::INFINITY;
    }
    let var = if n > 1.0 {
        normalized.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    (var - xim * mean) / (mean * mean)
}

/// Fitted means from the least-squares fit on normalized counts, scaled
/// back by the size factors and floored at [`MIN_MU`]
pub fn linear_model_mu(counts: &[f64], size_factors: &[f64], design: ArrayView2<f64>) -> Vec<f64> {
    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&y, &s)| y / s).collect();
    linear_fit(&normalized, design)
        .into_iter()
        .zip(size_factors)
        .map(|(mu, &s)| (mu * s).max(MIN_MU))
        .collect()
}

/// Gene-wise dispersion of one gene
pub fn estimate_gene_dispersion(
    counts: &[f64],
    size_factors: &[f64],
    design: &Design,
    xim: f64,
    params: &DispersionParams,
) -> GeneDispersion {
    let n = counts.len();
    if counts.iter().all(|&y| y == 0.0) {
        return GeneDispersion {
            alpha: f64::NAN,
            mu: vec![0.0; n],
            converged: false,
        };
    }

    let max_disp = max_dispersion(n);
    let normalized: Vec<f64> = counts.iter().zip(size_factors).map(|(&y, &s)| y / s).collect();
    let rough = rough_dispersion(&normalized, design.matrix());
    let moments = moments_dispersion(&normalized, xim);
    let alpha_init = rough.min(moments).clamp(params.min_disp, max_disp);

    let mu = if design.is_group_model() {
        linear_model_mu(counts, size_factors, design.matrix())
    } else {
        fit_gene(counts, size_factors, design.matrix(), alpha_init, &GlmFitParams::default()).mu
    };

    let objective = DispersionObjective::new(counts, &mu, design.matrix(), None);
    let search = line_search(&objective, alpha_init.ln(), params);

    // keep the start value when the search did not improve on it
    let no_increase = search.final_value < search.initial_value + search.initial_value.abs() / 1e6;
    let mut alpha = if no_increase {
        alpha_init
    } else {
        search.log_alpha.exp()
    };

    let converged = search.converged(params.maxit);
    if !converged && alpha > params.min_disp * 10.0 {
        alpha = grid_search(&objective, params.min_disp.ln(), max_disp.ln()).exp();
    }

    GeneDispersion {
        alpha: alpha.clamp(params.min_disp, max_disp),
        mu,
        converged,
    }
}

/// Gene-wise dispersions for every gene, in parallel and in input order
pub fn estimate_gene_dispersions(
    counts: ArrayView2<f64>,
    size_factors: ArrayView1<f64>,
    design: &Design,
    params: &DispersionParams,
) -> Vec<GeneDispersion> {
    let sf = size_factors.to_vec();
    let xim = sf.iter().map(|s| 1.0 / s).sum::<f64>() / sf.len() as f64;

    if design.n_samples() == design.n_coefs() {
        log::warn!(
            "no replicates: {} samples for {} coefficients, dispersion estimates are unreliable",
            design.n_samples(),
            design.n_coefs()
        );
    }

    (0..counts.nrows())
        .into_par_iter()
        .map(|i| {
            let row = counts.row(i).to_vec();
            estimate_gene_dispersion(&row, &sf, design, xim, params)
        })
        .collect()
}
