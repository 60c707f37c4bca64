//! Cox-Reid adjusted profile likelihood for a single gene's dispersion
//! and the optimizers used on it (Armijo line search, grid search).
//!
//! Everything is parametrized by `log(alpha)`. The fitted means are held
//! fixed while the dispersion moves.

use ndarray::{Array2, ArrayView2};
use statrs::function::gamma::{digamma, ln_gamma};

use super::DispersionParams;
use crate::glm::linalg::{invert_spd, log_det_spd};

/// Lowest log dispersion a proposal may reach
const MIN_LOG_ALPHA_PROPOSAL: f64 = -30.0;
/// Highest log dispersion a proposal may reach
const MAX_LOG_ALPHA_PROPOSAL: f64 = 10.0;
/// Armijo sufficient-increase constant
const ARMIJO_EPSILON: f64 = 1e-4;
/// Points per grid in the coarse and fine grid searches
const GRID_POINTS: usize = 20;

/// Normal prior on `log(alpha)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogNormalPrior {
    pub mean: f64,
    pub variance: f64,
}

/// Log posterior of one gene's dispersion (log-likelihood + Cox-Reid
/// adjustment + optional prior), as a function of `log(alpha)`
pub struct DispersionObjective<'a> {
    counts: &'a [f64],
    mu: &'a [f64],
    design: ArrayView2<'a, f64>,
    prior: Option<LogNormalPrior>,
}

impl<'a> DispersionObjective<'a> {
    pub fn new(
        counts: &'a [f64],
        mu: &'a [f64],
        design: ArrayView2<'a, f64>,
        prior: Option<LogNormalPrior>,
    ) -> Self {
        Self {
            counts,
            mu,
            design,
            prior,
        }
    }

    /// `w_i = 1 / (1/mu_i + alpha)`, the GLM weights at dispersion alpha
    fn weighted_gram(&self, alpha: f64) -> (Array2<f64>, Array2<f64>) {
        let p = self.design.ncols();
        let mut b = Array2::<f64>::zeros((p, p));
        let mut db = Array2::<f64>::zeros((p, p));
        for (row, &m) in self.design.outer_iter().zip(self.mu) {
            let w = 1.0 / (1.0 / m.max(1e-10) + alpha);
            for j in 0..p {
                for k in 0..p {
                    let xx = row[j] * row[k];
                    b[[j, k]] += w * xx;
                    db[[j, k]] -= w * w * xx;
                }
            }
        }
        (b, db)
    }

    pub fn value(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let size = 1.0 / alpha;
        let ll: f64 = self
            .counts
            .iter()
            .zip(self.mu)
            .map(|(&y, &m)| {
                let m = m.max(1e-10);
                ln_gamma(y + size) - ln_gamma(size) - y * (m + size).ln() - size * (1.0 + m * alpha).ln()
            })
            .sum();

        let (b, _) = self.weighted_gram(alpha);
        let cox_reid = log_det_spd(b.view()).map_or(0.0, |d| -0.5 * d);

        let prior = self
            .prior
            .map_or(0.0, |pr| -0.5 * (log_alpha - pr.mean).powi(2) / pr.variance);

        ll + cox_reid + prior
    }

    pub fn derivative(&self, log_alpha: f64) -> f64 {
        let alpha = log_alpha.exp();
        let alpha_sq = alpha * alpha;
        let size = 1.0 / alpha;

        let dll_dalpha: f64 = self
            .counts
            .iter()
            .zip(self.mu)
            .map(|(&y, &m)| {
                let m = m.max(1e-10);
                (digamma(size) - digamma(y + size)) / alpha_sq + y / (alpha_sq * (m + size))
                    + (1.0 + m * alpha).ln() / alpha_sq
                    - m / (alpha * (1.0 + m * alpha))
            })
            .sum();

        // d/dalpha of -0.5 log|B| is -0.5 tr(B^-1 dB)
        let (b, db) = self.weighted_gram(alpha);
        let dcr_dalpha = invert_spd(b.view()).map_or(0.0, |inv| -0.5 * inv.dot(&db).diag().sum());

        let dprior = self
            .prior
            .map_or(0.0, |pr| -(log_alpha - pr.mean) / pr.variance);

        (dll_dalpha + dcr_dalpha) * alpha + dprior
    }
}

/// Outcome of the Armijo line search
#[derive(Debug, Clone, Copy)]
pub struct LineSearch {
    pub log_alpha: f64,
    pub initial_value: f64,
    pub final_value: f64,
    pub iterations: usize,
}

impl LineSearch {
    /// Stopped before the iteration limit, and not after a single step
    pub fn converged(&self, maxit: usize) -> bool {
        self.iterations < maxit && self.iterations != 1
    }
}

/// Maximize the objective by gradient ascent in `log(alpha)` with an
/// adaptive step and the Armijo sufficient-increase rule
pub fn line_search(objective: &DispersionObjective<'_>, start_log_alpha: f64, params: &DispersionParams) -> LineSearch {
    let min_log_alpha = (params.min_disp / 10.0).ln();
    let mut log_alpha = start_log_alpha.clamp(MIN_LOG_ALPHA_PROPOSAL, MAX_LOG_ALPHA_PROPOSAL);
    let initial_value = objective.value(log_alpha);
    let mut value = initial_value;
    let mut slope = objective.derivative(log_alpha);
    let mut kappa = params.kappa_0;
    let mut accepted = 0usize;
    let mut iterations = params.maxit;

    for iter in 0..params.maxit {
        if slope == 0.0 || !slope.is_finite() {
            iterations = iter + 1;
            break;
        }
        let raw = log_alpha + kappa * slope;
        if raw < MIN_LOG_ALPHA_PROPOSAL {
            kappa = (MIN_LOG_ALPHA_PROPOSAL - log_alpha) / slope;
        }
        if raw > MAX_LOG_ALPHA_PROPOSAL {
            kappa = (MAX_LOG_ALPHA_PROPOSAL - log_alpha) / slope;
        }
        let proposal = log_alpha + kappa * slope;
        let proposal_value = objective.value(proposal);

        if proposal_value >= value + kappa * ARMIJO_EPSILON * slope * slope {
            accepted += 1;
            log_alpha = proposal;
            let change = proposal_value - value;
            value = proposal_value;
            if change < params.disp_tol || log_alpha < min_log_alpha {
                iterations = iter + 1;
                break;
            }
            slope = objective.derivative(log_alpha);
            kappa = (kappa * 1.1).min(params.kappa_0);
            if accepted % 5 == 0 {
                kappa /= 2.0;
            }
        } else {
            kappa /= 2.0;
        }
    }

    LineSearch {
        log_alpha,
        initial_value,
        final_value: value,
        iterations,
    }
}

/// Best `log(alpha)` on a coarse grid over `[min, max]`, refined by a fine
/// grid one coarse step either side of the coarse optimum
pub fn grid_search(objective: &DispersionObjective<'_>, min_log_alpha: f64, max_log_alpha: f64) -> f64 {
    let argmax = |grid: &[f64]| -> f64 {
        grid.iter()
            .map(|&la| (la, objective.value(la)))
            .filter(|(_, v)| v.is_finite())
            .fold((grid[0], f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best })
            .0
    };
    let linspace = |lo: f64, hi: f64| -> Vec<f64> {
        let step = (hi - lo) / (GRID_POINTS - 1) as f64;
        (0..GRID_POINTS).map(|i| lo + i as f64 * step).collect()
    };

    let coarse = linspace(min_log_alpha, max_log_alpha);
    let delta = coarse[1] - coarse[0];
    let best = argmax(&coarse);
    argmax(&linspace(best - delta, best + delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_group() -> Array2<f64> {
        array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0], [1.0, 0.0], [1.0, 0.0], [1.0, 0.0]]
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let counts = [30.0, 55.0, 41.0, 12.0, 25.0, 8.0];
        let mu = [42.0, 42.0, 42.0, 15.0, 15.0, 15.0];
        let design = two_group();
        for prior in [None, Some(LogNormalPrior { mean: -2.0, variance: 0.5 })] {
            let obj = DispersionObjective::new(&counts, &mu, design.view(), prior);
            for la in [-4.0, -1.5, 0.5] {
                let h = 1e-5;
                let numeric = (obj.value(la + h) - obj.value(la - h)) / (2.0 * h);
                let analytic = obj.derivative(la);
                assert!(
                    (numeric - analytic).abs() < 1e-4 * (1.0 + analytic.abs()),
                    "log_alpha {}: numeric {} analytic {}",
                    la,
                    numeric,
                    analytic
                );
            }
        }
    }

    #[test]
    fn test_line_search_and_grid_agree() {
        let counts = [30.0, 55.0, 41.0, 12.0, 25.0, 8.0];
        let mu = [42.0, 42.0, 42.0, 15.0, 15.0, 15.0];
        let design = two_group();
        let obj = DispersionObjective::new(&counts, &mu, design.view(), None);
        let params = DispersionParams::default();

        let ls = line_search(&obj, 0.0, &params);
        assert!(ls.final_value >= ls.initial_value);
        assert!(ls.converged(params.maxit));

        let grid = grid_search(&obj, params.min_disp.ln(), 10.0_f64.ln());
        assert!((ls.log_alpha - grid).abs() < 0.15);
    }

    #[test]
    fn test_prior_pulls_toward_its_mean() {
        let counts = [30.0, 55.0, 41.0, 12.0, 25.0, 8.0];
        let mu = [42.0, 42.0, 42.0, 15.0, 15.0, 15.0];
        let design = two_group();
        let params = DispersionParams::default();
        let free = line_search(&DispersionObjective::new(&counts, &mu, design.view(), None), -2.0, &params);
        let prior = LogNormalPrior {
            mean: free.log_alpha - 3.0,
            variance: 0.25,
        };
        let shrunk = line_search(&DispersionObjective::new(&counts, &mu, design.view(), Some(prior)), -2.0, &params);
        assert!(shrunk.log_alpha < free.log_alpha);
        assert!(shrunk.log_alpha > prior.mean);
    }
}
