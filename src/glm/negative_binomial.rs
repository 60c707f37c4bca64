//! Negative binomial distribution utilities

use statrs::function::gamma::ln_gamma;

/// Floor applied to fitted means during GLM fitting
pub const MIN_MU: f64 = 0.5;

/// IRLS stops once any |beta| exceeds this (natural-log scale)
pub const MAX_BETA: f64 = 30.0;

/// Linear predictors are clamped to this to keep `exp` finite
pub const MAX_ETA: f64 = 700.0;

/// Mean for linear predictor `eta` and size factor `s`: `s * exp(eta)`
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// IRLS working weight `mu / (1 + alpha * mu)`
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

/// Log probability of count `y` under mean `mu` and dispersion `alpha`
pub fn nb_log_pmf(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return if y == 0.0 && mu == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    let size = 1.0 / alpha;
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0)
        + size * (size / (size + mu)).ln()
        + y * (mu / (size + mu)).ln()
}

/// Total log-likelihood of a gene's counts
pub fn nb_log_likelihood(counts: &[f64], mu: &[f64], alpha: f64) -> f64 {
    counts.iter().zip(mu).map(|(&y, &m)| nb_log_pmf(y, m, alpha)).sum()
}
