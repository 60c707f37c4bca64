//! Cook's distance outlier flagging
//!
//! Cook's distance measures how much one sample moves a gene's fit. It is
//! computed from the GLM hat diagonals and fitted means, with a robust
//! method-of-moments dispersion in the Pearson residuals:
//! `cooks = r^2 / p * h / (1 - h)^2`.

use ndarray::ArrayView2;
use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::glm::{Design, GeneFit};
use crate::stats::trimmed_mean;

/// Floor on the robust dispersion
const MIN_ROBUST_DISP: f64 = 0.04;
/// Cells need this many samples before their Cook's distances are used
const MIN_CELL_SIZE: usize = 3;
/// Samples with a higher count than the outlier that exempt a gene
const DONT_FILTER_COUNT: usize = 3;

/// Trim ratio and scale factor for a trimmed variance over `n` values
fn trim_constants(n: usize) -> (f64, f64) {
    if n <= 3 {
        (1.0 / 3.0, 2.04)
    } else if n <= 23 {
        (1.0 / 4.0, 1.86)
    } else {
        (1.0 / 8.0, 1.51)
    }
}

/// Scaled trimmed mean of squared deviations from the trimmed mean
fn trimmed_variance(values: &[f64], trim: f64, scale: f64) -> f64 {
    let center = trimmed_mean(values, trim);
    let sq: Vec<f64> = values.iter().map(|&v| (v - center).powi(2)).collect();
    scale * trimmed_mean(&sq, trim)
}

/// Cells with at least [`MIN_CELL_SIZE`] samples
fn replicated_cells(design: &Design) -> Vec<Vec<usize>> {
    design
        .cells()
        .into_iter()
        .filter(|c| c.len() >= MIN_CELL_SIZE)
        .collect()
}

/// Robust method-of-moments dispersion per gene, `(v - m) / m^2` floored at
/// 0.04. `v` is the largest trimmed variance over replicated cells, or the
/// trimmed variance over all samples when no cell is replicated.
pub fn robust_dispersions(normalized: ArrayView2<f64>, design: &Design) -> Vec<f64> {
    let cells = replicated_cells(design);
    normalized
        .outer_iter()
        .map(|row| {
            let values = row.to_vec();
            let v = if cells.is_empty() {
                trimmed_variance(&values, 1.0 / 8.0, 1.51)
            } else {
                cells
                    .iter()
                    .map(|cell| {
                        let (trim, scale) = trim_constants(cell.len());
                        let cell_values: Vec<f64> = cell.iter().map(|&j| values[j]).collect();
                        trimmed_variance(&cell_values, trim, scale)
                    })
                    .fold(0.0_f64, f64::max)
            };
            let m = values.iter().sum::<f64>() / values.len() as f64;
            if m > 0.0 {
                ((v - m) / (m * m)).max(MIN_ROBUST_DISP)
            } else {
                MIN_ROBUST_DISP
            }
        })
        .collect()
}

/// Cook's distance of every sample of one gene. `NaN` where the hat value
/// leaves no residual degrees of freedom.
pub fn cooks_distances(counts: &[f64], fit: &GeneFit, robust_disp: f64) -> Vec<f64> {
    let p = fit.beta.len() as f64;
    counts
        .iter()
        .zip(&fit.mu)
        .zip(&fit.hat)
        .map(|((&y, &mu), &h)| {
            let var = mu + robust_disp * mu * mu;
            let pearson_sq = if var > 0.0 { (y - mu).powi(2) / var } else { 0.0 };
            if h.is_finite() && h < 1.0 && pearson_sq.is_finite() {
                pearson_sq / p * h / (1.0 - h).powi(2)
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// 99% quantile of `F(p, m - p)`, or `None` without residual degrees of freedom
pub fn cooks_cutoff(n_samples: usize, n_coefs: usize) -> Option<f64> {
    if n_samples <= n_coefs {
        return None;
    }
    FisherSnedecor::new(n_coefs as f64, (n_samples - n_coefs) as f64)
        .ok()
        .map(|f| f.inverse_cdf(0.99))
}

/// Genes whose largest Cook's distance over replicated cells exceeds
/// `cutoff`. A flagged gene is released again when at least three samples
/// have a higher raw count than the outlying sample.
///
/// Nothing is flagged when no cell has three or more samples.
pub fn cooks_outliers(
    counts: ArrayView2<f64>,
    normalized: ArrayView2<f64>,
    design: &Design,
    fits: &[Option<GeneFit>],
    cutoff: f64,
) -> Vec<bool> {
    let cells = replicated_cells(design);
    if cells.is_empty() {
        log::debug!("no cell with {} or more samples, Cook's distances not used", MIN_CELL_SIZE);
        return vec![false; counts.nrows()];
    }
    let mut eligible = vec![false; design.n_samples()];
    for &j in cells.iter().flatten() {
        eligible[j] = true;
    }

    let robust = robust_dispersions(normalized, design);

    let flags: Vec<bool> = (0..counts.nrows())
        .into_par_iter()
        .map(|i| {
            let fit = match &fits[i] {
                Some(fit) => fit,
                None => return false,
            };
            let row = counts.row(i).to_vec();
            let cooks = cooks_distances(&row, fit, robust[i]);
            let worst = cooks
                .iter()
                .enumerate()
                .filter(|&(j, c)| eligible[j] && c.is_finite())
                .fold(None, |best: Option<(usize, f64)>, (j, &c)| match best {
                    Some((_, b)) if b >= c => best,
                    _ => Some((j, c)),
                });
            match worst {
                Some((j, c)) if c > cutoff => {
                    let higher = row.iter().filter(|&&y| y > row[j]).count();
                    higher < DONT_FILTER_COUNT
                }
                _ => false,
            }
        })
        .collect();

    log::info!(
        "Cook's distance cutoff {:.3}: {} genes flagged as outliers",
        cutoff,
        flags.iter().filter(|&&f| f).count()
    );
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Group, GroupLabels};
    use crate::glm::{fit_gene, GlmFitParams};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn design(n_per_group: usize) -> Design {
        let groups: Vec<Group> = (0..2 * n_per_group)
            .map(|i| if i < n_per_group { Group::Positive } else { Group::Negative })
            .collect();
        Design::two_group(&groups, &GroupLabels::default()).unwrap()
    }

    #[test]
    fn test_default_cutoff() {
        let cutoff = cooks_cutoff(10, 2).unwrap();
        assert!(cutoff > 1.0 && cutoff < 20.0);
        assert!(cooks_cutoff(2, 2).is_none());
    }

    #[test]
    fn test_robust_dispersion_floor() {
        let d = design(3);
        let normalized = array![[100.0, 100.0, 100.0, 50.0, 50.0, 50.0], [0.0; 6]];
        let disp = robust_dispersions(normalized.view(), &d);
        assert_relative_eq!(disp[0], MIN_ROBUST_DISP);
        assert_relative_eq!(disp[1], MIN_ROBUST_DISP);
    }

    #[test]
    fn test_robust_dispersion_uses_worst_cell() {
        let d = design(4);
        let normalized = array![[10.0, 400.0, 60.0, 900.0, 100.0, 102.0, 98.0, 100.0]];
        let disp = robust_dispersions(normalized.view(), &d);
        assert!(disp[0] > 0.5, "dispersion {}", disp[0]);
    }

    #[test]
    fn test_single_spike_is_flagged() {
        let d = design(4);
        let counts = array![
            [100.0, 98.0, 103.0, 1500.0, 50.0, 52.0, 49.0, 51.0],
            [100.0, 98.0, 103.0, 101.0, 50.0, 52.0, 49.0, 51.0],
        ];
        let sf = [1.0; 8];
        let fits: Vec<Option<GeneFit>> = counts
            .outer_iter()
            .map(|row| Some(fit_gene(&row.to_vec(), &sf, d.matrix(), 0.05, &GlmFitParams::default())))
            .collect();
        let cutoff = cooks_cutoff(8, 2).unwrap();
        let flags = cooks_outliers(counts.view(), counts.view(), &d, &fits, cutoff);
        assert_eq!(flags, vec![true, false]);
    }

    #[test]
    fn test_low_side_outlier_is_released() {
        let d = design(4);
        // the influential sample sits below three others in its group
        let counts = array![[0.0, 300.0, 310.0, 305.0, 50.0, 52.0, 49.0, 51.0]];
        let sf = [1.0; 8];
        let fits = vec![Some(fit_gene(&counts.row(0).to_vec(), &sf, d.matrix(), 0.05, &GlmFitParams::default()))];
        let flags = cooks_outliers(counts.view(), counts.view(), &d, &fits, 0.0);
        assert_eq!(flags, vec![false]);
    }

    #[test]
    fn test_small_cells_flag_nothing() {
        let d = design(2);
        let counts = array![[100.0, 5000.0, 10.0, 12.0]];
        let sf = [1.0; 4];
        let fits = vec![Some(fit_gene(&counts.row(0).to_vec(), &sf, d.matrix(), 0.05, &GlmFitParams::default()))];
        assert_eq!(cooks_outliers(counts.view(), counts.view(), &d, &fits, 0.0), vec![false]);
    }
}
