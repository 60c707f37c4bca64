//! Statistical helpers shared across modules
//!
//! Robust location/scale, quantiles, the trigamma function and a LOWESS
//! smoother. Inputs are plain slices; NaN values are the caller's job to
//! remove unless stated otherwise.

use std::cmp::Ordering;

/// Consistency constant that makes the MAD estimate sigma for normal data
pub const MAD_CONSTANT: f64 = 1.4826;

/// Total order on floats for sorting (NaN last)
pub fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Median of a slice; NaN for an empty slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(cmp_f64);
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Scaled median absolute deviation
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|&x| (x - center).abs()).collect();
    median(&deviations) * MAD_CONSTANT
}

/// Arithmetic mean of the values left after dropping `trim` of each tail
pub fn trimmed_mean(values: &[f64], trim: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(cmp_f64);
    let n = sorted.len();
    let k = (n as f64 * trim).floor() as usize;
    let kept = if 2 * k >= n { &sorted[..] } else { &sorted[k..n - k] };
    kept.iter().sum::<f64>() / kept.len() as f64
}

/// Sample quantile with linear interpolation between order statistics
/// (Hyndman & Fan type 7). `sorted` must be ascending.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    let h = (n as f64 - 1.0) * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Trigamma function, the derivative of digamma
pub fn trigamma(x: f64) -> f64 {
    if x <= 0.0 && x.fract() == 0.0 {
        return f64::INFINITY;
    }
    if x < 0.5 {
        // reflection
        let s = (std::f64::consts::PI * x).sin();
        return (std::f64::consts::PI / s).powi(2) - trigamma(1.0 - x);
    }
    let mut shift = 0.0;
    let mut z = x;
    while z < 8.0 {
        shift += 1.0 / (z * z);
        z += 1.0;
    }
    // asymptotic expansion
    let z2 = z * z;
    let series = 1.0 / z + 1.0 / (2.0 * z2) + 1.0 / (6.0 * z2 * z) - 1.0 / (30.0 * z2 * z2 * z)
        + 1.0 / (42.0 * z2 * z2 * z2 * z)
        - 1.0 / (30.0 * z2 * z2 * z2 * z2 * z);
    shift + series
}

/// Locally weighted linear regression (LOWESS) of `y` on ascending `x`.
///
/// `span` is the fraction of points in each local window and `robustness_iters`
/// the number of bisquare reweighting passes after the initial fit.
pub fn lowess(x: &[f64], y: &[f64], span: f64, robustness_iters: usize) -> Vec<f64> {
    let n = x.len();
    debug_assert_eq!(n, y.len());
    if n < 3 {
        return y.to_vec();
    }

    let window = ((span * n as f64 + 1e-7) as usize).clamp(2, n);
    let mut robustness = vec![1.0; n];
    let mut fitted = vec![0.0; n];

    for pass in 0..=robustness_iters {
        for i in 0..n {
            fitted[i] = local_linear_fit(x, y, i, window, &robustness).unwrap_or(y[i]);
        }
        if pass == robustness_iters {
            break;
        }

        let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| (a - b).abs()).collect();
        let scale = 6.0 * median(&residuals);
        if scale <= 0.0 || !scale.is_finite() {
            break;
        }
        for (w, r) in robustness.iter_mut().zip(&residuals) {
            let u = r / scale;
            *w = if u < 1.0 { (1.0 - u * u).powi(2) } else { 0.0 };
        }
    }

    fitted
}

/// Weighted linear fit around `x[i]` using its `window` nearest neighbours
fn local_linear_fit(x: &[f64], y: &[f64], i: usize, window: usize, robustness: &[f64]) -> Option<f64> {
    let n = x.len();
    let x0 = x[i];

    // slide the window [lo, lo + window) to the nearest neighbours of x0
    let mut lo = i.saturating_sub(window - 1).min(n - window);
    while lo + window < n && x0 - x[lo] > x[lo + window] - x0 {
        lo += 1;
    }
    let hi = lo + window - 1;
    let h = (x0 - x[lo]).max(x[hi] - x0);

    let mut sw = 0.0;
    let mut swx = 0.0;
    let mut swy = 0.0;
    let mut swxx = 0.0;
    let mut swxy = 0.0;
    for j in lo..=hi {
        let u = if h > 0.0 { (x[j] - x0).abs() / h } else { 0.0 };
        if u >= 1.0 {
            continue;
        }
        let w = (1.0 - u * u * u).powi(3) * robustness[j];
        sw += w;
        swx += w * x[j];
        swy += w * y[j];
        swxx += w * x[j] * x[j];
        swxy += w * x[j] * y[j];
    }
    if sw <= 0.0 {
        return None;
    }

    let mean_x = swx / sw;
    let mean_y = swy / sw;
    let var_x = swxx / sw - mean_x * mean_x;
    let range = x[n - 1] - x[0];
    if var_x.sqrt() <= 1e-3 * range {
        return Some(mean_y);
    }
    let slope = (swxy / sw - mean_x * mean_y) / var_x;
    Some(mean_y + slope * (x0 - mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_and_mad() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
        assert_relative_eq!(mad(&[1.0, 2.0, 3.0, 4.0, 100.0]), 1.4826, epsilon = 1e-12);
    }

    #[test]
    fn test_trimmed_mean() {
        let v = [1.0, 2.0, 3.0, 4.0, 100.0, 5.0, 6.0, 7.0];
        // 1/8 of 8 values -> drop one from each end
        assert_relative_eq!(trimmed_mean(&v, 0.125), 4.5, epsilon = 1e-12);
        assert_relative_eq!(trimmed_mean(&[2.0, 4.0], 0.5), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_type7() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&x, 0.0), 1.0);
        assert_eq!(quantile_sorted(&x, 1.0), 5.0);
        assert_relative_eq!(quantile_sorted(&x, 0.3), 2.2, epsilon = 1e-12);
    }

    #[test]
    fn test_trigamma_values() {
        // trigamma(1) = pi^2 / 6
        let pi2_6 = std::f64::consts::PI.powi(2) / 6.0;
        assert_relative_eq!(trigamma(1.0), pi2_6, epsilon = 1e-10);
        // trigamma(0.5) = pi^2 / 2
        assert_relative_eq!(trigamma(0.5), 3.0 * pi2_6, epsilon = 1e-9);
        // recurrence: trigamma(x) = trigamma(x + 1) + 1 / x^2
        assert_relative_eq!(trigamma(2.5), trigamma(3.5) + 1.0 / 6.25, epsilon = 1e-12);
    }

    #[test]
    fn test_lowess_reproduces_a_line() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 / 49.0).collect();
        let y: Vec<f64> = x.iter().map(|&v| 3.0 + 2.0 * v).collect();
        let fit = lowess(&x, &y, 0.2, 3);
        for (f, t) in fit.iter().zip(&y) {
            assert_relative_eq!(*f, *t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_lowess_resists_single_outlier() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let mut y: Vec<f64> = x.iter().map(|&v| 10.0 + 0.5 * v + 0.5 * v.sin()).collect();
        y[25] = 500.0;
        let plain = lowess(&x, &y, 0.2, 0);
        let robust = lowess(&x, &y, 0.2, 3);
        assert!((robust[25] - 22.5).abs() < (plain[25] - 22.5).abs());
        assert!(robust[45] > 30.0 && robust[45] < 34.0);
    }
}
