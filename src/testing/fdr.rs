//! Benjamini-Hochberg adjustment for multiple testing

use crate::stats::cmp_f64;

/// Benjamini-Hochberg adjusted p-values.
///
/// Missing p-values stay missing and do not count toward the number of
/// tests. Output is in input order.
pub fn benjamini_hochberg(pvalues: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = pvalues
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.filter(|v| !v.is_nan()).map(|v| (i, v)))
        .collect();
    let m = present.len();
    let mut padj = vec![None; pvalues.len()];
    if m == 0 {
        return padj;
    }

    present.sort_by(|a, b| cmp_f64(&a.1, &b.1));

    let mut running_min = 1.0_f64;
    for (rank, &(i, p)) in present.iter().enumerate().rev() {
        let adjusted = p * m as f64 / (rank + 1) as f64;
        running_min = running_min.min(adjusted);
        padj[i] = Some(running_min);
    }
    padj
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bh_values() {
        let padj = benjamini_hochberg(&[Some(0.01), Some(0.04), Some(0.03), Some(0.02)]);
        let padj: Vec<f64> = padj.into_iter().map(Option::unwrap).collect();
        for v in padj {
            assert_relative_eq!(v, 0.04, epsilon = 1e-12);
        }

        let padj = benjamini_hochberg(&[Some(0.001), Some(0.2), Some(0.5)]);
        assert_relative_eq!(padj[0].unwrap(), 0.003, epsilon = 1e-12);
        assert_relative_eq!(padj[1].unwrap(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(padj[2].unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_excluded_from_count() {
        let padj = benjamini_hochberg(&[Some(0.01), None, Some(0.02)]);
        assert!(padj[1].is_none());
        // m = 2, not 3
        assert_relative_eq!(padj[0].unwrap(), 0.02, epsilon = 1e-12);
        assert_relative_eq!(padj[2].unwrap(), 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_monotone_and_bounded() {
        let pvalues: Vec<Option<f64>> = (0..50).map(|i| Some(((i * 37) % 50) as f64 / 49.0)).collect();
        let padj = benjamini_hochberg(&pvalues);
        for (p, q) in pvalues.iter().zip(&padj) {
            let (p, q) = (p.unwrap(), q.unwrap());
            assert!(q >= p && q <= 1.0);
        }
        let mut pairs: Vec<(f64, f64)> = pvalues.iter().zip(&padj).map(|(p, q)| (p.unwrap(), q.unwrap())).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        assert!(pairs.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_all_missing() {
        assert_eq!(benjamini_hochberg(&[None, None]), vec![None, None]);
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
