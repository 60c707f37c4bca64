//! Significance call on adjusted p-values

/// Default FDR threshold
pub const DEFAULT_ALPHA: f64 = 0.05;

/// `padj < threshold`, strictly. Missing values are never significant.
pub fn is_significant(padj: Option<f64>, threshold: f64) -> bool {
    matches!(padj, Some(p) if p < threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        assert!(is_significant(Some(0.049), DEFAULT_ALPHA));
        assert!(!is_significant(Some(0.05), DEFAULT_ALPHA));
        assert!(!is_significant(None, DEFAULT_ALPHA));
    }
}
