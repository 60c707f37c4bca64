//! Likelihood ratio test of the full model against a reduced model
//!
//! `stat = 2 * (logLik(full) - logLik(reduced))`, compared with a
//! chi-squared distribution on the difference in coefficient counts.
//! Fold changes and standard errors still come from the full model.

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::pvalue::chi_squared_upper;
use super::TestOutcome;
use crate::glm::{fit_genes, Design, GeneFit, GlmFitParams};

/// Likelihood ratio test for one gene
pub fn lrt_test(full: &GeneFit, reduced: &GeneFit, coef: usize, df: usize) -> Option<TestOutcome> {
    if !full.is_usable() || !reduced.converged || !reduced.log_likelihood.is_finite() {
        return None;
    }
    let beta = *full.beta.get(coef)?;
    let se = *full.se.get(coef)?;
    let stat = 2.0 * (full.log_likelihood - reduced.log_likelihood);
    Some(TestOutcome {
        log2_fold_change: beta / std::f64::consts::LN_2,
        lfc_se: se / std::f64::consts::LN_2,
        stat,
        pvalue: chi_squared_upper(stat, df as f64),
    })
}

/// Fit the reduced model for every gene and test it against the full fits
pub fn likelihood_ratio_tests(
    counts: ArrayView2<f64>,
    size_factors: ArrayView1<f64>,
    full_fits: &[Option<GeneFit>],
    full: &Design,
    reduced: &Design,
    dispersions: &[f64],
    coef: usize,
    params: &GlmFitParams,
) -> Vec<Option<TestOutcome>> {
    let df = full.n_coefs().saturating_sub(reduced.n_coefs());
    let reduced_fits = fit_genes(counts, size_factors, reduced, dispersions, params);
    log::debug!(
        "reduced model fitted for {} genes ({} degrees of freedom)",
        reduced_fits.iter().filter(|f| f.is_some()).count(),
        df
    );

    full_fits
        .par_iter()
        .zip(reduced_fits.par_iter())
        .map(|(f, r)| match (f, r) {
            (Some(f), Some(r)) => lrt_test(f, r, coef, df),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Group, GroupLabels};
    use crate::testing::wald_test;
    use ndarray::array;

    fn design() -> Design {
        use Group::{Negative as N, Positive as P};
        Design::two_group(&[P, P, P, N, N, N], &GroupLabels::default()).unwrap()
    }

    #[test]
    fn test_lrt_detects_effect() {
        let counts = array![[100.0, 102.0, 98.0, 10.0, 12.0, 9.0], [50.0, 52.0, 48.0, 51.0, 49.0, 50.0]];
        let sf = array![1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let d = design();
        let reduced = Design::intercept_only(6);
        let params = GlmFitParams::default();
        let dispersions = [0.01, 0.01];
        let full_fits = fit_genes(counts.view(), sf.view(), &d, &dispersions, &params);
        let outcomes = likelihood_ratio_tests(counts.view(), sf.view(), &full_fits, &d, &reduced, &dispersions, 1, &params);

        let strong = outcomes[0].as_ref().unwrap();
        assert!(strong.stat > 50.0);
        assert!(strong.pvalue.unwrap() < 1e-10);

        let flat = outcomes[1].as_ref().unwrap();
        assert!(flat.stat < 1.0);
        assert!(flat.pvalue.unwrap() > 0.3);

        // same effect size as the Wald test
        let wald = full_fits[0].as_ref().and_then(|f| wald_test(f, 1)).unwrap();
        assert_eq!(strong.log2_fold_change, wald.log2_fold_change);
    }

    #[test]
    fn test_unfitted_genes_have_no_outcome() {
        let counts = array![[0.0, 0.0, 0.0, 0.0, 0.0, 0.0]];
        let sf = array![1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let d = design();
        let params = GlmFitParams::default();
        let full_fits = fit_genes(counts.view(), sf.view(), &d, &[f64::NAN], &params);
        let outcomes = likelihood_ratio_tests(counts.view(), sf.view(), &full_fits, &d, &Design::intercept_only(6), &[f64::NAN], 1, &params);
        assert!(outcomes[0].is_none());
    }
}
