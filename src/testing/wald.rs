//! Wald test on a single coefficient

use rayon::prelude::*;

use super::pvalue::normal_two_sided;
use super::TestOutcome;
use crate::glm::GeneFit;

/// Wald test of coefficient `coef`: `stat = beta / se`, two-sided normal
/// p-value. Fold change and standard error are reported on the log2 scale.
/// `None` when the fit is not usable for inference.
pub fn wald_test(fit: &GeneFit, coef: usize) -> Option<TestOutcome> {
    if !fit.is_usable() {
        return None;
    }
    let beta = *fit.beta.get(coef)?;
    let se = *fit.se.get(coef)?;
    let stat = beta / se;
    Some(TestOutcome {
        log2_fold_change: beta / std::f64::consts::LN_2,
        lfc_se: se / std::f64::consts::LN_2,
        stat,
        pvalue: normal_two_sided(stat),
    })
}

/// Wald tests for every fitted gene, in input order
pub fn wald_tests(fits: &[Option<GeneFit>], coef: usize) -> Vec<Option<TestOutcome>> {
    fits.par_iter()
        .map(|fit| fit.as_ref().and_then(|f| wald_test(f, coef)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Group, GroupLabels};
    use crate::glm::{fit_gene, Design, GlmFitParams};
    use approx::assert_relative_eq;

    fn design() -> Design {
        use Group::{Negative as N, Positive as P};
        Design::two_group(&[P, P, P, N, N, N], &GroupLabels::default()).unwrap()
    }

    #[test]
    fn test_strong_effect() {
        let fit = fit_gene(
            &[100.0, 102.0, 98.0, 10.0, 12.0, 9.0],
            &[1.0; 6],
            design().matrix(),
            0.01,
            &GlmFitParams::default(),
        );
        let outcome = wald_test(&fit, 1).unwrap();
        assert_relative_eq!(outcome.log2_fold_change, (300.0_f64 / 31.0).log2(), max_relative = 1e-3);
        assert!(outcome.log2_fold_change > 3.2 && outcome.log2_fold_change < 3.4);
        assert!(outcome.stat > 0.0);
        assert!(outcome.pvalue.unwrap() < 1e-10);
        assert_relative_eq!(outcome.stat, outcome.log2_fold_change / outcome.lfc_se, max_relative = 1e-12);
    }

    #[test]
    fn test_null_effect() {
        let fit = fit_gene(&[50.0; 6], &[1.0; 6], design().matrix(), 0.05, &GlmFitParams::default());
        let outcome = wald_test(&fit, 1).unwrap();
        assert!(outcome.log2_fold_change.abs() < 1e-6);
        assert!(outcome.pvalue.unwrap() > 0.99);
    }

    #[test]
    fn test_unusable_fit_has_no_outcome() {
        let mut fit = fit_gene(&[5.0, 6.0, 7.0, 5.0, 6.0, 7.0], &[1.0; 6], design().matrix(), 0.1, &GlmFitParams::default());
        fit.converged = false;
        assert!(wald_test(&fit, 1).is_none());
        assert!(wald_tests(&[None, Some(fit)], 1).iter().all(Option::is_none));
    }
}
