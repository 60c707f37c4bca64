//! Generalized linear model fitting for negative binomial counts

mod design;
mod fitting;
pub(crate) mod linalg;
mod negative_binomial;

pub use design::Design;
pub use fitting::{fit_gene, fit_genes, GeneFit, GlmFitParams};
pub use negative_binomial::{nb_log_likelihood, nb_log_pmf, nb_mean, nb_weight, MAX_BETA, MIN_MU};
