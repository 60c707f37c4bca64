//! Command-line interface for t1d_deseq

use clap::{Parser, Subcommand};

use crate::config::AnalysisConfig;
use crate::dispersion::TrendFitMethod;
use crate::error::Result;
use crate::normalization::SizeFactorMethod;
use crate::testing::TestKind;

#[derive(Parser)]
#[command(name = "t1d_deseq")]
#[command(version)]
#[command(about = "Sample reconciliation and differential expression for GSE123658 (T1D vs Healthy)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match metadata records to count columns and write the aligned sample sheet
    Reconcile {
        /// Count matrix (tab or comma delimited, optionally gzipped)
        #[arg(short, long)]
        counts: String,

        /// Sample metadata table
        #[arg(short, long)]
        metadata: String,

        /// JSON configuration file
        #[arg(long)]
        config: Option<String>,

        /// Output sample sheet
        #[arg(short, long, default_value = "samples.tsv")]
        output: String,
    },

    /// Run the full differential expression analysis
    #[command(after_long_help = "\
Examples:
  # GSE123658 defaults: title containing T1D -> T1D, key from supplementary_file
  t1d_deseq run -c GSE123658_counts.tsv.gz -m metadata.csv -o results

  # Likelihood ratio test with gene symbols and a per-gene plot table
  t1d_deseq run -c counts.tsv -m metadata.csv --test lrt \\
    --symbols symbols.tsv --plot-gene ENSG00000254647")]
    Run {
        /// Count matrix (tab or comma delimited, optionally gzipped)
        #[arg(short, long)]
        counts: String,

        /// Sample metadata table
        #[arg(short, long)]
        metadata: String,

        /// JSON configuration file; flags below override it
        #[arg(long)]
        config: Option<String>,

        /// Two-column gene id -> symbol table for the annotated output
        #[arg(long)]
        symbols: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = "results")]
        output: String,

        /// Adjusted p-value threshold [default: 0.05]
        #[arg(short, long)]
        alpha: Option<f64>,

        /// Statistical test: wald or lrt [default: wald]
        #[arg(long)]
        test: Option<String>,

        /// Dispersion trend: parametric or mean [default: parametric]
        #[arg(long)]
        fit_type: Option<String>,

        /// Size factor method: ratio or poscounts [default: ratio]
        #[arg(long)]
        sf_type: Option<String>,

        /// Adjust every tested gene instead of filtering on mean counts
        #[arg(long)]
        no_independent_filtering: bool,

        /// Do not flag genes by Cook's distance
        #[arg(long)]
        no_cooks: bool,

        /// Cook's distance cutoff [default: 99% quantile of F(p, m - p)]
        #[arg(long)]
        cooks_cutoff: Option<f64>,

        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Also write per-sample normalized counts of this gene
        #[arg(long, value_name = "GENE_ID")]
        plot_gene: Option<String>,
    },

    /// Write size-factor normalized counts of the aligned samples
    Normalize {
        /// Count matrix (tab or comma delimited, optionally gzipped)
        #[arg(short, long)]
        counts: String,

        /// Sample metadata table
        #[arg(short, long)]
        metadata: String,

        /// JSON configuration file
        #[arg(long)]
        config: Option<String>,

        /// Size factor method: ratio or poscounts [default: ratio]
        #[arg(long)]
        sf_type: Option<String>,

        /// Output file
        #[arg(short, long, default_value = "normalized_counts.tsv")]
        output: String,
    },

    /// Print the default configuration as JSON
    Config,
}

/// Command-line values that override the configuration file
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub alpha: Option<f64>,
    pub test: Option<String>,
    pub fit_type: Option<String>,
    pub sf_type: Option<String>,
    pub no_independent_filtering: bool,
    pub no_cooks: bool,
    pub cooks_cutoff: Option<f64>,
}

impl Overrides {
    /// Apply the overrides and re-validate the result
    pub fn apply(&self, config: &mut AnalysisConfig) -> Result<()> {
        let analysis = &mut config.analysis;
        if let Some(alpha) = self.alpha {
            analysis.alpha = alpha;
        }
        if let Some(test) = &self.test {
            analysis.test = test.parse::<TestKind>()?;
        }
        if let Some(fit_type) = &self.fit_type {
            analysis.fit_type = fit_type.parse::<TrendFitMethod>()?;
        }
        if let Some(sf_type) = &self.sf_type {
            analysis.size_factor_method = sf_type.parse::<SizeFactorMethod>()?;
        }
        if self.no_independent_filtering {
            analysis.independent_filtering = false;
        }
        if self.no_cooks {
            analysis.cooks_filter = false;
        }
        if self.cooks_cutoff.is_some() {
            analysis.cooks_cutoff = self.cooks_cutoff;
        }
        analysis.validate()
    }
}

/// Configuration from `--config`, or the defaults
pub fn load_config(path: Option<&str>) -> Result<AnalysisConfig> {
    match path {
        Some(p) => AnalysisConfig::from_json_file(p),
        None => Ok(AnalysisConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments_parse() {
        let cli = Cli::try_parse_from([
            "t1d_deseq", "run", "-c", "counts.tsv", "-m", "meta.csv", "--test", "lrt", "--no-cooks", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Run { test, no_cooks, output, .. }) => {
                assert_eq!(test.as_deref(), Some("lrt"));
                assert!(no_cooks);
                assert_eq!(output, "results");
            }
            _ => panic!("expected the run command"),
        }
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = AnalysisConfig::default();
        let overrides = Overrides {
            alpha: Some(0.1),
            test: Some("lrt".to_string()),
            fit_type: Some("mean".to_string()),
            no_independent_filtering: true,
            ..Default::default()
        };
        overrides.apply(&mut config).unwrap();
        assert_eq!(config.analysis.alpha, 0.1);
        assert_eq!(config.analysis.test, TestKind::Lrt);
        assert_eq!(config.analysis.fit_type, TrendFitMethod::Mean);
        assert!(!config.analysis.independent_filtering);
        assert!(config.analysis.cooks_filter);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = AnalysisConfig::default();
        let overrides = Overrides {
            sf_type: Some("iterate".to_string()),
            ..Default::default()
        };
        assert!(overrides.apply(&mut config).is_err());
        let overrides = Overrides {
            alpha: Some(0.0),
            ..Default::default()
        };
        assert!(overrides.apply(&mut config).is_err());
    }
}
