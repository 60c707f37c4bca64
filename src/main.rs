//! t1d_deseq command-line interface

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use clap::Parser;
use log::{info, LevelFilter};

use t1d_deseq::cli::{load_config, Cli, Commands, Overrides};
use t1d_deseq::io::{
    gene_plot_file_name, write_annotated, write_gene_plot, write_normalized_counts, write_results, write_samples,
    write_volcano,
};
use t1d_deseq::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Reconcile {
            counts,
            metadata,
            config,
            output,
        }) => run_reconcile(&counts, &metadata, config.as_deref(), &output),
        Some(Commands::Run {
            counts,
            metadata,
            config,
            symbols,
            output,
            alpha,
            test,
            fit_type,
            sf_type,
            no_independent_filtering,
            no_cooks,
            cooks_cutoff,
            threads,
            plot_gene,
        }) => {
            let overrides = Overrides {
                alpha,
                test,
                fit_type,
                sf_type,
                no_independent_filtering,
                no_cooks,
                cooks_cutoff,
            };
            if threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .ok();
            }
            let outputs = RunOutputs {
                dir: output,
                symbols,
                plot_gene,
            };
            run_pipeline(&counts, &metadata, config.as_deref(), &overrides, &outputs)
        }
        Some(Commands::Normalize {
            counts,
            metadata,
            config,
            sf_type,
            output,
        }) => run_normalize(&counts, &metadata, config.as_deref(), sf_type, &output),
        Some(Commands::Config) => print_default_config(),
        None => {
            println!("t1d_deseq v{}", VERSION);
            println!("Run `t1d_deseq --help` for usage.");
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_and_reconcile(counts_path: &str, metadata_path: &str, config: &AnalysisConfig) -> Result<AlignedDataset> {
    info!("Loading count matrix from: {}", counts_path);
    let counts = read_count_matrix(counts_path)?;
    info!("Loading metadata from: {}", metadata_path);
    let metadata = read_metadata(metadata_path)?;
    let (dataset, report) = reconcile(&counts, &metadata, &config.reconcile)?;
    if !report.unmatched_columns.is_empty() {
        log::debug!("count columns without metadata: {:?}", report.unmatched_columns);
    }
    Ok(dataset)
}

fn run_reconcile(counts: &str, metadata: &str, config_path: Option<&str>, output: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let dataset = load_and_reconcile(counts, metadata, &config)?;
    write_samples(output, &dataset)?;
    info!("Aligned sample sheet written to: {}", output);
    Ok(())
}

/// Where `run` writes and what it adds beyond the result tables
struct RunOutputs {
    dir: String,
    symbols: Option<String>,
    plot_gene: Option<String>,
}

fn run_pipeline(
    counts: &str,
    metadata: &str,
    config_path: Option<&str>,
    overrides: &Overrides,
    outputs: &RunOutputs,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config)?;
    let alpha = config.analysis.alpha;

    // symbol table problems should surface before the statistics run
    let symbol_table: Option<HashMap<String, String>> = outputs.symbols.as_deref().map(read_symbol_table).transpose()?;

    let dataset = load_and_reconcile(counts, metadata, &config)?;
    let results = run_analysis(&dataset, &config.analysis)?;

    let out = Path::new(&outputs.dir);
    fs::create_dir_all(out)?;
    write_samples(out.join("samples.tsv"), &dataset)?;
    write_results(out.join("results.tsv"), &results)?;
    let significant = results.significant(alpha);
    write_results(out.join("significant.tsv"), &significant)?;
    write_volcano(out.join("volcano.tsv"), &results, alpha)?;
    if let Some(table) = &symbol_table {
        write_annotated(out.join("annotated.tsv"), &significant, table)?;
    }
    if let Some(gene) = outputs.plot_gene.as_deref() {
        let (_, normalized) = normalize(&dataset, config.analysis.size_factor_method)?;
        write_gene_plot(out.join(gene_plot_file_name(gene)), &dataset, normalized.view(), gene)?;
    }

    info!(
        "{} of {} genes with padj < {}; results written to: {}",
        significant.n_genes(),
        results.n_genes(),
        alpha,
        out.display()
    );
    Ok(())
}

fn run_normalize(
    counts: &str,
    metadata: &str,
    config_path: Option<&str>,
    sf_type: Option<String>,
    output: &str,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    let overrides = Overrides {
        sf_type,
        ..Default::default()
    };
    overrides.apply(&mut config)?;

    let dataset = load_and_reconcile(counts, metadata, &config)?;
    let (_, normalized) = normalize(&dataset, config.analysis.size_factor_method)?;
    write_normalized_counts(
        output,
        dataset.counts().gene_ids(),
        dataset.sample_ids(),
        normalized.view(),
    )?;
    info!("Normalized counts written to: {}", output);
    Ok(())
}

fn print_default_config() -> Result<()> {
    println!("{}", AnalysisConfig::default().to_json_pretty()?);
    Ok(())
}
