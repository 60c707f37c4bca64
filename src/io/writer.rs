//! Tab-separated writers; missing values are written as `NA`

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::{Writer, WriterBuilder};
use ndarray::ArrayView2;

use super::results::{DeResultRow, DeResults};
use crate::data::AlignedDataset;
use crate::error::{DeError, Result};

/// Text written for a missing value
pub const NA: &str = "NA";

const RESULT_COLUMNS: [&str; 9] = [
    "gene_id",
    "baseMean",
    "log2FoldChange",
    "lfcSE",
    "stat",
    "pvalue",
    "padj",
    "dispersion",
    "status",
];

fn tsv_writer(path: &Path) -> Result<Writer<File>> {
    Ok(WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

/// Fixed-point value or `NA`
pub fn format_fixed(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.6}", v),
        _ => NA.to_string(),
    }
}

/// Scientific value or `NA`, for p-values and dispersions
pub fn format_sci(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.6e}", v),
        _ => NA.to_string(),
    }
}

fn result_fields(row: &DeResultRow) -> Vec<String> {
    vec![
        row.gene_id.clone(),
        format_fixed(Some(row.base_mean)),
        format_fixed(row.log2_fold_change),
        format_fixed(row.lfc_se),
        format_fixed(row.stat),
        format_sci(row.pvalue),
        format_sci(row.padj),
        format_sci(row.dispersion),
        row.status.to_string(),
    ]
}

/// `gene_id baseMean log2FoldChange lfcSE stat pvalue padj dispersion status`
pub fn write_results<P: AsRef<Path>>(path: P, results: &DeResults) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(RESULT_COLUMNS)?;
    for row in &results.rows {
        writer.write_record(result_fields(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Result columns plus `symbol`, `NA` for genes missing from the table
pub fn write_annotated<P: AsRef<Path>>(
    path: P,
    results: &DeResults,
    symbols: &HashMap<String, String>,
) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(RESULT_COLUMNS.iter().copied().chain(["symbol"]))?;
    for (row, symbol) in results.annotate(symbols) {
        let mut fields = result_fields(row);
        fields.push(symbol.unwrap_or(NA).to_string());
        writer.write_record(fields)?;
    }
    writer.flush()?;
    Ok(())
}

/// `gene_id log2FoldChange neg_log10_padj significant`
pub fn write_volcano<P: AsRef<Path>>(path: P, results: &DeResults, threshold: f64) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(["gene_id", "log2FoldChange", "neg_log10_padj", "significant"])?;
    for point in results.volcano(threshold) {
        writer.write_record([
            point.gene_id,
            format_fixed(Some(point.log2_fold_change)),
            format_fixed(Some(point.neg_log10_padj)),
            point.significant.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Genes x samples matrix with a `gene_id` column
pub fn write_normalized_counts<P: AsRef<Path>>(
    path: P,
    gene_ids: &[String],
    sample_ids: &[String],
    normalized: ArrayView2<f64>,
) -> Result<()> {
    if normalized.dim() != (gene_ids.len(), sample_ids.len()) {
        return Err(DeError::DimensionMismatch {
            expected: format!("{} x {}", gene_ids.len(), sample_ids.len()),
            got: format!("{} x {}", normalized.nrows(), normalized.ncols()),
        });
    }
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(std::iter::once("gene_id").chain(sample_ids.iter().map(String::as_str)))?;
    for (gene, row) in gene_ids.iter().zip(normalized.outer_iter()) {
        writer.write_record(std::iter::once(gene.clone()).chain(row.iter().map(|&v| format_fixed(Some(v)))))?;
    }
    writer.flush()?;
    Ok(())
}

/// Aligned sample sheet: `sample metadata_id group`
pub fn write_samples<P: AsRef<Path>>(path: P, dataset: &AlignedDataset) -> Result<()> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(["sample", "metadata_id", "group"])?;
    for ((sample, id), label) in dataset
        .sample_ids()
        .iter()
        .zip(dataset.metadata_ids())
        .zip(dataset.condition_labels())
    {
        writer.write_record([sample.as_str(), id.as_str(), label])?;
    }
    writer.flush()?;
    Ok(())
}

/// File name of a gene's plot table. Characters outside `[A-Za-z0-9._-]`
/// become `_` so the id cannot leave the output directory.
pub fn gene_plot_file_name(gene_id: &str) -> String {
    let safe: String = gene_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_counts.tsv", safe)
}

/// Per-sample normalized counts of one gene: `sample group normalized_count`
pub fn write_gene_plot<P: AsRef<Path>>(
    path: P,
    dataset: &AlignedDataset,
    normalized: ArrayView2<f64>,
    gene_id: &str,
) -> Result<()> {
    let gene = dataset
        .counts()
        .gene_index(gene_id)
        .ok_or_else(|| DeError::InvalidInput {
            reason: format!("gene '{}' is not in the count matrix", gene_id),
        })?;
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(["sample", "group", "normalized_count"])?;
    for ((sample, label), &value) in dataset
        .sample_ids()
        .iter()
        .zip(dataset.condition_labels())
        .zip(normalized.row(gene).iter())
    {
        writer.write_record([sample.clone(), label.to_string(), format_fixed(Some(value))])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::GeneStatus;
    use tempfile::tempdir;

    fn results() -> DeResults {
        DeResults::new(
            "condition_T1D_vs_Healthy".to_string(),
            "Wald".to_string(),
            vec![
                DeResultRow {
                    gene_id: "ENSG1".to_string(),
                    base_mean: 120.5,
                    log2_fold_change: Some(1.25),
                    lfc_se: Some(0.25),
                    stat: Some(5.0),
                    pvalue: Some(5.7e-7),
                    padj: Some(1.1e-6),
                    dispersion: Some(0.05),
                    status: GeneStatus::Tested,
                },
                DeResultRow {
                    gene_id: "ENSG2".to_string(),
                    base_mean: 0.0,
                    log2_fold_change: None,
                    lfc_se: None,
                    stat: None,
                    pvalue: None,
                    padj: None,
                    dispersion: None,
                    status: GeneStatus::AllZero,
                },
            ],
        )
    }

    #[test]
    fn test_missing_values_written_as_na() {
        assert_eq!(format_sci(None), "NA");
        assert_eq!(format_fixed(Some(f64::NAN)), "NA");
        assert_eq!(format_fixed(Some(1.5)), "1.500000");

        let dir = tempdir().unwrap();
        let path = dir.path().join("results.tsv");
        write_results(&path, &results()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], RESULT_COLUMNS.join("\t"));
        assert!(lines[1].starts_with("ENSG1\t120.500000\t1.250000"));
        assert_eq!(lines[2], "ENSG2\t0.000000\tNA\tNA\tNA\tNA\tNA\tNA\tall_zero");
    }

    #[test]
    fn test_annotated_symbol_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("annotated.tsv");
        let symbols: HashMap<String, String> = [("ENSG1".to_string(), "INS".to_string())].into_iter().collect();
        write_annotated(&path, &results(), &symbols).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("\tstatus\tsymbol"));
        assert!(lines[1].ends_with("\tINS"));
        assert!(lines[2].ends_with("\tNA"));
    }

    #[test]
    fn test_volcano_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("volcano.tsv");
        write_volcano(&path, &results(), 0.05).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("ENSG1\t1.250000\t5.958607"));
        assert!(lines[1].ends_with("\ttrue"));
    }

    #[test]
    fn test_gene_plot_file_name_stays_in_directory() {
        assert_eq!(gene_plot_file_name("ENSG00000254647"), "ENSG00000254647_counts.tsv");
        assert_eq!(gene_plot_file_name("HLA-DRB1.2"), "HLA-DRB1.2_counts.tsv");
        let name = gene_plot_file_name("../../etc/passwd");
        assert_eq!(name, ".._.._etc_passwd_counts.tsv");
        let dir = tempdir().unwrap();
        assert_eq!(dir.path().join(&name).parent(), Some(dir.path()));
        assert_eq!(gene_plot_file_name("a\\b c"), "a_b_c_counts.tsv");
    }

    #[test]
    fn test_normalized_shape_checked() {
        let dir = tempdir().unwrap();
        let counts = ndarray::array![[1.0, 2.0]];
        let genes = vec!["g".to_string()];
        let samples = vec!["a".to_string()];
        assert!(write_normalized_counts(dir.path().join("n.tsv"), &genes, &samples, counts.view()).is_err());
    }
}
