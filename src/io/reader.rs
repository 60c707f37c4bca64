//! Readers for delimited count, metadata and symbol tables
//!
//! Tables may be tab or comma delimited (detected from the header line),
//! quoted, and optionally gzip compressed (detected from the magic bytes).

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::MultiGzDecoder;
use ndarray::Array2;

use crate::data::{CountMatrix, SampleMetadata, SampleRecord};
use crate::error::{DeError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whole file as text, decompressing gzip input
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut raw = Vec::new();
    BufReader::new(File::open(path.as_ref())?).read_to_end(&mut raw)?;
    if raw.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        MultiGzDecoder::new(raw.as_slice()).read_to_string(&mut text)?;
        Ok(text)
    } else {
        String::from_utf8(raw).map_err(|e| {
            DeError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

/// Tab when the header line has one, comma otherwise
fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    if header.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

/// Header and records of a delimited table. Rows may differ in length;
/// callers check the shape they need.
fn parse_table(text: &str) -> Result<(StringRecord, Vec<StringRecord>)> {
    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(text))
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());
    let header = reader.headers()?.clone();
    let records = reader
        .records()
        .filter(|r| !matches!(r, Ok(rec) if rec.iter().all(|f| f.is_empty())))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((header, records))
}

fn parse_count(value: &str, gene: &str, sample: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| DeError::InvalidCountMatrix {
        reason: format!("gene '{}', sample '{}': '{}' is not a number", gene, sample, value),
    })
}

/// Read a genes x samples count table.
///
/// The first column holds gene ids. The header either names that column
/// too, or lists only the sample ids (one field shorter than the rows).
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let (header, records) = parse_table(&text)?;

    let row_len = match records.first() {
        Some(first) => first.len(),
        None => {
            return Err(DeError::EmptyData {
                reason: format!("no gene rows in {}", path.display()),
            })
        }
    };
    let sample_ids: Vec<String> = if row_len == header.len() {
        header.iter().skip(1).map(String::from).collect()
    } else if row_len == header.len() + 1 {
        header.iter().map(String::from).collect()
    } else {
        return Err(DeError::InvalidCountMatrix {
            reason: format!("header has {} fields but rows have {}", header.len(), row_len),
        });
    };
    if sample_ids.is_empty() {
        return Err(DeError::InvalidCountMatrix {
            reason: "no sample columns in header".to_string(),
        });
    }

    let n_samples = sample_ids.len();
    let mut gene_ids = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len() * n_samples);
    for (i, record) in records.iter().enumerate() {
        if record.len() != n_samples + 1 {
            return Err(DeError::InvalidCountMatrix {
                reason: format!("row {} has {} fields, expected {}", i + 2, record.len(), n_samples + 1),
            });
        }
        let gene = record.get(0).unwrap_or("");
        for (field, sample) in record.iter().skip(1).zip(&sample_ids) {
            values.push(parse_count(field, gene, sample)?);
        }
        gene_ids.push(gene.to_string());
    }

    let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), values).map_err(|e| {
        DeError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;
    let matrix = CountMatrix::new(counts, gene_ids, sample_ids)?;
    log::info!(
        "Read {} genes x {} samples from {}",
        matrix.n_genes(),
        matrix.n_samples(),
        path.display()
    );
    Ok(matrix)
}

/// Make repeated header names unique by suffixing `.1`, `.2`, ...,
/// skipping suffixes already taken by another column
fn unique_columns(header: &StringRecord) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    header
        .iter()
        .map(|name| {
            let mut unique = name.to_string();
            let mut n = 1;
            while used.contains(&unique) {
                unique = format!("{}.{}", name, n);
                n += 1;
            }
            used.insert(unique.clone());
            unique
        })
        .collect()
}

/// Read a metadata table with a header row; every value is kept as text
pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<SampleMetadata> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let (header, records) = parse_table(&text)?;
    let columns = unique_columns(&header);

    let mut samples = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if record.len() != columns.len() {
            return Err(DeError::InvalidMetadata {
                reason: format!("row {} has {} fields, expected {}", i + 2, record.len(), columns.len()),
            });
        }
        samples.push(SampleRecord::from_pairs(columns.iter().cloned().zip(record.iter())));
    }
    if samples.is_empty() {
        return Err(DeError::EmptyData {
            reason: format!("no records in {}", path.display()),
        });
    }

    log::info!("Read {} metadata records from {}", samples.len(), path.display());
    SampleMetadata::new(columns, samples)
}

/// Read a two-column gene id -> symbol table. Later rows win on repeated ids.
pub fn read_symbol_table<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let (_, records) = parse_table(&text)?;
    let mut symbols = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        match (record.get(0), record.get(1)) {
            (Some(id), Some(symbol)) if !id.is_empty() => {
                if !symbol.is_empty() {
                    symbols.insert(id.to_string(), symbol.to_string());
                }
            }
            _ => {
                return Err(DeError::InvalidInput {
                    reason: format!("symbol table row {} needs a gene id and a symbol", i + 2),
                })
            }
        }
    }
    log::info!("Read {} gene symbols from {}", symbols.len(), path.display());
    Ok(symbols)
}
