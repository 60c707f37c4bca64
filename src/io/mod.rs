//! Reading input tables and writing result tables

mod reader;
mod results;
mod writer;

pub use reader::{read_count_matrix, read_metadata, read_symbol_table, read_text};
pub use results::{DeResultRow, DeResults, GeneStatus, ResultsSummary, VolcanoPoint};
pub use writer::{
    format_fixed, format_sci, gene_plot_file_name, write_annotated, write_gene_plot, write_normalized_counts, write_results,
    write_samples, write_volcano, NA,
};
