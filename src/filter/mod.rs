//! Outlier flagging, independent filtering and significance calls

mod cooks;
mod independent;
mod significance;

pub use cooks::{cooks_cutoff, cooks_distances, cooks_outliers, robust_dispersions};
pub use independent::{independent_filtering, IndependentFilter};
pub use significance::{is_significant, DEFAULT_ALPHA};
