//! Run configuration, loaded from JSON
//!
//! Every field has a default, so a config file only needs the values it
//! changes. The defaults reproduce the GSE123658 T1D vs Healthy run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::ReconcileConfig;
use crate::dispersion::{DispersionParams, TrendFitMethod};
use crate::error::{DeError, Result};
use crate::filter::DEFAULT_ALPHA;
use crate::glm::GlmFitParams;
use crate::io::read_text;
use crate::normalization::SizeFactorMethod;
use crate::testing::TestKind;

/// Parameters of the differential expression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    pub size_factor_method: SizeFactorMethod,
    pub fit_type: TrendFitMethod,
    pub test: TestKind,
    /// FDR threshold for significance and for tuning independent filtering
    pub alpha: f64,
    pub independent_filtering: bool,
    /// Flag genes with an influential sample by Cook's distance
    pub cooks_filter: bool,
    /// Overrides the `F(0.99; p, m - p)` cutoff
    pub cooks_cutoff: Option<f64>,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            size_factor_method: SizeFactorMethod::default(),
            fit_type: TrendFitMethod::default(),
            test: TestKind::default(),
            alpha: DEFAULT_ALPHA,
            independent_filtering: true,
            cooks_filter: true,
            cooks_cutoff: None,
            dispersion: DispersionParams::default(),
            glm: GlmFitParams::default(),
        }
    }
}

impl AnalysisParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(DeError::InvalidConfig {
                reason: format!("alpha must lie in (0, 1), got {}", self.alpha),
            });
        }
        if let Some(c) = self.cooks_cutoff {
            if c.is_nan() || c <= 0.0 {
                return Err(DeError::InvalidConfig {
                    reason: format!("Cook's cutoff must be positive, got {}", c),
                });
            }
        }
        let d = &self.dispersion;
        if d.min_disp <= 0.0 || d.disp_tol <= 0.0 || d.kappa_0 <= 0.0 || d.maxit == 0 {
            return Err(DeError::InvalidConfig {
                reason: "dispersion min_disp, disp_tol, kappa_0 and maxit must be positive".to_string(),
            });
        }
        if self.glm.maxit == 0 || self.glm.beta_tol <= 0.0 {
            return Err(DeError::InvalidConfig {
                reason: "glm maxit and beta_tol must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub reconcile: ReconcileConfig,
    pub analysis: AnalysisParams,
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.analysis.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());
        Self::from_json_str(&read_text(path)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = AnalysisConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.analysis.alpha, 0.05);
        assert_eq!(config.reconcile.id_field, "geo_accession");
    }

    #[test]
    fn test_round_trip() {
        let mut config = AnalysisConfig::default();
        config.analysis.test = TestKind::Lrt;
        config.analysis.fit_type = TrendFitMethod::Mean;
        config.analysis.cooks_cutoff = Some(4.0);
        let json = config.to_json_pretty().unwrap();
        assert!(json.contains("\"lrt\""));
        assert_eq!(AnalysisConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_sections() {
        let json = r#"{"analysis": {"alpha": 0.1, "dispersion": {"maxit": 50}}}"#;
        let config = AnalysisConfig::from_json_str(json).unwrap();
        assert_eq!(config.analysis.alpha, 0.1);
        assert_eq!(config.analysis.dispersion.maxit, 50);
        assert_eq!(config.analysis.dispersion.min_disp, 1e-8);
        assert!(config.analysis.independent_filtering);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AnalysisConfig::from_json_str(r#"{"analysis": {"alpha": 1.5}}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"analysis": {"test": "t"}}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"analysis": {"cooks_cutoff": -1}}"#).is_err());
    }
}
