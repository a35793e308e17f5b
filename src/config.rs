use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::contrast::ContrastParams;
use crate::psf::PsfConfig;
use crate::reduce::resel::BinningConfig;
use crate::reduce::snr::SnrConfig;
use crate::timeseries::TimeSeriesConfig;

/// Every tunable of the analysis routines, gathered in one explicit object.
///
/// Missing sections and fields fall back to their defaults, so a config file
/// only needs to name what it changes:
///
/// ```json
/// { "binning": { "binsize": 3 }, "snr": { "range": [1300, 1350] } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub binning: BinningConfig,
    pub snr: SnrConfig,
    /// Tolerance for comparing two measurements, in percent.
    pub tolerance_pct: f64,
    pub contrast: ContrastParams,
    pub psf: PsfConfig,
    pub timeseries: TimeSeriesConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            binning: BinningConfig::default(),
            snr: SnrConfig::default(),
            tolerance_pct: 1.0,
            contrast: ContrastParams::default(),
            psf: PsfConfig::default(),
            timeseries: TimeSeriesConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse a config from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(text).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json_str(&text)?;
        log::info!("loaded analysis config from {}", path.display());
        Ok(config)
    }

    /// Check the settings that can be checked without data.
    pub fn validate(&self) -> Result<()> {
        self.binning.validate().context("invalid binning config")?;
        if let Some(binsize) = self.snr.bin_first {
            BinningConfig::new(binsize, true)
                .validate()
                .context("invalid snr.bin_first")?;
        }
        self.contrast.validate().context("invalid contrast parameters")?;
        self.timeseries.validate().context("invalid time-series config")?;
        if !(self.tolerance_pct.is_finite() && self.tolerance_pct >= 0.0) {
            anyhow::bail!("tolerance_pct must be non-negative, got {}", self.tolerance_pct);
        }
        Ok(())
    }
}
