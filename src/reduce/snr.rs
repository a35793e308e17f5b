use serde::{Deserialize, Serialize};

use super::resel::{BinningConfig, bin_by_resel};
use crate::data::filter::{WavelengthRange, selected_pixels, take};
use crate::data::model::SpectralTable;
use crate::error::{AnalysisError, Result};

/// Options for [`estimate_snr`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnrConfig {
    /// Wavelength interval to estimate over; `[-1, -1]` in config files for
    /// the whole spectrum.
    pub range: WavelengthRange,
    /// Bin the table by this many pixels (exposure-weighted) first.
    pub bin_first: Option<usize>,
    /// Exposure-time-weighted average instead of the plain mean.
    pub weighted: bool,
}

/// SNR selection for one input segment.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SegmentSnr {
    /// Index of the segment in the input table, `None` when nothing was selected.
    pub segment: Option<usize>,
    /// Wavelengths of the selected pixels.
    pub wavelength: Vec<f64>,
    /// `sqrt(GCOUNTS)` of the selected pixels.
    pub snr: Vec<f64>,
    /// Aggregate SNR of the selected pixels.
    pub mean_snr: Option<f64>,
}

/// Whether the best estimate can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnrQuality {
    /// The selection lies on a single segment.
    Exact,
    /// The selection spans several segments (e.g. G230L stripes); the
    /// per-segment values are accurate but the combined mean may not be.
    MultipleSegments { count: usize },
}

/// Result of [`estimate_snr`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnrEstimate {
    /// Best single-number estimate over the selection.
    pub best: f64,
    /// One entry per input segment, in input order.
    pub segments: Vec<SegmentSnr>,
    pub quality: SnrQuality,
}

impl SnrEstimate {
    pub fn is_approximate(&self) -> bool {
        matches!(self.quality, SnrQuality::MultipleSegments { .. })
    }
}

/// Poisson SNR of a count value; non-physical counts give 0.
fn poisson_snr(counts: f64) -> f64 {
    let snr = counts.sqrt();
    if snr.is_finite() { snr } else { 0.0 }
}

/// Estimate the signal-to-noise ratio of `table` using `SNR ≈ sqrt(N_counts)`.
///
/// Every segment is checked for consistent column lengths first. Returns
/// [`AnalysisError::RangeNotFound`] when a bounded range selects no
/// pixel in any segment. A range found on more than one segment still
/// produces a result, flagged [`SnrQuality::MultipleSegments`].
pub fn estimate_snr(table: &SpectralTable, config: &SnrConfig) -> Result<SnrEstimate> {
    if table.is_empty() {
        return Err(AnalysisError::EmptyInput("spectral table"));
    }
    for segment in &table.segments {
        segment.validate()?;
    }

    let binned;
    let table = match config.bin_first {
        Some(binsize) => {
            log::info!("binning the data by {binsize} before estimating SNR");
            binned = bin_by_resel(table, &BinningConfig::new(binsize, true))?;
            &binned
        }
        None => table,
    };

    let mut segments = Vec::with_capacity(table.len());
    let mut found_means = Vec::new();

    for (i, segment) in table.segments.iter().enumerate() {
        let pixels = selected_pixels(segment, &config.range);
        if pixels.is_empty() {
            log::debug!(
                "segment {i} with limits {:?} is outside the range",
                segment.wavelength_bounds()
            );
            segments.push(SegmentSnr::default());
            continue;
        }

        let wavelength = take(&segment.wavelength, &pixels);
        let snr: Vec<f64> = pixels.iter().map(|&p| poisson_snr(segment.gcounts[p])).collect();

        let mean_snr = if config.weighted {
            let weights = take(&segment.exposure_weights(), &pixels);
            let total: f64 = weights.iter().sum();
            if total > 0.0 && total.is_finite() {
                snr.iter().zip(&weights).map(|(s, w)| s * w).sum::<f64>() / total
            } else {
                0.0
            }
        } else {
            snr.iter().sum::<f64>() / snr.len() as f64
        };

        log::info!(
            "segment {i}: {} {} SNR over {:?} is {mean_snr:.3}",
            if config.weighted { "EXPTIME weighted" } else { "unweighted" },
            if config.range.is_full() { "full-range" } else { "in-range" },
            config.range
        );

        found_means.push(mean_snr);
        segments.push(SegmentSnr {
            segment: Some(i),
            wavelength,
            snr,
            mean_snr: Some(mean_snr),
        });
    }

    let best = match found_means.len() {
        0 => {
            return match config.range {
                WavelengthRange::Bounded { lo, hi } => {
                    log::warn!("the input range ({lo}, {hi}) was not found in any segment");
                    Err(AnalysisError::RangeNotFound { lo, hi })
                }
                WavelengthRange::Full => Err(AnalysisError::EmptyInput("spectral table pixels")),
            };
        }
        n => found_means.iter().sum::<f64>() / n as f64,
    };

    let quality = if found_means.len() > 1 {
        log::warn!(
            "the range was found on {} segments; the per-segment values are accurate \
             but the combined mean may be incorrect",
            found_means.len()
        );
        SnrQuality::MultipleSegments {
            count: found_means.len(),
        }
    } else {
        SnrQuality::Exact
    };

    Ok(SnrEstimate {
        best,
        segments,
        quality,
    })
}
