use serde::{Deserialize, Serialize};

use super::downsample::{MeanOptions, downsample_mean, downsample_sum};
use crate::data::model::{Segment, SpectralTable};
use crate::error::{AnalysisError, Result};

/// Pixels per resolution element of the COS FUV channel.
pub const FUV_RESEL: usize = 6;

/// How [`bin_by_resel`] aggregates pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinningConfig {
    /// Pixels per output bin; must be greater than 1.
    pub binsize: usize,
    /// Weight averages by the per-pixel exposure time.
    pub weighted: bool,
}

impl Default for BinningConfig {
    fn default() -> Self {
        BinningConfig {
            binsize: FUV_RESEL,
            weighted: true,
        }
    }
}

impl BinningConfig {
    pub fn new(binsize: usize, weighted: bool) -> Self {
        BinningConfig { binsize, weighted }
    }

    /// Reject bin sizes that cannot mean real work.
    pub fn validate(&self) -> Result<()> {
        match self.binsize {
            0 => Err(AnalysisError::InvalidBinSize),
            1 => Err(AnalysisError::TrivialBinSize),
            _ => Ok(()),
        }
    }
}

/// Replace NaN and ±inf with zero.
fn finite_or_zero(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.is_finite() { v } else { 0.0 })
        .collect()
}

/// Bin every segment of `table` to `config.binsize` pixels per bin.
///
/// * Wavelength and flux: (exposure-weighted) mean of the bin.
/// * `ERROR`, `ERROR_LOWER`: (exposure-weighted) mean in quadrature, divided
///   by the square root of the bin population.
/// * `GROSS`, `GCOUNTS`: summed.
///
/// Segments with ragged columns are rejected with
/// [`AnalysisError::LengthMismatch`]. Non-finite inputs are zeroed before aggregation. Trailing pixels that do
/// not fill a bin are dropped. One output segment per input segment.
pub fn bin_by_resel(table: &SpectralTable, config: &BinningConfig) -> Result<SpectralTable> {
    config.validate()?;
    log::info!(
        "binning {} segment(s) by {} (weighted: {})",
        table.len(),
        config.binsize,
        config.weighted
    );

    let segments = table
        .segments
        .iter()
        .map(|segment| bin_segment(segment, config))
        .collect::<Result<Vec<_>>>()?;

    Ok(SpectralTable::from_segments(segments))
}

fn bin_segment(segment: &Segment, config: &BinningConfig) -> Result<Segment> {
    segment.validate()?;
    let factor = config.binsize;
    let weights = segment.exposure_weights();

    let mean = if config.weighted {
        MeanOptions::weighted(&weights)
    } else {
        MeanOptions::unweighted()
    };
    let quad = mean.in_quadrature();
    let population = (factor as f64).sqrt();

    let wavelength = downsample_mean(&finite_or_zero(&segment.wavelength), factor, &mean)?;
    let flux = downsample_mean(&finite_or_zero(&segment.flux), factor, &mean)?;
    let error: Vec<f64> = downsample_mean(&finite_or_zero(&segment.error), factor, &quad)?
        .into_iter()
        .map(|e| e / population)
        .collect();
    let error_lower: Vec<f64> =
        downsample_mean(&finite_or_zero(&segment.error_lower), factor, &quad)?
            .into_iter()
            .map(|e| e / population)
            .collect();
    let gross = downsample_sum(&finite_or_zero(&segment.gross), factor)?;
    let gcounts = downsample_sum(&finite_or_zero(&segment.gcounts), factor)?;

    Segment::new(
        segment.exptime,
        wavelength,
        flux,
        error,
        error_lower,
        gross,
        gcounts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn segment(n: usize, exptime: f64) -> Segment {
        Segment::new(
            exptime,
            (0..n).map(|i| 1400.0 + 0.01 * i as f64).collect(),
            (0..n).map(|i| 1e-14 * (1.0 + (i % 5) as f64)).collect(),
            vec![2e-15; n],
            vec![1e-15; n],
            (0..n).map(|i| 0.5 + (i % 3) as f64).collect(),
            (0..n).map(|i| exptime * (0.5 + (i % 3) as f64)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_bin_size_validation() {
        let table = SpectralTable::from_segments(vec![segment(12, 100.0)]);
        assert_eq!(
            bin_by_resel(&table, &BinningConfig::new(0, true)),
            Err(AnalysisError::InvalidBinSize)
        );
        assert_eq!(
            bin_by_resel(&table, &BinningConfig::new(1, false)),
            Err(AnalysisError::TrivialBinSize)
        );
    }

    #[test]
    fn test_one_output_segment_per_input() {
        let table = SpectralTable::from_segments(vec![segment(20, 100.0), segment(13, 50.0)]);
        let binned = bin_by_resel(&table, &BinningConfig::new(6, true)).unwrap();
        assert_eq!(binned.len(), 2);
        assert_eq!(binned.segments[0].len(), 3);
        assert_eq!(binned.segments[1].len(), 2);
        assert_eq!(binned.segments[1].exptime, 50.0);
    }

    #[test]
    fn test_counts_are_conserved_over_cropped_region() {
        let input = segment(20, 100.0);
        let table = SpectralTable::from_segments(vec![input.clone()]);
        let binned = bin_by_resel(&table, &BinningConfig::new(6, true)).unwrap();
        let out = &binned.segments[0];
        assert_relative_eq!(
            out.gcounts.iter().sum::<f64>(),
            input.gcounts[..18].iter().sum::<f64>(),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            out.gross.iter().sum::<f64>(),
            input.gross[..18].iter().sum::<f64>(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_constant_errors_shrink_by_sqrt_population() {
        let table = SpectralTable::from_segments(vec![segment(12, 100.0)]);
        let binned = bin_by_resel(&table, &BinningConfig::new(4, true)).unwrap();
        for &e in &binned.segments[0].error {
            assert_relative_eq!(e, 2e-15 / 2.0, max_relative = 1e-12);
        }
        for &e in &binned.segments[0].error_lower {
            assert_relative_eq!(e, 1e-15 / 2.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_unweighted_wavelength_is_bin_center() {
        let table = SpectralTable::from_segments(vec![segment(6, 100.0)]);
        let binned = bin_by_resel(&table, &BinningConfig::new(3, false)).unwrap();
        assert_relative_eq!(binned.segments[0].wavelength[0], 1400.01, max_relative = 1e-12);
        assert_relative_eq!(binned.segments[0].wavelength[1], 1400.04, max_relative = 1e-12);
    }

    #[test]
    fn test_weighted_mean_uses_recovered_exposure() {
        // One bin of two pixels; the second saw three times the exposure.
        let input = Segment::new(
            100.0,
            vec![1400.0, 1400.01],
            vec![1e-14, 3e-14],
            vec![1e-15, 1e-15],
            vec![1e-15, 1e-15],
            vec![2.0, 2.0],
            vec![100.0, 300.0],
        )
        .unwrap();
        let table = SpectralTable::from_segments(vec![input]);

        let weighted = bin_by_resel(&table, &BinningConfig::new(2, true)).unwrap();
        let out = &weighted.segments[0];
        // Weights 50 s and 150 s.
        assert_relative_eq!(out.flux[0], (1e-14 * 50.0 + 3e-14 * 150.0) / 200.0, max_relative = 1e-12);
        assert_relative_eq!(out.wavelength[0], 1400.0075, max_relative = 1e-12);

        let unweighted = bin_by_resel(&table, &BinningConfig::new(2, false)).unwrap();
        assert_relative_eq!(unweighted.segments[0].flux[0], 2e-14, max_relative = 1e-12);
    }

    #[test]
    fn test_ragged_segment_is_rejected() {
        let mut input = segment(6, 100.0);
        input.error.pop();
        let table = SpectralTable::from_segments(vec![input]);
        assert_eq!(
            bin_by_resel(&table, &BinningConfig::default()),
            Err(AnalysisError::LengthMismatch {
                what: "ERROR",
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn test_non_finite_values_do_not_propagate() {
        let mut input = segment(6, 100.0);
        input.flux[1] = f64::NAN;
        input.gcounts[2] = f64::INFINITY;
        input.gross[0] = 0.0;
        input.gcounts[0] = 0.0;
        let table = SpectralTable::from_segments(vec![input]);
        let binned = bin_by_resel(&table, &BinningConfig::new(3, true)).unwrap();
        let out = &binned.segments[0];
        for column in [&out.wavelength, &out.flux, &out.error, &out.gross, &out.gcounts] {
            assert!(column.iter().all(|v| v.is_finite()));
        }
    }
}
