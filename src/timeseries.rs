//! Time-series helpers for slitless (G280) transit spectroscopy.

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::filter::WavelengthRange;
use crate::error::{AnalysisError, Result, require_positive};
use crate::reduce::median;

/// Cosmic-ray rejection and light-curve settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    /// Temporal rejection threshold, in RMS deviations from the pixel median.
    pub time_sigma: f64,
    /// Passes of temporal rejection.
    pub time_iter: usize,
    /// Spatial rejection threshold, in local standard deviations.
    pub space_sigma: f64,
    /// Side of the square spatial filter window, in pixels.
    pub space_size: usize,
    /// Band summed into the white-light curve (Å).
    pub band: WavelengthRange,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        TimeSeriesConfig {
            time_sigma: 4.0,
            time_iter: 4,
            space_sigma: 3.0,
            space_size: 3,
            band: WavelengthRange::Bounded {
                lo: 2000.0,
                hi: 8000.0,
            },
        }
    }
}

impl TimeSeriesConfig {
    pub fn validate(&self) -> Result<()> {
        require_positive("time_sigma", self.time_sigma)?;
        require_positive("space_sigma", self.space_sigma)?;
        if self.space_size == 0 {
            return Err(AnalysisError::InvalidParameter {
                name: "space_size",
                reason: "filter window must cover at least one pixel".to_string(),
            });
        }
        Ok(())
    }
}

/// Replace temporal cosmic rays in a stack of frames shaped (n_frames, y, x).
///
/// On each of `config.time_iter` passes, a pixel is an outlier when its
/// absolute deviation from the per-pixel median over time exceeds
/// `config.time_sigma` times the RMS deviation from that median; outliers are
/// replaced by the median. Returns the cleaned stack and the union of the
/// outlier masks.
pub fn remove_cosmic_rays_time(
    series: &Array3<f64>,
    config: &TimeSeriesConfig,
) -> Result<(Array3<f64>, Array3<bool>)> {
    if series.len_of(Axis(0)) == 0 {
        return Err(AnalysisError::EmptyInput("time series"));
    }
    config.validate()?;
    let n_sigma = config.time_sigma;

    let (n_frames, ny, nx) = series.dim();
    let mut cleaned = series.clone();
    let mut mask = Array3::from_elem((n_frames, ny, nx), false);
    let mut samples = Vec::with_capacity(n_frames);

    for pass in 0..config.time_iter {
        let mut replaced = 0usize;
        for y in 0..ny {
            for x in 0..nx {
                samples.clear();
                samples.extend((0..n_frames).map(|t| cleaned[[t, y, x]]));
                let med = median(&mut samples);
                let rmse = ((0..n_frames)
                    .map(|t| (cleaned[[t, y, x]] - med).powi(2))
                    .sum::<f64>()
                    / n_frames as f64)
                    .sqrt();

                for t in 0..n_frames {
                    if (cleaned[[t, y, x]] - med).abs() > n_sigma * rmse {
                        cleaned[[t, y, x]] = med;
                        mask[[t, y, x]] = true;
                        replaced += 1;
                    }
                }
            }
        }
        log::debug!("cosmic-ray pass {pass}: replaced {replaced} pixel(s)");
    }

    Ok((cleaned, mask))
}

/// Replace spatial cosmic rays frame by frame in a stack shaped (n_frames, y, x).
///
/// Each pixel is compared with the median and the standard deviation of the
/// `config.space_size` square window around it, mirrored at the frame edges
/// (`d c b a | a b c d`). Pixels deviating from the local median by more than
/// `config.space_sigma` local deviations are replaced by that median. All
/// statistics of a frame come from the frame before replacement.
pub fn remove_cosmic_rays_space(
    series: &Array3<f64>,
    config: &TimeSeriesConfig,
) -> Result<(Array3<f64>, Array3<bool>)> {
    if series.len_of(Axis(0)) == 0 {
        return Err(AnalysisError::EmptyInput("time series"));
    }
    config.validate()?;

    let mut cleaned = series.clone();
    let mut mask = Array3::from_elem(series.dim(), false);

    for (t, frame) in series.outer_iter().enumerate() {
        let (median_frame, std_frame) = window_statistics(frame, config.space_size);
        let mut replaced = 0usize;
        for ((y, x), &value) in frame.indexed_iter() {
            let local_median = median_frame[[y, x]];
            if (value - local_median).abs() > config.space_sigma * std_frame[[y, x]] {
                cleaned[[t, y, x]] = local_median;
                mask[[t, y, x]] = true;
                replaced += 1;
            }
        }
        log::debug!("frame {t}: replaced {replaced} spatial outlier(s)");
    }

    Ok((cleaned, mask))
}

/// Mirror an index into `0..n` about the array edges.
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let i = i.rem_euclid(period);
    (if i >= n { period - 1 - i } else { i }) as usize
}

/// Median and standard deviation of the `size`-square window around every pixel.
fn window_statistics(frame: ArrayView2<f64>, size: usize) -> (Array2<f64>, Array2<f64>) {
    let (ny, nx) = frame.dim();
    let start = -((size / 2) as isize);
    let offsets: Vec<isize> = (start..start + size as isize).collect();

    let mut medians = Array2::zeros((ny, nx));
    let mut stds = Array2::zeros((ny, nx));
    let mut window = Vec::with_capacity(size * size);
    for y in 0..ny {
        for x in 0..nx {
            window.clear();
            for &dy in &offsets {
                let wy = reflect(y as isize + dy, ny);
                for &dx in &offsets {
                    window.push(frame[[wy, reflect(x as isize + dx, nx)]]);
                }
            }
            let n = window.len() as f64;
            let mean = window.iter().sum::<f64>() / n;
            let mean_sq = window.iter().map(|v| v * v).sum::<f64>() / n;
            stds[[y, x]] = (mean_sq - mean * mean).max(0.0).sqrt();
            medians[[y, x]] = median(&mut window);
        }
    }
    (medians, stds)
}

/// A band-integrated light curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightCurve {
    /// Summed counts per frame.
    pub counts: Vec<f64>,
    /// Poisson relative error per frame, `sqrt(N) / N`.
    pub relative_error: Vec<f64>,
}

/// Sum each frame of `counts` (n_frames, n_pixels) over the pixels whose
/// wavelength lies inside `range`.
pub fn make_light_curve(
    wavelength: &[f64],
    counts: &Array2<f64>,
    range: &WavelengthRange,
) -> Result<LightCurve> {
    let (_, n_pixels) = counts.dim();
    if n_pixels != wavelength.len() {
        return Err(AnalysisError::LengthMismatch {
            what: "light-curve pixels",
            expected: wavelength.len(),
            actual: n_pixels,
        });
    }

    let selected: Vec<usize> = wavelength
        .iter()
        .enumerate()
        .filter(|(_, &w)| range.contains(w))
        .map(|(i, _)| i)
        .collect();
    if selected.is_empty() {
        if let WavelengthRange::Bounded { lo, hi } = *range {
            return Err(AnalysisError::RangeNotFound { lo, hi });
        }
        return Err(AnalysisError::EmptyInput("wavelength"));
    }

    let band = counts.select(Axis(1), &selected);
    let summed = band.sum_axis(Axis(1)).to_vec();
    let relative_error = summed
        .iter()
        .map(|&n| if n > 0.0 { n.sqrt() / n } else { 0.0 })
        .collect();

    Ok(LightCurve {
        counts: summed,
        relative_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spike_is_replaced_by_median() {
        let mut series = Array3::from_elem((20, 3, 3), 10.0);
        series[[7, 1, 2]] = 1000.0;
        let (cleaned, mask) = remove_cosmic_rays_time(&series, &TimeSeriesConfig::default()).unwrap();
        assert_eq!(cleaned[[7, 1, 2]], 10.0);
        assert!(mask[[7, 1, 2]]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 1);
    }

    #[test]
    fn test_cosmic_ray_input_validation() {
        let config = TimeSeriesConfig::default();
        let empty = Array3::<f64>::zeros((0, 2, 2));
        assert_eq!(
            remove_cosmic_rays_time(&empty, &config),
            Err(AnalysisError::EmptyInput("time series"))
        );
        assert_eq!(
            remove_cosmic_rays_space(&empty, &config),
            Err(AnalysisError::EmptyInput("time series"))
        );

        let series = Array3::<f64>::zeros((3, 2, 2));
        let zero_sigma = TimeSeriesConfig {
            time_sigma: 0.0,
            ..config
        };
        assert!(remove_cosmic_rays_time(&series, &zero_sigma).is_err());
        let no_window = TimeSeriesConfig {
            space_size: 0,
            ..config
        };
        assert!(matches!(
            remove_cosmic_rays_space(&series, &no_window),
            Err(AnalysisError::InvalidParameter { name: "space_size", .. })
        ));
    }

    #[test]
    fn test_hot_pixel_is_replaced_by_local_median() {
        let mut series = Array3::from_elem((2, 5, 5), 10.0);
        series[[1, 2, 2]] = 1000.0;
        let (cleaned, mask) = remove_cosmic_rays_space(&series, &TimeSeriesConfig::default()).unwrap();
        assert_eq!(cleaned[[1, 2, 2]], 10.0);
        assert!(mask[[1, 2, 2]]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 1);
        assert_eq!(cleaned.index_axis(Axis(0), 0), series.index_axis(Axis(0), 0));
    }

    #[test]
    fn test_smooth_ramp_has_no_spatial_outliers() {
        let series = Array3::from_shape_fn((1, 4, 6), |(_, y, x)| 3.0 * x as f64 + y as f64);
        let (cleaned, mask) = remove_cosmic_rays_space(&series, &TimeSeriesConfig::default()).unwrap();
        assert!(mask.iter().all(|&m| !m));
        assert_eq!(cleaned, series);
    }

    #[test]
    fn test_reflect_mirrors_about_edges() {
        let mapped: Vec<usize> = (-2..6).map(|i| reflect(i, 4)).collect();
        assert_eq!(mapped, vec![1, 0, 0, 1, 2, 3, 3, 2]);
    }

    #[test]
    fn test_light_curve_band_sum() {
        let wavelength = [1900.0, 2500.0, 5000.0, 9000.0];
        let counts =
            Array2::from_shape_vec((2, 4), vec![1.0, 100.0, 300.0, 5.0, 2.0, 200.0, 200.0, 7.0])
                .unwrap();
        let config = TimeSeriesConfig::default();
        let lc = make_light_curve(&wavelength, &counts, &config.band).unwrap();
        assert_eq!(lc.counts, vec![400.0, 400.0]);
        assert_relative_eq!(lc.relative_error[0], 0.05);
    }

    #[test]
    fn test_light_curve_errors() {
        let counts = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            make_light_curve(&[1.0, 2.0], &counts, &WavelengthRange::Full),
            Err(AnalysisError::LengthMismatch { .. })
        ));
        let range = WavelengthRange::bounded(10.0, 20.0).unwrap();
        assert!(matches!(
            make_light_curve(&[1.0, 2.0, 3.0], &counts, &range),
            Err(AnalysisError::RangeNotFound { .. })
        ));
    }
}
