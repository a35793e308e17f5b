//! Coronagraphic contrast-sensitivity model.
//!
//! Predicts the faintest detectable companion (as a flux ratio to the host
//! star's PSF peak) versus angular separation for a coronagraphic exposure.
//! Four independent noise sources are added in quadrature:
//!
//! - detector: dark current and read noise (one read per sub-exposure)
//! - background: zodiacal light plus earthshine
//! - photon noise from the stellar PSF wings at each separation
//! - speckle noise, an empirical inverse power law in separation
//!
//! Every variance is doubled because the science frame is differenced
//! against a reference-star frame with the same noise.
//!
//! All quantities are per pixel; counts are electrons over the total
//! exposure time.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::data::model::PsfProfile;
use crate::error::{AnalysisError, Result, require_positive};

/// Detection thresholds reported by [`contrast_curve`].
pub const SIGMA_LEVELS: [f64; 3] = [1.0, 3.0, 5.0];

/// Exposure and detector parameters for the contrast model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastParams {
    /// Sub-exposure (single read) time in seconds.
    pub t_sub: f64,
    /// Total exposure time in seconds.
    pub texp: f64,
    /// Count rate of the PSF peak pixel, e⁻/s.
    pub peak_rate: f64,
    /// Dark current, e⁻/s/pixel.
    pub dark_rate: f64,
    /// Read noise per read, e⁻.
    pub read_noise: f64,
    /// Zodiacal light, e⁻/s/pixel.
    pub zodi_rate: f64,
    /// Earthshine, e⁻/s/pixel.
    pub earthshine_rate: f64,
    /// Speckle noise at 1 arcsec as a fraction of the PSF peak.
    pub speckle_amplitude: f64,
    /// Power-law index of the speckle falloff with separation.
    pub speckle_index: f64,
}

impl Default for ContrastParams {
    fn default() -> Self {
        // STIS CCD, unfiltered 50CCD aperture.
        ContrastParams {
            t_sub: 60.0,
            texp: 2400.0,
            peak_rate: 1.0e5,
            dark_rate: 0.009,
            read_noise: 5.4,
            zodi_rate: 0.012,
            earthshine_rate: 0.004,
            speckle_amplitude: 1.5e-4,
            speckle_index: 2.5,
        }
    }
}

fn require_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::InvalidParameter {
            name,
            reason: format!("must be a non-negative finite number, got {value}"),
        })
    }
}

impl ContrastParams {
    /// Reject parameters the model cannot use.
    pub fn validate(&self) -> Result<()> {
        require_positive("t_sub", self.t_sub)?;
        require_positive("texp", self.texp)?;
        require_positive("peak_rate", self.peak_rate)?;
        if self.t_sub > self.texp {
            return Err(AnalysisError::InvalidParameter {
                name: "t_sub",
                reason: format!(
                    "sub-exposure time {} exceeds total exposure time {}",
                    self.t_sub, self.texp
                ),
            });
        }
        require_non_negative("dark_rate", self.dark_rate)?;
        require_non_negative("read_noise", self.read_noise)?;
        require_non_negative("zodi_rate", self.zodi_rate)?;
        require_non_negative("earthshine_rate", self.earthshine_rate)?;
        require_non_negative("speckle_amplitude", self.speckle_amplitude)?;
        require_non_negative("speckle_index", self.speckle_index)?;
        Ok(())
    }

    /// Number of reads over the total exposure.
    pub fn reads(&self) -> f64 {
        self.texp / self.t_sub
    }

    /// Counts in the PSF peak pixel over the exposure; the signal of a
    /// companion at contrast 1.
    fn signal_per_unit_contrast(&self) -> f64 {
        self.peak_rate * self.texp
    }
}

/// Per-term 1-sigma noise at one separation, in contrast units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseBreakdown {
    pub detector: f64,
    pub background: f64,
    pub photon: f64,
    pub speckle: f64,
    /// Quadrature sum of the four terms.
    pub total: f64,
}

/// Predicted contrast sensitivity at each separation of the reference profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContrastCurve {
    /// Angular separation, arcsec.
    pub separation: Vec<f64>,
    pub one_sigma: Vec<f64>,
    pub three_sigma: Vec<f64>,
    pub five_sigma: Vec<f64>,
    pub noise: Vec<NoiseBreakdown>,
}

#[derive(Serialize)]
struct ContrastRow {
    separation: f64,
    one_sigma: f64,
    three_sigma: f64,
    five_sigma: f64,
    detector: f64,
    background: f64,
    photon: f64,
    speckle: f64,
}

impl ContrastCurve {
    pub fn len(&self) -> usize {
        self.separation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.separation.is_empty()
    }

    /// Contrast curve at an arbitrary sigma level.
    pub fn at_sigma(&self, n_sigma: f64) -> Vec<f64> {
        self.noise.iter().map(|n| n_sigma * n.total).collect()
    }

    /// Write the curve and its noise breakdown as CSV.
    pub fn write_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path).context("creating contrast CSV")?;
        for i in 0..self.len() {
            let n = &self.noise[i];
            writer
                .serialize(ContrastRow {
                    separation: self.separation[i],
                    one_sigma: self.one_sigma[i],
                    three_sigma: self.three_sigma[i],
                    five_sigma: self.five_sigma[i],
                    detector: n.detector,
                    background: n.background,
                    photon: n.photon,
                    speckle: n.speckle,
                })
                .with_context(|| format!("writing contrast row {i}"))?;
        }
        writer.flush().context("flushing contrast CSV")?;
        Ok(())
    }
}

/// Detector noise (dark + read) in contrast units, independent of separation.
pub fn detector_noise_contrast(params: &ContrastParams) -> Result<f64> {
    params.validate()?;
    Ok((2.0 * detector_variance(params)).sqrt() / params.signal_per_unit_contrast())
}

fn detector_variance(params: &ContrastParams) -> f64 {
    params.dark_rate * params.texp + params.read_noise.powi(2) * params.reads()
}

fn noise_at(params: &ContrastParams, separation: f64, psf_intensity: f64) -> NoiseBreakdown {
    let signal = params.signal_per_unit_contrast();
    let to_contrast = |variance: f64| (2.0 * variance).sqrt() / signal;

    let detector = to_contrast(detector_variance(params));
    let background =
        to_contrast((params.zodi_rate + params.earthshine_rate) * params.texp);
    let photon = to_contrast(params.peak_rate * psf_intensity.max(0.0) * params.texp);
    let speckle_counts =
        params.speckle_amplitude * separation.powf(-params.speckle_index) * signal;
    let speckle = to_contrast(speckle_counts * speckle_counts);

    let total = (detector.powi(2) + background.powi(2) + photon.powi(2) + speckle.powi(2)).sqrt();
    NoiseBreakdown {
        detector,
        background,
        photon,
        speckle,
        total,
    }
}

/// Compute the 1-, 3- and 5-sigma contrast curves at every separation of
/// `profile`.
pub fn contrast_curve(params: &ContrastParams, profile: &PsfProfile) -> Result<ContrastCurve> {
    params.validate()?;
    log::info!(
        "contrast model: texp {} s in {} reads, peak {} e-/s, {} separations",
        params.texp,
        params.reads(),
        params.peak_rate,
        profile.len()
    );

    let separation = profile.separation().to_vec();
    let noise: Vec<NoiseBreakdown> = separation
        .iter()
        .zip(profile.intensity())
        .map(|(&r, &intensity)| noise_at(params, r, intensity))
        .collect();

    let mut curve = ContrastCurve {
        separation,
        one_sigma: Vec::new(),
        three_sigma: Vec::new(),
        five_sigma: Vec::new(),
        noise,
    };
    let [one, three, five] = SIGMA_LEVELS;
    curve.one_sigma = curve.at_sigma(one);
    curve.three_sigma = curve.at_sigma(three);
    curve.five_sigma = curve.at_sigma(five);
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn profile() -> PsfProfile {
        let separation: Vec<f64> = (1..=30).map(|i| 0.1 * i as f64).collect();
        let intensity = separation.iter().map(|r| 1e-2 * r.powf(-3.0)).collect();
        PsfProfile::new(separation, intensity).unwrap()
    }

    #[test]
    fn test_sigma_levels_are_ordered() {
        let curve = contrast_curve(&ContrastParams::default(), &profile()).unwrap();
        assert_eq!(curve.len(), 30);
        for i in 0..curve.len() {
            assert!(curve.five_sigma[i] >= curve.three_sigma[i]);
            assert!(curve.three_sigma[i] >= curve.one_sigma[i]);
            assert!(curve.one_sigma[i] > 0.0);
        }
        assert_relative_eq!(curve.five_sigma[7], 5.0 * curve.one_sigma[7], max_relative = 1e-12);
    }

    #[test]
    fn test_longer_exposure_lowers_detector_noise() {
        let params = ContrastParams::default();
        let doubled = ContrastParams {
            texp: 2.0 * params.texp,
            ..params
        };
        let single = detector_noise_contrast(&params).unwrap();
        let double = detector_noise_contrast(&doubled).unwrap();
        assert!(double < single);
        assert_relative_eq!(double, single / 2.0_f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn test_contrast_improves_with_separation() {
        let curve = contrast_curve(&ContrastParams::default(), &profile()).unwrap();
        assert!(curve.one_sigma[0] > curve.one_sigma[curve.len() - 1]);
    }

    #[test]
    fn test_differencing_doubles_variance() {
        let params = ContrastParams {
            zodi_rate: 0.0,
            earthshine_rate: 0.0,
            speckle_amplitude: 0.0,
            dark_rate: 0.0,
            read_noise: 0.0,
            ..ContrastParams::default()
        };
        let profile = PsfProfile::new(vec![1.0], vec![1e-3]).unwrap();
        let curve = contrast_curve(&params, &profile).unwrap();
        let counts = params.peak_rate * 1e-3 * params.texp;
        let expected = (2.0 * counts).sqrt() / (params.peak_rate * params.texp);
        assert_relative_eq!(curve.one_sigma[0], expected, max_relative = 1e-12);
        assert_relative_eq!(curve.noise[0].photon, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let profile = profile();
        for params in [
            ContrastParams { texp: 0.0, ..Default::default() },
            ContrastParams { t_sub: -1.0, ..Default::default() },
            ContrastParams { peak_rate: 0.0, ..Default::default() },
            ContrastParams { t_sub: 5000.0, ..Default::default() },
            ContrastParams { dark_rate: f64::NAN, ..Default::default() },
        ] {
            assert!(matches!(
                contrast_curve(&params, &profile),
                Err(AnalysisError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_write_csv() {
        let curve = contrast_curve(&ContrastParams::default(), &profile()).unwrap();
        let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        curve.write_csv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("separation,one_sigma,three_sigma,five_sigma"));
        assert_eq!(text.lines().count(), 31);
    }
}
