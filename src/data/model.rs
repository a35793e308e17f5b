use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Segment – one row of an x1d-style spectral table
// ---------------------------------------------------------------------------

/// One detector segment (one row of the source table).
///
/// Every per-pixel vector has the same length; [`Segment::new`] checks this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Exposure time of the segment in seconds.
    pub exptime: f64,
    /// Wavelength axis (Å).
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub error: Vec<f64>,
    pub error_lower: Vec<f64>,
    /// Gross count rate (counts / s).
    pub gross: Vec<f64>,
    /// Gross counts.
    pub gcounts: Vec<f64>,
}

impl Segment {
    /// Build a segment, validating that all columns share the wavelength length.
    pub fn new(
        exptime: f64,
        wavelength: Vec<f64>,
        flux: Vec<f64>,
        error: Vec<f64>,
        error_lower: Vec<f64>,
        gross: Vec<f64>,
        gcounts: Vec<f64>,
    ) -> Result<Self> {
        let segment = Segment {
            exptime,
            wavelength,
            flux,
            error,
            error_lower,
            gross,
            gcounts,
        };
        segment.validate()?;
        Ok(segment)
    }

    /// Check that every column has as many pixels as the wavelength axis.
    pub fn validate(&self) -> Result<()> {
        let expected = self.wavelength.len();
        let columns: [(&'static str, usize); 5] = [
            ("FLUX", self.flux.len()),
            ("ERROR", self.error.len()),
            ("ERROR_LOWER", self.error_lower.len()),
            ("GROSS", self.gross.len()),
            ("GCOUNTS", self.gcounts.len()),
        ];
        for (what, actual) in columns {
            if actual != expected {
                return Err(AnalysisError::LengthMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    /// Whether the segment has no pixels.
    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Smallest and largest finite wavelength, or `None` for an empty segment.
    pub fn wavelength_bounds(&self) -> Option<(f64, f64)> {
        self.wavelength
            .iter()
            .copied()
            .filter(|w| w.is_finite())
            .fold(None, |acc, w| match acc {
                None => Some((w, w)),
                Some((lo, hi)) => Some((lo.min(w), hi.max(w))),
            })
    }

    /// Per-pixel exposure time recovered as `gcounts / gross`.
    ///
    /// Pixels where the ratio is not finite (0/0 on dead pixels) get a tiny
    /// weight instead, so a group only averages to ~0 weight when every pixel
    /// in it is dead.
    pub fn exposure_weights(&self) -> Vec<f64> {
        self.gcounts
            .iter()
            .zip(&self.gross)
            .map(|(&counts, &rate)| {
                let w = counts / rate;
                if w.is_finite() {
                    w
                } else {
                    DEAD_PIXEL_WEIGHT
                }
            })
            .collect()
    }
}

/// Weight given to pixels whose exposure time cannot be recovered.
pub const DEAD_PIXEL_WEIGHT: f64 = 1e-30;

// ---------------------------------------------------------------------------
// SpectralTable – the complete loaded dataset
// ---------------------------------------------------------------------------

/// A full spectral table: one [`Segment`] per detector segment, in file order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpectralTable {
    pub segments: Vec<Segment>,
}

impl SpectralTable {
    /// Build a table from already-validated segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        SpectralTable { segments }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total gross counts over every segment.
    pub fn total_gcounts(&self) -> f64 {
        self.segments
            .iter()
            .flat_map(|s| s.gcounts.iter())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// PsfProfile – reference radial PSF intensity curve
// ---------------------------------------------------------------------------

/// Azimuthally averaged PSF intensity, normalized to the PSF peak, as a
/// function of angular separation (arcsec).
///
/// Deserialization goes through [`PsfProfile::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PsfProfileColumns")]
pub struct PsfProfile {
    separation: Vec<f64>,
    intensity: Vec<f64>,
}

#[derive(Deserialize)]
struct PsfProfileColumns {
    separation: Vec<f64>,
    intensity: Vec<f64>,
}

impl TryFrom<PsfProfileColumns> for PsfProfile {
    type Error = AnalysisError;

    fn try_from(columns: PsfProfileColumns) -> Result<Self> {
        PsfProfile::new(columns.separation, columns.intensity)
    }
}

impl PsfProfile {
    /// Build a profile. Separations must be finite, positive and strictly
    /// ascending; intensities must be finite.
    pub fn new(separation: Vec<f64>, intensity: Vec<f64>) -> Result<Self> {
        if separation.is_empty() {
            return Err(AnalysisError::EmptyInput("PSF profile"));
        }
        if separation.len() != intensity.len() {
            return Err(AnalysisError::LengthMismatch {
                what: "PSF intensity",
                expected: separation.len(),
                actual: intensity.len(),
            });
        }
        for (name, column) in [("separation", &separation), ("intensity", &intensity)] {
            if let Some(bad) = column.iter().find(|v| !v.is_finite()) {
                return Err(AnalysisError::InvalidParameter {
                    name,
                    reason: format!("must be finite, got {bad}"),
                });
            }
        }
        if separation[0] <= 0.0 || separation.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidParameter {
                name: "separation",
                reason: "must be positive and strictly ascending".to_string(),
            });
        }
        Ok(PsfProfile {
            separation,
            intensity,
        })
    }

    pub fn separation(&self) -> &[f64] {
        &self.separation
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn len(&self) -> usize {
        self.separation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.separation.is_empty()
    }

    /// Linearly interpolated intensity at separation `r`.
    ///
    /// Outside the tabulated range the nearest end value is used; a NaN
    /// separation gives NaN.
    pub fn intensity_at(&self, r: f64) -> f64 {
        if r.is_nan() {
            return f64::NAN;
        }
        let xs = &self.separation;
        let ys = &self.intensity;
        let last = xs.len() - 1;
        if r <= xs[0] {
            return ys[0];
        }
        if r >= xs[last] {
            return ys[last];
        }
        let idx = xs.partition_point(|&x| x < r);
        if xs[idx] == r {
            return ys[idx];
        }
        let (x1, x2) = (xs[idx - 1], xs[idx]);
        let (y1, y2) = (ys[idx - 1], ys[idx]);
        let t = (r - x1) / (x2 - x1);
        y1 + t * (y2 - y1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn segment(n: usize) -> Segment {
        Segment::new(
            100.0,
            (0..n).map(|i| 1100.0 + i as f64).collect(),
            vec![1.0; n],
            vec![0.1; n],
            vec![0.1; n],
            vec![2.0; n],
            vec![200.0; n],
        )
        .unwrap()
    }

    #[test]
    fn test_segment_rejects_ragged_columns() {
        let err = Segment::new(
            1.0,
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::LengthMismatch {
                what: "ERROR",
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_exposure_weights_replace_dead_pixels() {
        let mut seg = segment(3);
        seg.gross[1] = 0.0;
        seg.gcounts[1] = 0.0;
        let w = seg.exposure_weights();
        assert_relative_eq!(w[0], 100.0);
        assert_eq!(w[1], DEAD_PIXEL_WEIGHT);
        assert_relative_eq!(w[2], 100.0);
    }

    #[test]
    fn test_wavelength_bounds() {
        let seg = segment(5);
        assert_eq!(seg.wavelength_bounds(), Some((1100.0, 1104.0)));
    }

    #[test]
    fn test_psf_profile_interpolation() {
        let profile = PsfProfile::new(vec![0.5, 1.0, 2.0], vec![1e-2, 1e-3, 1e-4]).unwrap();
        assert_relative_eq!(profile.intensity_at(0.75), 5.5e-3);
        assert_relative_eq!(profile.intensity_at(1.0), 1e-3);
        assert_relative_eq!(profile.intensity_at(0.1), 1e-2);
        assert_relative_eq!(profile.intensity_at(5.0), 1e-4);
    }

    #[test]
    fn test_psf_profile_rejects_unsorted() {
        assert!(PsfProfile::new(vec![1.0, 0.5], vec![1.0, 1.0]).is_err());
        assert!(PsfProfile::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_psf_profile_rejects_non_finite_samples() {
        assert!(matches!(
            PsfProfile::new(vec![f64::NAN, 1.0], vec![1e-2, 1e-3]),
            Err(AnalysisError::InvalidParameter { name: "separation", .. })
        ));
        assert!(matches!(
            PsfProfile::new(vec![0.5, f64::INFINITY], vec![1e-2, 1e-3]),
            Err(AnalysisError::InvalidParameter { name: "separation", .. })
        ));
        assert!(matches!(
            PsfProfile::new(vec![0.5, 1.0], vec![f64::NAN, 1e-3]),
            Err(AnalysisError::InvalidParameter { name: "intensity", .. })
        ));

        let profile = PsfProfile::new(vec![0.5, 1.0], vec![1e-2, 1e-3]).unwrap();
        assert!(profile.intensity_at(f64::NAN).is_nan());
    }

    #[test]
    fn test_psf_profile_deserialization_is_validated() {
        let ok: PsfProfile =
            serde_json::from_str(r#"{"separation": [0.5, 1.0], "intensity": [1e-2, 1e-3]}"#)
                .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<PsfProfile>(
            r#"{"separation": [1.0, 0.5], "intensity": [1e-2, 1e-3]}"#
        )
        .is_err());
    }

    #[test]
    fn test_deserialized_segment_can_be_ragged_until_validated() {
        let seg: Segment = serde_json::from_str(
            r#"{"exptime": 1.0, "wavelength": [1.0, 2.0, 3.0], "flux": [0, 0, 0],
                "error": [0, 0, 0], "error_lower": [0, 0, 0], "gross": [1, 1, 1],
                "gcounts": [4.0]}"#,
        )
        .unwrap();
        assert_eq!(
            seg.validate(),
            Err(AnalysisError::LengthMismatch {
                what: "GCOUNTS",
                expected: 3,
                actual: 1
            })
        );
    }
}
