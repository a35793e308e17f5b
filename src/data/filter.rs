use serde::{Deserialize, Serialize};

use super::model::Segment;
use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// WavelengthRange: which pixels of a segment are selected
// ---------------------------------------------------------------------------

/// Reserved value marking "no range" in the two-element config form.
pub const FULL_RANGE_SENTINEL: f64 = -1.0;

/// A wavelength selection.
///
/// In configuration files this is written as a two-element array; the
/// reserved pair `[-1, -1]` means [`WavelengthRange::Full`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub enum WavelengthRange {
    /// Every pixel of every segment.
    #[default]
    Full,
    /// Pixels with `lo < wavelength < hi` (both bounds exclusive).
    Bounded { lo: f64, hi: f64 },
}

impl WavelengthRange {
    /// Build a bounded range, rejecting empty or non-finite intervals.
    pub fn bounded(lo: f64, hi: f64) -> Result<Self> {
        if lo.is_nan() || hi.is_nan() || lo >= hi {
            return Err(AnalysisError::InvalidRange { lo, hi });
        }
        Ok(WavelengthRange::Bounded { lo, hi })
    }

    /// Whether a single wavelength is selected.
    pub fn contains(&self, wavelength: f64) -> bool {
        match *self {
            WavelengthRange::Full => true,
            WavelengthRange::Bounded { lo, hi } => wavelength > lo && wavelength < hi,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, WavelengthRange::Full)
    }
}

impl TryFrom<[f64; 2]> for WavelengthRange {
    type Error = AnalysisError;

    fn try_from(pair: [f64; 2]) -> Result<Self> {
        if pair == [FULL_RANGE_SENTINEL, FULL_RANGE_SENTINEL] {
            Ok(WavelengthRange::Full)
        } else {
            WavelengthRange::bounded(pair[0].min(pair[1]), pair[0].max(pair[1]))
        }
    }
}

impl From<WavelengthRange> for [f64; 2] {
    fn from(range: WavelengthRange) -> Self {
        match range {
            WavelengthRange::Full => [FULL_RANGE_SENTINEL, FULL_RANGE_SENTINEL],
            WavelengthRange::Bounded { lo, hi } => [lo, hi],
        }
    }
}

// ---------------------------------------------------------------------------
// Selection helpers
// ---------------------------------------------------------------------------

/// Indices of the pixels of `segment` that fall inside `range`.
pub fn selected_pixels(segment: &Segment, range: &WavelengthRange) -> Vec<usize> {
    segment
        .wavelength
        .iter()
        .enumerate()
        .filter(|(_, &w)| range.contains(w))
        .map(|(i, _)| i)
        .collect()
}

/// Gather `values[i]` for every index in `indices`.
pub fn take(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|&i| values[i]).collect()
}
