//! Empirical PSF (ePSF) utilities.
//!
//! Provides sub-pixel evaluation of a tabulated ePSF and stacking of
//! star cutouts into a model:
//! - Bilinear interpolation over the surrounding 2×2 pixels
//! - Bicubic (Keys, a = −0.5) interpolation over the surrounding 4×4 pixels
//! - Cutout extraction around known star positions
//! - Mean or median stacking with optional flux normalization

use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::reduce::median;

/// Keys cubic convolution parameter; −0.5 reproduces quadratics exactly.
const KEYS_A: f64 = -0.5;

/// A PSF sampled on an integer pixel grid, indexed `[y, x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsfGrid {
    data: Array2<f64>,
}

impl EpsfGrid {
    /// Wrap a grid; both dimensions must be at least 2.
    pub fn new(data: Array2<f64>) -> Result<Self> {
        let (ny, nx) = data.dim();
        if ny < 2 || nx < 2 {
            return Err(AnalysisError::InvalidParameter {
                name: "ePSF grid",
                reason: format!("needs at least 2×2 samples, got {ny}×{nx}"),
            });
        }
        Ok(EpsfGrid { data })
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Grid shape as (ny, nx).
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    fn check_bounds(&self, x: f64, y: f64) -> Result<()> {
        let (ny, nx) = self.data.dim();
        for (axis, value, max) in [("x", x, (nx - 1) as f64), ("y", y, (ny - 1) as f64)] {
            if !(0.0..=max).contains(&value) {
                return Err(AnalysisError::OutOfBounds {
                    axis,
                    value,
                    min: 0.0,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Pixel value with indices clamped to the grid edge.
    fn clamped(&self, iy: isize, ix: isize) -> f64 {
        let (ny, nx) = self.data.dim();
        let y = iy.clamp(0, ny as isize - 1) as usize;
        let x = ix.clamp(0, nx as isize - 1) as usize;
        self.data[[y, x]]
    }

    /// Bilinear interpolation at (`x`, `y`) in pixel coordinates.
    pub fn bilinear(&self, x: f64, y: f64) -> Result<f64> {
        self.check_bounds(x, y)?;
        let (ny, nx) = self.data.dim();

        // Upper edge falls into the last cell with weight 1.
        let x0 = (x.floor() as usize).min(nx - 2);
        let y0 = (y.floor() as usize).min(ny - 2);
        let tx = x - x0 as f64;
        let ty = y - y0 as f64;

        let d = &self.data;
        let bottom = d[[y0, x0]] * (1.0 - tx) + d[[y0, x0 + 1]] * tx;
        let top = d[[y0 + 1, x0]] * (1.0 - tx) + d[[y0 + 1, x0 + 1]] * tx;
        Ok(bottom * (1.0 - ty) + top * ty)
    }

    /// Bicubic interpolation at (`x`, `y`) using the Keys kernel.
    ///
    /// Neighbors beyond the grid edge take the edge value.
    pub fn bicubic(&self, x: f64, y: f64) -> Result<f64> {
        self.check_bounds(x, y)?;
        let x0 = x.floor() as isize;
        let y0 = y.floor() as isize;
        let tx = x - x0 as f64;
        let ty = y - y0 as f64;

        let mut value = 0.0;
        for j in -1..=2_isize {
            let wy = keys_kernel(ty - j as f64);
            if wy == 0.0 {
                continue;
            }
            let mut row = 0.0;
            for i in -1..=2_isize {
                row += keys_kernel(tx - i as f64) * self.clamped(y0 + j, x0 + i);
            }
            value += wy * row;
        }
        Ok(value)
    }
}

/// Keys cubic convolution kernel.
fn keys_kernel(t: f64) -> f64 {
    let t = t.abs();
    let a = KEYS_A;
    if t <= 1.0 {
        (a + 2.0) * t.powi(3) - (a + 3.0) * t.powi(2) + 1.0
    } else if t < 2.0 {
        a * t.powi(3) - 5.0 * a * t.powi(2) + 8.0 * a * t - 4.0 * a
    } else {
        0.0
    }
}

/// How cutouts are combined pixel by pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackMethod {
    Mean,
    /// Rejects contaminating sources in individual cutouts.
    #[default]
    Median,
}

/// Cutout extraction and stacking settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfConfig {
    /// Cutouts span `2 * half_width + 1` pixels on a side.
    pub half_width: usize,
    /// Scale each extracted cutout so its peak pixel is one.
    pub scale_to_peak: bool,
    pub method: StackMethod,
    /// Scale the stack to a total flux of one.
    pub normalize: bool,
}

impl Default for PsfConfig {
    fn default() -> Self {
        PsfConfig {
            half_width: 10,
            scale_to_peak: true,
            method: StackMethod::Median,
            normalize: true,
        }
    }
}

/// A star cutout and the index of its position in the input list.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    pub source: usize,
    pub data: Array2<f64>,
}

/// Extract square cutouts centred on the nearest pixel to each `(x, y)`
/// position of `image` (indexed `[y, x]`).
///
/// A star is skipped, with a warning, when its cutout would cross the image
/// edge, when its brightest pixel lies on the cutout border (the star is
/// off-centre or absent), or when it has no positive peak to scale by.
pub fn extract_cutouts(
    image: &Array2<f64>,
    centers: &[(f64, f64)],
    config: &PsfConfig,
) -> Result<Vec<Cutout>> {
    let (ny, nx) = image.dim();
    let r = config.half_width;
    let side = 2 * r + 1;
    let mut cutouts = Vec::with_capacity(centers.len());

    for (source, &(x, y)) in centers.iter().enumerate() {
        if !(x.is_finite() && y.is_finite()) {
            return Err(AnalysisError::NotANumber("star position"));
        }
        let (xi, yi) = (x.round(), y.round());
        if xi < r as f64 || yi < r as f64 || xi + r as f64 >= nx as f64 || yi + r as f64 >= ny as f64 {
            log::warn!("star {source} at ({x}, {y}) is too close to the image edge; skipped");
            continue;
        }
        let (xi, yi) = (xi as usize, yi as usize);
        let data = image.slice(s![yi - r..=yi + r, xi - r..=xi + r]).to_owned();

        let peak = data
            .indexed_iter()
            .filter(|(_, v)| !v.is_nan())
            .fold(None, |best: Option<((usize, usize), f64)>, (idx, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((idx, v)),
            });
        let on_border = |(py, px): (usize, usize)| py == 0 || px == 0 || py == side - 1 || px == side - 1;
        match peak {
            Some((idx, _)) if on_border(idx) => {
                log::warn!("star {source}: peak flux is on the cutout edge; skipped");
                continue;
            }
            None => {
                log::warn!("star {source}: cutout has no valid pixels; skipped");
                continue;
            }
            Some(_) => {}
        }

        let data = if config.scale_to_peak {
            match scale_to_peak(&data) {
                Ok(scaled) => scaled,
                Err(_) => {
                    log::warn!("star {source}: no positive peak to scale by; skipped");
                    continue;
                }
            }
        } else {
            data
        };
        log::debug!("star {source}: cutout centred on ({xi}, {yi})");
        cutouts.push(Cutout { source, data });
    }

    log::info!("extracted {} of {} cutouts", cutouts.len(), centers.len());
    Ok(cutouts)
}

/// Stack equally shaped star cutouts into a single image with
/// `config.method`.
///
/// With `config.normalize`, the result is scaled to a total flux of one.
pub fn stack_cutouts(cutouts: &[Array2<f64>], config: &PsfConfig) -> Result<Array2<f64>> {
    let method = config.method;
    let first = cutouts.first().ok_or(AnalysisError::EmptyInput("cutouts"))?;
    let shape = first.dim();
    if let Some(bad) = cutouts.iter().find(|c| c.dim() != shape) {
        return Err(AnalysisError::LengthMismatch {
            what: "cutout pixels",
            expected: first.len(),
            actual: bad.len(),
        });
    }
    log::info!("creating a {method:?} stack of {} cutouts", cutouts.len());

    let mut stacked = Array2::<f64>::zeros(shape);
    let mut column = Vec::with_capacity(cutouts.len());
    for ((y, x), out) in stacked.indexed_iter_mut() {
        column.clear();
        column.extend(cutouts.iter().map(|c| c[[y, x]]));
        *out = match method {
            StackMethod::Mean => column.iter().sum::<f64>() / column.len() as f64,
            StackMethod::Median => median(&mut column),
        };
    }

    if config.normalize {
        let total = stacked.sum();
        if total == 0.0 || !total.is_finite() {
            return Err(AnalysisError::ZeroFlux);
        }
        stacked /= total;
    }
    Ok(stacked)
}

/// Scale a cutout so its peak pixel is one.
pub fn scale_to_peak(cutout: &Array2<f64>) -> Result<Array2<f64>> {
    let peak = cutout.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak > 0.0 && peak.is_finite()) {
        return Err(AnalysisError::ZeroFlux);
    }
    Ok(cutout / peak)
}
