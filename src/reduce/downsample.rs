use crate::error::{AnalysisError, Result};

// ---------------------------------------------------------------------------
// Combination options
// ---------------------------------------------------------------------------

/// How [`downsample_mean`] combines each group of pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanOptions<'a> {
    /// Per-element weights; required when `weighted` is set.
    pub weights: Option<&'a [f64]>,
    /// Weighted average instead of the arithmetic mean.
    pub weighted: bool,
    /// Square the inputs, average, then take the square root, so that
    /// independent errors combine in quadrature.
    pub in_quadrature: bool,
}

impl<'a> MeanOptions<'a> {
    /// Plain arithmetic mean of each group.
    pub fn unweighted() -> Self {
        MeanOptions::default()
    }

    /// Weighted average using `weights`.
    pub fn weighted(weights: &'a [f64]) -> Self {
        MeanOptions {
            weights: Some(weights),
            weighted: true,
            in_quadrature: false,
        }
    }

    /// Same options, combined in quadrature.
    pub fn in_quadrature(mut self) -> Self {
        self.in_quadrature = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Downsampling
// ---------------------------------------------------------------------------

fn cropped_len(len: usize, factor: usize) -> Result<usize> {
    if factor == 0 {
        return Err(AnalysisError::InvalidFactor(factor));
    }
    Ok(len - len % factor)
}

/// Sum every `factor` consecutive elements.
///
/// The output has `values.len() / factor` elements; a trailing partial group
/// is dropped.
pub fn downsample_sum(values: &[f64], factor: usize) -> Result<Vec<f64>> {
    let n = cropped_len(values.len(), factor)?;
    Ok(values[..n]
        .chunks_exact(factor)
        .map(|group| group.iter().sum())
        .collect())
}

/// Average every `factor` consecutive elements according to `options`.
///
/// A trailing partial group is dropped, as in [`downsample_sum`]. A weighted
/// group whose weights sum to zero yields `0.0` rather than NaN.
pub fn downsample_mean(values: &[f64], factor: usize, options: &MeanOptions) -> Result<Vec<f64>> {
    let n = cropped_len(values.len(), factor)?;

    let weights = if options.weighted {
        let weights = options.weights.ok_or(AnalysisError::MissingWeights)?;
        if weights.len() < n {
            return Err(AnalysisError::LengthMismatch {
                what: "weights",
                expected: n,
                actual: weights.len(),
            });
        }
        Some(&weights[..n])
    } else {
        None
    };

    let square = |v: f64| if options.in_quadrature { v * v } else { v };

    let mut out: Vec<f64> = match weights {
        None => values[..n]
            .chunks_exact(factor)
            .map(|group| group.iter().map(|&v| square(v)).sum::<f64>() / factor as f64)
            .collect(),
        Some(weights) => values[..n]
            .chunks_exact(factor)
            .zip(weights.chunks_exact(factor))
            .enumerate()
            .map(|(i, (group, w))| {
                let total_weight: f64 = w.iter().sum();
                if total_weight == 0.0 || !total_weight.is_finite() {
                    log::debug!("group {i} has no usable weight; setting it to 0");
                    return 0.0;
                }
                group
                    .iter()
                    .zip(w)
                    .map(|(&v, &wi)| square(v) * wi)
                    .sum::<f64>()
                    / total_weight
            })
            .collect(),
    };

    if options.in_quadrature {
        for v in &mut out {
            *v = v.sqrt();
        }
    }
    Ok(out)
}
