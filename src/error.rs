use thiserror::Error;

// ---------------------------------------------------------------------------
// AnalysisError – every recoverable failure of the numeric routines
// ---------------------------------------------------------------------------

/// Errors returned by the binning, SNR, comparison, PSF and contrast routines.
///
/// All variants are local to the call: nothing here is fatal to the process,
/// and no partial result accompanies an error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("downsampling factor must be non-zero, got {0}")]
    InvalidFactor(usize),

    #[error("impossible bin size of 0")]
    InvalidBinSize,

    #[error("binning by 1 means doing nothing; bin size must be greater than 1")]
    TrivialBinSize,

    #[error("a weighted mean was requested but no weights were supplied")]
    MissingWeights,

    #[error("{what}: expected {expected} values, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{0} is not a number")]
    NotANumber(&'static str),

    #[error("wavelength range ({lo}, {hi}) was not found in any segment")]
    RangeNotFound { lo: f64, hi: f64 },

    #[error("invalid wavelength range: lower bound {lo} is not below upper bound {hi}")]
    InvalidRange { lo: f64, hi: f64 },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{0} is empty")]
    EmptyInput(&'static str),

    #[error("{axis} coordinate {value} is outside [{min}, {max}]")]
    OutOfBounds {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("total flux is zero; cannot normalize")]
    ZeroFlux,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Reject a non-positive (or non-finite) scalar parameter.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::InvalidParameter {
            name,
            reason: format!("must be a positive finite number, got {value}"),
        })
    }
}
