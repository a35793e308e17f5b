use serde::Serialize;

use crate::error::{AnalysisError, Result};

/// Outcome of [`within_percent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    /// `percent_difference <= tolerance`.
    pub within: bool,
    /// `100 · |a − b| / |mean(a, b)|`.
    pub percent_difference: f64,
}

/// Check whether `a` and `b` agree to within `tolerance_pct` percent.
///
/// The difference is taken relative to the mean of the two values, so the
/// result does not depend on argument order. Equal values always agree with a
/// difference of 0; unequal values whose mean is zero differ by `+inf`.
pub fn within_percent(a: f64, b: f64, tolerance_pct: f64) -> Result<Comparison> {
    for (name, value) in [("first value", a), ("second value", b), ("tolerance", tolerance_pct)] {
        if !value.is_finite() {
            return Err(AnalysisError::NotANumber(name));
        }
    }

    let percent_difference = if a == b {
        0.0
    } else {
        let mean = 0.5 * (a + b);
        if mean == 0.0 {
            f64::INFINITY
        } else {
            100.0 * (a - b).abs() / mean.abs()
        }
    };

    let within = percent_difference <= tolerance_pct;
    if !within {
        log::debug!("{a} and {b} differ by {percent_difference:.3}% (tolerance {tolerance_pct}%)");
    }
    Ok(Comparison {
        within,
        percent_difference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identical_values() {
        let c = within_percent(100.0, 100.0, 1.0).unwrap();
        assert!(c.within);
        assert_eq!(c.percent_difference, 0.0);
        assert!(within_percent(0.0, 0.0, 0.0).unwrap().within);
    }

    #[test]
    fn test_outside_tolerance_reports_magnitude() {
        let c = within_percent(100.0, 110.0, 5.0).unwrap();
        assert!(!c.within);
        assert_relative_eq!(c.percent_difference, 9.5238095, epsilon = 1e-6);
    }

    #[test]
    fn test_symmetric_in_arguments() {
        let ab = within_percent(3.2, 4.7, 50.0).unwrap();
        let ba = within_percent(4.7, 3.2, 50.0).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_nan_is_usage_error() {
        assert_eq!(
            within_percent(f64::NAN, 1.0, 1.0),
            Err(AnalysisError::NotANumber("first value"))
        );
        assert_eq!(
            within_percent(1.0, f64::NAN, 1.0),
            Err(AnalysisError::NotANumber("second value"))
        );
    }

    #[test]
    fn test_zero_mean() {
        let c = within_percent(-1.0, 1.0, 1000.0).unwrap();
        assert!(!c.within);
        assert!(c.percent_difference.is_infinite());
    }
}
