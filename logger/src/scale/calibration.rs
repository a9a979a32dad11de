//! Two-point GAP calibration.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalibrationError {
    /// A zero reference weight is a caller bug, not a transient condition.
    #[error("known weight must be non-zero")]
    ZeroKnownWeight,
}

/// Computes the GAP constant from a two-point observation:
///
/// `gap = (adc_at_zero - adc_at_weight) / known_weight_g`
///
/// Loading the sensor decreases the raw count for this wiring, so the
/// subtraction is swapped and a positive GAP means counts drop under load.
pub fn compute_gap(
    adc_at_zero: i32,
    adc_at_weight: i32,
    known_weight_g: f32,
) -> Result<f32, CalibrationError> {
    if known_weight_g == 0.0 {
        return Err(CalibrationError::ZeroKnownWeight);
    }
    Ok((adc_at_zero - adc_at_weight) as f32 / known_weight_g)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_from_two_points() {
        assert_eq!(compute_gap(1000, 800, 200.0).unwrap(), 1.0);
    }

    #[test]
    fn gap_is_negative_when_counts_rise_under_load() {
        assert_eq!(compute_gap(800, 1000, 200.0).unwrap(), -1.0);
    }

    #[test]
    fn zero_weight_is_rejected() {
        assert_eq!(
            compute_gap(1000, 800, 0.0),
            Err(CalibrationError::ZeroKnownWeight)
        );
    }
}
