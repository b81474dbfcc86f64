//! Statistical helpers shared by the estimators

use crate::error::EstimatorError;

/// Arithmetic mean of a slice.
///
/// # Arguments
/// * `values` - Sample values
/// * `what` - Name of the sample, used in the error message
///
/// # Returns
/// * `Ok(mean)` - Sum divided by count
/// * `Err(EstimatorError::EmptyData)` - If `values` is empty
pub fn mean(values: &[f64], what: &'static str) -> Result<f64, EstimatorError> {
    if values.is_empty() {
        return Err(EstimatorError::EmptyData(what));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Harmonic mean of a slice: the reciprocal of the mean of reciprocals.
///
/// # Returns
/// * `Err(EmptyData)` - If `values` is empty
/// * `Err(ZeroResidence)` - If any value is exactly zero
pub fn harmonic_mean(values: &[f64], what: &'static str) -> Result<f64, EstimatorError> {
    if values.is_empty() {
        return Err(EstimatorError::EmptyData(what));
    }

    let mut reciprocal_sum = 0.0;
    for (index, &value) in values.iter().enumerate() {
        if value == 0.0 {
            return Err(EstimatorError::ZeroResidence { index });
        }
        reciprocal_sum += 1.0 / value;
    }

    Ok(values.len() as f64 / reciprocal_sum)
}
