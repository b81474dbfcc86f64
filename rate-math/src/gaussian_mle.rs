//! Maximum-likelihood scale of a Gaussian sample

use crate::error::EstimatorError;
use crate::stats::mean;

/// Maximum-likelihood estimator for the standard deviation of a Gaussian.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianMle;

impl GaussianMle {
    /// Estimate σ as the population standard deviation (divides by `n`).
    ///
    /// # Returns
    /// * `Err(EstimatorError::EmptyData)` - If `data` is empty
    pub fn estimate(data: &[f64]) -> Result<f64, EstimatorError> {
        let mu = mean(data, "gaussian sample")?;
        let variance = data.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / data.len() as f64;
        Ok(variance.sqrt())
    }
}
