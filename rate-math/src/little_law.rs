//! Little's Law rate estimator
//!
//! Little's Law relates three long-run averages of a stable queue:
//!
//! ```text
//! L = λ · W
//! ```
//!
//! - `L` - mean number of particles inside the sensor (occupancy)
//! - `λ` - arrival rate of particles into the sensor
//! - `W` - mean time a particle spends inside the sensor (residence)
//!
//! Given an occupancy series and per-particle residence times the arrival
//! rate follows as `λ = L / W`.

use crate::error::EstimatorError;
use crate::stats::harmonic_mean;

/// Estimator based on Little's Law.
#[derive(Debug, Clone, Copy, Default)]
pub struct LittleLawEstimator;

impl LittleLawEstimator {
    /// Mean occupancy `L`: arithmetic mean of the occupancy counts.
    pub fn mean_occupation(occupancy: &[u32]) -> Result<f64, EstimatorError> {
        if occupancy.is_empty() {
            return Err(EstimatorError::EmptyData("occupancy series"));
        }
        let total: f64 = occupancy.iter().map(|&n| n as f64).sum();
        Ok(total / occupancy.len() as f64)
    }

    /// Mean residence `W`: harmonic mean of the residence times.
    pub fn residence_time(residence_times: &[f64]) -> Result<f64, EstimatorError> {
        harmonic_mean(residence_times, "residence times")
    }

    /// Estimate the arrival rate `L / W`.
    ///
    /// # Arguments
    /// * `occupancy` - Occupancy counts sampled on a uniform time grid
    /// * `residence_times` - One residence time per detected particle (seconds)
    ///
    /// # Returns
    /// * `Ok(rate)` - Particles per second entering the sensor
    /// * `Err(EstimatorError)` - Empty input or a zero residence time
    pub fn estimate(occupancy: &[u32], residence_times: &[f64]) -> Result<f64, EstimatorError> {
        let l = Self::mean_occupation(occupancy)?;
        let w = Self::residence_time(residence_times)?;
        Ok(l / w)
    }
}
