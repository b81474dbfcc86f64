//! Post-hoc reconstruction from detection records
//!
//! A detection record is a single snapshot: when a particle was first seen
//! inside the sensor, where, and how fast it was moving. Because particles
//! travel in straight lines, that snapshot is enough to reconstruct
//!
//! - how much longer the particle stayed inside (residence time)
//! - how many particles were inside at any instant (occupancy)
//! - when the particle left the launch plane (emission time)
//!
//! which in turn feed the rate estimators.

use std::fmt;

use log::warn;
use rate_math::{
    EstimatorError, GaussianMle, GeometricalEstimator, LinearEstimator, LinearFit,
    LittleLawEstimator,
};

use crate::error::AnalysisError;
use crate::hardware::sensor::SensorVolume;
use crate::particle::DetectionRecord;

/// Velocity components below this magnitude do not constrain the slab test.
pub const DEFAULT_SLAB_TOLERANCE: f64 = 1e-8;

/// Detection records of one run together with the sensor geometry.
#[derive(Debug, Clone)]
pub struct StaticAnalysis {
    run_duration: f64,
    volume: SensorVolume,
    records: Vec<DetectionRecord>,
}

impl StaticAnalysis {
    /// # Arguments
    /// * `run_duration` - Simulated time covered by the run (seconds)
    /// * `volume` - Sensor volume the records were taken with
    /// * `records` - Detection records in time order
    pub fn new(run_duration: f64, volume: SensorVolume, records: Vec<DetectionRecord>) -> Self {
        Self {
            run_duration,
            volume,
            records,
        }
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn run_duration(&self) -> f64 {
        self.run_duration
    }

    pub fn volume(&self) -> &SensorVolume {
        &self.volume
    }

    /// Remaining time inside the sensor for each record.
    ///
    /// The snapshot is moved into the sensor frame and intersected with the
    /// box by the slab method. A ray that misses the box gets zero. The result
    /// is capped by the time left until the end of the run.
    ///
    /// # Arguments
    /// * `tol` - Velocity components below this magnitude are treated as zero
    pub fn estimate_residence_times(&self, tol: f64) -> Vec<f64> {
        self.records
            .iter()
            .map(|record| {
                let remaining = self
                    .volume
                    .crossing(&record.position, &record.velocity, tol)
                    .map_or(0.0, |interval| interval.remaining());
                remaining.min((self.run_duration - record.time).max(0.0))
            })
            .collect()
    }

    /// Residence times with the default tolerance.
    pub fn residence_times(&self) -> Vec<f64> {
        self.estimate_residence_times(DEFAULT_SLAB_TOLERANCE)
    }

    /// Number of grid samples covering the run at frequency `fs`.
    fn grid_len(&self, fs: f64) -> usize {
        if !(self.run_duration > 0.0) || !(fs > 0.0) || !fs.is_finite() {
            return 0;
        }
        (self.run_duration * fs).ceil() as usize + 1
    }

    /// Occupancy count on a uniform grid of `ceil(T · fs) + 1` samples.
    ///
    /// Each record occupies `[time, min(time + residence, T)]`, mapped to
    /// grid indices `floor(start · fs)` and `ceil(end · fs)`. Counts are
    /// built with one increment and one decrement per interval followed by
    /// a running sum, linear in records plus grid length.
    ///
    /// Returns an empty series when the run or `fs` is not positive.
    pub fn occupation_array(&self, fs: f64) -> Vec<u32> {
        let n_samples = self.grid_len(fs);
        if n_samples == 0 {
            return Vec::new();
        }

        let residence = self.residence_times();
        let mut events = vec![0i64; n_samples + 1];
        for (record, res) in self.records.iter().zip(&residence) {
            let start = record.time;
            let end = (record.time + res).min(self.run_duration);

            let start_idx = (start * fs).floor().max(0.0) as usize;
            let end_idx = ((end * fs).ceil().max(0.0) as usize).max(start_idx);
            if start_idx >= events.len() {
                continue;
            }
            events[start_idx] += 1;
            if end_idx < events.len() {
                events[end_idx] -= 1;
            }
        }

        let mut running = 0i64;
        events
            .iter()
            .take(n_samples)
            .map(|delta| {
                running += delta;
                running.max(0) as u32
            })
            .collect()
    }

    /// Sample instants of [`occupation_array`](Self::occupation_array).
    pub fn occupation_times(&self, fs: f64) -> Vec<f64> {
        (0..self.grid_len(fs)).map(|k| k as f64 / fs).collect()
    }

    /// Detections per second over the run.
    pub fn detection_rate(&self) -> Result<f64, AnalysisError> {
        if !(self.run_duration > 0.0) {
            return Err(EstimatorError::InvalidArgument(format!(
                "run duration must be positive, got {}",
                self.run_duration
            ))
            .into());
        }
        Ok(self.records.len() as f64 / self.run_duration)
    }

    /// Emission instants back-propagated from each record, sorted.
    ///
    /// Records moving parallel to the launch plane carry no emission time
    /// and are skipped.
    pub fn estimated_emission_times(&self) -> Vec<f64> {
        let mut times: Vec<f64> = self
            .records
            .iter()
            .filter_map(|record| match record.estimated_emission_time() {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("skipping record at t={:.4}: {e}", record.time);
                    None
                }
            })
            .collect();
        times.sort_by(f64::total_cmp);
        times
    }

    /// Little's-Law rate from occupancy sampled at `fs` and residence times.
    pub fn little_law_rate(&self, fs: f64) -> Result<f64, AnalysisError> {
        let occupancy = self.occupation_array(fs);
        let residence = self.residence_times();
        Ok(LittleLawEstimator::estimate(&occupancy, &residence)?)
    }

    /// Rank-assignment fit of the back-propagated emission times.
    pub fn linear_fit(&self) -> Result<LinearFit, AnalysisError> {
        let emission_times = self.estimated_emission_times();
        Ok(LinearEstimator::estimate(&emission_times, 1, None, None)?)
    }

    /// Emission rate implied by the detection rate and the cone geometry.
    ///
    /// The slice runs between the placed box's extreme x coordinates, so a
    /// rotated sensor contributes its world-frame depth along the launch axis.
    ///
    /// # Arguments
    /// * `alpha_deg` - Emission cone half-angle in degrees
    /// * `emission_radius` - Radius of the emission surface
    pub fn geometrical_rate(&self, alpha_deg: f64, emission_radius: f64) -> Result<f64, AnalysisError> {
        let far_face = self.volume.max_corner().x;
        let near_face = 2.0 * self.volume.center().x - far_face;
        Ok(GeometricalEstimator::estimate_between_faces(
            self.detection_rate()?,
            alpha_deg,
            emission_radius,
            near_face,
            far_face,
            self.volume.volume(),
        )?)
    }

    /// Maximum-likelihood spread of the detected speeds.
    pub fn speed_spread(&self) -> Result<f64, AnalysisError> {
        let speeds: Vec<f64> = self.records.iter().map(|r| r.velocity.norm()).collect();
        Ok(GaussianMle::estimate(&speeds)?)
    }
}

impl fmt::Display for StaticAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Static analysis")?;
        writeln!(f, "  Sensor records: {} detections", self.records.len())?;
        writeln!(f, "  Run duration: {:.4} s", self.run_duration)?;
        for (axis, name) in ["X", "Y", "Z"].iter().enumerate() {
            let (lo, hi) = self
                .records
                .iter()
                .map(|r| r.position[axis])
                .fold(None, |range: Option<(f64, f64)>, v| match range {
                    Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                    None => Some((v, v)),
                })
                .unwrap_or((0.0, 0.0));
            writeln!(f, "  {name} in [{lo:.3}, {hi:.3}]")?;
        }
        Ok(())
    }
}
