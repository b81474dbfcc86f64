//! Particles emitted by the source and their detection state
//!
//! A particle is a point mass travelling in a straight line. Besides its
//! kinematic state it carries a detection snapshot (time, position and
//! velocity at the first tick it was seen inside a sensor) and the dwell
//! time accumulated while it stayed inside. The snapshot is written once
//! and never changes afterwards.

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Velocity components below this magnitude are treated as zero.
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Unique particle identity within one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticleId(pub u64);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out strictly increasing particle identities.
///
/// Each simulation owns its own allocator, so independent runs never share
/// identity state and identities are never reused within a run.
#[derive(Debug, Clone, Default)]
pub struct ParticleIdAllocator {
    next: u64,
}

impl ParticleIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh identity, greater than every identity issued before.
    pub fn next_id(&mut self) -> ParticleId {
        let id = ParticleId(self.next);
        self.next += 1;
        id
    }

    /// Number of identities issued so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// Detection snapshot of one particle: when it was first seen and how it
/// was moving at that instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionRecord {
    pub particle: ParticleId,
    pub time: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl DetectionRecord {
    /// Back-propagate the snapshot to the launch plane `x = 0`.
    ///
    /// # Returns
    /// * `Ok(t)` - `time - x / v_x`
    /// * `Err(AnalysisError::ParallelToLaunchAxis)` - If `v_x` is zero
    pub fn estimated_emission_time(&self) -> Result<f64, AnalysisError> {
        if self.velocity.x.abs() < PARALLEL_TOLERANCE {
            return Err(AnalysisError::ParallelToLaunchAxis(self.particle));
        }
        Ok(self.time - self.position.x / self.velocity.x)
    }
}

/// A point particle moving at constant velocity.
#[derive(Debug, Clone)]
pub struct Particle {
    id: ParticleId,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Driver tick at which the particle was emitted
    pub emission_time: Option<f64>,
    detection: Option<DetectionRecord>,
    detection_duration: f64,
}

impl Particle {
    pub fn new(id: ParticleId, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            id,
            position,
            velocity,
            emission_time: None,
            detection: None,
            detection_duration: 0.0,
        }
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    /// Move the particle along its velocity for `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        self.position += self.velocity * dt;
    }

    pub fn is_detected(&self) -> bool {
        self.detection.is_some()
    }

    pub fn detection(&self) -> Option<&DetectionRecord> {
        self.detection.as_ref()
    }

    pub fn detection_time(&self) -> Option<f64> {
        self.detection.map(|d| d.time)
    }

    /// Cumulative time spent inside the sensor after the detection tick.
    pub fn detection_duration(&self) -> f64 {
        self.detection_duration
    }

    /// Capture the detection snapshot at time `t` unless one already exists.
    ///
    /// Returns `true` only for the call that actually latched the snapshot.
    pub fn latch_detection(&mut self, t: f64) -> bool {
        if self.detection.is_some() {
            return false;
        }
        self.detection = Some(DetectionRecord {
            particle: self.id,
            time: t,
            position: self.position,
            velocity: self.velocity,
        });
        true
    }

    /// Add dwell time. Negative increments are ignored.
    pub fn accumulate_duration(&mut self, dt: f64) {
        if dt > 0.0 {
            self.detection_duration += dt;
        }
    }

    /// Emission instant inferred from the detection snapshot alone.
    pub fn estimated_emission_time(&self) -> Result<f64, AnalysisError> {
        self.detection
            .as_ref()
            .ok_or(AnalysisError::NotDetected(self.id))?
            .estimated_emission_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn moving_particle(id: u64) -> Particle {
        Particle::new(
            ParticleId(id),
            Vector3::new(0.0, 0.1, -0.2),
            Vector3::new(2.0, 0.0, 0.5),
        )
    }

    #[test]
    fn test_allocator_strictly_increasing() {
        let mut ids = ParticleIdAllocator::new();
        let issued: Vec<ParticleId> = (0..100).map(|_| ids.next_id()).collect();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.issued(), 100);
    }

    #[test]
    fn test_independent_allocators() {
        let mut a = ParticleIdAllocator::new();
        let mut b = ParticleIdAllocator::new();
        a.next_id();
        a.next_id();
        assert_eq!(b.next_id(), ParticleId(0));
    }

    #[test]
    fn test_advance_is_linear() {
        let mut p = moving_particle(0);
        p.advance(0.5);
        p.advance(0.5);
        assert_relative_eq!(p.position, Vector3::new(2.0, 0.1, 0.3), epsilon = 1e-12);
    }

    #[test]
    fn test_detection_latches_once() {
        let mut p = moving_particle(3);
        assert!(!p.is_detected());
        assert!(p.latch_detection(1.0));
        let first = *p.detection().unwrap();

        p.advance(1.0);
        assert!(!p.latch_detection(2.0));
        assert_eq!(*p.detection().unwrap(), first);
        assert_eq!(p.detection_time(), Some(1.0));
    }

    #[test]
    fn test_duration_never_decreases() {
        let mut p = moving_particle(0);
        p.accumulate_duration(0.25);
        p.accumulate_duration(-1.0);
        p.accumulate_duration(0.25);
        assert_relative_eq!(p.detection_duration(), 0.5);
    }

    #[test]
    fn test_estimated_emission_time() {
        let mut p = moving_particle(5);
        p.advance(1.5);
        p.latch_detection(1.5);
        assert_relative_eq!(p.estimated_emission_time().unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_emission_time_requires_detection() {
        let p = moving_particle(9);
        assert_eq!(
            p.estimated_emission_time(),
            Err(AnalysisError::NotDetected(ParticleId(9)))
        );
    }

    #[test]
    fn test_emission_time_parallel_motion() {
        let mut p = Particle::new(ParticleId(1), Vector3::zeros(), Vector3::new(0.0, 1.0, 0.0));
        p.latch_detection(0.0);
        assert_eq!(
            p.estimated_emission_time(),
            Err(AnalysisError::ParallelToLaunchAxis(ParticleId(1)))
        );
    }
}
