//! Volumetric particle sensors
//!
//! A sensor is a rectangular cuboid described in its own local frame:
//! local x spans the width, local y the depth and local z the height
//! (thickness). The cuboid is placed in the world by a rotation taking local
//! +z onto the configured normal direction, followed by a translation to its
//! center:
//!
//! ```text
//! p_world = R · p_local + center      p_local = Rᵀ · (p_world - center)
//! ```
//!
//! Two detection strategies share the [`Detector`] interface:
//!
//! - [`SampledSensor`] tests the oriented box at a fixed temporal cadence
//!   and records every particle identity at most once
//! - [`DwellSensor`] tests the axis-aligned box on every tick and accumulates
//!   how long each detected particle stays inside

use std::collections::HashSet;
use std::f64::consts::PI;
use std::fmt;

use log::{debug, warn};
use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::algo::slab::{self, SlabInterval};
use crate::error::ConfigError;
use crate::particle::{DetectionRecord, Particle, ParticleId};

/// Construction parameters of a sensor.
///
/// Field names match the `sen_`-prefixed keys of a flat run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Center position
    pub pos: [f64; 3],
    /// Full extent (width, depth, height)
    pub dimensions: [f64; 3],
    /// Sampling frequency in Hz
    pub fs: f64,
    /// `"dwell"` or `"sampled"`
    pub strategy: String,
    /// Normal of the height axis, sampled strategy only
    pub direction: Option<[f64; 3]>,
}

impl SensorConfig {
    /// Keys accepted after the `sen_` prefix.
    pub const KEYS: &'static [&'static str] = &["pos", "dimensions", "fs", "strategy", "direction"];
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            pos: [3.0, 0.0, 0.0],
            dimensions: [1.0, 3.0, 0.5],
            fs: 1000.0,
            strategy: "dwell".to_string(),
            direction: None,
        }
    }
}

/// Detection strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStrategy {
    Dwell,
    Sampled,
}

impl std::str::FromStr for SensorStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dwell" => Ok(SensorStrategy::Dwell),
            "sampled" => Ok(SensorStrategy::Sampled),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for SensorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorStrategy::Dwell => write!(f, "dwell"),
            SensorStrategy::Sampled => write!(f, "sampled"),
        }
    }
}

/// Placed rectangular detection volume.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorVolume {
    center: Vector3<f64>,
    dimensions: Vector3<f64>,
    orientation: Rotation3<f64>,
}

impl SensorVolume {
    /// Box aligned with the world axes.
    pub fn axis_aligned(center: Vector3<f64>, dimensions: Vector3<f64>) -> Result<Self, ConfigError> {
        Self::with_orientation(center, dimensions, Rotation3::identity())
    }

    /// Box whose local height axis points along `normal`.
    ///
    /// An anti-parallel normal is handled as a half-turn about local x.
    pub fn oriented(
        center: Vector3<f64>,
        dimensions: Vector3<f64>,
        normal: Vector3<f64>,
    ) -> Result<Self, ConfigError> {
        let length = normal.norm();
        if !(length > 0.0) || !length.is_finite() {
            return Err(ConfigError::invalid_value(
                "direction",
                format!("normal must be a finite non-zero vector, got {normal:?}"),
            ));
        }
        let orientation = Rotation3::rotation_between(&Vector3::z(), &(normal / length))
            .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3::x_axis(), PI));
        Self::with_orientation(center, dimensions, orientation)
    }

    fn with_orientation(
        center: Vector3<f64>,
        dimensions: Vector3<f64>,
        orientation: Rotation3<f64>,
    ) -> Result<Self, ConfigError> {
        if center.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::invalid_value(
                "pos",
                format!("must be finite, got {center:?}"),
            ));
        }
        if dimensions.iter().any(|&d| !(d > 0.0) || !d.is_finite()) {
            return Err(ConfigError::invalid_value(
                "dimensions",
                format!("extents must be positive and finite, got {dimensions:?}"),
            ));
        }
        Ok(Self {
            center,
            dimensions,
            orientation,
        })
    }

    pub fn center(&self) -> &Vector3<f64> {
        &self.center
    }

    /// Full extent (width, depth, height).
    pub fn dimensions(&self) -> &Vector3<f64> {
        &self.dimensions
    }

    pub fn half_extents(&self) -> Vector3<f64> {
        self.dimensions / 2.0
    }

    pub fn orientation(&self) -> &Rotation3<f64> {
        &self.orientation
    }

    pub fn volume(&self) -> f64 {
        self.dimensions.product()
    }

    /// World point expressed in the sensor frame.
    pub fn to_local_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.orientation.inverse_transform_vector(&(p - self.center))
    }

    /// World direction expressed in the sensor frame.
    pub fn to_local_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.orientation.inverse_transform_vector(v)
    }

    /// Whether the world point `p` lies inside the box, faces included.
    pub fn contains(&self, p: &Vector3<f64>) -> bool {
        let local = self.to_local_point(p);
        let half = self.half_extents();
        (0..3).all(|i| local[i].abs() <= half[i])
    }

    /// Upper corner of the world-axis-aligned bounding box of the volume.
    pub fn max_corner(&self) -> Vector3<f64> {
        let r = self.orientation.matrix().abs();
        self.center + r * self.half_extents()
    }

    /// Time interval during which a particle at `position` moving at
    /// `velocity` (world frame) lies inside the box, relative to now.
    pub fn crossing(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        tol: f64,
    ) -> Option<SlabInterval> {
        slab::intersect(
            &self.to_local_point(position),
            &self.to_local_vector(velocity),
            &self.half_extents(),
            tol,
        )
    }
}

/// Per-tick detection capability shared by every sensor strategy.
pub trait Detector: fmt::Debug + Send {
    /// Evaluate one living particle at simulation time `t`.
    ///
    /// Returns `true` when a new detection record was appended.
    fn observe(&mut self, particle: &mut Particle, t: f64) -> bool;

    /// Detection records in the order they were taken.
    fn records(&self) -> &[DetectionRecord];

    fn volume(&self) -> &SensorVolume;

    /// Sampling frequency in Hz.
    fn sampling_frequency(&self) -> f64;

    fn strategy(&self) -> SensorStrategy;
}

fn validate_fs(fs: f64) -> Result<f64, ConfigError> {
    if fs > 0.0 && fs.is_finite() {
        Ok(fs)
    } else {
        Err(ConfigError::invalid_value(
            "fs",
            format!("sampling frequency must be positive and finite, got {fs}"),
        ))
    }
}

/// Oriented sensor tested at a fixed cadence of `1 / fs`.
///
/// The cadence is shared by all particles: every call that passes the time
/// gate moves the next allowed sample instant one period forward, whatever
/// the containment outcome.
#[derive(Debug, Clone)]
pub struct SampledSensor {
    volume: SensorVolume,
    fs: f64,
    next_sample_time: f64,
    seen: HashSet<ParticleId>,
    records: Vec<DetectionRecord>,
}

impl SampledSensor {
    pub fn new(volume: SensorVolume, fs: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            volume,
            fs: validate_fs(fs)?,
            next_sample_time: 0.0,
            seen: HashSet::new(),
            records: Vec::new(),
        })
    }

    /// Whether `particle` is inside the volume at time `t`.
    ///
    /// Returns `false` without touching the cadence for an identity already
    /// recorded, and `false` for any `t` before the next sample instant.
    pub fn detect(&mut self, particle: &Particle, t: f64) -> bool {
        if self.seen.contains(&particle.id()) {
            return false;
        }
        if t < self.next_sample_time {
            return false;
        }
        self.next_sample_time += 1.0 / self.fs;
        self.volume.contains(&particle.position)
    }

    /// Mark the identity as seen and append its snapshot.
    pub fn record(&mut self, particle: &Particle, t: f64) {
        self.seen.insert(particle.id());
        self.records.push(DetectionRecord {
            particle: particle.id(),
            time: t,
            position: particle.position,
            velocity: particle.velocity,
        });
    }

    pub fn next_sample_time(&self) -> f64 {
        self.next_sample_time
    }
}

impl Detector for SampledSensor {
    fn observe(&mut self, particle: &mut Particle, t: f64) -> bool {
        if !self.detect(particle, t) {
            return false;
        }
        self.record(particle, t);
        particle.latch_detection(t);
        debug!("sampled sensor recorded particle {} at t={t:.4}", particle.id());
        true
    }

    fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    fn volume(&self) -> &SensorVolume {
        &self.volume
    }

    fn sampling_frequency(&self) -> f64 {
        self.fs
    }

    fn strategy(&self) -> SensorStrategy {
        SensorStrategy::Sampled
    }
}

/// Axis-aligned sensor evaluated on every tick.
///
/// The first contained tick latches the particle's detection snapshot and
/// appends a record; each later contained tick adds one sampling period to
/// the particle's dwell time. Leaving the volume never clears a detection.
#[derive(Debug, Clone)]
pub struct DwellSensor {
    volume: SensorVolume,
    fs: f64,
    records: Vec<DetectionRecord>,
}

impl DwellSensor {
    pub fn new(center: Vector3<f64>, dimensions: Vector3<f64>, fs: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            volume: SensorVolume::axis_aligned(center, dimensions)?,
            fs: validate_fs(fs)?,
            records: Vec::new(),
        })
    }

    /// Update detection state of `particle` at time `t`.
    pub fn update(&mut self, particle: &mut Particle, t: f64) -> bool {
        let relative = particle.position - self.volume.center();
        let half = self.volume.half_extents();
        if !(0..3).all(|i| relative[i].abs() <= half[i]) {
            return false;
        }

        if particle.latch_detection(t) {
            if let Some(snapshot) = particle.detection() {
                self.records.push(*snapshot);
            }
            debug!("dwell sensor detected particle {} at t={t:.4}", particle.id());
            true
        } else {
            particle.accumulate_duration(1.0 / self.fs);
            false
        }
    }
}

impl Detector for DwellSensor {
    fn observe(&mut self, particle: &mut Particle, t: f64) -> bool {
        self.update(particle, t)
    }

    fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    fn volume(&self) -> &SensorVolume {
        &self.volume
    }

    fn sampling_frequency(&self) -> f64 {
        self.fs
    }

    fn strategy(&self) -> SensorStrategy {
        SensorStrategy::Dwell
    }
}

/// Build the sensor strategy named in `config`.
pub fn build_detector(config: &SensorConfig) -> Result<Box<dyn Detector>, ConfigError> {
    let center = Vector3::from(config.pos);
    let dimensions = Vector3::from(config.dimensions);
    match config.strategy.parse::<SensorStrategy>()? {
        SensorStrategy::Dwell => {
            if config.direction.is_some() {
                warn!("dwell sensor is axis-aligned, ignoring configured direction");
            }
            Ok(Box::new(DwellSensor::new(center, dimensions, config.fs)?))
        }
        SensorStrategy::Sampled => {
            let normal = Vector3::from(config.direction.unwrap_or([0.0, 0.0, 1.0]));
            let volume = SensorVolume::oriented(center, dimensions, normal)?;
            Ok(Box::new(SampledSensor::new(volume, config.fs)?))
        }
    }
}
