//! Stochastic particle source
//!
//! The source is a flat emission surface in the local y–z plane at `x = 0`,
//! launching particles into a cone around the +x axis. Four independent laws
//! drive it:
//!
//! - **Position**: a radial (disk) or lateral (square) sample mapped through
//!   its own CDF, which makes coverage uniform in area whatever the law
//! - **Speed**: magnitude of the launch velocity
//! - **Direction**: polar angle within the cone half-angle, uniform azimuth
//! - **Delay**: time between two consecutive emissions
//!
//! # Emission schedule
//!
//! The generator accumulates the elapsed time handed to [`EmissionGenerator::advance`]
//! and emits once that reaches the scheduled delay. At most one particle is
//! emitted per call, however many delays have elapsed: a tick coarser than
//! the delay law's support under-samples the source.

use std::f64::consts::TAU;

use log::{debug, error, warn};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::algo::distributions::{DistParams, DistributionRegistry, Sampler, TruncatedNormal};
use crate::error::{ConfigError, SampleError};
use crate::particle::{Particle, ParticleIdAllocator};

/// Construction parameters of an [`EmissionGenerator`].
///
/// Field names match the `gen_`-prefixed keys of a flat run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Disk radius, or half side of the square surface
    pub radius: f64,
    /// Cone half-angle in degrees
    pub alpha: f64,
    /// Nominal emission rate in particles per second, reported alongside estimates
    pub emission_rate: f64,
    /// `"circle"` or `"square"`
    pub surface_type: String,
    pub pos_dist_type: String,
    pub pos_dist_params: DistParams,
    pub vel_norm_dist_type: String,
    pub vel_norm_dist_params: DistParams,
    /// `"uniform_cone"` or `"truncnorm_cone"`
    pub vel_dir_dist_type: String,
    /// Optional `loc` / `scale` (radians) of the truncated-normal polar angle
    pub vel_dir_dist_params: DistParams,
    pub emit_dist_type: String,
    pub emit_dist_params: DistParams,
    /// Consecutive failed draws tolerated before an overdue emission is dropped
    pub max_sampling_retries: u32,
}

impl GeneratorConfig {
    /// Keys accepted after the `gen_` prefix.
    pub const KEYS: &'static [&'static str] = &[
        "radius",
        "alpha",
        "emission_rate",
        "surface_type",
        "pos_dist_type",
        "pos_dist_params",
        "vel_norm_dist_type",
        "vel_norm_dist_params",
        "vel_dir_dist_type",
        "vel_dir_dist_params",
        "emit_dist_type",
        "emit_dist_params",
        "max_sampling_retries",
    ];
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let value = |v: f64| DistParams::from([("value".to_string(), v)]);
        Self {
            radius: 0.5,
            alpha: 20.0,
            emission_rate: 10.0,
            surface_type: "circle".to_string(),
            pos_dist_type: "uniform".to_string(),
            pos_dist_params: DistParams::new(),
            vel_norm_dist_type: "constant".to_string(),
            vel_norm_dist_params: value(1.0),
            vel_dir_dist_type: "uniform_cone".to_string(),
            vel_dir_dist_params: DistParams::new(),
            emit_dist_type: "constant".to_string(),
            emit_dist_params: value(0.5),
            max_sampling_retries: 16,
        }
    }
}

/// Shape of the emission surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceShape {
    /// Disk of radius `radius`
    Circle,
    /// Square of side `2 · radius`
    Square,
}

impl std::str::FromStr for SurfaceShape {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "circle" => Ok(SurfaceShape::Circle),
            "square" => Ok(SurfaceShape::Square),
            other => Err(ConfigError::UnknownSurface(other.to_string())),
        }
    }
}

/// Law of the launch direction inside the emission cone.
#[derive(Debug, Clone)]
pub enum DirectionLaw {
    /// `cos θ` uniform in `[cos α, 1]`: uniform over the cone's solid angle
    UniformCone { cos_alpha: f64 },
    /// Polar angle normal, truncated to `[0, α]`
    TruncNormCone(TruncatedNormal),
}

impl DirectionLaw {
    /// Build a direction law for half-angle `alpha_deg`.
    pub fn new(kind: &str, params: &DistParams, alpha_deg: f64) -> Result<Self, ConfigError> {
        let alpha = alpha_deg.to_radians();
        match kind {
            "uniform_cone" => {
                if !params.is_empty() {
                    warn!("uniform_cone takes no parameters, ignoring {params:?}");
                }
                Ok(DirectionLaw::UniformCone {
                    cos_alpha: alpha.cos(),
                })
            }
            "truncnorm_cone" => {
                if let Some(key) = params.keys().find(|k| *k != "loc" && *k != "scale") {
                    return Err(ConfigError::UnknownParameter {
                        family: kind.to_string(),
                        parameter: key.clone(),
                    });
                }
                let loc = params.get("loc").copied().unwrap_or(alpha / 2.0);
                let scale = params.get("scale").copied().unwrap_or(alpha / 6.0);
                Ok(DirectionLaw::TruncNormCone(TruncatedNormal::between(
                    0.0, alpha, loc, scale,
                )?))
            }
            other => Err(ConfigError::UnknownDirectionLaw(other.to_string())),
        }
    }

    /// Draw a polar angle in radians.
    fn polar_angle(&self, rng: &mut StdRng) -> f64 {
        match self {
            DirectionLaw::UniformCone { cos_alpha } => {
                let cos_theta: f64 = rng.gen_range(*cos_alpha..=1.0);
                cos_theta.clamp(-1.0, 1.0).acos()
            }
            DirectionLaw::TruncNormCone(law) => law.sample(rng),
        }
    }
}

/// Particle source emitting from a surface into a cone around +x.
#[derive(Debug)]
pub struct EmissionGenerator {
    radius: f64,
    alpha_deg: f64,
    emission_rate: f64,
    surface: SurfaceShape,
    position_law: Box<dyn Sampler>,
    speed_law: Box<dyn Sampler>,
    direction_law: DirectionLaw,
    delay_law: Box<dyn Sampler>,
    max_sampling_retries: u32,
    rng: StdRng,

    /// Time accumulated since the last emission
    elapsed: f64,
    /// Delay scheduled for the next emission, drawn lazily
    next_delay: Option<f64>,
    consecutive_failures: u32,
    emitted: u64,
    sampling_failures: u64,
}

impl EmissionGenerator {
    /// Build a generator using the built-in distribution families.
    ///
    /// # Arguments
    /// * `config` - Surface geometry and emission laws
    /// * `seed` - Seed of the generator's random stream, entropy when `None`
    pub fn new(config: &GeneratorConfig, seed: Option<u64>) -> Result<Self, ConfigError> {
        Self::with_registry(config, &DistributionRegistry::with_defaults(), seed)
    }

    /// Build a generator resolving distribution families through `registry`.
    pub fn with_registry(
        config: &GeneratorConfig,
        registry: &DistributionRegistry,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if !config.radius.is_finite() || config.radius < 0.0 {
            return Err(ConfigError::invalid_value(
                "radius",
                format!("must be finite and non-negative, got {}", config.radius),
            ));
        }
        if !(0.0..=180.0).contains(&config.alpha) {
            return Err(ConfigError::invalid_value(
                "alpha",
                format!("cone half-angle must lie in [0, 180] degrees, got {}", config.alpha),
            ));
        }
        if !config.emission_rate.is_finite() || config.emission_rate < 0.0 {
            return Err(ConfigError::invalid_value(
                "emission_rate",
                format!("must be finite and non-negative, got {}", config.emission_rate),
            ));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            radius: config.radius,
            alpha_deg: config.alpha,
            emission_rate: config.emission_rate,
            surface: config.surface_type.parse()?,
            position_law: registry.build(&config.pos_dist_type, &config.pos_dist_params)?,
            speed_law: registry.build(&config.vel_norm_dist_type, &config.vel_norm_dist_params)?,
            direction_law: DirectionLaw::new(
                &config.vel_dir_dist_type,
                &config.vel_dir_dist_params,
                config.alpha,
            )?,
            delay_law: registry.build(&config.emit_dist_type, &config.emit_dist_params)?,
            max_sampling_retries: config.max_sampling_retries.max(1),
            rng,
            elapsed: 0.0,
            next_delay: None,
            consecutive_failures: 0,
            emitted: 0,
            sampling_failures: 0,
        })
    }

    /// Advance the source clock by `dt` and emit at most one particle.
    ///
    /// A failed draw yields no particle and is counted; the emission stays
    /// overdue and is attempted again on the next call, up to
    /// `max_sampling_retries` consecutive failures after which it is dropped
    /// and a fresh delay is scheduled. A failed delay draw restarts the wait
    /// from zero and is bounded by the same retry count.
    pub fn advance(&mut self, dt: f64, ids: &mut ParticleIdAllocator) -> Option<Particle> {
        self.elapsed += dt;

        let delay = match self.next_delay {
            Some(delay) => delay,
            None => {
                self.schedule_next_delay();
                match self.next_delay {
                    Some(delay) => delay,
                    None => {
                        // a failed delay draw restarts the wait
                        self.elapsed = 0.0;
                        if self.consecutive_failures >= self.max_sampling_retries {
                            error!(
                                "emission delay law failed {} consecutive draws",
                                self.consecutive_failures
                            );
                            self.consecutive_failures = 0;
                        }
                        return None;
                    }
                }
            }
        };
        if self.elapsed < delay {
            return None;
        }

        match self.sample_launch() {
            Ok((position, velocity)) => {
                let particle = Particle::new(ids.next_id(), position, velocity);
                debug!(
                    "emitted particle {} at y={:.4} z={:.4} with speed {:.4}",
                    particle.id(),
                    position.y,
                    position.z,
                    velocity.norm()
                );
                self.emitted += 1;
                self.consecutive_failures = 0;
                self.elapsed = 0.0;
                self.schedule_next_delay();
                Some(particle)
            }
            Err(e) => {
                self.record_failure(&e);
                if self.consecutive_failures >= self.max_sampling_retries {
                    error!(
                        "dropping overdue emission after {} consecutive sampling failures",
                        self.consecutive_failures
                    );
                    self.consecutive_failures = 0;
                    self.elapsed = 0.0;
                    self.schedule_next_delay();
                }
                None
            }
        }
    }

    /// Draw a launch position on the emission surface.
    pub fn sample_position(&mut self) -> Result<Vector3<f64>, SampleError> {
        match self.surface {
            SurfaceShape::Circle => {
                let u = self.unit_position_draw()?;
                let r = self.radius * u.sqrt();
                let theta = self.rng.gen_range(0.0..TAU);
                Ok(Vector3::new(0.0, r * theta.cos(), r * theta.sin()))
            }
            SurfaceShape::Square => {
                let side = 2.0 * self.radius;
                let y = (self.unit_position_draw()? - 0.5) * side;
                let z = (self.unit_position_draw()? - 0.5) * side;
                Ok(Vector3::new(0.0, y, z))
            }
        }
    }

    /// Draw a launch velocity inside the emission cone.
    pub fn sample_velocity(&mut self) -> Result<Vector3<f64>, SampleError> {
        let speed = self.speed_law.sample(&mut self.rng);
        if !speed.is_finite() {
            return Err(SampleError::NonFinite {
                quantity: "speed",
                value: speed,
            });
        }

        let theta = self.direction_law.polar_angle(&mut self.rng);
        let phi = self.rng.gen_range(0.0..TAU);
        let direction = Vector3::new(
            theta.cos(),
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
        );
        let norm = direction.norm();
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(SampleError::DegenerateDirection);
        }

        Ok(direction * (speed / norm))
    }

    fn sample_launch(&mut self) -> Result<(Vector3<f64>, Vector3<f64>), SampleError> {
        let position = self.sample_position()?;
        let velocity = self.sample_velocity()?;
        Ok((position, velocity))
    }

    /// Raw position draw mapped through its own CDF into `[0, 1]`.
    fn unit_position_draw(&mut self) -> Result<f64, SampleError> {
        let raw = self.position_law.sample(&mut self.rng);
        let u = self.position_law.cdf(raw);
        if !u.is_finite() {
            return Err(SampleError::NonFinite {
                quantity: "position",
                value: raw,
            });
        }
        Ok(u.clamp(0.0, 1.0))
    }

    fn schedule_next_delay(&mut self) {
        let delay = self.delay_law.sample(&mut self.rng);
        if delay.is_finite() {
            self.next_delay = Some(delay);
        } else {
            self.next_delay = None;
            self.record_failure(&SampleError::NonFinite {
                quantity: "emission delay",
                value: delay,
            });
        }
    }

    fn record_failure(&mut self, e: &SampleError) {
        self.sampling_failures += 1;
        self.consecutive_failures += 1;
        warn!("emission sampling failed: {e}");
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Cone half-angle in degrees.
    pub fn alpha_deg(&self) -> f64 {
        self.alpha_deg
    }

    /// Nominal emission rate from the configuration.
    pub fn emission_rate(&self) -> f64 {
        self.emission_rate
    }

    pub fn surface(&self) -> SurfaceShape {
        self.surface
    }

    /// Particles emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Failed draws so far, including delay draws.
    pub fn sampling_failures(&self) -> u64 {
        self.sampling_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::RngCore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn generator(config: &GeneratorConfig, seed: u64) -> EmissionGenerator {
        EmissionGenerator::new(config, Some(seed)).unwrap()
    }

    fn params(pairs: &[(&str, f64)]) -> DistParams {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_default_config_builds() {
        let g = generator(&GeneratorConfig::default(), 0);
        assert_eq!(g.surface(), SurfaceShape::Circle);
        assert_eq!(g.alpha_deg(), 20.0);
        assert_eq!(g.emission_rate(), 10.0);
    }

    #[test]
    fn test_constant_delay_schedule() {
        let mut g = generator(&GeneratorConfig::default(), 1);
        let mut ids = ParticleIdAllocator::new();

        // delay 0.5 s, tick 0.125 s -> every fourth call emits
        let emitted: Vec<bool> = (0..16).map(|_| g.advance(0.125, &mut ids).is_some()).collect();
        let expected: Vec<bool> = (1..=16).map(|i| i % 4 == 0).collect();
        assert_eq!(emitted, expected);
        assert_eq!(g.emitted(), 4);
    }

    #[test]
    fn test_at_most_one_emission_per_call() {
        let mut g = generator(&GeneratorConfig::default(), 2);
        let mut ids = ParticleIdAllocator::new();
        for _ in 0..10 {
            // ten delays elapse per call, still a single particle
            assert!(g.advance(5.0, &mut ids).is_some());
        }
        assert_eq!(ids.issued(), 10);
    }

    #[test]
    fn test_identities_strictly_increase() {
        let config = GeneratorConfig {
            emit_dist_type: "expon".to_string(),
            emit_dist_params: params(&[("scale", 0.05)]),
            ..GeneratorConfig::default()
        };
        let mut g = generator(&config, 3);
        let mut ids = ParticleIdAllocator::new();
        let emitted: Vec<_> = (0..2000)
            .filter_map(|_| g.advance(0.01, &mut ids))
            .map(|p| p.id())
            .collect();
        assert!(emitted.len() > 100);
        assert!(emitted.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disk_area_uniformity() {
        let laws = [
            ("uniform", DistParams::new()),
            ("norm", params(&[("loc", 3.0), ("scale", 2.0)])),
            ("expon", params(&[("scale", 0.1)])),
            ("gamma", params(&[("a", 3.0)])),
        ];
        for (family, law_params) in laws {
            let config = GeneratorConfig {
                radius: 2.0,
                pos_dist_type: family.to_string(),
                pos_dist_params: law_params,
                ..GeneratorConfig::default()
            };
            let mut g = generator(&config, 4);
            let n = 20_000;
            let mut bins = [0usize; 4];
            for _ in 0..n {
                let p = g.sample_position().unwrap();
                assert_eq!(p.x, 0.0);
                let r2 = (p.y * p.y + p.z * p.z) / 4.0;
                assert!(r2 <= 1.0 + 1e-12);
                bins[((r2 * 4.0) as usize).min(3)] += 1;
            }
            // r² / R² uniform on [0, 1]: each quarter holds a quarter of the draws
            for count in bins {
                assert_relative_eq!(count as f64 / n as f64, 0.25, epsilon = 0.02);
            }
        }
    }

    #[test]
    fn test_square_surface_bounds() {
        let config = GeneratorConfig {
            radius: 1.5,
            surface_type: "square".to_string(),
            ..GeneratorConfig::default()
        };
        let mut g = generator(&config, 5);
        let mut mean_y = 0.0;
        for _ in 0..5000 {
            let p = g.sample_position().unwrap();
            assert!(p.y.abs() <= 1.5 && p.z.abs() <= 1.5);
            mean_y += p.y / 5000.0;
        }
        assert_relative_eq!(mean_y, 0.0, epsilon = 0.05);
    }

    #[test]
    fn test_uniform_cone_directions() {
        let alpha: f64 = 20.0;
        let config = GeneratorConfig {
            vel_norm_dist_params: params(&[("value", 3.0)]),
            ..GeneratorConfig::default()
        };
        let mut g = generator(&config, 6);
        let n = 20_000;
        let mut mean_cos = 0.0;
        for _ in 0..n {
            let v = g.sample_velocity().unwrap();
            assert_relative_eq!(v.norm(), 3.0, epsilon = 1e-9);
            let cos_theta = v.x / v.norm();
            assert!(cos_theta >= alpha.to_radians().cos() - 1e-12);
            mean_cos += cos_theta / n as f64;
        }
        // cos θ uniform on [cos α, 1]
        let expected = (1.0 + alpha.to_radians().cos()) / 2.0;
        assert_relative_eq!(mean_cos, expected, epsilon = 1e-3);
    }

    #[test]
    fn test_truncnorm_cone_directions() {
        let config = GeneratorConfig {
            alpha: 30.0,
            vel_dir_dist_type: "truncnorm_cone".to_string(),
            ..GeneratorConfig::default()
        };
        let mut g = generator(&config, 7);
        let alpha = 30.0_f64.to_radians();
        let mut mean_theta = 0.0;
        for _ in 0..10_000 {
            let v = g.sample_velocity().unwrap();
            let theta = (v.x / v.norm()).clamp(-1.0, 1.0).acos();
            assert!(theta <= alpha + 1e-9);
            mean_theta += theta / 10_000.0;
        }
        // symmetric truncation around α/2
        assert_relative_eq!(mean_theta, alpha / 2.0, epsilon = 0.01);
    }

    #[test]
    fn test_truncnorm_cone_overrides() {
        let config = GeneratorConfig {
            alpha: 30.0,
            vel_dir_dist_type: "truncnorm_cone".to_string(),
            vel_dir_dist_params: params(&[("loc", 0.0), ("scale", 0.01)]),
            ..GeneratorConfig::default()
        };
        let mut g = generator(&config, 8);
        for _ in 0..1000 {
            let v = g.sample_velocity().unwrap();
            assert!(v.x / v.norm() > 0.99);
        }
    }

    #[test]
    fn test_configuration_errors() {
        let bad = [
            GeneratorConfig {
                pos_dist_type: "nope".to_string(),
                ..GeneratorConfig::default()
            },
            GeneratorConfig {
                vel_norm_dist_params: DistParams::new(),
                ..GeneratorConfig::default()
            },
            GeneratorConfig {
                vel_dir_dist_type: "isotropic".to_string(),
                ..GeneratorConfig::default()
            },
            GeneratorConfig {
                surface_type: "hexagon".to_string(),
                ..GeneratorConfig::default()
            },
            GeneratorConfig {
                radius: -1.0,
                ..GeneratorConfig::default()
            },
        ];
        for config in bad {
            assert!(EmissionGenerator::new(&config, Some(0)).is_err(), "{config:?}");
        }
    }

    #[derive(Debug)]
    struct NanLaw;

    impl Sampler for NanLaw {
        fn sample(&self, _rng: &mut dyn RngCore) -> f64 {
            f64::NAN
        }
        fn cdf(&self, _x: f64) -> f64 {
            f64::NAN
        }
        fn family(&self) -> &str {
            "nan"
        }
    }

    fn build_nan(_: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
        Ok(Box::new(NanLaw))
    }

    /// Delay law returning NaN for its first `failures` draws, then 0.5.
    #[derive(Debug)]
    struct FlakyDelay {
        failures: AtomicU32,
    }

    impl Sampler for FlakyDelay {
        fn sample(&self, _rng: &mut dyn RngCore) -> f64 {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                f64::NAN
            } else {
                0.5
            }
        }
        fn cdf(&self, _x: f64) -> f64 {
            f64::NAN
        }
        fn family(&self) -> &str {
            "flaky"
        }
    }

    fn build_flaky(_: &DistParams) -> Result<Box<dyn Sampler>, ConfigError> {
        Ok(Box::new(FlakyDelay {
            failures: AtomicU32::new(5),
        }))
    }

    #[test]
    fn test_failed_delay_draws_restart_the_wait() {
        let mut registry = DistributionRegistry::with_defaults();
        registry.register("flaky", build_flaky);
        let config = GeneratorConfig {
            emit_dist_type: "flaky".to_string(),
            emit_dist_params: DistParams::new(),
            max_sampling_retries: 3,
            ..GeneratorConfig::default()
        };
        let mut g = EmissionGenerator::with_registry(&config, &registry, Some(4)).unwrap();
        let mut ids = ParticleIdAllocator::new();

        for _ in 0..5 {
            assert!(g.advance(0.25, &mut ids).is_none());
        }
        assert_eq!(g.sampling_failures(), 5);

        // the 0.5 s delay drawn on the sixth call is waited out in full
        assert!(g.advance(0.25, &mut ids).is_none());
        assert!(g.advance(0.25, &mut ids).is_some());
        assert_eq!(g.emitted(), 1);
    }

    #[test]
    fn test_sampling_failure_is_counted_and_bounded() {
        let mut registry = DistributionRegistry::with_defaults();
        registry.register("nan", build_nan);
        let config = GeneratorConfig {
            vel_norm_dist_type: "nan".to_string(),
            vel_norm_dist_params: DistParams::new(),
            emit_dist_params: params(&[("value", 0.1)]),
            max_sampling_retries: 3,
            ..GeneratorConfig::default()
        };
        let mut g = EmissionGenerator::with_registry(&config, &registry, Some(9)).unwrap();
        let mut ids = ParticleIdAllocator::new();

        // overdue emission retried three times then dropped
        assert!(g.advance(0.1, &mut ids).is_none());
        assert!(g.advance(0.0, &mut ids).is_none());
        assert!(g.advance(0.0, &mut ids).is_none());
        assert_eq!(g.sampling_failures(), 3);

        // accumulator was reset: nothing attempted before the next delay
        assert!(g.advance(0.05, &mut ids).is_none());
        assert_eq!(g.sampling_failures(), 3);
        assert_eq!(g.emitted(), 0);
        assert_eq!(ids.issued(), 0);
    }
}
