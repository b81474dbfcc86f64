//! Fixed-timestep emission / detection run
//!
//! Each tick executes, in order:
//!
//! 1. generator advance (a new particle is stamped with the tick time)
//! 2. kinematic update of every living particle by `dt = 1 / clock`
//! 3. sensor observation at the tick time
//! 4. classification and pruning of particles that left the domain
//!
//! A particle leaves the domain once any of its coordinates reaches the
//! upper corner of the sensor's bounding box, or once it is farther than the
//! optional `max_range` from the origin. Leaving particles are classified as
//! detected or lost. Particles still alive at the end of the run are
//! classified the same way.

use log::{debug, info};
use nalgebra::Vector3;

use crate::config::{RunConfig, SimulationParams};
use crate::error::ConfigError;
use crate::hardware::generator::EmissionGenerator;
use crate::hardware::sensor::{build_detector, Detector, SensorVolume};
use crate::particle::{DetectionRecord, Particle, ParticleId, ParticleIdAllocator};
use crate::sims::static_analysis::StaticAnalysis;

/// Number of progress lines logged over a full run.
const PROGRESS_REPORTS: u64 = 10;

/// Everything a finished run hands to the analysis stage.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Particles that were detected, in the order they left the domain
    pub detected: Vec<Particle>,
    /// Identities of particles that left the domain undetected
    pub lost: Vec<ParticleId>,
    /// Sensor records in time order
    pub records: Vec<DetectionRecord>,
    pub volume: SensorVolume,
    /// Simulated time covered by the ticks that ran
    pub run_duration: f64,
    pub emitted: u64,
    pub sampling_failures: u64,
    /// Configured emission rate, the ground truth estimates are compared to
    pub nominal_rate: f64,
    pub emission_alpha_deg: f64,
    pub emission_radius: f64,
    pub sampling_frequency: f64,
}

impl RunOutcome {
    /// Post-hoc analysis over this run's detection records.
    pub fn analysis(&self) -> StaticAnalysis {
        StaticAnalysis::new(self.run_duration, self.volume.clone(), self.records.clone())
    }
}

/// Simulation driver owning the generator, the sensor and the living particles.
#[derive(Debug)]
pub struct Simulation {
    generator: EmissionGenerator,
    detector: Box<dyn Detector>,
    ids: ParticleIdAllocator,
    living: Vec<Particle>,
    detected: Vec<Particle>,
    lost: Vec<ParticleId>,
    dt: f64,
    time: f64,
    steps_done: u64,
    total_steps: u64,
    max_range: Option<f64>,
    bound: Vector3<f64>,
}

impl Simulation {
    /// Build generator, sensor and driver from a run configuration.
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        let generator = EmissionGenerator::new(&config.generator, config.simulation.seed)?;
        let detector = build_detector(&config.sensor)?;
        Self::from_parts(generator, detector, &config.simulation)
    }

    /// Assemble a driver around an existing generator and sensor.
    ///
    /// # Returns
    /// * `Err(ConfigError::InvalidValue)` - If the clock or the run duration
    ///   is not positive and finite
    pub fn from_parts(
        generator: EmissionGenerator,
        detector: Box<dyn Detector>,
        params: &SimulationParams,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        let bound = detector.volume().max_corner();
        let total_steps = (params.run_duration * params.clock + 1e-9).floor() as u64;
        info!(
            "simulation: {} steps of {:.4} s, sensor strategy {}",
            total_steps,
            1.0 / params.clock,
            detector.strategy()
        );
        Ok(Self {
            generator,
            detector,
            ids: ParticleIdAllocator::new(),
            living: Vec::new(),
            detected: Vec::new(),
            lost: Vec::new(),
            dt: 1.0 / params.clock,
            time: 0.0,
            steps_done: 0,
            total_steps,
            max_range: params.max_range,
            bound,
        })
    }

    /// Execute one tick.
    pub fn step(&mut self) {
        let t = self.time;

        if let Some(mut particle) = self.generator.advance(self.dt, &mut self.ids) {
            particle.emission_time = Some(t);
            self.living.push(particle);
        }

        let living = std::mem::take(&mut self.living);
        for mut particle in living {
            particle.advance(self.dt);
            self.detector.observe(&mut particle, t);

            if has_left(&particle, &self.bound, self.max_range) {
                self.classify(particle);
            } else {
                self.living.push(particle);
            }
        }

        self.steps_done += 1;
        self.time = self.steps_done as f64 * self.dt;
    }

    /// Run the remaining ticks and classify what is left.
    pub fn run(mut self) -> RunOutcome {
        let report_every = (self.total_steps / PROGRESS_REPORTS).max(1);
        while self.steps_done < self.total_steps {
            self.step();
            if self.steps_done % report_every == 0 {
                debug!(
                    "step {}/{}: {} living, {} detected, {} lost",
                    self.steps_done,
                    self.total_steps,
                    self.living.len(),
                    self.detected.len(),
                    self.lost.len()
                );
            }
        }
        self.finish()
    }

    /// Stop here: classify living particles and collect the outcome.
    pub fn finish(mut self) -> RunOutcome {
        for particle in std::mem::take(&mut self.living) {
            self.classify(particle);
        }

        info!(
            "simulation finished at t={:.3} s: {} emitted, {} detected, {} lost",
            self.time,
            self.generator.emitted(),
            self.detected.len(),
            self.lost.len()
        );

        RunOutcome {
            detected: self.detected,
            lost: self.lost,
            records: self.detector.records().to_vec(),
            volume: self.detector.volume().clone(),
            run_duration: self.time,
            emitted: self.generator.emitted(),
            sampling_failures: self.generator.sampling_failures(),
            nominal_rate: self.generator.emission_rate(),
            emission_alpha_deg: self.generator.alpha_deg(),
            emission_radius: self.generator.radius(),
            sampling_frequency: self.detector.sampling_frequency(),
        }
    }

    fn classify(&mut self, particle: Particle) {
        if particle.is_detected() {
            self.detected.push(particle);
        } else {
            self.lost.push(particle.id());
        }
    }

    /// Simulation time of the next tick.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn living(&self) -> &[Particle] {
        &self.living
    }

    pub fn steps_done(&self) -> u64 {
        self.steps_done
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn is_finished(&self) -> bool {
        self.steps_done >= self.total_steps
    }

    pub fn detector(&self) -> &dyn Detector {
        self.detector.as_ref()
    }
}

/// Whether `particle` left the domain of interest.
///
/// A non-finite position cannot be compared against the bound and counts
/// as having left.
fn has_left(particle: &Particle, bound: &Vector3<f64>, max_range: Option<f64>) -> bool {
    let position = &particle.position;
    if position.iter().any(|c| !c.is_finite()) {
        debug!("particle {} has a non-finite position, pruning", particle.id());
        return true;
    }
    if (0..3).any(|i| position[i] >= bound[i]) {
        return true;
    }
    max_range.map_or(false, |range| position.norm() > range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::distributions::DistParams;

    fn constant(value: f64) -> DistParams {
        DistParams::from([("value".to_string(), value)])
    }

    fn beam_config() -> RunConfig {
        // narrow beam straight at the default sensor
        let mut config = RunConfig::default();
        config.simulation.clock = 64.0;
        config.generator.alpha = 1.0;
        config.generator.radius = 0.05;
        config.simulation.seed = Some(1);
        config
    }

    #[test]
    fn test_step_advances_time() {
        let mut sim = Simulation::new(&beam_config()).unwrap();
        assert_eq!(sim.total_steps(), 640);
        sim.step();
        sim.step();
        assert_eq!(sim.steps_done(), 2);
        assert_eq!(sim.time(), 2.0 / 64.0);
    }

    #[test]
    fn test_emission_time_is_tick_time() {
        let mut config = beam_config();
        config.simulation.clock = 8.0;
        let mut sim = Simulation::new(&config).unwrap();

        // delay 0.5 s at 8 Hz: first emission on the fourth tick, t = 0.375
        for _ in 0..4 {
            sim.step();
        }
        assert_eq!(sim.living().len(), 1);
        assert_eq!(sim.living()[0].emission_time, Some(0.375));
    }

    #[test]
    fn test_beam_particles_are_detected() {
        let outcome = Simulation::new(&beam_config()).unwrap().run();
        assert_eq!(outcome.emitted, 20);
        // the last few launches have not reached the sensor when the run ends
        assert!(outcome.detected.len() >= 14);
        assert_eq!(outcome.detected.len() + outcome.lost.len(), 20);
        assert_eq!(outcome.records.len(), outcome.detected.len());
        assert_eq!(outcome.nominal_rate, 10.0);
    }

    #[test]
    fn test_particles_missing_sensor_are_lost() {
        let mut config = beam_config();
        // aim everything away from the sensor volume
        config.sensor.pos = [3.0, 5.0, 0.0];
        let outcome = Simulation::new(&config).unwrap().run();
        assert!(outcome.detected.is_empty());
        assert_eq!(outcome.lost.len() as u64, outcome.emitted);
    }

    #[test]
    fn test_max_range_prunes() {
        let mut config = beam_config();
        config.generator.vel_norm_dist_params = constant(-1.0);
        config.simulation.max_range = Some(2.0);
        let mut sim = Simulation::new(&config).unwrap();
        for _ in 0..300 {
            sim.step();
        }
        // backwards particles never reach the sensor; max range removes them
        assert!(sim.living().iter().all(|p| p.position.norm() <= 2.0));
        let outcome = sim.finish();
        assert!(!outcome.lost.is_empty());
        assert!(outcome.detected.is_empty());
    }

    #[test]
    fn test_non_finite_position_counts_as_left() {
        let bound = Vector3::new(1.0, 1.0, 1.0);
        let p = Particle::new(
            ParticleId(0),
            Vector3::new(f64::NAN, 0.0, 0.0),
            Vector3::zeros(),
        );
        assert!(has_left(&p, &bound, None));

        let inside = Particle::new(ParticleId(1), Vector3::zeros(), Vector3::zeros());
        assert!(!has_left(&inside, &bound, None));
        assert!(!has_left(&inside, &bound, Some(1.0)));
    }

    #[test]
    fn test_non_finite_timing_rejected() {
        let mut config = beam_config();
        config.simulation.clock = f64::INFINITY;
        assert!(matches!(
            Simulation::new(&config),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = beam_config();
        config.simulation.run_duration = f64::INFINITY;
        assert!(matches!(
            Simulation::new(&config),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = beam_config();
        config.simulation.clock = 0.0;
        assert!(Simulation::new(&config).is_err());
    }

    #[test]
    fn test_zero_duration_run() {
        let mut config = beam_config();
        config.simulation.run_duration = 0.0;
        let outcome = Simulation::new(&config).unwrap().run();
        assert_eq!(outcome.emitted, 0);
        assert_eq!(outcome.run_duration, 0.0);
    }
}
