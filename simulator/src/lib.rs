//! Stochastic particle emission and detection simulation
//!
//! This crate simulates a source emitting particles into a cone, a
//! rectangular sensor observing them, and the post-hoc reconstruction that
//! turns the sensor's detection records into emission-rate estimates:
//!
//! - [`particle`] - point particles, identities and detection snapshots
//! - [`algo`] - sampling laws by family name, ray/box intersection
//! - [`hardware`] - emission generator and sensor strategies
//! - [`sims`] - fixed-timestep driver and static analysis
//! - [`config`] - flat key routing of a run configuration
//!
//! The estimators themselves live in the `rate-math` crate.

pub mod algo;
pub mod config;
pub mod error;
pub mod hardware;
pub mod particle;
pub mod shared_args;
pub mod sims;

// Re-exports for easier access
pub use config::{RunConfig, SimulationParams};
pub use error::{AnalysisError, ConfigError, SampleError};
pub use hardware::generator::{EmissionGenerator, GeneratorConfig};
pub use hardware::sensor::{Detector, DwellSensor, SampledSensor, SensorConfig, SensorVolume};
pub use particle::{DetectionRecord, Particle, ParticleId, ParticleIdAllocator};
pub use sims::emission_run::{RunOutcome, Simulation};
pub use sims::static_analysis::StaticAnalysis;
