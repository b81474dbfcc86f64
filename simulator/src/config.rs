//! Run configuration and flat-key routing
//!
//! A run is described by one flat map of string keys. Keys prefixed `gen_`
//! configure the generator, keys prefixed `sen_` configure the sensor, and
//! `clock`, `run_duration`, `seed` and `max_range` configure the driver:
//!
//! ```json
//! {
//!     "clock": 60,
//!     "run_duration": 10.0,
//!     "gen_alpha": 20,
//!     "gen_emit_dist_type": "expon",
//!     "gen_emit_dist_params": {"scale": 0.7},
//!     "sen_pos": [3.0, 0.0, 0.0]
//! }
//! ```
//!
//! Unrecognised keys are ignored with a warning. A `null` value leaves the
//! default in place.

use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::hardware::generator::GeneratorConfig;
use crate::hardware::sensor::SensorConfig;

const GENERATOR_PREFIX: &str = "gen_";
const SENSOR_PREFIX: &str = "sen_";

/// Driver-level parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Ticks per simulated second
    pub clock: f64,
    /// Simulated duration in seconds
    pub run_duration: f64,
    /// Seed of the generator's random stream, entropy when absent
    pub seed: Option<u64>,
    /// Particles farther than this from the origin leave the domain
    pub max_range: Option<f64>,
}

impl SimulationParams {
    pub const KEYS: &'static [&'static str] = &["clock", "run_duration", "seed", "max_range"];

    /// Reject tick rates, durations and ranges that cannot drive a finite run.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.clock > 0.0) || !self.clock.is_finite() {
            return Err(ConfigError::invalid_value(
                "clock",
                format!("tick rate must be positive and finite, got {}", self.clock),
            ));
        }
        if !(self.run_duration >= 0.0) || !self.run_duration.is_finite() {
            return Err(ConfigError::invalid_value(
                "run_duration",
                format!("must be finite and non-negative, got {}", self.run_duration),
            ));
        }
        if let Some(range) = self.max_range {
            if !(range > 0.0) {
                return Err(ConfigError::invalid_value(
                    "max_range",
                    format!("must be positive, got {range}"),
                ));
            }
        }
        Ok(())
    }
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            clock: 60.0,
            run_duration: 10.0,
            seed: None,
            max_range: None,
        }
    }
}

/// Complete description of one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub generator: GeneratorConfig,
    pub sensor: SensorConfig,
    pub simulation: SimulationParams,
}

impl RunConfig {
    /// Route a flat key map to the generator, sensor and driver sections.
    pub fn from_flat(flat: &Map<String, Value>) -> Result<Self, ConfigError> {
        let mut generator = Map::new();
        let mut sensor = Map::new();
        let mut simulation = Map::new();

        for (key, value) in flat {
            if value.is_null() {
                continue;
            }
            if let Some(sub) = key.strip_prefix(GENERATOR_PREFIX) {
                route(&mut generator, GeneratorConfig::KEYS, key, sub, value);
            } else if let Some(sub) = key.strip_prefix(SENSOR_PREFIX) {
                route(&mut sensor, SensorConfig::KEYS, key, sub, value);
            } else {
                route(&mut simulation, SimulationParams::KEYS, key, key, value);
            }
        }

        let config = Self {
            generator: serde_json::from_value(Value::Object(generator))?,
            sensor: serde_json::from_value(Value::Object(sensor))?,
            simulation: serde_json::from_value(Value::Object(simulation))?,
        };
        config.simulation.validate()?;
        Ok(config)
    }

    /// Read a JSON file holding a flat key map.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let flat: Map<String, Value> = serde_json::from_str(&text)?;
        Self::from_flat(&flat)
    }

    /// Seconds between two ticks.
    pub fn time_step(&self) -> f64 {
        1.0 / self.simulation.clock
    }

    /// Number of ticks in the run.
    pub fn total_steps(&self) -> u64 {
        // tolerate products like 0.29 · 100 landing just below an integer
        (self.simulation.run_duration * self.simulation.clock + 1e-9).floor() as u64
    }
}

fn route(target: &mut Map<String, Value>, known: &[&str], key: &str, sub: &str, value: &Value) {
    if known.contains(&sub) {
        target.insert(sub.to_string(), value.clone());
    } else {
        warn!("unknown parameter '{key}' ignored");
    }
}
