use std::path::PathBuf;

use clap::Parser;

use crate::config::RunConfig;
use crate::error::ConfigError;

/// Common arguments shared by simulation binaries
#[derive(Parser, Debug, Clone)]
pub struct SharedSimulationArgs {
    /// JSON file holding a flat run configuration (gen_*, sen_*, clock, ...)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Simulation tick rate in Hz, overrides the configuration
    #[arg(long)]
    pub clock: Option<f64>,

    /// Simulated duration in seconds, overrides the configuration
    #[arg(long)]
    pub run_duration: Option<f64>,

    /// Random seed, overrides the configuration
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SharedSimulationArgs {
    /// Load the configuration file (or defaults) and apply overrides.
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(clock) = self.clock {
            config.simulation.clock = clock;
        }
        if let Some(run_duration) = self.run_duration {
            config.simulation.run_duration = run_duration;
        }
        if self.seed.is_some() {
            config.simulation.seed = self.seed;
        }
        config.simulation.validate()?;
        Ok(config)
    }
}
