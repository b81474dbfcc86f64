//! Error types for configuration, sampling and post-hoc analysis

use rate_math::EstimatorError;
use thiserror::Error;

use crate::particle::ParticleId;

/// Misconfigured experiment. Raised while building a component, never mid-run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown distribution family '{0}'")]
    UnknownDistribution(String),

    #[error("distribution '{family}' requires parameter '{parameter}'")]
    MissingParameter {
        family: String,
        parameter: &'static str,
    },

    #[error("distribution '{family}' does not accept parameter '{parameter}'")]
    UnknownParameter { family: String, parameter: String },

    #[error("invalid parameters for distribution '{family}': {reason}")]
    InvalidParameter { family: String, reason: String },

    #[error("unknown velocity direction law '{0}' (expected 'uniform_cone' or 'truncnorm_cone')")]
    UnknownDirectionLaw(String),

    #[error("unknown emission surface '{0}' (expected 'circle' or 'square')")]
    UnknownSurface(String),

    #[error("unknown sensor strategy '{0}' (expected 'dwell' or 'sampled')")]
    UnknownStrategy(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// A single draw that could not be turned into a particle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("{quantity} draw is not finite ({value})")]
    NonFinite { quantity: &'static str, value: f64 },

    #[error("launch direction has zero length")]
    DegenerateDirection,
}

/// Failure while reconstructing quantities from detection records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("particle {0} was never detected")]
    NotDetected(ParticleId),

    #[error("particle {0} moves parallel to the launch plane")]
    ParallelToLaunchAxis(ParticleId),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}
