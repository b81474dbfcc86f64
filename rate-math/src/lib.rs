//! rate-math - Emission-rate estimators for particle detection experiments
//!
//! This crate turns indirect observations of a particle source (how many
//! particles sit inside a sensor, how long they stay, when they were first
//! seen) into an estimate of the true emission rate. It provides:
//!
//! - **Little's Law** - occupancy / residence-time inversion `λ = L / W`
//! - **Linear / DP** - rank assignment of emission times by dynamic programming
//! - **Geometrical** - cone-slice to sensor volume ratio
//! - **Gaussian MLE** - maximum-likelihood spread of a sample
//! - **Statistics** - arithmetic and harmonic means
//!
//! Every estimator is a pure function of its inputs and is safe to call
//! concurrently on distinct data.
//!
//! # Example
//!
//! ```
//! use rate_math::{LinearEstimator, LittleLawEstimator};
//!
//! let rate = LittleLawEstimator::estimate(&[2, 2, 2], &[1.0, 1.0, 1.0, 1.0]).unwrap();
//! assert_eq!(rate, 2.0);
//!
//! let fit = LinearEstimator::estimate(&[2.0, 4.0, 6.0, 8.0], 1, None, Some(&[1.5, 2.0, 2.5][..])).unwrap();
//! assert_eq!(fit.best_x, vec![1, 2, 3, 4]);
//! ```

pub mod error;
pub mod gaussian_mle;
pub mod geometrical;
pub mod linear;
pub mod little_law;
pub mod stats;

// Re-export commonly used types
pub use error::EstimatorError;
pub use gaussian_mle::GaussianMle;
pub use geometrical::GeometricalEstimator;
pub use linear::{LinearEstimator, LinearFit};
pub use little_law::LittleLawEstimator;
pub use stats::{harmonic_mean, mean};
