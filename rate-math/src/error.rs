use thiserror::Error;

/// Errors produced by the rate estimators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// The named input sequence contains no values.
    #[error("{0} is empty; cannot perform estimation")]
    EmptyData(&'static str),

    /// A residence time of exactly zero makes the harmonic mean undefined.
    #[error("residence time at index {index} is zero; harmonic mean undefined")]
    ZeroResidence {
        /// Position of the offending value.
        index: usize,
    },

    /// The rank window cannot hold the requested strictly increasing sequence.
    #[error("rank window [{xmin}, {xmax}] cannot hold {n} strictly increasing values")]
    RankWindowTooSmall {
        /// Smallest admissible rank.
        xmin: i64,
        /// Largest admissible rank.
        xmax: i64,
        /// Number of observations to place.
        n: usize,
    },

    /// Any other rejected argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
