//! Simulation driver and post-hoc analysis

pub mod emission_run;
pub mod static_analysis;

pub use emission_run::{RunOutcome, Simulation};
pub use static_analysis::{StaticAnalysis, DEFAULT_SLAB_TOLERANCE};
