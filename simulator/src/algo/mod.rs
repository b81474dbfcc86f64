//! Numerical building blocks: sampling laws and box intersection

pub mod distributions;
pub mod slab;

pub use distributions::{DistParams, DistributionRegistry, Sampler};
pub use slab::{intersect, SlabInterval};
