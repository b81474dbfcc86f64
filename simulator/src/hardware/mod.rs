//! Particle source and sensor models

pub mod generator;
pub mod sensor;

pub use generator::{DirectionLaw, EmissionGenerator, GeneratorConfig, SurfaceShape};
pub use sensor::{
    build_detector, Detector, DwellSensor, SampledSensor, SensorConfig, SensorStrategy,
    SensorVolume,
};
