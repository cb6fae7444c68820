//! Staged plane-wave FFT engine.
//!
//! Moves real-space grids and reciprocal-space coefficient sets between the
//! host and an accelerator, running FFTs, packing kernels and
//! gather/scatter kernels on a three-stream pipeline. The accelerator is
//! abstracted by [`device::Device`]; backends live in their own crates.

pub mod coefficients;
pub mod complex;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod kernels;
pub mod launch;
pub mod pipeline;
pub mod plan;
pub mod shape;
pub mod transform;

pub use coefficients::CoefficientMap;
pub use config::{ConfigError, EngineConfig, PlanarStrategy};
pub use device::Device;
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorKind, MemoryInfo};
pub use shape::{Direction, GridShape};

#[cfg(test)]
mod _tests_config;
#[cfg(test)]
mod _tests_launch;
#[cfg(test)]
mod _tests_plan;
