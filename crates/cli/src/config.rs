//! Run configuration for the `pwfft` binary.
//!
//! ```toml
//! backend = "cpu"
//! shape = [24, 24, 24]
//! cutoff = 0.6
//! hermitian = true
//! repeat = 5
//! memory_limit_mb = 256
//!
//! [scales]
//! backward = 1.0
//!
//! [engine]
//! planar = "batched-2d"
//! ```

use std::path::Path;

use clap::ValueEnum;
use pwfft_core::{ConfigError, EngineConfig, GridShape};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Cuda,
}

/// Scales applied by the gather and scatter stages. The gather scale
/// defaults to `1 / N`, which makes gather-then-scatter a projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scales {
    pub forward: Option<f64>,
    pub backward: f64,
}

impl Default for Scales {
    fn default() -> Self {
        Self {
            forward: None,
            backward: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub backend: Backend,
    pub shape: [usize; 3],
    /// Fraction of the Nyquist frequency kept along every axis.
    pub cutoff: f64,
    /// Keep half the sphere and rebuild the rest from conjugate partners.
    pub hermitian: bool,
    pub repeat: usize,
    pub memory_limit_mb: Option<usize>,
    pub scales: Scales,
    pub engine: EngineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Cpu,
            shape: [16, 16, 16],
            cutoff: 0.5,
            hermitian: true,
            repeat: 3,
            memory_limit_mb: None,
            scales: Scales::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.contains(&0) {
            return Err(ConfigError::Invalid(format!(
                "shape {:?} has an empty axis",
                self.shape
            )));
        }
        if !(self.cutoff > 0.0 && self.cutoff.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "cutoff must be positive, got {}",
                self.cutoff
            )));
        }
        if self.repeat == 0 {
            return Err(ConfigError::Invalid("repeat must be at least 1".into()));
        }
        self.engine.validate()
    }

    pub fn grid(&self) -> GridShape {
        GridShape::from(self.shape)
    }

    pub fn forward_scale(&self) -> f64 {
        self.scales
            .forward
            .unwrap_or_else(|| 1.0 / self.grid().len() as f64)
    }

    pub fn memory_limit_bytes(&self) -> Option<usize> {
        self.memory_limit_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}
