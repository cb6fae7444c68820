//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! planar = "two-pass-1d"
//! validate_maps = true
//!
//! [plan_cache]
//! capacity_1d = 30
//! capacity_2d = 30
//! capacity_3d = 30
//!
//! [launch]
//! max_threads_per_group = 512
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::launch::LaunchLimits;
use crate::plan::PlanCacheConfig;

/// How the planar (2-D) operations are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanarStrategy {
    /// Two passes of batched 1-D transforms.
    #[default]
    #[serde(rename = "two-pass-1d")]
    TwoPass1d,
    /// A single batched 2-D plan.
    #[serde(rename = "batched-2d")]
    Batched2d,
}

/// Optional tightening of the device's launch limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOverrides {
    pub max_threads_per_group: Option<u32>,
    pub max_groups_per_dim: Option<u32>,
}

impl LaunchOverrides {
    /// Device limits, lowered wherever an override is smaller.
    pub fn apply(&self, device: LaunchLimits) -> LaunchLimits {
        LaunchLimits {
            max_threads_per_group: self
                .max_threads_per_group
                .map_or(device.max_threads_per_group, |v| v.min(device.max_threads_per_group)),
            max_groups_per_dim: self
                .max_groups_per_dim
                .map_or(device.max_groups_per_dim, |v| v.min(device.max_groups_per_dim)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub plan_cache: PlanCacheConfig,
    pub planar: PlanarStrategy,
    /// Range-check coefficient maps against the dense grid before each operation.
    pub validate_maps: bool,
    pub launch: LaunchOverrides,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan_cache: PlanCacheConfig::default(),
            planar: PlanarStrategy::default(),
            validate_maps: true,
            launch: LaunchOverrides::default(),
        }
    }
}

impl EngineConfig {
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
        if self.launch.max_threads_per_group == Some(0) {
            return Err(ConfigError::Invalid(
                "launch.max_threads_per_group must be positive".into(),
            ));
        }
        if self.launch.max_groups_per_dim == Some(0) {
            return Err(ConfigError::Invalid(
                "launch.max_groups_per_dim must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
