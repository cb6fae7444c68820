//! Tests for engine configuration loading.

#![cfg(test)]

use crate::config::{ConfigError, EngineConfig, LaunchOverrides, PlanarStrategy};
use crate::launch::LaunchLimits;

#[test]
fn empty_document_gives_defaults() {
    let config = EngineConfig::from_toml_str("").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.plan_cache.capacity_1d, 30);
    assert_eq!(config.planar, PlanarStrategy::TwoPass1d);
    assert!(config.validate_maps);
}

#[test]
fn partial_document_overrides_selected_fields() {
    let raw = r#"
        planar = "batched-2d"
        validate_maps = false

        [plan_cache]
        capacity_3d = 2

        [launch]
        max_threads_per_group = 128
    "#;
    let config = EngineConfig::from_toml_str(raw).unwrap();
    assert_eq!(config.planar, PlanarStrategy::Batched2d);
    assert!(!config.validate_maps);
    assert_eq!(config.plan_cache.capacity_3d, 2);
    assert_eq!(config.plan_cache.capacity_1d, 30);
    assert_eq!(config.launch.max_threads_per_group, Some(128));
    assert_eq!(config.launch.max_groups_per_dim, None);
}

#[test]
fn config_survives_a_toml_round_trip() {
    let mut config = EngineConfig::default();
    config.planar = PlanarStrategy::Batched2d;
    config.plan_cache.capacity_2d = 3;
    config.launch.max_groups_per_dim = Some(100);
    let text = config.to_toml_string().unwrap();
    assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn zero_launch_override_is_rejected() {
    let err = EngineConfig::from_toml_str("[launch]\nmax_groups_per_dim = 0").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = EngineConfig::from_toml_str("planar = [").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
    let err = EngineConfig::from_toml_str("planar = \"diagonal\"").unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = EngineConfig::from_file("/nonexistent/pwfft.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn overrides_only_tighten_device_limits() {
    let device = LaunchLimits {
        max_threads_per_group: 512,
        max_groups_per_dim: 1000,
    };
    let overrides = LaunchOverrides {
        max_threads_per_group: Some(2048),
        max_groups_per_dim: Some(10),
    };
    let limits = overrides.apply(device);
    assert_eq!(limits.max_threads_per_group, 512);
    assert_eq!(limits.max_groups_per_dim, 10);
    assert_eq!(LaunchOverrides::default().apply(device), device);
}
