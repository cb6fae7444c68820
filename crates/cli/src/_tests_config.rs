#![cfg(test)]

use pwfft_core::PlanarStrategy;

use crate::config::{Backend, RunConfig};
use crate::parse_shape;

#[test]
fn defaults_validate() {
    let config = RunConfig::default();
    assert_eq!(config.backend, Backend::Cpu);
    assert_eq!(config.shape, [16, 16, 16]);
    assert!(config.hermitian);
    config.validate().unwrap();
}

#[test]
fn partial_toml_keeps_defaults() {
    let config = RunConfig::from_toml_str(
        r#"
        shape = [8, 6, 4]
        cutoff = 0.75

        [engine]
        planar = "batched-2d"
        "#,
    )
    .unwrap();
    assert_eq!(config.shape, [8, 6, 4]);
    assert_eq!(config.cutoff, 0.75);
    assert_eq!(config.repeat, 3);
    assert_eq!(config.engine.planar, PlanarStrategy::Batched2d);
    assert_eq!(config.scales.backward, 1.0);
}

#[test]
fn backend_names_are_lowercase() {
    let config = RunConfig::from_toml_str("backend = \"cuda\"").unwrap();
    assert_eq!(config.backend, Backend::Cuda);
    assert!(RunConfig::from_toml_str("backend = \"CUDA\"").is_err());
}

#[test]
fn invalid_runs_are_rejected() {
    assert!(RunConfig::from_toml_str("shape = [8, 0, 8]").is_err());
    assert!(RunConfig::from_toml_str("cutoff = 0.0").is_err());
    assert!(RunConfig::from_toml_str("cutoff = -1.0").is_err());
    assert!(RunConfig::from_toml_str("repeat = 0").is_err());
}

#[test]
fn forward_scale_defaults_to_inverse_grid_size() {
    let mut config = RunConfig {
        shape: [4, 2, 8],
        ..RunConfig::default()
    };
    assert_eq!(config.forward_scale(), 1.0 / 64.0);
    config.scales.forward = Some(2.5);
    assert_eq!(config.forward_scale(), 2.5);
}

#[test]
fn memory_limit_is_converted_from_mebibytes() {
    let config = RunConfig::from_toml_str("memory_limit_mb = 3").unwrap();
    assert_eq!(config.memory_limit_bytes(), Some(3 * 1024 * 1024));
    assert_eq!(RunConfig::default().memory_limit_bytes(), None);
}

#[test]
fn dumped_config_parses_back() {
    let mut config = RunConfig::default();
    config.cutoff = 0.4;
    config.memory_limit_mb = Some(64);
    let text = config.to_toml_string().unwrap();
    assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn shapes_parse_from_the_command_line() {
    assert_eq!(parse_shape("12").unwrap(), [12, 12, 12]);
    assert_eq!(parse_shape("8x6x4").unwrap(), [8, 6, 4]);
    assert_eq!(parse_shape("8, 6, 4").unwrap(), [8, 6, 4]);
    assert!(parse_shape("8x6").is_err());
    assert!(parse_shape("8xax4").is_err());
}
