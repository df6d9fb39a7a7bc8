//! Tests for configuration loading and validation

use std::time::Duration;
use tracking_head::{
    config::{Config, EXAMPLE_CONFIG},
    mode::OperatingMode,
    protocol::WireFields,
    Error,
};

#[test]
fn test_round_trip_through_file() {
    let dir = std::env::temp_dir().join(format!("tracking-head-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("head.yaml");

    let mut config = Config::default();
    config.pipeline.initial_mode = OperatingMode::DisplayOnly;
    config.transmission.wire_fields = WireFields::Horizontal;
    config.source.frames = Some(42);
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_missing_file() {
    let result = Config::from_file("/nonexistent/tracking-head.yaml");
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_example_config_values() {
    let config: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
    assert_eq!(config.pipeline.frame_capacity, 2);
    assert_eq!(config.transmission.min_delay(), Duration::from_millis(100));
    assert_eq!(config.transmission.precision, 2);
    assert_eq!(config.control.horizontal.exclusion, 0.3);
    assert_eq!(config.control.vertical.exclusion, 0.2);
    assert_eq!(config.control.approach.target_area, 0.15);
    assert_eq!(config.receiver.silence_timeout(), Duration::from_millis(1000));
}

#[test]
fn test_validation_errors() {
    let mut config = Config::default();
    config.control.horizontal.exclusion = 0.6;
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let mut config = Config::default();
    config.control.approach.tolerance = 0.2;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.receiver.port = config.transmission.port;
    config.receiver.bind = config.transmission.bind;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.source.buffers = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.transmission.precision = 9;
    assert!(config.validate().is_err());
}

#[test]
fn test_malformed_yaml() {
    let result: Result<Config, _> = serde_yaml::from_str("pipeline: [1, 2");
    assert!(result.is_err());
}
