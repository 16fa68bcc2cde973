//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use std::time::Duration;

use lobby_relay::config::{AccessMode, RelayConfig, MAX_BLOCK_PENALTY};
use tracing::Level;

fn valid() -> RelayConfig {
    RelayConfig::default_with_overrides(|c| {
        c.server.admin_password = "secret".into();
    })
}

#[test]
fn test_default_config_needs_password() {
    let errors = RelayConfig::default().validate();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("Admin password"));
    assert!(valid().validate().is_empty());
}

#[test]
fn test_invalid_addresses() {
    let mut config = valid();
    config.server.tcp_address = "invalid_address".to_string();
    config.server.udp_address = String::new();

    let errors = config.validate();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e.contains("Invalid TCP address")));
    assert!(errors.iter().any(|e| e.contains("UDP address cannot be empty")));
}

#[test]
fn test_block_penalty_capped() {
    let mut config = valid();
    config.server.block_penalty = Duration::from_secs(5);

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Block penalty too long")));
    assert_eq!(config.server.effective_block_penalty(), MAX_BLOCK_PENALTY);
}

#[test]
fn test_short_sweep_interval() {
    let mut config = valid();
    config.server.sweep_interval = Duration::from_millis(10);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Sweep interval too short")));
}

#[test]
fn test_bad_text_filter() {
    let mut config = valid();
    config.lobby.text_filter = Some("(unclosed".into());

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid text filter")));
    assert!(config.validate_strict().is_err());
}

#[test]
fn test_empty_app_name() {
    let mut config = valid();
    config.logging.app_name = String::new();
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Application name cannot be empty")));
}

#[test]
fn test_partial_toml() {
    let config = RelayConfig::from_toml(
        r#"
        [server]
        tcp_address = "127.0.0.1:9000"
        admin_password = "hunter2"
        access_mode = "private"
        block_penalty = 500

        [lobby]
        default_names = ["Alpha", "Beta"]
        text_filter = "darn|heck"

        [logging]
        log_level = "debug"
        "#,
    )
    .expect("parse");

    assert_eq!(config.server.tcp_address, "127.0.0.1:9000");
    assert_eq!(config.server.udp_address, "0.0.0.0:8554");
    assert_eq!(config.server.access_mode, AccessMode::Private);
    assert_eq!(config.server.block_penalty, Duration::from_millis(500));
    assert_eq!(
        config.lobby.default_names,
        Some(vec!["Alpha".to_string(), "Beta".to_string()])
    );
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert_eq!(config.logging.app_name, "lobby-relay");
    assert!(config.validate_strict().is_ok());
}

#[test]
fn test_malformed_toml() {
    assert!(RelayConfig::from_toml("[server\nadmin_password = ").is_err());
    assert!(RelayConfig::from_toml("[logging]\nlog_level = \"loud\"").is_err());
}

#[test]
fn test_example_config_parses() {
    let example = RelayConfig::example_config();
    let parsed = RelayConfig::from_toml(&example).expect("example parses");
    assert_eq!(parsed.server.tcp_address, "0.0.0.0:8555");
    assert_eq!(parsed.server.sweep_interval, Duration::from_secs(600));
}
