//! Test for configuration priority order
//!
//! Command line arguments > Environment variables > Configuration file > Default values

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use serial_test::serial;
use tempfile::TempDir;

use stomp_http_gateway::config::{CliArgs, ConfigBuilder, ValueSource, ENV_PREFIX};

const ENV_VARS: &[&str] = &["STOMP_BACKEND", "HTTP_BACKEND", "MAX_LINE_LENGTH", "LOG_LEVEL", "TCP_NODELAY"];

fn clear_env() {
    for name in ENV_VARS {
        env::remove_var(format!("{}{}", ENV_PREFIX, name));
    }
}

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("gateway.json");
    let content = r#"{
        "stomp_backend": "127.0.0.1:7001",
        "http_backend": "127.0.0.1:7002",
        "max_line_length": 1024,
        "log_level": "warn"
    }"#;
    fs::write(&path, content).expect("Failed to write config file");
    path
}

#[test]
#[serial]
fn test_config_priority() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir);

    env::set_var(format!("{}HTTP_BACKEND", ENV_PREFIX), "127.0.0.1:7102");
    env::set_var(format!("{}MAX_LINE_LENGTH", ENV_PREFIX), "2048");

    let args = CliArgs {
        max_line_length: Some(4096),
        ..CliArgs::default()
    };

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_file(&path)
        .with_env(ENV_PREFIX)
        .with_cli(args)
        .build();

    clear_env();
    let config = config.expect("Failed to build configuration");

    // File only
    assert_eq!(config.stomp_backend(), addr("127.0.0.1:7001"));
    assert_eq!(config.sources.get("stomp_backend"), Some(&ValueSource::File));
    assert_eq!(config.log_level(), "warn");

    // Env over file
    assert_eq!(config.http_backend(), addr("127.0.0.1:7102"));
    assert_eq!(config.sources.get("http_backend"), Some(&ValueSource::Environment));

    // CLI over env
    assert_eq!(config.max_line_length(), 4096);
    assert_eq!(config.sources.get("max_line_length"), Some(&ValueSource::CommandLine));

    // Untouched
    assert_eq!(config.buffer_size(), 8192);
    assert_eq!(config.sources.get("buffer_size"), Some(&ValueSource::Default));
    assert_eq!(config.config_file(), Some(path.as_path()));
}

#[test]
#[serial]
fn test_invalid_env_value_rejected() {
    clear_env();
    env::set_var(format!("{}TCP_NODELAY", ENV_PREFIX), "sometimes");

    let result = ConfigBuilder::new().with_defaults().with_env(ENV_PREFIX).build();

    clear_env();
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_malformed_file_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"listen\": ").unwrap();

    assert!(ConfigBuilder::new().with_defaults().with_file(&path).build().is_err());
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let config = ConfigBuilder::new()
        .with_defaults()
        .with_file(dir.path().join("absent.json"))
        .with_env(ENV_PREFIX)
        .build()
        .unwrap();

    assert_eq!(config.listen(), addr("0.0.0.0:61613"));
    assert_eq!(config.sources.get("listen"), Some(&ValueSource::Default));
    assert!(config.config_file().is_none());
}
