//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use crate::config::defaults::LOG_LEVELS;
use crate::config::error::{ConfigError, Result};
use crate::config::types::GatewayConfig;

/// Validate the configuration
pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_detection_settings(config)?;
    validate_general_settings(config)?;
    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &GatewayConfig) -> Result<()> {
    let listen = config.listen();

    // Forwarding to ourselves would loop forever
    for (name, backend) in [("stomp_backend", config.stomp_backend()), ("http_backend", config.http_backend())] {
        if backend == listen {
            return Err(ConfigError::InvalidCombination(format!(
                "Listen address and {} must be different ({})",
                name, listen
            )));
        }
    }

    Ok(())
}

/// Validate detection settings
fn validate_detection_settings(config: &GatewayConfig) -> Result<()> {
    if config.max_line_length() == 0 {
        return Err(ConfigError::InvalidValue(
            "max_line_length".to_string(),
            "Max line length must be greater than 0".to_string(),
        ));
    }

    if config.detect_timeout_ms() == 0 {
        return Err(ConfigError::InvalidValue(
            "detect_timeout_ms".to_string(),
            "Detect timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &GatewayConfig) -> Result<()> {
    let level = config.log_level();
    if !LOG_LEVELS.contains(&level) {
        return Err(ConfigError::InvalidValue(
            "log_level".to_string(),
            format!("'{}' is not one of {}", level, LOG_LEVELS.join(", ")),
        ));
    }

    if config.buffer_size() == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string(),
        ));
    }

    if config.connection_timeout() == 0 {
        return Err(ConfigError::InvalidValue(
            "connection_timeout".to_string(),
            "Connection timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Check configuration for suspicious but legal settings
pub fn check_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.stomp_backend() == config.http_backend() {
        warnings.push(format!(
            "STOMP and HTTP backends share the same address {}",
            config.stomp_backend()
        ));
    }

    if config.buffer_size() < 512 {
        warnings.push(format!(
            "Buffer size {} bytes is very small and may hurt throughput",
            config.buffer_size()
        ));
    }

    warnings
}
