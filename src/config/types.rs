//! Configuration types
//!
//! This module contains the main configuration types used throughout the application.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::parse_socket_addr;
use crate::config::defaults;

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// Default value
    Default,
    /// From configuration file
    File,
    /// From environment variable
    Environment,
    /// From command line argument
    CommandLine,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<Option<SocketAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(addr_str) => parse_socket_addr(&addr_str)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Configuration values
///
/// Every field is optional so that each source only sets what it knows
/// about; unset fields fall back to [`defaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    // --- Network settings ---

    /// Listen address (host:port)
    #[serde(default, deserialize_with = "deserialize_socket_addr")]
    pub listen: Option<SocketAddr>,

    /// Where STOMP connections are forwarded
    #[serde(default, deserialize_with = "deserialize_socket_addr")]
    pub stomp_backend: Option<SocketAddr>,

    /// Where HTTP and WebSocket connections are forwarded
    #[serde(default, deserialize_with = "deserialize_socket_addr")]
    pub http_backend: Option<SocketAddr>,

    // --- Detection settings ---

    /// Maximum bytes of the first line, terminator included
    #[serde(default)]
    pub max_line_length: Option<usize>,

    /// How long a client may take to send its first line, in milliseconds
    #[serde(default)]
    pub detect_timeout_ms: Option<u64>,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,

    /// Backend connect timeout in seconds
    #[serde(default)]
    pub connection_timeout: Option<u64>,

    /// Socket read buffer size (in bytes)
    #[serde(default)]
    pub buffer_size: Option<usize>,

    /// Disable Nagle's algorithm on both legs
    #[serde(default)]
    pub tcp_nodelay: Option<bool>,

    /// Enable TCP keepalive on both legs
    #[serde(default)]
    pub tcp_keepalive: Option<bool>,

    /// How long shutdown waits for open connections, in seconds
    #[serde(default)]
    pub shutdown_timeout: Option<u64>,
}

/// Gateway configuration
///
/// Contains all configuration options needed for the gateway.
/// Supports loading from command-line arguments, environment variables,
/// and configuration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Configuration values
    pub values: ConfigValues,

    /// Configuration file path
    pub config_file: Option<PathBuf>,

    /// Source tracking for configuration values
    pub sources: HashMap<String, ValueSource>,
}

impl Deref for GatewayConfig {
    type Target = ConfigValues;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut config = Self::empty();
        config.set_default_values();
        config
    }
}

impl GatewayConfig {
    /// A configuration with no values set and no sources recorded
    pub fn empty() -> Self {
        Self {
            values: ConfigValues::default(),
            config_file: None,
            sources: HashMap::new(),
        }
    }

    /// A configuration holding `values`, attributed to `source`
    pub fn from_values(values: ConfigValues, source: ValueSource) -> Self {
        let other = Self {
            values,
            config_file: None,
            sources: HashMap::new(),
        };
        Self::empty().merge(&other, source)
    }

    /// Fill every unset field with its default
    pub fn set_default_values(&mut self) {
        macro_rules! default_field {
            ($name:ident) => {
                if self.values.$name.is_none() {
                    self.values.$name = Some(defaults::$name());
                    self.sources.insert(stringify!($name).to_string(), ValueSource::Default);
                }
            };
        }

        default_field!(listen);
        default_field!(stomp_backend);
        default_field!(http_backend);
        default_field!(max_line_length);
        default_field!(detect_timeout_ms);
        default_field!(log_level);
        default_field!(connection_timeout);
        default_field!(buffer_size);
        default_field!(tcp_nodelay);
        default_field!(tcp_keepalive);
        default_field!(shutdown_timeout);
    }

    /// Merge a higher priority configuration into this one
    ///
    /// Fields set in `other` win and are attributed to `source`.
    pub fn merge(&self, other: &GatewayConfig, source: ValueSource) -> Self {
        let mut result = self.clone();

        macro_rules! merge_field {
            ($name:ident) => {
                if other.values.$name.is_some() {
                    result.values.$name = other.values.$name.clone();
                    result.sources.insert(stringify!($name).to_string(), source);
                }
            };
        }

        merge_field!(listen);
        merge_field!(stomp_backend);
        merge_field!(http_backend);
        merge_field!(max_line_length);
        merge_field!(detect_timeout_ms);
        merge_field!(log_level);
        merge_field!(connection_timeout);
        merge_field!(buffer_size);
        merge_field!(tcp_nodelay);
        merge_field!(tcp_keepalive);
        merge_field!(shutdown_timeout);

        if let Some(path) = &other.config_file {
            result.config_file = Some(path.clone());
        }

        result
    }

    /// Get the source of a configuration value
    pub fn source(&self, name: &str) -> String {
        self.sources
            .get(name)
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the listen address
    pub fn listen(&self) -> SocketAddr {
        self.values.listen.unwrap_or_else(defaults::listen)
    }

    /// Get the STOMP backend address
    pub fn stomp_backend(&self) -> SocketAddr {
        self.values.stomp_backend.unwrap_or_else(defaults::stomp_backend)
    }

    /// Get the HTTP backend address
    pub fn http_backend(&self) -> SocketAddr {
        self.values.http_backend.unwrap_or_else(defaults::http_backend)
    }

    /// Get the first-line limit
    pub fn max_line_length(&self) -> usize {
        self.values.max_line_length.unwrap_or_else(defaults::max_line_length)
    }

    /// Get the detection window in milliseconds
    pub fn detect_timeout_ms(&self) -> u64 {
        self.values.detect_timeout_ms.unwrap_or_else(defaults::detect_timeout_ms)
    }

    /// Get the detection window
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms())
    }

    /// Get the log level
    pub fn log_level(&self) -> &str {
        self.values.log_level.as_deref().unwrap_or(defaults::LOG_LEVEL_STR)
    }

    /// Get the backend connect timeout in seconds
    pub fn connection_timeout(&self) -> u64 {
        self.values.connection_timeout.unwrap_or_else(defaults::connection_timeout)
    }

    /// Get the read buffer size
    pub fn buffer_size(&self) -> usize {
        self.values.buffer_size.unwrap_or_else(defaults::buffer_size)
    }

    /// Whether TCP_NODELAY is set on both legs
    pub fn tcp_nodelay(&self) -> bool {
        self.values.tcp_nodelay.unwrap_or_else(defaults::tcp_nodelay)
    }

    /// Whether TCP keepalive is set on both legs
    pub fn tcp_keepalive(&self) -> bool {
        self.values.tcp_keepalive.unwrap_or_else(defaults::tcp_keepalive)
    }

    /// Get the shutdown grace period in seconds
    pub fn shutdown_timeout(&self) -> u64 {
        self.values.shutdown_timeout.unwrap_or_else(defaults::shutdown_timeout)
    }

    /// Get the configuration file path
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Log the configuration
    pub fn log(&self) {
        debug!("=== Configuration ===");
        debug!("Network settings:");
        debug!("  Listen address: {} (from {})", self.listen(), self.source("listen"));
        debug!("  STOMP backend: {} (from {})", self.stomp_backend(), self.source("stomp_backend"));
        debug!("  HTTP backend: {} (from {})", self.http_backend(), self.source("http_backend"));

        debug!("Detection settings:");
        debug!("  Max line length: {} bytes (from {})", self.max_line_length(), self.source("max_line_length"));
        debug!("  Detect timeout: {} ms (from {})", self.detect_timeout_ms(), self.source("detect_timeout_ms"));

        debug!("General settings:");
        debug!("  Log level: {} (from {})", self.log_level(), self.source("log_level"));
        debug!("  Connection timeout: {} seconds (from {})", self.connection_timeout(), self.source("connection_timeout"));
        debug!("  Buffer size: {} bytes (from {})", self.buffer_size(), self.source("buffer_size"));
        debug!("  TCP nodelay: {} / keepalive: {}", self.tcp_nodelay(), self.tcp_keepalive());
        debug!("  Shutdown timeout: {} seconds (from {})", self.shutdown_timeout(), self.source("shutdown_timeout"));

        if let Some(file) = self.config_file() {
            debug!("  Configuration file: {}", file.display());
        }

        debug!("=====================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_tracked() {
        let config = GatewayConfig::default();

        assert_eq!(config.listen().port(), 61613);
        assert_eq!(config.max_line_length(), 8192);
        assert_eq!(config.source("listen"), "default");
        assert_eq!(config.source("nonexistent"), "unknown");
    }

    #[test]
    fn test_merge_overrides_set_fields_only() {
        let base = GatewayConfig::default();
        let mut values = ConfigValues::default();
        values.http_backend = Some("127.0.0.1:9000".parse().unwrap());
        values.max_line_length = Some(256);
        let file = GatewayConfig::from_values(values, ValueSource::File);

        let merged = base.merge(&file, ValueSource::File);

        assert_eq!(merged.http_backend().port(), 9000);
        assert_eq!(merged.max_line_length(), 256);
        assert_eq!(merged.stomp_backend().port(), 61614);
        assert_eq!(merged.source("http_backend"), "file");
        assert_eq!(merged.source("stomp_backend"), "default");
    }

    #[test]
    fn test_parse_partial_values() {
        let json = r#"{ "listen": "127.0.0.1:7000", "tcp_nodelay": false }"#;
        let values: ConfigValues = serde_json::from_str(json).unwrap();

        assert_eq!(values.listen.unwrap().port(), 7000);
        assert_eq!(values.tcp_nodelay, Some(false));
        assert!(values.buffer_size.is_none());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{ "target": "127.0.0.1:6000" }"#;
        assert!(serde_json::from_str::<ConfigValues>(json).is_err());
    }
}
