//! Configuration sources
//!
//! This module defines traits and implementations for loading configuration
//! from different sources.

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use log::{debug, warn};

use crate::common::parse_socket_addr;
use crate::config::error::{ConfigError, Result};
use crate::config::types::{ConfigValues, GatewayConfig, ValueSource};

/// Configuration source trait
pub trait ConfigSource {
    /// Load configuration from this source
    fn load(&self) -> Result<GatewayConfig>;

    /// Get the source type
    fn source_type(&self) -> ValueSource;
}

/// Default configuration source
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<GatewayConfig> {
        debug!("Loading default configuration");
        Ok(GatewayConfig::default())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Default
    }
}

/// JSON file configuration source
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    /// Create a new file source
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<GatewayConfig> {
        debug!("Loading configuration from file: {}", self.path.display());

        if !self.path.exists() {
            warn!("Configuration file not found: {}", self.path.display());
            return Ok(GatewayConfig::empty());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::FileReadError(self.path.clone(), e.to_string()))?;

        let values: ConfigValues = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", self.path.display(), e)))?;

        let mut config = GatewayConfig::from_values(values, self.source_type());
        config.config_file = Some(self.path.clone());
        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::File
    }
}

/// Environment variable configuration source
///
/// Reads `<PREFIX><FIELD>` in upper case, e.g. `STOMP_HTTP_GATEWAY_LISTEN`.
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    /// Create a new environment source
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn get(&self, name: &str) -> Option<String> {
        env::var(format!("{}{}", self.prefix, name)).ok()
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(value) => value
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue(format!("{}{}", self.prefix, name), e.to_string())),
            None => Ok(None),
        }
    }

    fn addr(&self, name: &str) -> Result<Option<SocketAddr>> {
        match self.get(name) {
            Some(value) => parse_socket_addr(value.trim())
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue(format!("{}{}", self.prefix, name), e.to_string())),
            None => Ok(None),
        }
    }

    fn flag(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            Some(value) => match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Some(true)),
                "0" | "false" | "no" | "off" => Ok(Some(false)),
                other => Err(ConfigError::InvalidValue(
                    format!("{}{}", self.prefix, name),
                    format!("expected a boolean, got '{}'", other),
                )),
            },
            None => Ok(None),
        }
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<GatewayConfig> {
        debug!("Loading configuration from environment with prefix {}", self.prefix);

        let values = ConfigValues {
            listen: self.addr("LISTEN")?,
            stomp_backend: self.addr("STOMP_BACKEND")?,
            http_backend: self.addr("HTTP_BACKEND")?,
            max_line_length: self.parse("MAX_LINE_LENGTH")?,
            detect_timeout_ms: self.parse("DETECT_TIMEOUT_MS")?,
            log_level: self.get("LOG_LEVEL"),
            connection_timeout: self.parse("CONNECTION_TIMEOUT")?,
            buffer_size: self.parse("BUFFER_SIZE")?,
            tcp_nodelay: self.flag("TCP_NODELAY")?,
            tcp_keepalive: self.flag("TCP_KEEPALIVE")?,
            shutdown_timeout: self.parse("SHUTDOWN_TIMEOUT")?,
        };

        Ok(GatewayConfig::from_values(values, self.source_type()))
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Environment
    }
}

/// Command line arguments
///
/// Every option is optional; unset options leave lower priority sources in place.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "stomp-http-gateway", version, about, long_about = None)]
pub struct CliArgs {
    /// Listen address (host:port)
    #[arg(long)]
    pub listen: Option<String>,

    /// STOMP broker address (host:port)
    #[arg(long)]
    pub stomp_backend: Option<String>,

    /// HTTP/WebSocket server address (host:port)
    #[arg(long)]
    pub http_backend: Option<String>,

    /// Maximum bytes of the first line before the connection is dropped
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Milliseconds a client may take to send its first line
    #[arg(long)]
    pub detect_timeout_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Backend connect timeout in seconds
    #[arg(long)]
    pub connection_timeout: Option<u64>,

    /// Socket read buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// TCP_NODELAY on both legs
    #[arg(long)]
    pub tcp_nodelay: Option<bool>,

    /// TCP keepalive on both legs
    #[arg(long)]
    pub tcp_keepalive: Option<bool>,

    /// Seconds to wait for open connections on shutdown
    #[arg(long)]
    pub shutdown_timeout: Option<u64>,

    /// Configuration file path
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}

/// Command line configuration source
pub struct CliSource {
    args: CliArgs,
}

impl CliSource {
    /// Create a command line source from parsed arguments
    pub fn new(args: CliArgs) -> Self {
        Self { args }
    }

    /// Parse raw arguments (program name first)
    pub fn from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        CliArgs::try_parse_from(args)
            .map(Self::new)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl ConfigSource for CliSource {
    fn load(&self) -> Result<GatewayConfig> {
        debug!("Loading configuration from command line");

        let addr = |name: &str, value: &Option<String>| -> Result<Option<SocketAddr>> {
            value
                .as_deref()
                .map(|v| {
                    parse_socket_addr(v)
                        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
                })
                .transpose()
        };

        let values = ConfigValues {
            listen: addr("listen", &self.args.listen)?,
            stomp_backend: addr("stomp_backend", &self.args.stomp_backend)?,
            http_backend: addr("http_backend", &self.args.http_backend)?,
            max_line_length: self.args.max_line_length,
            detect_timeout_ms: self.args.detect_timeout_ms,
            log_level: self.args.log_level.clone(),
            connection_timeout: self.args.connection_timeout,
            buffer_size: self.args.buffer_size,
            tcp_nodelay: self.args.tcp_nodelay,
            tcp_keepalive: self.args.tcp_keepalive,
            shutdown_timeout: self.args.shutdown_timeout,
        };

        let mut config = GatewayConfig::from_values(values, self.source_type());
        config.config_file = self.args.config_file.clone();
        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::CommandLine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let config = FileSource::new("does-not-exist.json").load().unwrap();
        assert_eq!(config, GatewayConfig::empty());
    }

    #[test]
    fn test_cli_source_parses_addresses() {
        let source = CliSource::from_args([
            "stomp-http-gateway",
            "--listen",
            "127.0.0.1:9999",
            "--max-line-length",
            "128",
        ])
        .unwrap();

        let config = source.load().unwrap();
        assert_eq!(config.listen().port(), 9999);
        assert_eq!(config.max_line_length(), 128);
        assert_eq!(config.source("listen"), "command line");
        assert!(config.values.http_backend.is_none());
    }

    #[test]
    fn test_cli_source_rejects_bad_address() {
        let source = CliSource::from_args(["stomp-http-gateway", "--http-backend", "nowhere"]).unwrap();
        assert!(matches!(source.load(), Err(ConfigError::InvalidValue(_, _))));
    }

    #[test]
    fn test_cli_unknown_flag() {
        assert!(CliSource::from_args(["stomp-http-gateway", "--target", "x"]).is_err());
    }
}
