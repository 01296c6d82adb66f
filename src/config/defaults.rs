//! Default configuration values
//!
//! Single source of truth for defaults.

use std::net::SocketAddr;
use std::str::FromStr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "STOMP_HTTP_GATEWAY_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default listen address as string (the IANA STOMP port)
pub const LISTEN_STR: &str = "0.0.0.0:61613";

/// Default STOMP broker address as string
pub const STOMP_BACKEND_STR: &str = "127.0.0.1:61614";

/// Default HTTP/WebSocket server address as string
pub const HTTP_BACKEND_STR: &str = "127.0.0.1:8080";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Valid log level names
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Default listen address
pub fn listen() -> SocketAddr {
    SocketAddr::from_str(LISTEN_STR).unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 61613)))
}

/// Default STOMP backend address
pub fn stomp_backend() -> SocketAddr {
    SocketAddr::from_str(STOMP_BACKEND_STR).unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 61614)))
}

/// Default HTTP backend address
pub fn http_backend() -> SocketAddr {
    SocketAddr::from_str(HTTP_BACKEND_STR).unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080)))
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default first-line limit (8KB)
pub fn max_line_length() -> usize {
    crate::protocol::DEFAULT_MAX_LINE_LENGTH
}

/// Default detection window in milliseconds
pub fn detect_timeout_ms() -> u64 {
    5000
}

/// Default backend connect timeout in seconds
pub fn connection_timeout() -> u64 {
    30
}

/// Default read buffer size (8KB)
pub fn buffer_size() -> usize {
    8192
}

/// Default TCP_NODELAY setting
pub fn tcp_nodelay() -> bool {
    true
}

/// Default TCP keepalive setting
pub fn tcp_keepalive() -> bool {
    true
}

/// Default time to wait for connections on shutdown, in seconds
pub fn shutdown_timeout() -> u64 {
    30
}
