//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use super::error::{GatewayError, Result};

/// Parse a socket address
///
/// Accepts a literal `ip:port` or a resolvable `host:port`.
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| GatewayError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(GatewayError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Apply TCP socket options to an accepted or connected stream
///
/// # Parameters
///
/// * `stream` - Stream to configure
/// * `nodelay` - Disable Nagle's algorithm
/// * `keepalive` - Enable TCP keepalive probes
pub fn configure_socket(stream: &TcpStream, nodelay: bool, keepalive: bool) -> Result<()> {
    if nodelay {
        stream.set_nodelay(true)?;
    }

    if keepalive {
        let socket_ref = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(60))
            .with_interval(Duration::from_secs(20));

        #[cfg(target_os = "linux")]
        let keepalive = keepalive.with_retries(3);

        socket_ref.set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}
