//! Connection handler module
//!
//! This module handles individual client connections: detect the protocol
//! from the first line, connect the matching backend, then relay.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};
use metrics::counter;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use crate::common::{configure_socket, GatewayError, Result};
use crate::config::GatewayConfig;
use crate::pipeline::Pipeline;
use crate::protocol::{ProtocolDetector, ProtocolTag};

use super::forwarder::relay;
use super::route::{BackendRoute, ForwardingConfigurator};

/// Handle a single client connection
///
/// # Returns
///
/// Returns the detected protocol once both legs have closed, or the error
/// that ended the connection.
pub async fn handle_connection(client_stream: TcpStream, config: Arc<GatewayConfig>) -> Result<ProtocolTag> {
    configure_socket(&client_stream, config.tcp_nodelay(), config.tcp_keepalive())?;

    let (configurator, route_rx) = ForwardingConfigurator::new(config.stomp_backend(), config.http_backend());
    let mut pipeline = Pipeline::new();
    pipeline.add_last(
        ProtocolDetector::new(Arc::new(configurator)).with_max_line_length(config.max_line_length()),
    );

    let (mut client_reader, client_writer) = client_stream.into_split();
    let route = detect(&mut client_reader, &mut pipeline, route_rx, &config).await?;
    let protocol = route.protocol;

    counter!("gateway.connections.classified", "protocol" => protocol.as_str()).increment(1);
    info!("Detected {} client, forwarding to {}", protocol, route.backend);

    let connect_timeout = Duration::from_secs(config.connection_timeout());
    let backend_stream = timeout(connect_timeout, TcpStream::connect(route.backend))
        .await
        .map_err(|_| GatewayError::Io(io::Error::new(io::ErrorKind::TimedOut, "Backend connection timed out")))??;
    configure_socket(&backend_stream, config.tcp_nodelay(), config.tcp_keepalive())?;

    relay(
        client_reader,
        client_writer,
        pipeline,
        route.ingress,
        route.capacity,
        backend_stream,
        config.buffer_size(),
    )
    .await?;

    Ok(protocol)
}

/// Feed client chunks into the pipeline until the detector picks a route
async fn detect(
    client_reader: &mut OwnedReadHalf,
    pipeline: &mut Pipeline,
    mut route_rx: tokio::sync::oneshot::Receiver<BackendRoute>,
    config: &GatewayConfig,
) -> Result<BackendRoute> {
    let deadline = Instant::now() + config.detect_timeout();
    let mut buffer = vec![0u8; config.buffer_size()];

    loop {
        let n = match timeout_at(deadline, client_reader.read(&mut buffer)).await {
            Ok(read) => read?,
            Err(_) => {
                pipeline.close();
                return Err(GatewayError::DetectionTimeout(config.detect_timeout_ms()));
            }
        };

        if n == 0 {
            debug!("Client closed before sending a complete first line");
            pipeline.close();
            return Err(GatewayError::Closed);
        }

        pipeline.fire_read(Bytes::copy_from_slice(&buffer[..n]))?;

        if let Ok(route) = route_rx.try_recv() {
            return Ok(route);
        }
    }
}
