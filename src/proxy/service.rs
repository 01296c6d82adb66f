//! Gateway service implementation
//!
//! This module implements the accept loop using a message-driven
//! architecture: the loop owns the listener and the connection tasks, and is
//! controlled through a [`GatewayHandle`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use metrics::{counter, gauge};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::common::{GatewayError, Result};
use crate::config::GatewayConfig;

use super::handler::handle_connection;
use super::message::{create_channel, GatewayHandle, GatewayMessage, GatewayStats};

/// Accept loop state
struct ServiceState {
    config: Arc<GatewayConfig>,
    tasks: JoinSet<()>,
    accepted: u64,
    active: usize,
}

impl ServiceState {
    fn stats(&self) -> GatewayStats {
        GatewayStats {
            accepted: self.accepted,
            active: self.active,
        }
    }

    fn spawn_connection(&mut self, client_stream: TcpStream, client_addr: SocketAddr) {
        self.accepted += 1;
        self.active += 1;
        counter!("gateway.connections.accepted").increment(1);
        gauge!("gateway.connections.active").set(self.active as f64);

        let config = Arc::clone(&self.config);
        self.tasks.spawn(async move {
            let start_time = Instant::now();
            debug!("Starting to handle connection from {}", client_addr);

            match handle_connection(client_stream, config).await {
                Ok(protocol) => {
                    debug!(
                        "{} connection from {} finished after {} ms",
                        protocol,
                        client_addr,
                        start_time.elapsed().as_millis()
                    );
                }
                Err(e) => {
                    counter!("gateway.connections.rejected", "reason" => e.reason()).increment(1);
                    match e {
                        GatewayError::Closed => debug!("Connection from {} closed: {}", client_addr, e),
                        _ => warn!("Connection from {} failed: {}", client_addr, e),
                    }
                }
            }
        });
    }

    fn task_finished(&mut self, result: std::result::Result<(), tokio::task::JoinError>) {
        self.active = self.active.saturating_sub(1);
        gauge!("gateway.connections.active").set(self.active as f64);

        if let Err(e) = result {
            error!("Task error: {}", e);
        }
    }
}

/// Gateway service
///
/// Binds on construction so callers (and tests binding port 0) can learn
/// the real listen address before the loop starts.
pub struct GatewayService {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<GatewayConfig>,
}

impl GatewayService {
    /// Bind the listen address from `config`
    ///
    /// # Errors
    ///
    /// Returns an error if it cannot bind to the listen address.
    pub async fn bind(config: Arc<GatewayConfig>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen()).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the accept loop on the runtime
    ///
    /// The loop stops when [`GatewayHandle::shutdown`] is called or every
    /// handle has been dropped.
    pub fn start(self) -> (GatewayHandle, JoinHandle<Result<()>>) {
        let (handle, rx) = create_channel();

        let task = tokio::spawn(async move {
            let result = self.run_service(rx).await;
            if let Err(e) = &result {
                error!("Gateway service error: {}", e);
            }
            result
        });

        (handle, task)
    }

    async fn run_service(self, mut rx: mpsc::Receiver<GatewayMessage>) -> Result<()> {
        info!("Gateway service started, listening on {}", self.local_addr);
        info!(
            "STOMP backend {}, HTTP backend {}",
            self.config.stomp_backend(),
            self.config.http_backend()
        );

        let shutdown_timeout = Duration::from_secs(self.config.shutdown_timeout());
        let listener = self.listener;
        let mut state = ServiceState {
            config: self.config,
            tasks: JoinSet::new(),
            accepted: 0,
            active: 0,
        };

        loop {
            select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((client_stream, client_addr)) => {
                            info!("Accepted connection from {}", client_addr);
                            state.spawn_connection(client_stream, client_addr);
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }

                message = rx.recv() => {
                    match message {
                        Some(GatewayMessage::Stats(reply)) => {
                            let _ = reply.send(state.stats());
                        }
                        Some(GatewayMessage::Shutdown) => {
                            info!("Received shutdown message");
                            break;
                        }
                        None => {
                            info!("All gateway handles dropped, shutting down");
                            break;
                        }
                    }
                }

                Some(result) = state.tasks.join_next() => {
                    state.task_finished(result);
                }
            }
        }

        drop(listener);

        info!("Waiting for {} connections to complete...", state.active);
        let drain = async {
            while let Some(result) = state.tasks.join_next().await {
                state.task_finished(result);
            }
        };

        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!("Shutdown timeout reached, {} connections still active", state.active);
            state.tasks.abort_all();
        }

        info!("Gateway service shutdown complete");
        Ok(())
    }
}
