//! Gateway message types
//!
//! This module defines the message types that can be sent to the gateway
//! service. The accept loop owns all of its state; everything else talks
//! to it through a [`GatewayHandle`].

use tokio::sync::{mpsc, oneshot};

use crate::common::{GatewayError, Result};

/// Connection counters reported by the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Connections accepted since start
    pub accepted: u64,
    /// Connections currently being handled
    pub active: usize,
}

/// Messages that can be sent to the gateway service
#[derive(Debug)]
pub enum GatewayMessage {
    /// Report connection counters
    Stats(oneshot::Sender<GatewayStats>),
    /// Stop accepting and drain open connections
    Shutdown,
}

/// Gateway control handle
///
/// Cheap to clone; every clone talks to the same service.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    sender: mpsc::Sender<GatewayMessage>,
}

impl GatewayHandle {
    /// Create a new gateway handle
    pub fn new(sender: mpsc::Sender<GatewayMessage>) -> Self {
        Self { sender }
    }

    /// Send a message to the gateway service
    pub async fn send(&self, message: GatewayMessage) -> Result<()> {
        self.sender.send(message).await.map_err(|_| GatewayError::Closed)
    }

    /// Current connection counters
    pub async fn stats(&self) -> Result<GatewayStats> {
        let (tx, rx) = oneshot::channel();
        self.send(GatewayMessage::Stats(tx)).await?;
        rx.await.map_err(|_| GatewayError::Closed)
    }

    /// Shutdown the gateway service
    pub async fn shutdown(&self) -> Result<()> {
        self.send(GatewayMessage::Shutdown).await
    }
}

/// Create a new gateway message channel
pub fn create_channel() -> (GatewayHandle, mpsc::Receiver<GatewayMessage>) {
    let (tx, rx) = mpsc::channel(100);
    (GatewayHandle::new(tx), rx)
}
