//! Backend routing
//!
//! The gateway's [`PipelineConfigurator`]: when the detector classifies a
//! connection, it installs a [`ForwardStage`] that queues every inbound chunk
//! for the backend of that protocol, and hands the connection handler a
//! [`BackendRoute`] describing where to connect.
//!
//! The queue is bounded at [`BACKEND_QUEUE_DEPTH`] chunks. Whoever reads the
//! client socket waits on [`BackendRoute::capacity`] before each read, so a
//! slow backend slows the client down instead of growing the queue.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use log::debug;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::common::{GatewayError, Result};
use crate::pipeline::{Pipeline, PipelineConfigurator, Stage, StageContext};
use crate::protocol::ProtocolTag;

/// Stage name installed for STOMP connections
pub const STOMP_FORWARD_STAGE: &str = "stomp-forward";

/// Stage name installed for HTTP connections
pub const HTTP_FORWARD_STAGE: &str = "http-forward";

/// Chunks that may wait for the backend writer
pub const BACKEND_QUEUE_DEPTH: usize = 16;

/// Where a classified connection goes, and the bytes bound for it
#[derive(Debug)]
pub struct BackendRoute {
    /// Detected protocol
    pub protocol: ProtocolTag,
    /// Backend address for that protocol
    pub backend: SocketAddr,
    /// Chunks the pipeline forwarded, starting with the replayed first line
    pub ingress: mpsc::Receiver<Bytes>,
    /// Room in the ingress queue; gone once the forward stage is dropped
    pub capacity: mpsc::WeakSender<Bytes>,
}

/// Tail stage queueing chunks for the backend writer
///
/// Never waits: a chunk arriving at a full queue is an error. The reader
/// feeding the pipeline reserves room first.
pub struct ForwardStage {
    name: &'static str,
    tx: mpsc::Sender<Bytes>,
}

impl ForwardStage {
    /// Create a stage feeding `tx`
    pub fn new(name: &'static str, tx: mpsc::Sender<Bytes>) -> Self {
        Self { name, tx }
    }
}

impl Stage for ForwardStage {
    fn name(&self) -> &str {
        self.name
    }

    fn handle_read(&mut self, _ctx: &mut StageContext<'_>, msg: Bytes) -> Result<()> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(msg) => {
                GatewayError::Pipeline(format!("Backend queue full, refusing {} bytes", msg.len()))
            }
            // The writer side only goes away when the backend leg is gone.
            TrySendError::Closed(_) => GatewayError::Closed,
        })
    }
}

/// Configurator routing STOMP and HTTP connections to their backends
///
/// One instance serves exactly one connection.
pub struct ForwardingConfigurator {
    stomp_backend: SocketAddr,
    http_backend: SocketAddr,
    route: Mutex<Option<oneshot::Sender<BackendRoute>>>,
}

impl ForwardingConfigurator {
    /// Create a configurator and the receiver the chosen route arrives on
    pub fn new(stomp_backend: SocketAddr, http_backend: SocketAddr) -> (Self, oneshot::Receiver<BackendRoute>) {
        let (tx, rx) = oneshot::channel();
        let configurator = Self {
            stomp_backend,
            http_backend,
            route: Mutex::new(Some(tx)),
        };
        (configurator, rx)
    }

    fn install(&self, pipeline: &mut Pipeline, protocol: ProtocolTag, backend: SocketAddr, stage: &'static str) -> Result<()> {
        let sender = self
            .route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| GatewayError::Pipeline("Connection already routed".to_string()))?;

        let (tx, ingress) = mpsc::channel(BACKEND_QUEUE_DEPTH);
        let capacity = tx.downgrade();
        pipeline.add_last(ForwardStage::new(stage, tx));
        debug!("Routing {} connection to {}", protocol, backend);

        sender
            .send(BackendRoute {
                protocol,
                backend,
                ingress,
                capacity,
            })
            .map_err(|_| GatewayError::Closed)
    }
}

impl PipelineConfigurator for ForwardingConfigurator {
    fn switch_to_stomp(&self, pipeline: &mut Pipeline) -> Result<()> {
        self.install(pipeline, ProtocolTag::Stomp, self.stomp_backend, STOMP_FORWARD_STAGE)
    }

    fn switch_to_http(&self, pipeline: &mut Pipeline) -> Result<()> {
        self.install(pipeline, ProtocolTag::HttpFamily, self.http_backend, HTTP_FORWARD_STAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::protocol::ProtocolDetector;

    fn addrs() -> (SocketAddr, SocketAddr) {
        ("127.0.0.1:61614".parse().unwrap(), "127.0.0.1:8080".parse().unwrap())
    }

    #[test]
    fn test_stomp_route_carries_replayed_bytes() {
        let (stomp, http) = addrs();
        let (configurator, mut route_rx) = ForwardingConfigurator::new(stomp, http);
        let mut pipeline = Pipeline::new();
        pipeline.add_last(ProtocolDetector::new(Arc::new(configurator)));

        pipeline.fire_read(Bytes::from_static(b"CONN")).unwrap();
        assert!(route_rx.try_recv().is_err());

        pipeline.fire_read(Bytes::from_static(b"ECT\naccept-version:1.2\n")).unwrap();
        let mut route = route_rx.try_recv().unwrap();

        assert_eq!(route.protocol, ProtocolTag::Stomp);
        assert_eq!(route.backend, stomp);
        assert_eq!(pipeline.names(), vec![STOMP_FORWARD_STAGE]);
        assert_eq!(route.ingress.try_recv().unwrap(), Bytes::from_static(b"CONNECT\naccept-version:1.2\n"));

        pipeline.fire_read(Bytes::from_static(b"\n\0")).unwrap();
        assert_eq!(route.ingress.try_recv().unwrap(), Bytes::from_static(b"\n\0"));
    }

    #[test]
    fn test_http_route() {
        let (stomp, http) = addrs();
        let (configurator, mut route_rx) = ForwardingConfigurator::new(stomp, http);
        let mut pipeline = Pipeline::new();
        pipeline.add_last(ProtocolDetector::new(Arc::new(configurator)));

        pipeline.fire_read(Bytes::from_static(b"GET / HTTP/1.1\r\n")).unwrap();
        let route = route_rx.try_recv().unwrap();

        assert_eq!(route.protocol, ProtocolTag::HttpFamily);
        assert_eq!(route.backend, http);
    }

    #[test]
    fn test_second_route_rejected() {
        let (stomp, http) = addrs();
        let (configurator, _route_rx) = ForwardingConfigurator::new(stomp, http);
        let mut pipeline = Pipeline::new();

        configurator.switch_to_http(&mut pipeline).unwrap();
        assert!(matches!(configurator.switch_to_stomp(&mut pipeline), Err(GatewayError::Pipeline(_))));
    }

    #[test]
    fn test_dropped_backend_closes_pipeline() {
        let (stomp, http) = addrs();
        let (configurator, mut route_rx) = ForwardingConfigurator::new(stomp, http);
        let mut pipeline = Pipeline::new();
        pipeline.add_last(ProtocolDetector::new(Arc::new(configurator)));

        pipeline.fire_read(Bytes::from_static(b"STOMP\n")).unwrap();
        drop(route_rx.try_recv().unwrap());

        assert!(matches!(pipeline.fire_read(Bytes::from_static(b"x")), Err(GatewayError::Closed)));
        assert!(pipeline.is_closed());
    }

    #[test]
    fn test_full_queue_is_an_error() {
        let (tx, mut rx) = mpsc::channel(2);
        let mut pipeline = Pipeline::new();
        pipeline.add_last(ForwardStage::new(STOMP_FORWARD_STAGE, tx));

        pipeline.fire_read(Bytes::from_static(b"one")).unwrap();
        pipeline.fire_read(Bytes::from_static(b"two")).unwrap();
        let err = pipeline.fire_read(Bytes::from_static(b"three")).unwrap_err();

        assert!(matches!(err, GatewayError::Pipeline(_)));
        assert!(pipeline.is_closed());
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"two"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_capacity_tracks_the_queue() {
        let (stomp, http) = addrs();
        let (configurator, mut route_rx) = ForwardingConfigurator::new(stomp, http);
        let mut pipeline = Pipeline::new();
        pipeline.add_last(ProtocolDetector::new(Arc::new(configurator)));

        pipeline.fire_read(Bytes::from_static(b"STOMP\n")).unwrap();
        let mut route = route_rx.try_recv().unwrap();

        // The replayed line holds one slot.
        let tx = route.capacity.upgrade().unwrap();
        assert_eq!(tx.capacity(), BACKEND_QUEUE_DEPTH - 1);
        for _ in 1..BACKEND_QUEUE_DEPTH {
            pipeline.fire_read(Bytes::from_static(b"x")).unwrap();
        }
        assert_eq!(tx.capacity(), 0);

        route.ingress.recv().await.unwrap();
        let permit = tx.reserve().await.unwrap();
        drop(permit);
        drop(tx);

        pipeline.close();
        assert!(route.capacity.upgrade().is_none());
    }
}
