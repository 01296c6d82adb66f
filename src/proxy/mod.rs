//! Gateway service module
//!
//! This module implements the listening side of the gateway: every accepted
//! connection gets a pipeline headed by the protocol detector, is routed to
//! the STOMP or HTTP backend once its first line arrives, and is relayed
//! from then on.
//!
//! The service uses a message-driven architecture; it is controlled through
//! a [`GatewayHandle`] rather than shared state.

mod forwarder;
mod handler;
mod message;
pub mod route;
mod service;

pub use handler::handle_connection;
pub use message::{GatewayHandle, GatewayMessage, GatewayStats};
pub use route::{
    BackendRoute, ForwardStage, ForwardingConfigurator, BACKEND_QUEUE_DEPTH, HTTP_FORWARD_STAGE, STOMP_FORWARD_STAGE,
};
pub use service::GatewayService;
