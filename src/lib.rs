//! STOMP/HTTP Gateway: one listen port for STOMP and HTTP clients
//!
//! Every accepted connection starts with a one-shot protocol detector at
//! the head of its pipeline. The detector buffers the first line, decides
//! whether the client speaks STOMP or an HTTP dialect (plain HTTP or a
//! WebSocket upgrade), asks a [`PipelineConfigurator`] to install the
//! stages for that protocol, replays every byte it looked at into them, and
//! removes itself.
//!
//! # Main Features
//!
//! - Lossless first-line detection across arbitrary read chunking
//! - Pluggable pipeline configurator and classifier
//! - TCP gateway forwarding each protocol to its own backend
//! - Layered configuration (defaults, JSON file, environment, command line)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stomp_http_gateway::{GatewayService, Result};
//! use stomp_http_gateway::config::GatewayConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Arc::new(GatewayConfig::default());
//!     let service = GatewayService::bind(config).await?;
//!     let (handle, task) = service.start();
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await?;
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```

pub mod common;
pub mod config;
pub mod pipeline;
pub mod protocol;
pub mod proxy;

pub use common::{parse_socket_addr, GatewayError, Result};
pub use pipeline::{Pipeline, PipelineConfigurator, Stage, StageContext, StageId};
pub use protocol::{classify, ProtocolDetector, ProtocolTag};
pub use proxy::{GatewayHandle, GatewayService};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
