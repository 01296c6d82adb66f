//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

/// Gateway error type
///
/// Every variant except `Config` is fatal to exactly one connection: the
/// connection is closed and the listener keeps running.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No line terminator arrived before the buffering limit was exceeded
    #[error("First line exceeds {limit} bytes ({buffered} buffered) without a terminator")]
    LineTooLong {
        /// Configured maximum bytes before classification
        limit: usize,
        /// Bytes buffered when the limit tripped
        buffered: usize,
    },

    /// The replayed region does not match what was buffered
    #[error("Replay integrity violation: buffered {buffered} bytes, replayed {replayed}")]
    ReplayIntegrity {
        /// Bytes accumulated at mark time
        buffered: usize,
        /// Bytes actually handed to the new pipeline
        replayed: usize,
    },

    /// Pipeline reconfiguration or stage failure
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// No complete first line within the detection window
    #[error("Protocol detection timed out after {0} ms")]
    DetectionTimeout(u64),

    /// The pipeline was closed
    #[error("Connection closed")]
    Closed,
}

impl GatewayError {
    /// Short, stable label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::LineTooLong { .. } => "line_too_long",
            Self::ReplayIntegrity { .. } => "replay_integrity",
            Self::Pipeline(_) => "pipeline",
            Self::DetectionTimeout(_) => "detection_timeout",
            Self::Closed => "closed",
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `GatewayError`.
pub type Result<T> = std::result::Result<T, GatewayError>;
