//! Pipeline configurator interface
//!
//! The configurator is the only collaborator allowed to install stages for a
//! detected protocol. Both operations only wire stages; they never consume
//! or require bytes. An error is fatal to the connection.

use crate::common::Result;

use super::Pipeline;

/// Installs the downstream stages for a detected protocol
#[cfg_attr(test, mockall::automock)]
pub trait PipelineConfigurator: Send + Sync {
    /// Install STOMP frame oriented stages
    fn switch_to_stomp(&self, pipeline: &mut Pipeline) -> Result<()>;

    /// Install HTTP request/response and WebSocket upgrade capable stages
    fn switch_to_http(&self, pipeline: &mut Pipeline) -> Result<()>;
}
