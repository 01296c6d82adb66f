//! Recording stages and configurator
//!
//! In-memory collaborators for exercising a pipeline without sockets: a
//! [`CaptureStage`] keeps every chunk it receives, and a
//! [`RecordingConfigurator`] installs one while counting its invocations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};

use crate::common::Result;

use super::{Pipeline, PipelineConfigurator, Stage, StageContext};

/// Shared view of the chunks a [`CaptureStage`] received
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    chunks: Arc<Mutex<Vec<Bytes>>>,
}

impl CaptureHandle {
    /// Create an empty handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks in arrival order
    pub fn chunks(&self) -> Vec<Bytes> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All received bytes concatenated
    pub fn bytes(&self) -> Bytes {
        let chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
        for chunk in chunks.iter() {
            out.extend_from_slice(chunk);
        }
        out.freeze()
    }

    fn push(&self, chunk: Bytes) {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner).push(chunk);
    }
}

/// Terminal stage that records what reaches it
#[derive(Debug)]
pub struct CaptureStage {
    name: String,
    handle: CaptureHandle,
}

impl CaptureStage {
    /// Create a capture stage reporting into `handle`
    pub fn new(name: impl Into<String>, handle: CaptureHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

impl Stage for CaptureStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle_read(&mut self, _ctx: &mut StageContext<'_>, msg: Bytes) -> Result<()> {
        self.handle.push(msg);
        Ok(())
    }
}

/// Configurator that installs a [`CaptureStage`] per protocol and counts calls
#[derive(Debug, Default)]
pub struct RecordingConfigurator {
    stomp: CaptureHandle,
    http: CaptureHandle,
    stomp_calls: AtomicUsize,
    http_calls: AtomicUsize,
}

impl RecordingConfigurator {
    /// Stage name installed for STOMP
    pub const STOMP_STAGE: &'static str = "stomp-capture";
    /// Stage name installed for HTTP
    pub const HTTP_STAGE: &'static str = "http-capture";

    /// Create a configurator with empty captures
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received by the STOMP stage
    pub fn stomp(&self) -> &CaptureHandle {
        &self.stomp
    }

    /// Bytes received by the HTTP stage
    pub fn http(&self) -> &CaptureHandle {
        &self.http
    }

    /// Number of `switch_to_stomp` calls
    pub fn stomp_calls(&self) -> usize {
        self.stomp_calls.load(Ordering::SeqCst)
    }

    /// Number of `switch_to_http` calls
    pub fn http_calls(&self) -> usize {
        self.http_calls.load(Ordering::SeqCst)
    }

    /// Total configurator invocations
    pub fn total_calls(&self) -> usize {
        self.stomp_calls() + self.http_calls()
    }
}

impl PipelineConfigurator for RecordingConfigurator {
    fn switch_to_stomp(&self, pipeline: &mut Pipeline) -> Result<()> {
        self.stomp_calls.fetch_add(1, Ordering::SeqCst);
        pipeline.add_last(CaptureStage::new(Self::STOMP_STAGE, self.stomp.clone()));
        Ok(())
    }

    fn switch_to_http(&self, pipeline: &mut Pipeline) -> Result<()> {
        self.http_calls.fetch_add(1, Ordering::SeqCst);
        pipeline.add_last(CaptureStage::new(Self::HTTP_STAGE, self.http.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_concatenates() {
        let handle = CaptureHandle::new();
        let mut pipeline = Pipeline::new();
        pipeline.add_last(CaptureStage::new("sink", handle.clone()));

        pipeline.fire_read(Bytes::from_static(b"ab")).unwrap();
        pipeline.fire_read(Bytes::from_static(b"cd")).unwrap();

        assert_eq!(handle.chunks().len(), 2);
        assert_eq!(&handle.bytes()[..], b"abcd");
    }

    #[test]
    fn test_recording_configurator_counts() {
        let configurator = RecordingConfigurator::new();
        let mut pipeline = Pipeline::new();

        configurator.switch_to_http(&mut pipeline).unwrap();
        assert_eq!(configurator.http_calls(), 1);
        assert_eq!(configurator.stomp_calls(), 0);
        assert_eq!(pipeline.names(), vec![RecordingConfigurator::HTTP_STAGE]);
    }
}
