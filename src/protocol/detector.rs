//! Protocol detector implementation
//!
//! The detector is the first stage of every new connection pipeline. It
//! buffers bytes until the first line is complete, classifies that line,
//! asks the configurator to install the matching protocol stages, replays
//! everything it buffered into them as one chunk and removes itself.
//!
//! ```text
//! AwaitingLine ──line──▶ ClassifiedAndRewired ──replay──▶ Detached
//!      ▲   │
//!      └───┘ no terminator yet
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, error, trace};

use crate::common::{GatewayError, Result};
use crate::pipeline::{PipelineConfigurator, Stage, StageContext};

use super::classifier::{Classifier, ProtocolTag, StompCommandClassifier};
use super::scanner::LineScanner;

/// Default limit on bytes buffered before classification
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// Stage name of the detector in a pipeline
pub const DETECTOR_STAGE: &str = "protocol-detector";

/// Detector lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Buffering until the first line terminator arrives
    AwaitingLine,
    /// Classified and the pipeline rewired; replay pending
    ClassifiedAndRewired,
    /// Removed from the pipeline (terminal)
    Detached,
}

/// One-shot protocol detection stage
pub struct ProtocolDetector {
    scanner: LineScanner,
    state: DetectorState,
    configurator: Arc<dyn PipelineConfigurator>,
    classifier: Arc<dyn Classifier>,
    max_line_length: usize,
    observed: usize,
    decision: Option<ProtocolTag>,
}

impl fmt::Debug for ProtocolDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDetector")
            .field("state", &self.state)
            .field("buffered", &self.scanner.buffered_len())
            .field("max_line_length", &self.max_line_length)
            .field("decision", &self.decision)
            .finish()
    }
}

impl ProtocolDetector {
    /// Create a detector with the default STOMP/HTTP classifier
    ///
    /// # Parameters
    ///
    /// * `configurator` - Installs the stages for the detected protocol
    pub fn new(configurator: Arc<dyn PipelineConfigurator>) -> Self {
        Self {
            scanner: LineScanner::new(),
            state: DetectorState::AwaitingLine,
            configurator,
            classifier: Arc::new(StompCommandClassifier),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            observed: 0,
            decision: None,
        }
    }

    /// Use a different classification policy
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Limit the first line to `max_line_length` bytes, terminator included
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// The classification, once made
    pub fn decision(&self) -> Option<ProtocolTag> {
        self.decision
    }

    fn classify_and_rewire(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        // 1. mark, 2. read and classify the line
        let mark = self.scanner.mark();
        let expected = self.scanner.buffered_len();
        let Some(line) = self.scanner.read_line() else {
            return Ok(());
        };

        if line.len() > self.max_line_length {
            return Err(GatewayError::LineTooLong {
                limit: self.max_line_length,
                buffered: line.len(),
            });
        }

        let tag = self.classifier.classify(line.text());
        debug!("First line {:?} classified as {}", line.text(), tag);

        // 3. rewind and take everything that was buffered at mark time
        self.scanner.reset_to_mark(mark);
        let region = self.scanner.full_buffered_region();
        if region.len() != expected || region.len() != self.observed {
            error!(
                "Replay region mismatch: observed {} bytes, buffered {}, replaying {}",
                self.observed,
                expected,
                region.len()
            );
            return Err(GatewayError::ReplayIntegrity {
                buffered: self.observed,
                replayed: region.len(),
            });
        }

        // 4. rewire
        let pipeline = ctx.pipeline();
        match tag {
            ProtocolTag::Stomp => self.configurator.switch_to_stomp(pipeline)?,
            ProtocolTag::HttpFamily => self.configurator.switch_to_http(pipeline)?,
        }
        self.decision = Some(tag);
        self.state = DetectorState::ClassifiedAndRewired;
        debug!("Pipeline rewired for {}: {:?}", tag, ctx.pipeline().names());

        // 5. replay as a single unit, 6. detach
        trace!("Replaying {} buffered bytes", region.len());
        ctx.fire_read(region);
        ctx.remove_self();
        self.state = DetectorState::Detached;
        Ok(())
    }
}

impl Stage for ProtocolDetector {
    fn name(&self) -> &str {
        DETECTOR_STAGE
    }

    fn handle_read(&mut self, ctx: &mut StageContext<'_>, msg: Bytes) -> Result<()> {
        if self.state != DetectorState::AwaitingLine {
            trace!("Detector already {:?}, passing {} bytes through", self.state, msg.len());
            ctx.fire_read(msg);
            return Ok(());
        }

        self.observed += msg.len();
        self.scanner.feed(&msg);

        if self.scanner.try_extract_line().is_none() {
            if self.scanner.buffered_len() > self.max_line_length {
                return Err(GatewayError::LineTooLong {
                    limit: self.max_line_length,
                    buffered: self.scanner.buffered_len(),
                });
            }
            trace!("No complete line yet, {} bytes buffered", self.scanner.buffered_len());
            return Ok(());
        }

        self.classify_and_rewire(ctx)
    }

    fn handle_close(&mut self) {
        if self.state == DetectorState::AwaitingLine {
            debug!(
                "Connection closed before classification, discarding {} bytes",
                self.scanner.buffered_len()
            );
        }
    }
}
