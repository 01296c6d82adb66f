//! Connection pipeline
//!
//! A [`Pipeline`] is the ordered chain of [`Stage`]s attached to one
//! connection. Inbound chunks enter at the head; a stage hands bytes to the
//! stage after it through its [`StageContext`]. Stages are addressed by a
//! stable [`StageId`], so a stage can remove itself (or be removed) without
//! invalidating the others.
//!
//! Dispatch is queue based. While a stage callback runs, any reconfiguration
//! it performs is applied to the chain immediately, but the bytes it forwards
//! are only delivered after the callback returns. No message is ever
//! processed by a chain that is halfway through being rewired.
//!
//! A stage that leaves the chain during its callback hands its forwarded
//! bytes to whichever stage took its slot, or to the head. If the chain is
//! empty by then, dispatch fails instead of dropping them.

mod configurator;
mod capture;

pub use configurator::PipelineConfigurator;
pub use capture::{CaptureHandle, CaptureStage, RecordingConfigurator};

#[cfg(test)]
pub use configurator::MockPipelineConfigurator;

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use log::{debug, trace, warn};

use crate::common::{GatewayError, Result};

/// Stable identity of a stage within one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A processing unit in a connection pipeline
pub trait Stage: Send {
    /// Human readable name, used for logging and lookups
    fn name(&self) -> &str;

    /// Handle an inbound chunk
    ///
    /// Returning an error closes the pipeline.
    fn handle_read(&mut self, ctx: &mut StageContext<'_>, msg: Bytes) -> Result<()>;

    /// The pipeline is closing; release resources
    fn handle_close(&mut self) {}
}

/// Handle given to a stage while it runs
pub struct StageContext<'a> {
    pipeline: &'a mut Pipeline,
    id: StageId,
    forwarded: Vec<Bytes>,
    remove_requested: bool,
}

impl<'a> StageContext<'a> {
    fn new(pipeline: &'a mut Pipeline, id: StageId) -> Self {
        Self {
            pipeline,
            id,
            forwarded: Vec::new(),
            remove_requested: false,
        }
    }

    /// Identity of the running stage
    pub fn id(&self) -> StageId {
        self.id
    }

    /// The pipeline this stage belongs to, for rewiring
    pub fn pipeline(&mut self) -> &mut Pipeline {
        &mut *self.pipeline
    }

    /// Enqueue bytes for the stage after this one
    ///
    /// The next stage is resolved after the callback returns, so stages
    /// installed during the callback receive the bytes.
    pub fn fire_read(&mut self, msg: Bytes) {
        self.forwarded.push(msg);
    }

    /// Remove the running stage once its callback returns
    pub fn remove_self(&mut self) {
        self.remove_requested = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Head,
    Stage(StageId),
}

struct StageEntry {
    id: StageId,
    name: String,
    // `None` while the stage's own callback is running
    stage: Option<Box<dyn Stage>>,
}

/// Ordered chain of stages for one connection
pub struct Pipeline {
    stages: Vec<StageEntry>,
    queue: VecDeque<(Target, Bytes)>,
    next_id: u64,
    dispatching: bool,
    closed: bool,
    unhandled_bytes: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names())
            .field("queued", &self.queue.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            queue: VecDeque::new(),
            next_id: 0,
            dispatching: false,
            closed: false,
            unhandled_bytes: 0,
        }
    }

    /// Append a stage at the tail
    pub fn add_last<S: Stage + 'static>(&mut self, stage: S) -> StageId {
        let entry = self.entry(Box::new(stage));
        let id = entry.id;
        debug!("Pipeline add_last {} ({})", entry.name, id);
        self.stages.push(entry);
        id
    }

    /// Insert a stage at the head
    pub fn add_first<S: Stage + 'static>(&mut self, stage: S) -> StageId {
        let entry = self.entry(Box::new(stage));
        let id = entry.id;
        debug!("Pipeline add_first {} ({})", entry.name, id);
        self.stages.insert(0, entry);
        id
    }

    /// Insert a stage directly after `after`
    pub fn add_after<S: Stage + 'static>(&mut self, after: StageId, stage: S) -> Result<StageId> {
        let index = self
            .position(after)
            .ok_or_else(|| GatewayError::Pipeline(format!("No stage {} to insert after", after)))?;
        let entry = self.entry(Box::new(stage));
        let id = entry.id;
        debug!("Pipeline add_after {}: {} ({})", after, entry.name, id);
        self.stages.insert(index + 1, entry);
        Ok(id)
    }

    /// Remove a stage by identity
    ///
    /// Returns `false` when no such stage exists. Removing a stage whose
    /// callback is running takes effect when the callback returns.
    pub fn remove(&mut self, id: StageId) -> bool {
        match self.position(id) {
            Some(index) => {
                let entry = self.stages.remove(index);
                debug!("Pipeline remove {} ({})", entry.name, id);
                true
            }
            None => false,
        }
    }

    /// Whether a stage is still part of the chain
    pub fn contains(&self, id: StageId) -> bool {
        self.position(id).is_some()
    }

    /// Identity of the first stage with the given name
    pub fn find(&self, name: &str) -> Option<StageId> {
        self.stages.iter().find(|e| e.name == name).map(|e| e.id)
    }

    /// Stage names from head to tail
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|e| e.name.as_str()).collect()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes that fell off the tail with no stage to receive them
    pub fn unhandled_bytes(&self) -> usize {
        self.unhandled_bytes
    }

    /// Deliver an inbound chunk to the head of the chain
    ///
    /// Runs every stage callback the chunk triggers before returning. Any
    /// stage error closes the pipeline and is returned.
    pub fn fire_read(&mut self, msg: Bytes) -> Result<()> {
        if self.closed {
            return Err(GatewayError::Closed);
        }

        self.queue.push_back((Target::Head, msg));

        // A configurator calling back into the pipeline only enqueues.
        if self.dispatching {
            return Ok(());
        }

        self.dispatching = true;
        let result = self.drain();
        self.dispatching = false;

        if let Err(e) = &result {
            warn!("Pipeline failed, closing: {}", e);
            self.close();
        }
        result
    }

    /// Close the pipeline
    ///
    /// Notifies and drops every stage. Queued bytes are discarded. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.clear();

        for mut entry in self.stages.drain(..) {
            if let Some(stage) = entry.stage.as_mut() {
                trace!("Closing stage {} ({})", entry.name, entry.id);
                stage.handle_close();
            }
        }
        debug!("Pipeline closed");
    }

    fn entry(&mut self, stage: Box<dyn Stage>) -> StageEntry {
        let id = StageId(self.next_id);
        self.next_id += 1;
        StageEntry {
            id,
            name: stage.name().to_string(),
            stage: Some(stage),
        }
    }

    fn position(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|e| e.id == id)
    }

    fn drain(&mut self) -> Result<()> {
        while let Some((target, msg)) = self.queue.pop_front() {
            let index = match target {
                Target::Head if self.stages.is_empty() => {
                    self.discard(msg);
                    continue;
                }
                Target::Head => 0,
                Target::Stage(id) => self.position(id).ok_or_else(|| {
                    GatewayError::Pipeline(format!(
                        "Stage {} removed with {} bytes pending",
                        id,
                        msg.len()
                    ))
                })?,
            };
            self.dispatch(index, msg)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, index: usize, msg: Bytes) -> Result<()> {
        let id = self.stages[index].id;
        let mut stage = self.stages[index]
            .stage
            .take()
            .ok_or_else(|| GatewayError::Pipeline(format!("Stage {} re-entered", id)))?;

        trace!("Dispatching {} bytes to {} ({})", msg.len(), stage.name(), id);

        let mut ctx = StageContext::new(self, id);
        let result = stage.handle_read(&mut ctx, msg);
        let StageContext { forwarded, remove_requested, .. } = ctx;

        // The callback may have moved the stage, or removed it from the chain.
        let next = match self.position(id) {
            Some(current) if !remove_requested => {
                self.stages[current].stage = Some(stage);
                result?;
                self.stages.get(current + 1).map(|e| e.id)
            }
            current => {
                let slot = match current {
                    Some(current) => {
                        let entry = self.stages.remove(current);
                        debug!("Stage {} ({}) removed itself", entry.name, id);
                        current
                    }
                    None => {
                        debug!("Stage {} ({}) removed during its own callback", stage.name(), id);
                        index
                    }
                };
                result?;
                self.heir(id, slot, &forwarded)?
            }
        };

        // Forwarded bytes go before anything queued later, in the order sent.
        for msg in forwarded.into_iter().rev() {
            match next {
                Some(next) => self.queue.push_front((Target::Stage(next), msg)),
                None => self.discard(msg),
            }
        }
        Ok(())
    }

    /// Receiver for the bytes of a stage that has left the chain
    ///
    /// The stage now at the departed stage's slot takes them, or the head
    /// when the slot is past the tail. Bytes with no possible receiver are
    /// an error rather than a discard.
    fn heir(&self, departed: StageId, slot: usize, forwarded: &[Bytes]) -> Result<Option<StageId>> {
        let heir = self.stages.get(slot).or_else(|| self.stages.first()).map(|e| e.id);

        if heir.is_none() && !forwarded.is_empty() {
            let pending: usize = forwarded.iter().map(Bytes::len).sum();
            return Err(GatewayError::Pipeline(format!(
                "Stage {} left the pipeline with {} bytes and no stage to receive them",
                departed, pending
            )));
        }
        Ok(heir)
    }

    fn discard(&mut self, msg: Bytes) {
        debug!("No stage to receive {} bytes, discarding", msg.len());
        self.unhandled_bytes += msg.len();
    }
}
