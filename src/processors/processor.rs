// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Frame processor: the pipeline stage primitive.
//!
//! A [`FrameProcessor`] owns a dual inbound queue (unbounded control channel,
//! bounded data channel), a forward link to the next stage, a backward link to
//! the previous stage, and a processing loop running on its own tokio task.
//! Concrete behavior is supplied through the single [`FrameHandler::handle`]
//! extension point.
//!
//! Queue discipline: the loop always drains the control channel before the
//! data channel (`select! { biased; ... }`), so control frames jump the queue
//! while each class stays FIFO relative to itself. The control channel is
//! unbounded, so control frames are never dropped and never blocked. The data
//! channel is bounded, so a slow consumer suspends its producer's `forward`
//! instead of growing without limit.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::frames::{ErrorFrame, Frame, FrameKind};
use crate::utils::{obj_count, obj_id};

/// Default capacity of a processor's bounded data channel.
pub const DEFAULT_DATA_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Priority channel
// ---------------------------------------------------------------------------

/// Sender half of a priority channel pair.
///
/// Control frames go to the unbounded control channel; data frames go to the
/// bounded data channel.
#[derive(Clone)]
pub struct PrioritySender {
    control_tx: mpsc::UnboundedSender<Frame>,
    data_tx: mpsc::Sender<Frame>,
}

impl PrioritySender {
    /// Send a frame, routing by [`FrameKind`].
    ///
    /// Control sends never block. Data sends suspend while the receiving
    /// processor's data channel is full. Logs and drops the frame if the
    /// receiver is gone (e.g. during shutdown).
    pub async fn send(&self, frame: Frame) {
        match frame.kind() {
            FrameKind::Control => {
                if self.control_tx.send(frame).is_err() {
                    tracing::warn!("PrioritySender: control receiver dropped, frame lost");
                }
            }
            FrameKind::Data => {
                if self.data_tx.send(frame).await.is_err() {
                    tracing::warn!("PrioritySender: data receiver dropped, frame lost");
                }
            }
        }
    }
}

/// Receiver half of a priority channel pair.
pub struct PriorityReceiver {
    control_rx: mpsc::UnboundedReceiver<Frame>,
    data_rx: mpsc::Receiver<Frame>,
}

impl PriorityReceiver {
    /// Receive the next frame, preferring control frames over data frames.
    pub async fn recv(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            Some(frame) = self.control_rx.recv() => Some(frame),
            Some(frame) = self.data_rx.recv() => Some(frame),
            else => None,
        }
    }
}

/// Create a priority channel pair with the given data channel capacity.
pub fn priority_channel(data_capacity: usize) -> (PrioritySender, PriorityReceiver) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (data_tx, data_rx) = mpsc::channel(data_capacity);
    (
        PrioritySender { control_tx, data_tx },
        PriorityReceiver { control_rx, data_rx },
    )
}

// ---------------------------------------------------------------------------
// ProcessorHandle
// ---------------------------------------------------------------------------

/// A cheap-clone handle to a processor's inbound queues.
///
/// Links between processors are held as handles rather than owning
/// references, so the chain has no ownership cycle: the orchestrator owns the
/// processors, and neighbors only hold senders.
#[derive(Clone)]
pub struct ProcessorHandle {
    name: Arc<str>,
    id: u64,
    sender: PrioritySender,
}

impl ProcessorHandle {
    /// Name of the processor behind this handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ID of the processor behind this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Enqueue a frame on the processor behind this handle, routing control
    /// frames to the priority queue.
    pub async fn enqueue(&self, frame: Frame) {
        self.sender.send(frame).await;
    }
}

impl fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HandlerContext
// ---------------------------------------------------------------------------

/// Context handed to [`FrameHandler::handle`] for moving frames on.
///
/// Carries the forward and backward neighbor handles captured when the
/// processor started, plus the cancellation token for cooperative early exit
/// inside long-running handlers.
pub struct HandlerContext {
    name: Arc<str>,
    next: Option<ProcessorHandle>,
    prev: Option<ProcessorHandle>,
    cancel: CancellationToken,
}

impl HandlerContext {
    /// Name of the processor this context belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a frame downstream.
    ///
    /// This is the only sanctioned way to move a frame toward the output. If
    /// no forward link exists the frame is dropped with a debug log.
    pub async fn forward(&self, frame: Frame) {
        match &self.next {
            Some(next) => next.enqueue(frame).await,
            None => {
                tracing::debug!(
                    processor = %self.name,
                    frame = %frame,
                    "no next processor, dropping frame"
                );
            }
        }
    }

    /// Wrap an error and this processor's name into an [`ErrorFrame`] and
    /// send it upstream. With no backward link the error is logged and
    /// dropped; it is never silently swallowed at its origin.
    pub async fn raise_upstream(&self, error: PipelineError) {
        match &self.prev {
            Some(prev) => {
                let frame = ErrorFrame::new(error.to_string(), Some(self.name.to_string()));
                prev.enqueue(Frame::Error(frame)).await;
            }
            None => {
                tracing::error!(
                    processor = %self.name,
                    error = %error,
                    "error with no upstream handler"
                );
            }
        }
    }

    /// Send an already-built frame upstream, used to relay [`ErrorFrame`]s
    /// arriving from downstream further toward the head. With no backward
    /// link the frame is logged as unhandled and dropped.
    pub async fn push_upstream(&self, frame: Frame) {
        match &self.prev {
            Some(prev) => prev.enqueue(frame).await,
            None => {
                tracing::error!(
                    processor = %self.name,
                    frame = %frame,
                    "unhandled upstream frame, dropping"
                );
            }
        }
    }

    /// Clone of the next-hop handle, for background tasks that produce frames
    /// independently of `handle()` (e.g. a transport's inbound reader loop).
    pub fn downstream(&self) -> Option<ProcessorHandle> {
        self.next.clone()
    }

    /// Whether a forward link exists.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Cancellation token for cooperative early exit.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Convenience: check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Build a detached context for exercising a handler directly in tests.
    #[cfg(test)]
    pub(crate) fn for_test(
        name: &str,
        next: Option<ProcessorHandle>,
        prev: Option<ProcessorHandle>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            next,
            prev,
            cancel: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("name", &self.name)
            .field("has_next", &self.next.is_some())
            .field("has_prev", &self.prev.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FrameHandler trait
// ---------------------------------------------------------------------------

/// The single extension point of a frame processor.
///
/// Implementations follow one of four patterns:
///
/// - **transform**: mutate (before first forward) and `ctx.forward()`
/// - **filter**: conditionally forward or drop
/// - **generate**: emit zero or more new frames
/// - **sink**: consume without forwarding
///
/// Returning an `Err` converts the failure into an upstream [`ErrorFrame`];
/// the processor loop then continues with the next queued frame, so a single
/// bad frame never halts the stage.
///
/// Control frames are not auto-forwarded by the loop: each handler decides
/// whether downstream stages should observe `Start`/`End`/`Cancel`.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Human-readable handler type name, used for auto-generated processor
    /// names and error attribution.
    fn name(&self) -> &str;

    /// Process one frame.
    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError>;

    /// Lifecycle: called once when the processor loop starts.
    async fn setup(&mut self) {}

    /// Lifecycle: called once when the processor loop exits.
    async fn cleanup(&mut self) {}
}

// ---------------------------------------------------------------------------
// FrameProcessor
// ---------------------------------------------------------------------------

/// A pipeline stage: dual inbound queues, neighbor links, and a processing
/// loop on its own tokio task.
pub struct FrameProcessor {
    id: u64,
    name: Arc<str>,
    handler: Option<Box<dyn FrameHandler>>,
    sender: PrioritySender,
    receiver: Option<PriorityReceiver>,
    next: Option<ProcessorHandle>,
    prev: Option<ProcessorHandle>,
    cancel: CancellationToken,
    loop_task: Option<JoinHandle<()>>,
}

impl FrameProcessor {
    /// Create a processor around a handler with the default data capacity.
    ///
    /// The processor is auto-named `<handler name>#<instance count>`.
    pub fn new(handler: impl FrameHandler + 'static) -> Self {
        Self::with_capacity(handler, DEFAULT_DATA_CAPACITY)
    }

    /// Create a processor with an explicit bounded data-channel capacity.
    pub fn with_capacity(handler: impl FrameHandler + 'static, data_capacity: usize) -> Self {
        let type_name = handler.name().to_string();
        let name = format!("{}#{}", type_name, obj_count(&type_name));
        let (sender, receiver) = priority_channel(data_capacity.max(1));
        Self {
            id: obj_id(),
            name: Arc::from(name.as_str()),
            handler: Some(Box::new(handler)),
            sender,
            receiver: Some(receiver),
            next: None,
            prev: None,
            cancel: CancellationToken::new(),
            loop_task: None,
        }
    }

    /// Override the auto-generated name. Call before linking so neighbor
    /// handles pick up the final name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into().as_str());
        self
    }

    /// Unique identifier of this processor.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of this processor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A cheap-clone handle to this processor's inbound queues.
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            name: self.name.clone(),
            id: self.id,
            sender: self.sender.clone(),
        }
    }

    /// Link this processor to `next`, symmetrically: sets `self.next` and
    /// `next.prev` together. Re-linking replaces the prior link.
    pub fn link(&mut self, next: &mut FrameProcessor) {
        self.next = Some(next.handle());
        next.prev = Some(self.handle());
        tracing::debug!("{} -> {}", self.name, next.name);
    }

    /// Forward link, if any.
    pub fn next(&self) -> Option<&ProcessorHandle> {
        self.next.as_ref()
    }

    /// Backward link, if any.
    pub fn prev(&self) -> Option<&ProcessorHandle> {
        self.prev.as_ref()
    }

    /// Enqueue a frame on this processor, routing control frames to the
    /// priority queue. Control frames never block; data frames suspend the
    /// caller while the data channel is full.
    pub async fn enqueue(&self, frame: Frame) {
        self.sender.send(frame).await;
    }

    /// Whether the processing loop is currently running.
    pub fn is_running(&self) -> bool {
        self.loop_task
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Replace the cancellation token, parenting this processor to a
    /// pipeline-wide token. Must be called before `start`.
    pub(crate) fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Launch the processing loop on its own tokio task.
    ///
    /// Links are captured at this point; `start` after `stop` is a no-op
    /// (the chain topology and lifecycle are one-shot).
    pub fn start(&mut self) {
        if self.loop_task.is_some() {
            return;
        }
        let Some(handler) = self.handler.take() else {
            tracing::warn!(processor = %self.name, "start after stop ignored");
            return;
        };
        let receiver = self
            .receiver
            .take()
            .expect("receiver taken without handler");
        let ctx = HandlerContext {
            name: self.name.clone(),
            next: self.next.clone(),
            prev: self.prev.clone(),
            cancel: self.cancel.clone(),
        };
        let name = self.name.clone();
        let cancel = self.cancel.clone();
        self.loop_task = Some(tokio::spawn(run_loop(name, handler, receiver, ctx, cancel)));
    }

    /// Signal the loop to terminate and wait for it to exit. Idempotent;
    /// cooperative only (no forced pre-emption).
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.loop_task.take() {
            if let Err(err) = task.await {
                if err.is_panic() {
                    tracing::error!(processor = %self.name, "loop task panicked during stop");
                }
            }
        }
    }

    /// Wait for the processing loop to exit without cancelling it.
    pub async fn join(&mut self) {
        if let Some(task) = self.loop_task.take() {
            let _ = task.await;
        }
    }
}

impl fmt::Debug for FrameProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProcessor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl fmt::Display for FrameProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The processing loop: control frames first, one frame at a time, failures
/// converted to upstream error frames, panics contained.
async fn run_loop(
    name: Arc<str>,
    mut handler: Box<dyn FrameHandler>,
    mut receiver: PriorityReceiver,
    ctx: HandlerContext,
    cancel: CancellationToken,
) {
    handler.setup().await;
    tracing::debug!(processor = %name, "processor loop started");

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            maybe = receiver.recv() => match maybe {
                Some(frame) => frame,
                None => break,
            },
        };

        tracing::trace!(processor = %name, frame = %frame, "dispatching frame");

        let result = AssertUnwindSafe(handler.handle(frame, &ctx))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::error!(processor = %name, error = %error, "handler failed");
                ctx.raise_upstream(error).await;
            }
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                tracing::error!(processor = %name, "handler panicked: {msg}");
                ctx.raise_upstream(PipelineError::processor(name.to_string(), msg))
                    .await;
            }
        }
    }

    handler.cleanup().await;
    tracing::debug!(processor = %name, "processor loop stopped");
}

/// Build a detached handle + receiver pair for tests that need to observe
/// what a handler sends to a neighbor.
#[cfg(test)]
pub(crate) fn test_handle(name: &str) -> (ProcessorHandle, PriorityReceiver) {
    let (sender, receiver) = priority_channel(DEFAULT_DATA_CAPACITY);
    (
        ProcessorHandle {
            name: Arc::from(name),
            id: obj_id(),
            sender,
        },
        receiver,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
