// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Pipeline orchestration: building, linking, and driving processor chains.
//!
//! A [`Pipeline`] owns an ordered list of [`FrameProcessor`]s, wires them
//! into one linear chain at construction time, and drives the chain through
//! its start → running → stop lifecycle. Topology is fixed after
//! construction; adding or removing a stage means building a new pipeline.

pub mod context;
pub use context::PipelineContext;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::frames::{EndFrame, Frame, StartFrame};
use crate::processors::FrameProcessor;
use crate::utils::obj_count;

/// An ordered, statically-linked chain of frame processors plus the
/// start/stop lifecycle protocol driving them.
pub struct Pipeline {
    name: String,
    processors: Vec<FrameProcessor>,
    cancel: CancellationToken,
    grace: Duration,
    running: bool,
}

impl Pipeline {
    /// Build a pipeline from already-constructed processors, linking
    /// `processors[i] -> processors[i + 1]` for all `i`.
    pub fn new(processors: Vec<FrameProcessor>) -> Self {
        let name = format!("Pipeline#{}", obj_count("Pipeline"));
        Self::named(name, processors)
    }

    /// Build a pipeline with an explicit name.
    pub fn named(name: impl Into<String>, mut processors: Vec<FrameProcessor>) -> Self {
        let cancel = CancellationToken::new();
        for i in 1..processors.len() {
            let (left, right) = processors.split_at_mut(i);
            left[i - 1].link(&mut right[0]);
        }
        for p in &mut processors {
            p.set_cancel_token(cancel.child_token());
        }
        Self {
            name: name.into(),
            processors,
            cancel,
            grace: Duration::ZERO,
            running: false,
        }
    }

    /// Set a grace period that `stop` waits between enqueueing [`EndFrame`]
    /// and cancelling the processor loops, giving in-flight frames a chance
    /// to drain. The default is zero: a full drain is not guaranteed.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Name of this pipeline.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The processors in chain order.
    pub fn processors(&self) -> &[FrameProcessor] {
        &self.processors
    }

    /// The first processor in the chain, where frames are injected.
    pub fn head(&self) -> Option<&FrameProcessor> {
        self.processors.first()
    }

    /// Whether the pipeline is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Token cancelled when the whole pipeline shuts down. An external task
    /// holding this token can end a blocking [`run`](Pipeline::run).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start every processor's loop, then inject a [`StartFrame`] at the
    /// head of the chain.
    pub async fn start(&mut self) {
        tracing::info!(
            pipeline = %self.name,
            processors = self.processors.len(),
            "starting pipeline"
        );
        for p in &mut self.processors {
            p.start();
        }
        if let Some(head) = self.processors.first() {
            head.enqueue(Frame::Start(StartFrame::new())).await;
        }
        self.running = true;
        tracing::info!(pipeline = %self.name, "pipeline started");
    }

    /// Stop the pipeline: inject an [`EndFrame`] at the head, wait out the
    /// grace period, then cancel and await every processor loop.
    ///
    /// A no-op when the pipeline is not running, so calling `stop` twice has
    /// the same observable effect as calling it once.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        tracing::info!(pipeline = %self.name, "stopping pipeline");

        if let Some(head) = self.processors.first() {
            head.enqueue(Frame::End(EndFrame::new())).await;
        }
        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
        }
        self.cancel.cancel();
        for p in &mut self.processors {
            p.stop().await;
        }
        self.running = false;
        tracing::info!(pipeline = %self.name, "pipeline stopped");
    }

    /// Start the pipeline and wait for every processor loop to exit, which
    /// normally happens only once [`cancel_token`](Pipeline::cancel_token)
    /// is cancelled or `stop` runs from another owner.
    pub async fn run(&mut self) {
        self.start().await;
        for p in &mut self.processors {
            p.join().await;
        }
        self.running = false;
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("processors", &self.processors.len())
            .field("running", &self.running)
            .finish()
    }
}
