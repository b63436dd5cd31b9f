// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Frame processing pipeline infrastructure.
//!
//! [`processor`] holds the stage primitive ([`FrameProcessor`], the
//! [`FrameHandler`] extension point, and the dual-queue plumbing);
//! [`audio`] holds the audio-domain processors (VAD, buffering). This module
//! adds two small general-purpose processors: a passthrough and a collecting
//! sink.

pub mod audio;
pub mod processor;

pub use processor::{
    priority_channel, FrameHandler, FrameProcessor, HandlerContext, PriorityReceiver,
    PrioritySender, ProcessorHandle, DEFAULT_DATA_CAPACITY,
};

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::frames::Frame;

/// A processor that forwards every frame unchanged.
///
/// Error frames are relayed upstream (they must never travel forward);
/// everything else, control frames included, goes downstream.
pub struct PassthroughProcessor;

#[async_trait]
impl FrameHandler for PassthroughProcessor {
    fn name(&self) -> &str {
        "Passthrough"
    }

    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError> {
        match frame {
            Frame::Error(_) => ctx.push_upstream(frame).await,
            other => ctx.forward(other).await,
        }
        Ok(())
    }
}

/// Shared view over the frames a [`CollectorProcessor`] has consumed.
#[derive(Clone, Default)]
pub struct CollectedFrames {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl CollectedFrames {
    /// Number of frames collected so far.
    pub fn len(&self) -> usize {
        self.frames.lock().expect("collector lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame type names, in arrival order.
    pub fn names(&self) -> Vec<String> {
        self.map(|frames| frames.iter().map(|f| f.name().to_string()).collect())
    }

    /// Payloads of the collected text frames, in arrival order.
    pub fn texts(&self) -> Vec<String> {
        self.map(|frames| {
            frames
                .iter()
                .filter_map(|f| match f {
                    Frame::Text(t) => Some(t.text.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    /// Run a closure over the collected frames.
    pub fn map<R>(&self, f: impl FnOnce(&[Frame]) -> R) -> R {
        let guard = self.frames.lock().expect("collector lock poisoned");
        f(&guard)
    }

    fn push(&self, frame: Frame) {
        self.frames
            .lock()
            .expect("collector lock poisoned")
            .push(frame);
    }
}

/// A sink processor that appends every received frame to a shared list.
///
/// Consumes everything, error frames included; as the terminal stage it is
/// where upstream-travelling errors become visible to the application.
pub struct CollectorProcessor {
    collected: CollectedFrames,
}

impl CollectorProcessor {
    pub fn new() -> Self {
        Self {
            collected: CollectedFrames::default(),
        }
    }

    /// Shared view over the collected frames; clone before handing the
    /// processor to the pipeline.
    pub fn collected(&self) -> CollectedFrames {
        self.collected.clone()
    }
}

impl Default for CollectorProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameHandler for CollectorProcessor {
    fn name(&self) -> &str {
        "Collector"
    }

    async fn handle(&mut self, frame: Frame, _ctx: &HandlerContext) -> Result<(), PipelineError> {
        self.collected.push(frame);
        Ok(())
    }
}
