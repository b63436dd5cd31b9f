// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Network-transport adapter.
//!
//! Bridges the chain to a remote peer (e.g. a WebRTC binding): outbound
//! avatar/video/audio frames are delivered to a [`MediaSink`], and an
//! optional [`MediaSource`] is read by a background task that manufactures
//! inbound [`AudioFrame`]s. The adapter always forwards whatever it
//! receives, so a transport can sit at either end of the chain.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::frames::{AudioData, AudioFrame, Frame, ImageData};
use crate::processors::{FrameHandler, HandlerContext};
use crate::utils::now_pts;

/// Outbound half of a transport binding.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Deliver one video image to the remote peer.
    async fn send_video(&mut self, video: &ImageData) -> Result<(), PipelineError>;

    /// Deliver one audio chunk to the remote peer.
    async fn send_audio(&mut self, audio: &AudioData) -> Result<(), PipelineError>;
}

/// Inbound half of a transport binding.
#[async_trait]
pub trait MediaSource: Send + Sync + 'static {
    /// Next inbound audio chunk, or `None` once the remote stream ends.
    async fn recv_audio(&mut self) -> Option<AudioData>;
}

/// Network-transport adapter processor.
///
/// On [`Frame::Start`] the inbound reader task is spawned; on
/// [`Frame::End`]/[`Frame::Cancel`] (or loop cleanup) it is cancelled and
/// awaited. Control frames are forwarded so stages past the transport still
/// observe the lifecycle.
pub struct TransportProcessor {
    sink: Box<dyn MediaSink>,
    source: Option<Box<dyn MediaSource>>,
    reader: Option<JoinHandle<()>>,
    reader_cancel: CancellationToken,
}

impl TransportProcessor {
    pub fn new(sink: impl MediaSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: None,
            reader: None,
            reader_cancel: CancellationToken::new(),
        }
    }

    /// Attach an inbound media source; its audio enters the chain downstream
    /// of this processor once the pipeline starts.
    pub fn with_source(mut self, source: impl MediaSource) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    fn spawn_reader(&mut self, ctx: &HandlerContext) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        let Some(downstream) = ctx.downstream() else {
            tracing::debug!(
                processor = %ctx.name(),
                "no next processor, inbound audio has nowhere to go"
            );
            return;
        };
        let token = ctx.cancel_token().child_token();
        self.reader_cancel = token.clone();
        let name = ctx.name().to_string();

        self.reader = Some(tokio::spawn(async move {
            loop {
                let audio = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    maybe = source.recv_audio() => match maybe {
                        Some(audio) => audio,
                        None => break,
                    },
                };
                let mut frame = AudioFrame::new(audio);
                frame.set_pts(Some(now_pts()));
                // The enqueue races cancellation so a full downstream data
                // queue cannot stall shutdown.
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = downstream.enqueue(Frame::Audio(frame)) => {}
                }
            }
            tracing::debug!(processor = %name, "inbound reader stopped");
        }));
    }

    async fn stop_reader(&mut self) {
        self.reader_cancel.cancel();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

#[async_trait]
impl FrameHandler for TransportProcessor {
    fn name(&self) -> &str {
        "Transport"
    }

    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError> {
        match frame {
            Frame::Start(_) => {
                self.spawn_reader(ctx);
                ctx.forward(frame).await;
            }
            Frame::End(_) | Frame::Cancel(_) => {
                self.stop_reader().await;
                ctx.forward(frame).await;
            }
            Frame::Avatar(ref avatar) => {
                self.sink.send_video(&avatar.video).await?;
                if let Some(audio) = &avatar.audio {
                    self.sink.send_audio(audio).await?;
                }
                ctx.forward(frame).await;
            }
            Frame::Video(ref video) => {
                self.sink.send_video(&video.image).await?;
                ctx.forward(frame).await;
            }
            Frame::Audio(ref audio) => {
                self.sink.send_audio(&audio.audio).await?;
                ctx.forward(frame).await;
            }
            Frame::Error(_) => ctx.push_upstream(frame).await,
            other => ctx.forward(other).await,
        }
        Ok(())
    }

    async fn cleanup(&mut self) {
        self.stop_reader().await;
    }
}
