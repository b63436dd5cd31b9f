// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Common re-exports for building pipelines.
//!
//! ```ignore
//! use avatarflow::prelude::*;
//! ```

pub use crate::error::PipelineError;
pub use crate::frames::{
    AudioData, AudioFrame, AvatarFrame, CancelFrame, EndFrame, ErrorFrame, ExtensionFrame, Frame,
    FrameFields, FrameKind, ImageData, StartFrame, TextFrame, VideoFrame,
};
pub use crate::pipeline::{Pipeline, PipelineContext};
pub use crate::processors::audio::{AudioBufferProcessor, VadProcessor, META_COMPLETE_UTTERANCE};
pub use crate::processors::{
    CollectedFrames, CollectorProcessor, FrameHandler, FrameProcessor, HandlerContext,
    PassthroughProcessor, ProcessorHandle,
};
pub use crate::services::{
    AvatarBackend, AvatarProcessor, ChatMessage, LlmBackend, LlmProcessor, MediaSink, MediaSource,
    ModelRegistry, SharedAvatarBackend, SttBackend, SttProcessor, TransportProcessor, TtsBackend,
    TtsProcessor,
};
