// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Core frame definitions for the avatarflow pipeline.
//!
//! All data flows as [`Frame`] values through a chain of frame processors.
//! Frames represent data units (text, audio, video, avatar composites) and
//! control signals. Data frames flow **downstream** (input to output); error
//! frames flow **upstream** (output to input).
//!
//! # Frame classes
//!
//! - **Control frames** ([`FrameKind::Control`]): lifecycle signals and
//!   errors. Always dequeued before any waiting data frame.
//! - **Data frames** ([`FrameKind::Data`]): ordered content.
//!
//! Frames are treated as immutable once they leave their producing processor;
//! a pure in-place transform is permitted only before a frame is first
//! forwarded.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::obj_id;

// ---------------------------------------------------------------------------
// Presentation timestamp helpers
// ---------------------------------------------------------------------------

/// Format a presentation timestamp (nanoseconds) to a human-readable string.
pub fn format_pts(pts: Option<u64>) -> String {
    match pts {
        Some(ns) => {
            let secs = ns / 1_000_000_000;
            let frac = ns % 1_000_000_000;
            format!("{}.{:09}", secs, frac)
        }
        None => "None".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Frame class enum
// ---------------------------------------------------------------------------

/// Classifies a frame for queue routing and scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// Control frame: lifecycle signal or error, jumps the data queue.
    Control,
    /// Data frame: ordered content, FIFO relative to other data frames.
    Data,
}

// ---------------------------------------------------------------------------
// Embedded data structs (not frames themselves)
// ---------------------------------------------------------------------------

/// Raw audio data embedded in audio-bearing frame types.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// Raw audio bytes in PCM format (16-bit signed little-endian).
    pub audio: Vec<u8>,
    /// Audio sample rate in Hz (e.g. 16000, 24000).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo).
    pub num_channels: u32,
    /// Number of audio frames (computed from audio length).
    pub num_frames: u32,
}

impl AudioData {
    /// Create new audio data, computing `num_frames` automatically.
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        let num_frames = if num_channels > 0 {
            let bytes_per_frame = (num_channels as usize).saturating_mul(2);
            (audio.len() / bytes_per_frame).min(u32::MAX as usize) as u32
        } else {
            0
        };
        Self {
            audio,
            sample_rate,
            num_channels,
            num_frames,
        }
    }

    /// Encode normalized f32 samples (`-1.0..=1.0`) as PCM16LE audio data.
    pub fn from_samples_f32(samples: &[f32], sample_rate: u32, num_channels: u32) -> Self {
        let mut audio = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            audio.extend_from_slice(&v.to_le_bytes());
        }
        Self::new(audio, sample_rate, num_channels)
    }

    /// Decode the PCM16LE payload to normalized f32 samples.
    pub fn samples_f32(&self) -> Vec<f32> {
        self.audio
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect()
    }

    /// Duration of this audio payload in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames as f64 / self.sample_rate as f64
    }
}

/// Raw image data embedded in video-bearing frame types.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Raw image bytes.
    pub image: Vec<u8>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Pixel format (e.g. "bgr24", "rgb24").
    pub format: Option<String>,
}

impl ImageData {
    pub fn new(image: Vec<u8>, width: u32, height: u32, format: Option<String>) -> Self {
        Self {
            image,
            width,
            height,
            format,
        }
    }
}

// ---------------------------------------------------------------------------
// Common base fields for all frames
// ---------------------------------------------------------------------------

/// Returns a reference to a static empty metadata map.
fn empty_metadata() -> &'static HashMap<String, serde_json::Value> {
    use std::sync::OnceLock;
    static EMPTY: OnceLock<HashMap<String, serde_json::Value>> = OnceLock::new();
    EMPTY.get_or_init(HashMap::new)
}

/// Common fields stored in every frame struct.
///
/// The metadata bag is lazily allocated so that the common case (no
/// annotations) costs a single pointer.
#[derive(Debug, Clone)]
pub struct FrameFields {
    /// Process-unique frame identifier.
    pub id: u64,
    /// Presentation timestamp in nanoseconds, or `None`.
    pub pts: Option<u64>,
    /// Arbitrary key/value metadata for cross-cutting annotations.
    pub metadata: Option<Box<HashMap<String, serde_json::Value>>>,
}

impl FrameFields {
    /// Create a new `FrameFields` with a unique ID.
    pub fn new() -> Self {
        Self {
            id: obj_id(),
            pts: None,
            metadata: None,
        }
    }
}

impl Default for FrameFields {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Macros for reducing frame boilerplate
// ---------------------------------------------------------------------------

/// Implements the common field accessors delegating to `self.fields`.
macro_rules! impl_fields_accessors {
    ($name:ident) => {
        impl $name {
            /// Presentation timestamp in nanoseconds, or `None`.
            pub fn pts(&self) -> Option<u64> {
                self.fields.pts
            }
            /// Set the presentation timestamp.
            pub fn set_pts(&mut self, pts: Option<u64>) {
                self.fields.pts = pts;
            }
            /// Arbitrary key/value metadata.
            pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
                self.fields
                    .metadata
                    .as_deref()
                    .unwrap_or_else(|| empty_metadata())
            }
            /// Mutable access to metadata, allocating the bag on first use.
            pub fn metadata_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
                self.fields
                    .metadata
                    .get_or_insert_with(|| Box::new(HashMap::new()))
            }
        }
    };
}

/// Default Display implementation showing just the frame name.
macro_rules! impl_frame_display_simple {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", stringify!($name))
            }
        }
    };
}

/// Declares a payload-free control frame struct with `new()`/`Default`.
macro_rules! declare_control_frame {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            pub fields: FrameFields,
        }
        impl $name {
            pub fn new() -> Self {
                Self { fields: FrameFields::new() }
            }
        }
        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
        impl_fields_accessors!($name);
        impl_frame_display_simple!($name);
    };
}

// =========================================================================
// CONTROL FRAMES
// =========================================================================

declare_control_frame!(
    /// Initial frame injected at the head of a pipeline to start processing.
    StartFrame
);

declare_control_frame!(
    /// Frame signalling graceful pipeline shutdown.
    EndFrame
);

declare_control_frame!(
    /// Frame requesting cancellation of in-progress work.
    CancelFrame
);

/// Error notification frame.
///
/// Notifies upstream that an error occurred downstream. Error frames flow
/// backward (toward `prev`) only, never forward.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub fields: FrameFields,
    /// Description of the error.
    pub error: String,
    /// Name of the processor that raised the error.
    pub source: Option<String>,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>, source: Option<String>) -> Self {
        Self {
            fields: FrameFields::new(),
            error: error.into(),
            source,
        }
    }
}

impl_fields_accessors!(ErrorFrame);

impl fmt::Display for ErrorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorFrame(error: {}, source: {:?})", self.error, self.source)
    }
}

// =========================================================================
// DATA FRAMES
// =========================================================================

/// Text data frame.
///
/// Produced by speech recognition and language-model adapters, consumed by
/// language-model and speech-synthesis adapters.
#[derive(Debug, Clone)]
pub struct TextFrame {
    pub fields: FrameFields,
    /// The text content.
    pub text: String,
    /// Identifier of the speaker who produced this text, if known.
    pub user_id: Option<String>,
    /// Language tag (BCP-47-ish, e.g. "en").
    pub language: String,
}

impl TextFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fields: FrameFields::new(),
            text: text.into(),
            user_id: None,
            language: "en".to_string(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl_fields_accessors!(TextFrame);

impl fmt::Display for TextFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TextFrame(pts: {}, text: [{}])",
            format_pts(self.fields.pts),
            self.text
        )
    }
}

/// Raw PCM audio frame.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub fields: FrameFields,
    /// Raw audio data.
    pub audio: AudioData,
}

impl AudioFrame {
    pub fn new(audio: AudioData) -> Self {
        Self {
            fields: FrameFields::new(),
            audio,
        }
    }

    /// Build an audio frame directly from PCM16LE bytes.
    pub fn from_pcm(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        Self::new(AudioData::new(audio, sample_rate, num_channels))
    }
}

impl_fields_accessors!(AudioFrame);

impl fmt::Display for AudioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioFrame(pts: {}, size: {}, frames: {}, sample_rate: {}, channels: {})",
            format_pts(self.fields.pts),
            self.audio.audio.len(),
            self.audio.num_frames,
            self.audio.sample_rate,
            self.audio.num_channels
        )
    }
}

/// A single image frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub fields: FrameFields,
    /// Raw image data.
    pub image: ImageData,
}

impl VideoFrame {
    pub fn new(image: ImageData) -> Self {
        Self {
            fields: FrameFields::new(),
            image,
        }
    }
}

impl_fields_accessors!(VideoFrame);

impl fmt::Display for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VideoFrame(pts: {}, size: {}x{}, format: {:?})",
            format_pts(self.fields.pts),
            self.image.width,
            self.image.height,
            self.image.format
        )
    }
}

/// Generated avatar frame: one video image with optionally synchronized
/// audio and a speaking-state flag.
///
/// The terminal artifact of the avatar-render adapter.
#[derive(Debug, Clone)]
pub struct AvatarFrame {
    pub fields: FrameFields,
    /// The rendered talking-head image.
    pub video: ImageData,
    /// Audio chunk synchronized with the video image, if any.
    pub audio: Option<AudioData>,
    /// Whether the avatar is speaking in this frame.
    pub is_speaking: bool,
}

impl AvatarFrame {
    pub fn new(video: ImageData, audio: Option<AudioData>, is_speaking: bool) -> Self {
        Self {
            fields: FrameFields::new(),
            video,
            audio,
            is_speaking,
        }
    }
}

impl_fields_accessors!(AvatarFrame);

impl fmt::Display for AvatarFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AvatarFrame(pts: {}, size: {}x{}, audio: {}, speaking: {})",
            format_pts(self.fields.pts),
            self.video.width,
            self.video.height,
            self.audio.is_some(),
            self.is_speaking
        )
    }
}

// ---------------------------------------------------------------------------
// Extension frame for adapter extensibility
// ---------------------------------------------------------------------------

/// Extension frame for types not known to the core enum.
///
/// An escape hatch for adapters to define custom frames without modifying
/// [`Frame`]. The extension declares its own [`FrameKind`] so queue routing
/// still works.
pub struct ExtensionFrame {
    pub fields: FrameFields,
    /// The custom frame payload.
    pub data: Box<dyn std::any::Any + Send + Sync>,
    /// A static name for the extension frame type.
    pub type_name: &'static str,
    /// Queue-routing class declared by the extension.
    pub kind: FrameKind,
}

impl ExtensionFrame {
    pub fn new<T: std::any::Any + Send + Sync>(
        type_name: &'static str,
        kind: FrameKind,
        data: T,
    ) -> Self {
        Self {
            fields: FrameFields::new(),
            data: Box::new(data),
            type_name,
            kind,
        }
    }

    /// Borrow the payload as `T`, if it is one.
    pub fn payload<T: std::any::Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Mutably borrow the payload as `T`, if it is one.
    pub fn payload_mut<T: std::any::Any>(&mut self) -> Option<&mut T> {
        self.data.downcast_mut::<T>()
    }
}

impl_fields_accessors!(ExtensionFrame);

impl fmt::Debug for ExtensionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionFrame")
            .field("type_name", &self.type_name)
            .field("id", &self.fields.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ExtensionFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionFrame({})", self.type_name)
    }
}

// ---------------------------------------------------------------------------
// The Frame enum
// ---------------------------------------------------------------------------

/// Concrete enum of all frame types in the pipeline.
///
/// A closed set with exhaustive pattern matching; adapters extend it through
/// [`ExtensionFrame`].
#[derive(Debug)]
pub enum Frame {
    /// Text data.
    Text(TextFrame),
    /// Raw PCM audio.
    Audio(AudioFrame),
    /// A single image.
    Video(VideoFrame),
    /// Rendered avatar composite.
    Avatar(AvatarFrame),
    /// Pipeline start signal.
    Start(StartFrame),
    /// Graceful pipeline shutdown signal.
    End(EndFrame),
    /// Cancellation request.
    Cancel(CancelFrame),
    /// Error notification (flows upstream).
    Error(ErrorFrame),
    /// Adapter-defined frame type.
    Extension(ExtensionFrame),
}

macro_rules! for_each_variant {
    ($self:expr, $f:ident => $body:expr) => {
        match $self {
            Frame::Text($f) => $body,
            Frame::Audio($f) => $body,
            Frame::Video($f) => $body,
            Frame::Avatar($f) => $body,
            Frame::Start($f) => $body,
            Frame::End($f) => $body,
            Frame::Cancel($f) => $body,
            Frame::Error($f) => $body,
            Frame::Extension($f) => $body,
        }
    };
}

impl Frame {
    fn fields(&self) -> &FrameFields {
        for_each_variant!(self, f => &f.fields)
    }

    fn fields_mut(&mut self) -> &mut FrameFields {
        for_each_variant!(self, f => &mut f.fields)
    }

    /// Process-unique frame identifier.
    pub fn id(&self) -> u64 {
        self.fields().id
    }

    /// Human-readable frame type name.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Text(_) => "TextFrame",
            Frame::Audio(_) => "AudioFrame",
            Frame::Video(_) => "VideoFrame",
            Frame::Avatar(_) => "AvatarFrame",
            Frame::Start(_) => "StartFrame",
            Frame::End(_) => "EndFrame",
            Frame::Cancel(_) => "CancelFrame",
            Frame::Error(_) => "ErrorFrame",
            Frame::Extension(e) => e.type_name,
        }
    }

    /// Queue-routing class of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Start(_) | Frame::End(_) | Frame::Cancel(_) | Frame::Error(_) => {
                FrameKind::Control
            }
            Frame::Extension(e) => e.kind,
            _ => FrameKind::Data,
        }
    }

    /// Returns `true` for control frames.
    pub fn is_control(&self) -> bool {
        self.kind() == FrameKind::Control
    }

    /// Presentation timestamp in nanoseconds, or `None`.
    pub fn pts(&self) -> Option<u64> {
        self.fields().pts
    }

    /// Set the presentation timestamp.
    pub fn set_pts(&mut self, pts: Option<u64>) {
        self.fields_mut().pts = pts;
    }

    /// Arbitrary key/value metadata.
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        self.fields()
            .metadata
            .as_deref()
            .unwrap_or_else(|| empty_metadata())
    }

    /// Mutable access to metadata, allocating the bag on first use.
    pub fn metadata_mut(&mut self) -> &mut HashMap<String, serde_json::Value> {
        self.fields_mut()
            .metadata
            .get_or_insert_with(|| Box::new(HashMap::new()))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for_each_variant!(self, frame => fmt::Display::fmt(frame, f))
    }
}

impl From<TextFrame> for Frame {
    fn from(f: TextFrame) -> Self {
        Frame::Text(f)
    }
}

impl From<AudioFrame> for Frame {
    fn from(f: AudioFrame) -> Self {
        Frame::Audio(f)
    }
}

impl From<VideoFrame> for Frame {
    fn from(f: VideoFrame) -> Self {
        Frame::Video(f)
    }
}

impl From<AvatarFrame> for Frame {
    fn from(f: AvatarFrame) -> Self {
        Frame::Avatar(f)
    }
}

impl From<StartFrame> for Frame {
    fn from(f: StartFrame) -> Self {
        Frame::Start(f)
    }
}

impl From<EndFrame> for Frame {
    fn from(f: EndFrame) -> Self {
        Frame::End(f)
    }
}

impl From<CancelFrame> for Frame {
    fn from(f: CancelFrame) -> Self {
        Frame::Cancel(f)
    }
}

impl From<ErrorFrame> for Frame {
    fn from(f: ErrorFrame) -> Self {
        Frame::Error(f)
    }
}

impl From<ExtensionFrame> for Frame {
    fn from(f: ExtensionFrame) -> Self {
        Frame::Extension(f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
