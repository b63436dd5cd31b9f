// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Avatar-render adapter: [`AudioFrame`] → [`AvatarFrame`]s.
//!
//! The renderer consumes audio in fixed-size chunks, one chunk per output
//! video frame at the pipeline's frame rate, so this adapter slices inbound
//! audio into `sample_rate / fps` sample chunks (carrying the remainder over
//! to the next audio frame) and emits one [`AvatarFrame`] per chunk.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::PipelineError;
use crate::frames::{AudioData, AvatarFrame, Frame, ImageData};
use crate::processors::{FrameHandler, HandlerContext};

/// Mean-absolute energy above which a chunk counts as speech.
const SPEAKING_THRESHOLD: f32 = 0.01;

/// Avatar rendering backend (lip-sync inference).
///
/// Synchronous per call; failures surface upstream, there is no retry.
pub trait AvatarBackend: Send {
    /// Generate one video frame from one chunk of audio.
    fn render(&mut self, chunk: &AudioData) -> Result<ImageData, PipelineError>;
}

/// A cached, shareable avatar backend as handed out by [`ModelRegistry`].
pub type SharedAvatarBackend = Arc<Mutex<Box<dyn AvatarBackend>>>;

/// Mean of absolute sample values.
fn mean_abs_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}

/// Avatar-render adapter processor.
///
/// A *generate* stage: one inbound audio frame becomes zero or more
/// [`AvatarFrame`]s, each pairing a rendered image with its audio chunk and
/// a speaking flag computed from the chunk's energy.
pub struct AvatarProcessor {
    backend: SharedAvatarBackend,
    sample_rate: u32,
    fps: u32,
    pending: Vec<u8>,
}

impl AvatarProcessor {
    pub fn new(backend: impl AvatarBackend + 'static) -> Self {
        Self::from_shared(Arc::new(Mutex::new(Box::new(backend))))
    }

    /// Build from a shared backend, typically obtained from a
    /// [`ModelRegistry`].
    pub fn from_shared(backend: SharedAvatarBackend) -> Self {
        Self {
            backend,
            sample_rate: 16000,
            fps: 25,
            pending: Vec::new(),
        }
    }

    /// Output video frame rate; determines the audio chunk size.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    /// Audio chunk size in samples for one video frame.
    pub fn chunk_samples(&self) -> usize {
        (self.sample_rate / self.fps) as usize
    }
}

#[async_trait]
impl FrameHandler for AvatarProcessor {
    fn name(&self) -> &str {
        "Avatar"
    }

    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError> {
        let audio = match frame {
            Frame::Audio(audio) => audio,
            Frame::Error(_) => {
                ctx.push_upstream(frame).await;
                return Ok(());
            }
            other => {
                ctx.forward(other).await;
                return Ok(());
            }
        };

        let num_channels = audio.audio.num_channels.max(1);
        let chunk_bytes = self.chunk_samples() * num_channels as usize * 2;
        let pts = audio.pts();
        self.pending.extend_from_slice(&audio.audio.audio);

        while self.pending.len() >= chunk_bytes {
            let rest = self.pending.split_off(chunk_bytes);
            let chunk_pcm = std::mem::replace(&mut self.pending, rest);
            let chunk = AudioData::new(chunk_pcm, self.sample_rate, num_channels);
            let is_speaking = mean_abs_energy(&chunk.samples_f32()) > SPEAKING_THRESHOLD;

            let video = {
                let mut backend = self.backend.lock().await;
                backend.render(&chunk)?
            };

            let mut out = AvatarFrame::new(video, Some(chunk), is_speaking);
            out.set_pts(pts);
            ctx.forward(Frame::Avatar(out)).await;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Model registry
// ---------------------------------------------------------------------------

/// Load-once cache of avatar backends keyed by model identity.
///
/// Owned by whatever composes the avatar-render adapters (e.g. a session
/// manager serving many pipelines from one loaded model); lookup-or-create
/// runs under the registry lock so a model is loaded exactly once.
#[derive(Default)]
pub struct ModelRegistry {
    models: Mutex<HashMap<String, SharedAvatarBackend>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the backend for `name`, loading it with `loader` on first use.
    pub async fn get_or_load<F>(
        &self,
        name: &str,
        loader: F,
    ) -> Result<SharedAvatarBackend, PipelineError>
    where
        F: FnOnce() -> Result<Box<dyn AvatarBackend>, PipelineError>,
    {
        let mut models = self.models.lock().await;
        if let Some(backend) = models.get(name) {
            tracing::info!(model = name, "reusing cached avatar model");
            return Ok(backend.clone());
        }
        tracing::info!(model = name, "loading avatar model");
        let backend = Arc::new(Mutex::new(loader()?));
        models.insert(name.to_string(), backend.clone());
        Ok(backend)
    }

    /// Whether a model is already loaded.
    pub async fn contains(&self, name: &str) -> bool {
        self.models.lock().await.contains_key(name)
    }

    /// Number of loaded models.
    pub async fn len(&self) -> usize {
        self.models.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
