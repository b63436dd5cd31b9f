// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Text-to-speech adapter: [`TextFrame`] → [`AudioFrame`].

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::frames::{AudioData, AudioFrame, Frame};
use crate::processors::{FrameHandler, HandlerContext};

/// Speech-synthesis backend: one opaque synthesis call.
///
/// May be remote and slow; no retry or timeout is imposed here.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize speech audio for the given text.
    async fn synthesize(&mut self, text: &str) -> Result<AudioData, PipelineError>;
}

/// Text-to-speech adapter processor.
///
/// Synthesized audio carries the source frame's timestamp and records the
/// producing text under the `text` metadata key, so downstream stages can
/// correlate audio back to what was said.
pub struct TtsProcessor {
    backend: Box<dyn TtsBackend>,
}

impl TtsProcessor {
    pub fn new(backend: impl TtsBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }
}

#[async_trait]
impl FrameHandler for TtsProcessor {
    fn name(&self) -> &str {
        "Tts"
    }

    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError> {
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Error(_) => {
                ctx.push_upstream(frame).await;
                return Ok(());
            }
            other => {
                ctx.forward(other).await;
                return Ok(());
            }
        };

        let audio = self.backend.synthesize(&text.text).await?;
        tracing::debug!(
            processor = %ctx.name(),
            text = %text.text,
            samples = audio.num_frames,
            "synthesized"
        );

        let mut out = AudioFrame::new(audio);
        out.set_pts(text.pts());
        out.metadata_mut()
            .insert("text".to_string(), serde_json::json!(text.text));
        ctx.forward(Frame::Audio(out)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::TextFrame;
    use crate::processors::processor::test_handle;

    struct SilenceTts;

    #[async_trait]
    impl TtsBackend for SilenceTts {
        async fn synthesize(&mut self, text: &str) -> Result<AudioData, PipelineError> {
            // One sample per character, so tests can check sizing.
            Ok(AudioData::from_samples_f32(
                &vec![0.0f32; text.len()],
                16000,
                1,
            ))
        }
    }

    struct FailingTts;

    #[async_trait]
    impl TtsBackend for FailingTts {
        async fn synthesize(&mut self, _text: &str) -> Result<AudioData, PipelineError> {
            Err(PipelineError::Service("voice not found".into()))
        }
    }

    #[tokio::test]
    async fn synthesizes_and_correlates_metadata() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("tts", Some(next), None);
        let mut tts = TtsProcessor::new(SilenceTts);

        let mut input = TextFrame::new("hello");
        input.set_pts(Some(42));
        tts.handle(Frame::Text(input), &ctx).await.unwrap();

        match next_rx.recv().await.unwrap() {
            Frame::Audio(a) => {
                assert_eq!(a.audio.num_frames, 5);
                assert_eq!(a.pts(), Some(42));
                assert_eq!(a.metadata().get("text"), Some(&serde_json::json!("hello")));
            }
            other => panic!("expected AudioFrame, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn failure_forwards_nothing() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("tts", Some(next), None);
        let mut tts = TtsProcessor::new(FailingTts);

        let result = tts.handle(Frame::Text(TextFrame::new("hi")), &ctx).await;
        assert!(result.is_err());
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), next_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn forwards_audio_frames_untouched() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("tts", Some(next), None);
        let mut tts = TtsProcessor::new(SilenceTts);

        tts.handle(Frame::Audio(AudioFrame::from_pcm(vec![0; 4], 16000, 1)), &ctx)
            .await
            .unwrap();
        assert!(matches!(next_rx.recv().await.unwrap(), Frame::Audio(_)));
    }
}
