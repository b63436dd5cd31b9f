// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Speech-to-text adapter: [`AudioFrame`] → [`TextFrame`].

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::frames::{AudioData, Frame, TextFrame};
use crate::processors::audio::META_COMPLETE_UTTERANCE;
use crate::processors::{FrameHandler, HandlerContext};

/// Speech-recognition backend: one opaque transcription call.
#[async_trait]
pub trait SttBackend: Send + Sync {
    /// Transcribe one complete utterance to text.
    async fn transcribe(&mut self, audio: &AudioData) -> Result<String, PipelineError>;
}

/// Speech-to-text adapter processor.
///
/// Only audio frames tagged [`META_COMPLETE_UTTERANCE`] (as emitted by the
/// VAD) reach the backend; interim chunks are dropped. Blank transcripts are
/// dropped too. Transcriptions carry the source frame's timestamp and an
/// `audio_duration` metadata entry for correlation.
pub struct SttProcessor {
    backend: Box<dyn SttBackend>,
}

impl SttProcessor {
    pub fn new(backend: impl SttBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }
}

#[async_trait]
impl FrameHandler for SttProcessor {
    fn name(&self) -> &str {
        "Stt"
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

        if audio.metadata().get(META_COMPLETE_UTTERANCE) != Some(&serde_json::json!(true)) {
            tracing::trace!(processor = %ctx.name(), "skipping partial utterance");
            return Ok(());
        }

        let text = self.backend.transcribe(&audio.audio).await?;
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(processor = %ctx.name(), "empty transcription, skipping");
            return Ok(());
        }
        tracing::info!(processor = %ctx.name(), text, "transcribed");

        let mut out = TextFrame::new(text);
        out.set_pts(audio.pts());
        out.metadata_mut().insert(
            "audio_duration".to_string(),
            serde_json::json!(audio.audio.duration_secs()),
        );
        ctx.forward(Frame::Text(out)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::AudioFrame;
    use crate::processors::processor::test_handle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedStt {
        reply: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SttBackend for FixedStt {
        async fn transcribe(&mut self, _audio: &AudioData) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    fn utterance_frame() -> Frame {
        let mut frame = AudioFrame::from_pcm(vec![0u8; 640], 16000, 1);
        frame
            .metadata_mut()
            .insert(META_COMPLETE_UTTERANCE.to_string(), serde_json::json!(true));
        Frame::Audio(frame)
    }

    #[tokio::test]
    async fn transcribes_complete_utterances() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("stt", Some(next), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stt = SttProcessor::new(FixedStt {
            reply: "hello world",
            calls: calls.clone(),
        });

        stt.handle(utterance_frame(), &ctx).await.unwrap();

        match next_rx.recv().await.unwrap() {
            Frame::Text(t) => {
                assert_eq!(t.text, "hello world");
                assert!(t.metadata().contains_key("audio_duration"));
            }
            other => panic!("expected TextFrame, got {}", other.name()),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_partial_utterances_without_calling_backend() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("stt", Some(next), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stt = SttProcessor::new(FixedStt {
            reply: "never",
            calls: calls.clone(),
        });

        stt.handle(
            Frame::Audio(AudioFrame::from_pcm(vec![0u8; 640], 16000, 1)),
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), next_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn drops_blank_transcriptions() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("stt", Some(next), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stt = SttProcessor::new(FixedStt {
            reply: "   ",
            calls: calls.clone(),
        });

        stt.handle(utterance_frame(), &ctx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), next_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn forwards_non_matching_frames_untouched() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("stt", Some(next), None);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stt = SttProcessor::new(FixedStt {
            reply: "never",
            calls: calls.clone(),
        });

        stt.handle(Frame::Text(TextFrame::new("typed message")), &ctx)
            .await
            .unwrap();

        match next_rx.recv().await.unwrap() {
            Frame::Text(t) => assert_eq!(t.text, "typed message"),
            other => panic!("expected TextFrame, got {}", other.name()),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
