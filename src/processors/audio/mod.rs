// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Audio-domain processors: voice activity detection and buffering.
//!
//! [`VadProcessor`] turns a stream of microphone chunks into complete
//! utterances for the speech-recognition adapter; [`AudioBufferProcessor`]
//! coalesces small chunks into fixed-size blocks.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::frames::{AudioFrame, Frame};
use crate::processors::{FrameHandler, HandlerContext};

/// Metadata key marking an audio frame as one complete utterance.
pub const META_COMPLETE_UTTERANCE: &str = "is_complete_utterance";

/// Root-mean-square energy of normalized samples.
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Voice activity detection by energy threshold.
///
/// Buffers audio while the user is speaking and, once the configured silence
/// duration has elapsed, emits a single concatenated [`AudioFrame`] tagged
/// with [`META_COMPLETE_UTTERANCE`]. Interim audio chunks are consumed, not
/// forwarded; all non-audio frames (control included) pass through.
pub struct VadProcessor {
    threshold: f32,
    max_silence_chunks: usize,
    is_speaking: bool,
    silence_chunks: usize,
    buffer: Vec<u8>,
    sample_rate: u32,
    num_channels: u32,
}

impl VadProcessor {
    /// `threshold` is RMS energy over normalized samples; `silence_duration`
    /// is how long the user must stay quiet before the utterance is closed,
    /// assuming ~20ms inbound chunks.
    pub fn new(threshold: f32, silence_duration_secs: f32) -> Self {
        Self {
            threshold,
            max_silence_chunks: (silence_duration_secs * 50.0) as usize,
            is_speaking: false,
            silence_chunks: 0,
            buffer: Vec::new(),
            sample_rate: 16000,
            num_channels: 1,
        }
    }

    fn finish_utterance(&mut self) -> AudioFrame {
        let audio = std::mem::take(&mut self.buffer);
        self.is_speaking = false;
        self.silence_chunks = 0;
        let mut frame = AudioFrame::from_pcm(audio, self.sample_rate, self.num_channels);
        frame
            .metadata_mut()
            .insert(META_COMPLETE_UTTERANCE.to_string(), serde_json::json!(true));
        frame
    }
}

impl Default for VadProcessor {
    fn default() -> Self {
        Self::new(0.5, 0.8)
    }
}

#[async_trait]
impl FrameHandler for VadProcessor {
    fn name(&self) -> &str {
        "Vad"
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

        let energy = rms_energy(&audio.audio.samples_f32());

        if energy > self.threshold {
            if !self.is_speaking {
                tracing::debug!(processor = %ctx.name(), "speech started");
                self.is_speaking = true;
                self.buffer.clear();
            }
            self.sample_rate = audio.audio.sample_rate;
            self.num_channels = audio.audio.num_channels;
            self.buffer.extend_from_slice(&audio.audio.audio);
            self.silence_chunks = 0;
        } else if self.is_speaking {
            self.silence_chunks += 1;
            if self.silence_chunks >= self.max_silence_chunks {
                tracing::debug!(
                    processor = %ctx.name(),
                    bytes = self.buffer.len(),
                    "speech ended"
                );
                let utterance = self.finish_utterance();
                ctx.forward(Frame::Audio(utterance)).await;
            }
        }

        Ok(())
    }
}

/// Coalesces audio frames into blocks of at least `target_bytes`.
///
/// Non-audio frames pass through untouched.
pub struct AudioBufferProcessor {
    target_bytes: usize,
    buffer: Vec<u8>,
    sample_rate: u32,
    num_channels: u32,
    last_pts: Option<u64>,
}

impl AudioBufferProcessor {
    pub fn new(target_bytes: usize) -> Self {
        Self {
            target_bytes,
            buffer: Vec::new(),
            sample_rate: 16000,
            num_channels: 1,
            last_pts: None,
        }
    }
}

impl Default for AudioBufferProcessor {
    /// 300 ms of 16 kHz mono PCM16.
    fn default() -> Self {
        Self::new(9600)
    }
}

#[async_trait]
impl FrameHandler for AudioBufferProcessor {
    fn name(&self) -> &str {
        "AudioBuffer"
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

        self.sample_rate = audio.audio.sample_rate;
        self.num_channels = audio.audio.num_channels;
        self.last_pts = audio.pts().or(self.last_pts);
        self.buffer.extend_from_slice(&audio.audio.audio);

        if self.buffer.len() >= self.target_bytes {
            let block = std::mem::take(&mut self.buffer);
            let mut out = AudioFrame::from_pcm(block, self.sample_rate, self.num_channels);
            out.set_pts(self.last_pts);
            ctx.forward(Frame::Audio(out)).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{AudioData, StartFrame};
    use crate::processors::processor::test_handle;

    fn loud_frame(samples: usize) -> Frame {
        Frame::Audio(AudioFrame::new(AudioData::from_samples_f32(
            &vec![0.9f32; samples],
            16000,
            1,
        )))
    }

    fn quiet_frame(samples: usize) -> Frame {
        Frame::Audio(AudioFrame::new(AudioData::from_samples_f32(
            &vec![0.0f32; samples],
            16000,
            1,
        )))
    }

    #[test]
    fn rms_energy_of_silence_is_zero() {
        assert_eq!(rms_energy(&[0.0, 0.0, 0.0]), 0.0);
        assert!(rms_energy(&[]) == 0.0);
    }

    #[tokio::test]
    async fn vad_emits_complete_utterance_after_silence() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("vad", Some(next), None);
        // 2 silence chunks close the utterance (0.04s * 50).
        let mut vad = VadProcessor::new(0.5, 0.04);

        for _ in 0..3 {
            vad.handle(loud_frame(320), &ctx).await.unwrap();
        }
        for _ in 0..2 {
            vad.handle(quiet_frame(320), &ctx).await.unwrap();
        }

        let out = tokio::time::timeout(std::time::Duration::from_millis(200), next_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        match out {
            Frame::Audio(a) => {
                assert_eq!(a.audio.num_frames, 3 * 320);
                assert_eq!(
                    a.metadata().get(META_COMPLETE_UTTERANCE),
                    Some(&serde_json::json!(true))
                );
            }
            other => panic!("expected AudioFrame, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn vad_consumes_interim_audio_and_passes_control() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("vad", Some(next), None);
        let mut vad = VadProcessor::default();

        vad.handle(loud_frame(320), &ctx).await.unwrap();
        vad.handle(Frame::Start(StartFrame::new()), &ctx)
            .await
            .unwrap();

        // Only the control frame comes out.
        assert!(matches!(next_rx.recv().await.unwrap(), Frame::Start(_)));
        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), next_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn audio_buffer_coalesces_chunks() {
        let (next, mut next_rx) = test_handle("next");
        let ctx = HandlerContext::for_test("buf", Some(next), None);
        let mut buf = AudioBufferProcessor::new(1280);

        // Two 320-sample chunks (640 bytes each): the second crosses 1280.
        buf.handle(quiet_frame(320), &ctx).await.unwrap();
        buf.handle(quiet_frame(320), &ctx).await.unwrap();

        let out = tokio::time::timeout(std::time::Duration::from_millis(200), next_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        match out {
            Frame::Audio(a) => assert_eq!(a.audio.audio.len(), 1280),
            other => panic!("expected AudioFrame, got {}", other.name()),
        }
    }
}
