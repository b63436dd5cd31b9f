// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Processor contract tests: queue priority, FIFO ordering, error isolation,
//! terminal drops, and the adapter contract under backend failure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use avatarflow::prelude::*;

/// Poll until `cond` holds, panicking after two seconds.
async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !cond() {
        if start.elapsed() > Duration::from_secs(2) {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct Uppercase;

#[async_trait]
impl FrameHandler for Uppercase {
    fn name(&self) -> &str {
        "Uppercase"
    }

    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError> {
        match frame {
            Frame::Text(mut text) => {
                text.text = text.text.to_uppercase();
                ctx.forward(Frame::Text(text)).await;
            }
            Frame::Error(_) => ctx.push_upstream(frame).await,
            other => ctx.forward(other).await,
        }
        Ok(())
    }
}

/// Fails on every third data frame, forwards the rest.
struct FailEveryThird {
    seen: usize,
}

#[async_trait]
impl FrameHandler for FailEveryThird {
    fn name(&self) -> &str {
        "FailEveryThird"
    }

    async fn handle(&mut self, frame: Frame, ctx: &HandlerContext) -> Result<(), PipelineError> {
        match frame {
            Frame::Text(text) => {
                self.seen += 1;
                if self.seen % 3 == 0 {
                    return Err(PipelineError::Service(format!(
                        "synthetic failure on frame {}",
                        self.seen
                    )));
                }
                ctx.forward(Frame::Text(text)).await;
                Ok(())
            }
            other => {
                ctx.forward(other).await;
                Ok(())
            }
        }
    }
}

#[tokio::test]
async fn control_enqueued_after_data_is_handled_first() {
    // Scenario: both frames are queued before the loop ever runs; the control
    // frame was enqueued second but must be observed first.
    let collector = CollectorProcessor::new();
    let collected = collector.collected();
    let mut proc = FrameProcessor::new(collector);

    proc.enqueue(Frame::Text(TextFrame::new("data"))).await;
    proc.enqueue(Frame::Start(StartFrame::new())).await;

    proc.start();
    wait_until("both frames handled", || collected.len() == 2).await;

    assert_eq!(collected.names(), vec!["StartFrame", "TextFrame"]);
    proc.stop().await;
}

#[tokio::test]
async fn data_frames_keep_fifo_order() {
    let collector = CollectorProcessor::new();
    let collected = collector.collected();
    let mut proc = FrameProcessor::new(collector);
    proc.start();

    for i in 0..10 {
        proc.enqueue(Frame::Text(TextFrame::new(format!("msg{i}"))))
            .await;
    }

    wait_until("all frames handled", || collected.len() == 10).await;
    let expected: Vec<String> = (0..10).map(|i| format!("msg{i}")).collect();
    assert_eq!(collected.texts(), expected);
    proc.stop().await;
}

#[tokio::test]
async fn transform_forwards_each_frame_at_most_once() {
    let collector = CollectorProcessor::new();
    let collected = collector.collected();
    let mut upper = FrameProcessor::new(Uppercase);
    let mut sink = FrameProcessor::new(collector);
    upper.link(&mut sink);
    upper.start();
    sink.start();

    for i in 0..20 {
        upper
            .enqueue(Frame::Text(TextFrame::new(format!("m{i}"))))
            .await;
    }

    wait_until("all frames forwarded", || collected.len() >= 20).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(collected.len(), 20, "no frame may be forwarded twice");

    upper.stop().await;
    sink.stop().await;
}

#[tokio::test]
async fn handler_failure_raises_upstream_and_loop_continues() {
    // stub <- flaky -> sink; ten data frames, every third one fails.
    let upstream = CollectorProcessor::new();
    let errors = upstream.collected();
    let downstream = CollectorProcessor::new();
    let forwarded = downstream.collected();

    let mut stub = FrameProcessor::new(upstream);
    let mut flaky = FrameProcessor::new(FailEveryThird { seen: 0 });
    let mut sink = FrameProcessor::new(downstream);
    stub.link(&mut flaky);
    flaky.link(&mut sink);
    let flaky_name = flaky.name().to_string();

    stub.start();
    flaky.start();
    sink.start();

    for i in 1..=10 {
        flaky
            .enqueue(Frame::Text(TextFrame::new(format!("frame{i}"))))
            .await;
    }

    wait_until("seven frames forwarded", || forwarded.len() == 7).await;
    wait_until("three errors raised", || errors.len() == 3).await;

    // Frames 3, 6, and 9 failed; the rest came through in order.
    let expected: Vec<String> = [1, 2, 4, 5, 7, 8, 10]
        .iter()
        .map(|i| format!("frame{i}"))
        .collect();
    assert_eq!(forwarded.texts(), expected);

    errors.map(|frames| {
        for frame in frames {
            match frame {
                Frame::Error(err) => {
                    assert_eq!(err.source.as_deref(), Some(flaky_name.as_str()));
                    assert!(err.error.contains("synthetic failure"));
                }
                other => panic!("expected ErrorFrame, got {}", other.name()),
            }
        }
    });

    stub.stop().await;
    flaky.stop().await;
    sink.stop().await;
}

#[tokio::test]
async fn forward_without_next_drops_without_crashing() {
    let mut proc = FrameProcessor::new(PassthroughProcessor);
    proc.start();

    proc.enqueue(Frame::Text(TextFrame::new("into the void")))
        .await;
    proc.enqueue(Frame::Text(TextFrame::new("still alive")))
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(proc.is_running(), "terminal drop must not kill the loop");
    proc.stop().await;
}

// ---------------------------------------------------------------------------
// Adapter contract under backend failure
// ---------------------------------------------------------------------------

struct AlwaysFailingStt {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl SttBackend for AlwaysFailingStt {
    async fn transcribe(&mut self, _audio: &AudioData) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::Service("recognizer unavailable".into()))
    }
}

#[tokio::test]
async fn failing_adapter_raises_once_and_stays_transparent() {
    let upstream = CollectorProcessor::new();
    let errors = upstream.collected();
    let downstream = CollectorProcessor::new();
    let forwarded = downstream.collected();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut stub = FrameProcessor::new(upstream);
    let mut stt = FrameProcessor::new(SttProcessor::new(AlwaysFailingStt {
        calls: calls.clone(),
    }));
    let mut sink = FrameProcessor::new(downstream);
    stub.link(&mut stt);
    stt.link(&mut sink);

    stub.start();
    stt.start();
    sink.start();

    // One matching input: backend invoked once, one error upstream, nothing
    // forwarded.
    let mut utterance = AudioFrame::from_pcm(vec![0u8; 640], 16000, 1);
    utterance
        .metadata_mut()
        .insert(META_COMPLETE_UTTERANCE.to_string(), serde_json::json!(true));
    stt.enqueue(Frame::Audio(utterance)).await;

    wait_until("error raised", || errors.len() == 1).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(forwarded.is_empty());

    // One non-matching input: forwarded unchanged, backend never invoked.
    stt.enqueue(Frame::Text(TextFrame::new("typed instead")))
        .await;
    wait_until("text forwarded", || forwarded.len() == 1).await;
    assert_eq!(forwarded.texts(), vec!["typed instead"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    stub.stop().await;
    stt.stop().await;
    sink.stop().await;
}
