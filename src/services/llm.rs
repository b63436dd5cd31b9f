// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Language-model adapter: [`TextFrame`] → [`TextFrame`].

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::frames::{Frame, TextFrame};
use crate::processors::{FrameHandler, HandlerContext};
use crate::services::ChatMessage;

/// Language-model backend: one opaque completion call over a conversation.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate the assistant's next reply for the given history.
    async fn generate(&mut self, messages: &[ChatMessage]) -> Result<String, PipelineError>;
}

/// Language-model adapter processor.
///
/// Keeps the conversation history local to the adapter instance: each
/// inbound text frame is appended as a user turn, the backend reply as an
/// assistant turn. Replies carry the source frame's timestamp and a
/// `conversation_turn` metadata entry.
pub struct LlmProcessor {
    backend: Box<dyn LlmBackend>,
    history: Vec<ChatMessage>,
}

impl LlmProcessor {
    pub fn new(backend: impl LlmBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            history: Vec::new(),
        }
    }

    /// Seed the conversation with a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.history.insert(0, ChatMessage::system(prompt));
        self
    }

    /// The accumulated conversation history.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

#[async_trait]
impl FrameHandler for LlmProcessor {
    fn name(&self) -> &str {
        "Llm"
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

        tracing::info!(processor = %ctx.name(), user = %text.text, "user turn");
        self.history.push(ChatMessage::user(&text.text));

        let response = self.backend.generate(&self.history).await?;
        self.history.push(ChatMessage::assistant(&response));
        tracing::info!(processor = %ctx.name(), assistant = %response, "assistant turn");

        let mut out = TextFrame::new(response);
        out.set_pts(text.pts());
        out.metadata_mut().insert(
            "conversation_turn".to_string(),
            serde_json::json!(self.history.len() / 2),
        );
        ctx.forward(Frame::Text(out)).await;
        Ok(())
    }
}
