// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! External service integrations.
//!
//! Every external AI or media service enters the chain through an adapter
//! processor wrapping exactly one backend trait. Adapters share one contract:
//!
//! 1. A frame of the expected input type invokes the backend (an opaque,
//!    potentially slow or unreliable call).
//! 2. On success the result is wrapped in the output frame type, timestamp
//!    and correlation metadata are carried over, and the frame is forwarded.
//! 3. On failure the error is raised upstream and nothing is forwarded for
//!    that input; the loop continues with the next frame.
//! 4. Frames of any other type are forwarded unchanged (error frames are
//!    relayed upstream), so adapters are transparent to stages they do not
//!    understand.
//!
//! No retry or timeout lives in this layer; both belong inside a backend
//! implementation wrapping its own call.

pub mod avatar;
pub mod llm;
pub mod stt;
pub mod transport;
pub mod tts;

pub use avatar::{AvatarBackend, AvatarProcessor, ModelRegistry, SharedAvatarBackend};
pub use llm::{LlmBackend, LlmProcessor};
pub use stt::{SttBackend, SttProcessor};
pub use transport::{MediaSink, MediaSource, TransportProcessor};
pub use tts::{TtsBackend, TtsProcessor};

use serde::{Deserialize, Serialize};

/// One turn of a conversation, as exchanged with a language-model backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant".
    pub role: String,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}
