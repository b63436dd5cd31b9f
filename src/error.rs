// Copyright (c) 2024-2026, Avatarflow Authors
// SPDX-License-Identifier: BSD-2-Clause

//! Error taxonomy for the pipeline framework.
//!
//! Every error in this crate is recoverable at the chain level: the processor
//! run loop converts a failed `handle()` into an upstream [`ErrorFrame`] and
//! keeps going. Retry policy, where desired, belongs inside a backend
//! implementation wrapping its one external call, never in the chain.
//!
//! [`ErrorFrame`]: crate::frames::ErrorFrame

use thiserror::Error;

/// Errors surfaced by processors and service backends.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A processor-local failure (bad frame payload, exhausted state, panic).
    #[error("[{name}] {message}")]
    Processor {
        /// Name of the processor that failed.
        name: String,
        /// Human-readable failure description.
        message: String,
    },

    /// A failure reported by an external AI service (STT, TTS, LLM).
    #[error("service error: {0}")]
    Service(String),

    /// A failure reported by a network transport binding.
    #[error("transport error: {0}")]
    Transport(String),

    /// A failure during avatar frame generation.
    #[error("avatar error: {0}")]
    Avatar(String),
}

impl PipelineError {
    /// Convenience constructor for processor-local failures.
    pub fn processor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processor {
            name: name.into(),
            message: message.into(),
        }
    }
}
